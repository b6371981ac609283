use crate::models::{CatalogRow, OutfitSlotItem, TokenSet};
use crate::schema::AttributeBag;
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct MatcherConfig {
    /// A narrower level replaces the current one only if it keeps at least
    /// this many rows; otherwise the chain rolls back and stops.
    pub min_keep: usize,
    pub per_slot_cap: usize,
    /// Whether unisex rows join the gender-filtered base corpus.
    pub include_unisex: bool,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            min_keep: 2,
            per_slot_cap: 100,
            include_unisex: true,
        }
    }
}

impl MatcherConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            min_keep: usize_from_env("MATCH_MIN_KEEP", defaults.min_keep),
            per_slot_cap: usize_from_env("MATCH_PER_SLOT_CAP", defaults.per_slot_cap),
            include_unisex: std::env::var("MATCH_INCLUDE_UNISEX")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(defaults.include_unisex),
        }
    }
}

fn usize_from_env(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

/// Progressive constraint relaxation over one slot item. Level 0 is the
/// category floor (primary category-id equality unioned with a case-sensitive
/// name substring match) and is never narrowed below. Each optional
/// dimension then filters the previous level in a fixed order
/// (color, fabric, pattern, detail); a level that keeps fewer than
/// `min_keep` rows is discarded and the chain stops at the last level that
/// held. An absent dimension also stops the chain. Candidates come back
/// de-duplicated by image URL, in corpus order.
pub fn match_item<'a>(
    base: &[&'a CatalogRow],
    slot: &OutfitSlotItem,
    config: &MatcherConfig,
) -> Vec<&'a CatalogRow> {
    let mut current: Vec<&CatalogRow> = base
        .iter()
        .copied()
        .filter(|row| {
            row.category_id.first().is_some_and(|c| c == &slot.category)
                || row.name.contains(&slot.category)
        })
        .collect();

    let dimensions: [(&str, &Option<TokenSet>, fn(&AttributeBag) -> Vec<&str>); 4] = [
        ("color", &slot.color, AttributeBag::color_terms),
        ("fabric", &slot.fabric, AttributeBag::fabric_terms),
        ("pattern", &slot.pattern, AttributeBag::pattern_terms),
        ("detail", &slot.detail, AttributeBag::detail_terms),
    ];

    for (dimension, tokens, terms) in dimensions {
        let Some(tokens) = tokens else { break };
        let narrowed: Vec<&CatalogRow> = current
            .iter()
            .copied()
            .filter(|row| dimension_matches(row, tokens, terms))
            .collect();
        if narrowed.len() < config.min_keep {
            debug!(
                target = "stylist.matcher",
                category = %slot.category,
                dimension,
                kept = narrowed.len(),
                "narrowing below min_keep, rolling back"
            );
            break;
        }
        current = narrowed;
    }

    dedup_by_image_url(current)
}

/// Substring-or-field policy: a token matches when it equals one of the
/// row's extracted field terms for this dimension (case-insensitive) or
/// appears verbatim in the row name.
fn dimension_matches(
    row: &CatalogRow,
    tokens: &TokenSet,
    terms: fn(&AttributeBag) -> Vec<&str>,
) -> bool {
    let field_terms: Vec<String> = row
        .extracted
        .as_ref()
        .map(|bag| terms(bag).into_iter().map(str::to_lowercase).collect())
        .unwrap_or_default();
    tokens.tokens().into_iter().any(|token| {
        let lowered = token.to_lowercase();
        field_terms.iter().any(|term| *term == lowered) || row.name.contains(token)
    })
}

fn dedup_by_image_url<'a>(rows: Vec<&'a CatalogRow>) -> Vec<&'a CatalogRow> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|row| {
            let url = row.image_url.trim();
            url.is_empty() || seen.insert(url.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::test_support::footwear_bag;

    fn row(good_id: &str, name: &str, categories: &[&str], url: &str) -> CatalogRow {
        CatalogRow {
            good_id: good_id.into(),
            store_id: "s1".into(),
            name: name.into(),
            category_id: categories.iter().map(|c| c.to_string()).collect(),
            gender: Default::default(),
            image_url: url.into(),
            meta_category: Some("shoes".into()),
            extracted: None,
        }
    }

    fn slot(category: &str) -> OutfitSlotItem {
        OutfitSlotItem {
            category: category.into(),
            color: None,
            fabric: None,
            pattern: None,
            detail: None,
        }
    }

    fn config(min_keep: usize) -> MatcherConfig {
        MatcherConfig {
            min_keep,
            ..MatcherConfig::default()
        }
    }

    #[test]
    fn rolls_back_when_color_level_is_below_min_keep() {
        let only = row("g1", "blue cotton shirt", &["top", "shirt"], "");
        let base = vec![&only];
        let mut item = slot("top");
        item.color = Some(TokenSet::One("blue".into()));
        item.fabric = Some(TokenSet::One("cotton".into()));

        let result = match_item(&base, &item, &config(2));
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].good_id, "g1");
    }

    #[test]
    fn narrows_when_the_level_holds_enough_rows() {
        let rows = vec![
            row("g1", "blue shirt top", &["top"], "u1"),
            row("g2", "blue linen top", &["top"], "u2"),
            row("g3", "red silk top", &["top"], "u3"),
        ];
        let base: Vec<&CatalogRow> = rows.iter().collect();
        let mut item = slot("top");
        item.color = Some(TokenSet::One("blue".into()));

        let result = match_item(&base, &item, &config(2));
        let ids: Vec<&str> = result.iter().map(|r| r.good_id.as_str()).collect();
        assert_eq!(ids, vec!["g1", "g2"]);
    }

    #[test]
    fn category_floor_unions_field_equality_and_name_substring() {
        let rows = vec![
            row("g1", "crew-neck tee", &["top"], ""),
            row("g2", "halter top in silk", &["shirt"], ""),
            row("g3", "denim jeans", &["bottom"], ""),
        ];
        let base: Vec<&CatalogRow> = rows.iter().collect();

        let result = match_item(&base, &slot("top"), &config(2));
        let ids: Vec<&str> = result.iter().map(|r| r.good_id.as_str()).collect();
        assert_eq!(ids, vec!["g1", "g2"]);
    }

    #[test]
    fn tokens_match_extracted_field_terms_case_insensitively() {
        let mut with_bag = row("g1", "plain item one", &["sneakers"], "");
        with_bag.extracted = Some(footwear_bag("sneakers", None));
        let mut other = row("g2", "plain item two", &["sneakers"], "");
        other.extracted = Some(footwear_bag("sneakers", None));
        other.extracted.as_mut().unwrap().shared_mut().color_tone = "vivid".into();
        let third = row("g3", "plain item three", &["sneakers"], "");
        let base = vec![&with_bag, &other, &third];

        let mut item = slot("sneakers");
        item.color = Some(TokenSet::One("Muted".into()));
        // only g1 carries the "muted" tone; below min_keep=2 the chain
        // rolls back to the category floor
        assert_eq!(match_item(&base, &item, &config(2)).len(), 3);
        let narrowed = match_item(&base, &item, &config(1));
        assert_eq!(narrowed.len(), 1);
        assert_eq!(narrowed[0].good_id, "g1");
    }

    #[test]
    fn absent_dimension_stops_the_chain() {
        let rows = vec![
            row("g1", "silk top", &["top"], "u1"),
            row("g2", "cotton top", &["top"], "u2"),
        ];
        let base: Vec<&CatalogRow> = rows.iter().collect();
        let mut item = slot("top");
        // no color hint: the fabric hint is never reached
        item.fabric = Some(TokenSet::One("silk".into()));

        assert_eq!(match_item(&base, &item, &config(1)).len(), 2);
    }

    #[test]
    fn candidates_are_deduplicated_by_image_url() {
        let rows = vec![
            row("g1", "blue top", &["top"], "https://cdn/a.jpg"),
            row("g2", "blue top restock", &["top"], "https://cdn/a.jpg"),
        ];
        let base: Vec<&CatalogRow> = rows.iter().collect();

        let result = match_item(&base, &slot("top"), &config(2));
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].good_id, "g1");
    }

    #[test]
    fn name_substring_match_is_case_sensitive() {
        let rows = vec![row("g1", "Crop Top", &["shirt"], "")];
        let base: Vec<&CatalogRow> = rows.iter().collect();
        assert!(match_item(&base, &slot("top"), &config(1)).is_empty());
        assert_eq!(match_item(&base, &slot("Top"), &config(1)).len(), 1);
    }
}
