use crate::matcher::{MatcherConfig, match_item};
use crate::models::{CatalogRow, Gender, GeneratedLook, MatchResult, SlotKey};
use tracing::debug;

/// Gender-filtered view of the corpus for one query. Rows tagged with the
/// look's sex are eligible; unisex rows join only when the config says so.
pub fn base_corpus<'a>(
    corpus: &'a [CatalogRow],
    sex: Gender,
    config: &MatcherConfig,
) -> Vec<&'a CatalogRow> {
    corpus
        .iter()
        .filter(|row| {
            row.gender == sex || (config.include_unisex && row.gender == Gender::Unisex)
        })
        .collect()
}

/// Runs the matcher over every slot of the look and assembles the keyed
/// candidate sets. Slots with no candidates are omitted, not stored empty.
pub fn assemble(corpus: &[CatalogRow], look: &GeneratedLook, config: &MatcherConfig) -> MatchResult {
    let base = base_corpus(corpus, look.sex, config);
    let mut result = MatchResult::default();

    for (part, items) in look.parts() {
        for (index, item) in items.iter().enumerate() {
            let candidates = match_item(&base, item, config);
            debug!(
                target = "stylist.look",
                part = part.as_str(),
                category = %item.category,
                index,
                candidates = candidates.len(),
                "slot matched"
            );
            if candidates.is_empty() {
                continue;
            }
            let key = SlotKey {
                part,
                category: item.category.clone(),
                index,
            };
            let capped = candidates
                .into_iter()
                .take(config.per_slot_cap)
                .cloned()
                .collect();
            result.slots.insert(key, capped);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LookPart, OutfitSlotItem};

    fn row(good_id: &str, name: &str, category: &str, gender: Gender) -> CatalogRow {
        CatalogRow {
            good_id: good_id.into(),
            store_id: "s1".into(),
            name: name.into(),
            category_id: vec![category.into()],
            gender,
            image_url: format!("https://cdn/{good_id}.jpg"),
            meta_category: None,
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

    fn look_with_top(sex: Gender, items: Vec<OutfitSlotItem>) -> GeneratedLook {
        GeneratedLook {
            sex,
            season: None,
            top: items,
            bottom: vec![],
            full: vec![],
            shoes: vec![],
            outerwear: vec![],
            accessories: vec![],
        }
    }

    #[test]
    fn base_corpus_keeps_matching_sex_and_unisex_only() {
        let corpus = vec![
            row("g1", "tee", "top", Gender::Unisex),
            row("g2", "tank", "top", Gender::Unisex),
            row("g3", "polo", "top", Gender::Male),
        ];
        let base = base_corpus(&corpus, Gender::Female, &MatcherConfig::default());
        let ids: Vec<&str> = base.iter().map(|r| r.good_id.as_str()).collect();
        assert_eq!(ids, vec!["g1", "g2"]);

        let without_unisex = MatcherConfig {
            include_unisex: false,
            ..MatcherConfig::default()
        };
        assert!(base_corpus(&corpus, Gender::Female, &without_unisex).is_empty());
    }

    #[test]
    fn assemble_keys_slots_and_omits_empty_ones() {
        let corpus = vec![
            row("g1", "linen top", "top", Gender::Female),
            row("g2", "silk top", "top", Gender::Female),
        ];
        let look = look_with_top(Gender::Female, vec![slot("top"), slot("coat")]);
        let result = assemble(&corpus, &look, &MatcherConfig::default());

        assert_eq!(result.slots.len(), 1);
        let key = SlotKey {
            part: LookPart::Top,
            category: "top".into(),
            index: 0,
        };
        assert_eq!(result.slots[&key].len(), 2);
        assert_eq!(key.to_string(), "top/top/0");
    }

    #[test]
    fn per_slot_cap_truncates_in_corpus_order() {
        let corpus: Vec<CatalogRow> = (0..5)
            .map(|i| row(&format!("g{i}"), "plain top", "top", Gender::Female))
            .collect();
        let config = MatcherConfig {
            per_slot_cap: 3,
            ..MatcherConfig::default()
        };
        let look = look_with_top(Gender::Female, vec![slot("top")]);
        let result = assemble(&corpus, &look, &config);

        let key = SlotKey {
            part: LookPart::Top,
            category: "top".into(),
            index: 0,
        };
        let ids: Vec<&str> = result.slots[&key].iter().map(|r| r.good_id.as_str()).collect();
        assert_eq!(ids, vec!["g0", "g1", "g2"]);
    }
}
