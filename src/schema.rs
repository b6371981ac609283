use crate::prompts::{GENERAL_EXTRACTION_PROMPT, INLINE_EXTRACTION_SUFFIX};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use thiserror::Error;

/// Coarse garment class determining which attribute schema and prompt apply.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum MetaCategory {
    UpperBody,
    LowerBody,
    FullBody,
    Outerwear,
    Footwear,
    Bag,
    Accessory,
}

impl MetaCategory {
    /// Resolves a corpus meta-category tag. The corpus still carries the
    /// legacy short tags (`top`, `outwear`, `accessorize`) next to the
    /// canonical kebab-case names.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_lowercase().as_str() {
            "top" | "upper-body" => Some(MetaCategory::UpperBody),
            "bottom" | "lower-body" => Some(MetaCategory::LowerBody),
            "fullbody" | "full-body" => Some(MetaCategory::FullBody),
            "outwear" | "outerwear" => Some(MetaCategory::Outerwear),
            "shoes" | "footwear" => Some(MetaCategory::Footwear),
            "bag" => Some(MetaCategory::Bag),
            "accessorize" | "accessory" | "accessories" => Some(MetaCategory::Accessory),
            _ => None,
        }
    }

    fn index(self) -> usize {
        match self {
            MetaCategory::UpperBody => 0,
            MetaCategory::LowerBody => 1,
            MetaCategory::FullBody => 2,
            MetaCategory::Outerwear => 3,
            MetaCategory::Footwear => 4,
            MetaCategory::Bag => 5,
            MetaCategory::Accessory => 6,
        }
    }
}

/// Classification of agreement between a text description and an image for
/// the same catalog row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConsistencyVerdict {
    Match,
    Mismatch,
    Missing,
    Cropped,
}

/// `[H, S, L]` triple with H in 0..=360 and S, L in 0..=100.
pub type ColorHsl = [u16; 3];

/// Attribute block shared by every meta-category schema.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SharedAttributes {
    pub category: String,
    pub sex: String,
    pub pattern: String,
    pub color_temperature: String,
    pub color_tone: String,
    #[serde(default)]
    pub color_hsl: Vec<ColorHsl>,
    #[serde(default)]
    pub fabric: Vec<String>,
    pub surface: String,
    pub textured_surface_type: Option<String>,
    pub season: String,
    pub base: bool,
    #[serde(default)]
    pub style: Vec<String>,
    pub confidence: f32,
    pub consistency_check: Option<ConsistencyVerdict>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpperBodyAttributes {
    #[serde(flatten)]
    pub shared: SharedAttributes,
    pub fit: String,
    pub sleeve_len: String,
    #[serde(default)]
    pub neckline: Vec<String>,
    pub collar: Option<String>,
    pub closure: Option<String>,
    pub pockets: String,
    pub top_length: String,
    #[serde(default)]
    pub model_construction: Vec<String>,
    #[serde(default)]
    pub cut_features: Vec<String>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LowerBodyAttributes {
    #[serde(flatten)]
    pub shared: SharedAttributes,
    pub fit: String,
    pub waistline: String,
    pub waistband: String,
    pub pockets: String,
    pub length: String,
    #[serde(default)]
    pub model_construction: Vec<String>,
    #[serde(default)]
    pub cut_features: Vec<String>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FullBodyAttributes {
    #[serde(flatten)]
    pub shared: SharedAttributes,
    pub fit: String,
    pub sleeve_len: String,
    #[serde(default)]
    pub neckline: Vec<String>,
    pub collar: Option<String>,
    pub waistline: String,
    pub waistband: String,
    pub pockets: String,
    pub length: String,
    #[serde(default)]
    pub model_construction: Vec<String>,
    #[serde(default)]
    pub cut_features: Vec<String>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OuterwearAttributes {
    #[serde(flatten)]
    pub shared: SharedAttributes,
    pub fit: String,
    pub sleeve_len: String,
    pub collar: String,
    pub waistline: Option<String>,
    pub closure: Option<String>,
    pub pockets: String,
    pub length: String,
    #[serde(default)]
    pub model_construction: Vec<String>,
    #[serde(default)]
    pub cut_features: Vec<String>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FootwearAttributes {
    #[serde(flatten)]
    pub shared: SharedAttributes,
    pub sole_profile: String,
    pub shank_height: String,
    #[serde(default)]
    pub model_construction: Vec<String>,
}

/// Bags and miscellaneous accessories share one schema.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CarryAttributes {
    #[serde(flatten)]
    pub shared: SharedAttributes,
    #[serde(default)]
    pub model_construction: Vec<String>,
}

/// Schema-typed record of extracted garment attributes for one item,
/// tagged with its meta-category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "meta", rename_all = "kebab-case")]
pub enum AttributeBag {
    UpperBody(UpperBodyAttributes),
    LowerBody(LowerBodyAttributes),
    FullBody(FullBodyAttributes),
    Outerwear(OuterwearAttributes),
    Footwear(FootwearAttributes),
    Bag(CarryAttributes),
    Accessory(CarryAttributes),
}

#[derive(Debug, Error)]
#[error("attribute record violates the `{meta:?}` schema: {detail}")]
pub struct SchemaViolation {
    pub meta: MetaCategory,
    pub detail: String,
}

impl AttributeBag {
    /// Decodes an untagged model response against the schema `meta` selects
    /// and checks field bounds. Any failure here is a contract violation.
    pub fn from_response(meta: MetaCategory, value: serde_json::Value) -> Result<Self, SchemaViolation> {
        let violation = |err: serde_json::Error| SchemaViolation {
            meta,
            detail: err.to_string(),
        };
        let bag = match meta {
            MetaCategory::UpperBody => {
                AttributeBag::UpperBody(serde_json::from_value(value).map_err(violation)?)
            }
            MetaCategory::LowerBody => {
                AttributeBag::LowerBody(serde_json::from_value(value).map_err(violation)?)
            }
            MetaCategory::FullBody => {
                AttributeBag::FullBody(serde_json::from_value(value).map_err(violation)?)
            }
            MetaCategory::Outerwear => {
                AttributeBag::Outerwear(serde_json::from_value(value).map_err(violation)?)
            }
            MetaCategory::Footwear => {
                AttributeBag::Footwear(serde_json::from_value(value).map_err(violation)?)
            }
            MetaCategory::Bag => {
                AttributeBag::Bag(serde_json::from_value(value).map_err(violation)?)
            }
            MetaCategory::Accessory => {
                AttributeBag::Accessory(serde_json::from_value(value).map_err(violation)?)
            }
        };
        bag.validate()?;
        Ok(bag)
    }

    pub fn meta(&self) -> MetaCategory {
        match self {
            AttributeBag::UpperBody(_) => MetaCategory::UpperBody,
            AttributeBag::LowerBody(_) => MetaCategory::LowerBody,
            AttributeBag::FullBody(_) => MetaCategory::FullBody,
            AttributeBag::Outerwear(_) => MetaCategory::Outerwear,
            AttributeBag::Footwear(_) => MetaCategory::Footwear,
            AttributeBag::Bag(_) => MetaCategory::Bag,
            AttributeBag::Accessory(_) => MetaCategory::Accessory,
        }
    }

    pub fn shared(&self) -> &SharedAttributes {
        match self {
            AttributeBag::UpperBody(a) => &a.shared,
            AttributeBag::LowerBody(a) => &a.shared,
            AttributeBag::FullBody(a) => &a.shared,
            AttributeBag::Outerwear(a) => &a.shared,
            AttributeBag::Footwear(a) => &a.shared,
            AttributeBag::Bag(a) | AttributeBag::Accessory(a) => &a.shared,
        }
    }

    pub fn shared_mut(&mut self) -> &mut SharedAttributes {
        match self {
            AttributeBag::UpperBody(a) => &mut a.shared,
            AttributeBag::LowerBody(a) => &mut a.shared,
            AttributeBag::FullBody(a) => &mut a.shared,
            AttributeBag::Outerwear(a) => &mut a.shared,
            AttributeBag::Footwear(a) => &mut a.shared,
            AttributeBag::Bag(a) | AttributeBag::Accessory(a) => &mut a.shared,
        }
    }

    pub fn category(&self) -> &str {
        &self.shared().category
    }

    pub fn verdict(&self) -> Option<ConsistencyVerdict> {
        self.shared().consistency_check
    }

    pub fn color_terms(&self) -> Vec<&str> {
        let shared = self.shared();
        vec![shared.color_tone.as_str(), shared.color_temperature.as_str()]
    }

    pub fn fabric_terms(&self) -> Vec<&str> {
        self.shared().fabric.iter().map(String::as_str).collect()
    }

    pub fn pattern_terms(&self) -> Vec<&str> {
        vec![self.shared().pattern.as_str()]
    }

    pub fn detail_terms(&self) -> Vec<&str> {
        let (construction, cut) = match self {
            AttributeBag::UpperBody(a) => (&a.model_construction, Some(&a.cut_features)),
            AttributeBag::LowerBody(a) => (&a.model_construction, Some(&a.cut_features)),
            AttributeBag::FullBody(a) => (&a.model_construction, Some(&a.cut_features)),
            AttributeBag::Outerwear(a) => (&a.model_construction, Some(&a.cut_features)),
            AttributeBag::Footwear(a) => (&a.model_construction, None),
            AttributeBag::Bag(a) | AttributeBag::Accessory(a) => (&a.model_construction, None),
        };
        let mut terms: Vec<&str> = construction.iter().map(String::as_str).collect();
        if let Some(cut) = cut {
            terms.extend(cut.iter().map(String::as_str));
        }
        terms
    }

    pub fn validate(&self) -> Result<(), SchemaViolation> {
        let meta = self.meta();
        let shared = self.shared();
        if shared.category.trim().is_empty() {
            return Err(SchemaViolation {
                meta,
                detail: "empty category".into(),
            });
        }
        if !(0.0..=1.0).contains(&shared.confidence) {
            return Err(SchemaViolation {
                meta,
                detail: format!("confidence {} outside [0, 1]", shared.confidence),
            });
        }
        for &[h, s, l] in &shared.color_hsl {
            if h > 360 || s > 100 || l > 100 {
                return Err(SchemaViolation {
                    meta,
                    detail: format!("color_hsl [{h}, {s}, {l}] out of range"),
                });
            }
        }
        Ok(())
    }
}

/// Per-meta-category configuration for one extraction call. Defined at
/// process start, never mutated.
#[derive(Debug, Clone, Copy)]
pub struct MetaCategoryTemplate {
    pub meta: MetaCategory,
    pub model: &'static str,
    pub metacategory_name: &'static str,
    pub category_examples: &'static str,
    pub silhouette_examples: &'static str,
    pub max_completion_tokens: u32,
}

impl MetaCategoryTemplate {
    pub fn system_prompt(&self) -> String {
        GENERAL_EXTRACTION_PROMPT
            .replace("**META_CATEGORY_NAME**", self.metacategory_name)
            .replace("**CATEGORY_EXAMPLES**", self.category_examples)
            .replace("**MODEL_EXAMPLES**", self.silhouette_examples)
    }

    pub fn inline_prompt(&self, description: &str) -> String {
        let mut prompt = self.system_prompt();
        prompt.push_str(&INLINE_EXTRACTION_SUFFIX.replace("**NAME**", description));
        prompt
    }
}

const DEFAULT_MODEL: &str = "gpt-4.1-mini";
const LIGHT_MODEL: &str = "gpt-4.1-nano";

static TEMPLATES: [MetaCategoryTemplate; 7] = [
    MetaCategoryTemplate {
        meta: MetaCategory::UpperBody,
        model: DEFAULT_MODEL,
        metacategory_name: "top",
        category_examples: "(e.g. polo, shirt, tee, top, tank top, blazer, etc.)",
        silhouette_examples: "(e.g. for top: crop top, halter top, tube top; for tank top - none)",
        max_completion_tokens: 15_000,
    },
    MetaCategoryTemplate {
        meta: MetaCategory::LowerBody,
        model: DEFAULT_MODEL,
        metacategory_name: "bottom",
        category_examples: "(e.g. pants, skirt, jeans, etc.)",
        silhouette_examples: "(e.g. for pants and jeans: skinny, palazzo, pencil, straight, etc.)",
        max_completion_tokens: 15_000,
    },
    MetaCategoryTemplate {
        meta: MetaCategory::FullBody,
        model: DEFAULT_MODEL,
        metacategory_name: "fullbody",
        category_examples: "(e.g. dress, suit, set, etc.)",
        silhouette_examples: "(e.g. for dress: straight, cocoon, wrap, etc.)",
        max_completion_tokens: 15_000,
    },
    MetaCategoryTemplate {
        meta: MetaCategory::Outerwear,
        model: DEFAULT_MODEL,
        metacategory_name: "outerwear",
        category_examples: "(e.g. coat, parka, puffer, cape, etc.)",
        silhouette_examples: "(e.g. for coat: straight, cocoon, wrap, etc.)",
        max_completion_tokens: 15_000,
    },
    MetaCategoryTemplate {
        meta: MetaCategory::Footwear,
        model: LIGHT_MODEL,
        metacategory_name: "shoes",
        category_examples: "(loafers, sneakers, boots, booties, pumps, flats, sandals)",
        silhouette_examples: "(e.g. for sneakers: sneaker, running, dad-shoes, etc.)",
        max_completion_tokens: 10_000,
    },
    MetaCategoryTemplate {
        meta: MetaCategory::Bag,
        model: LIGHT_MODEL,
        metacategory_name: "bag",
        category_examples: "(one of: clutch, backpack, crossbody, belt bag, tote, shopper, briefcase)",
        silhouette_examples: "",
        max_completion_tokens: 10_000,
    },
    MetaCategoryTemplate {
        meta: MetaCategory::Accessory,
        model: LIGHT_MODEL,
        metacategory_name: "accessory",
        category_examples: "(e.g. watch, scarf, hat, shawl, tie, bracelet, etc.)",
        silhouette_examples: "",
        max_completion_tokens: 10_000,
    },
];

#[derive(Debug, Error)]
#[error("unknown meta-category `{0}`")]
pub struct UnknownCategory(pub String);

pub fn template(meta: MetaCategory) -> &'static MetaCategoryTemplate {
    &TEMPLATES[meta.index()]
}

/// Resolves a corpus meta-category tag to its template. Callers are expected
/// to skip the corresponding rows on `UnknownCategory`, not abort the batch.
pub fn lookup(tag: &str) -> Result<&'static MetaCategoryTemplate, UnknownCategory> {
    let meta = MetaCategory::from_tag(tag).ok_or_else(|| UnknownCategory(tag.to_string()))?;
    Ok(template(meta))
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn upper_body_payload() -> serde_json::Value {
        json!({
            "category": "shirt",
            "sex": "f",
            "pattern": "no-print",
            "color_temperature": "cold",
            "color_tone": "pastel",
            "color_hsl": [[210, 40, 80]],
            "fabric": ["cotton"],
            "surface": "matte",
            "textured_surface_type": null,
            "season": "demi",
            "base": true,
            "style": ["smart-casual"],
            "confidence": 0.85,
            "fit": "semi-fitted",
            "sleeve_len": "long",
            "neckline": ["round"],
            "collar": "classic",
            "closure": "buttons",
            "pockets": "non",
            "top_length": "reg",
            "model_construction": ["shirt"],
            "cut_features": []
        })
    }

    #[test]
    fn resolves_legacy_and_canonical_tags() {
        assert_eq!(MetaCategory::from_tag("top"), Some(MetaCategory::UpperBody));
        assert_eq!(
            MetaCategory::from_tag("upper-body"),
            Some(MetaCategory::UpperBody)
        );
        assert_eq!(MetaCategory::from_tag("outwear"), Some(MetaCategory::Outerwear));
        assert_eq!(
            MetaCategory::from_tag("accessorize"),
            Some(MetaCategory::Accessory)
        );
        assert_eq!(MetaCategory::from_tag("  Shoes "), Some(MetaCategory::Footwear));
        assert_eq!(MetaCategory::from_tag("hat"), None);
    }

    #[test]
    fn lookup_fails_on_unknown_tag() {
        let err = lookup("garment").unwrap_err();
        assert_eq!(err.0, "garment");
        assert!(lookup("fullbody").is_ok());
    }

    #[test]
    fn decodes_response_against_selected_schema() {
        let bag = AttributeBag::from_response(MetaCategory::UpperBody, upper_body_payload())
            .expect("valid payload");
        assert_eq!(bag.meta(), MetaCategory::UpperBody);
        assert_eq!(bag.category(), "shirt");
        assert_eq!(bag.fabric_terms(), vec!["cotton"]);
        assert!(bag.verdict().is_none());
    }

    #[test]
    fn rejects_out_of_bounds_confidence() {
        let mut payload = upper_body_payload();
        payload["confidence"] = json!(1.4);
        let err = AttributeBag::from_response(MetaCategory::UpperBody, payload).unwrap_err();
        assert!(err.detail.contains("confidence"));
    }

    #[test]
    fn rejects_out_of_range_hsl() {
        let mut payload = upper_body_payload();
        payload["color_hsl"] = json!([[400, 10, 10]]);
        let err = AttributeBag::from_response(MetaCategory::UpperBody, payload).unwrap_err();
        assert!(err.detail.contains("color_hsl"));
    }

    #[test]
    fn rejects_missing_required_field() {
        let mut payload = upper_body_payload();
        payload.as_object_mut().unwrap().remove("fit");
        assert!(AttributeBag::from_response(MetaCategory::UpperBody, payload).is_err());
    }

    #[test]
    fn bag_round_trips_with_meta_tag() {
        let bag = test_support::footwear_bag("sneakers", Some(ConsistencyVerdict::Match));
        let value = serde_json::to_value(&bag).unwrap();
        assert_eq!(value["meta"], "footwear");
        let back: AttributeBag = serde_json::from_value(value).unwrap();
        assert_eq!(back, bag);
    }

    #[test]
    fn prompt_substitutes_template_placeholders() {
        let tpl = template(MetaCategory::Footwear);
        let prompt = tpl.system_prompt();
        assert!(prompt.contains("loafers, sneakers"));
        assert!(!prompt.contains("**CATEGORY_EXAMPLES**"));
        let inline = tpl.inline_prompt("black leather boots");
        assert!(inline.contains("black leather boots"));
    }
}
