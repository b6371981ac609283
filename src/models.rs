use crate::schema::AttributeBag;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// One catalog row, as produced by the upstream corpus export. The
/// `extracted` bag is filled in by the enrichment pipeline; rows whose
/// meta-category cannot be resolved stay in the corpus unenriched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogRow {
    pub good_id: String,
    pub store_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category_id: Vec<String>,
    #[serde(default)]
    pub gender: Gender,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub meta_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted: Option<AttributeBag>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Female,
    Male,
    #[default]
    Unisex,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EnrichMode {
    Text,
    Image,
}

/// Either a single token or a small token set. Slot hints arrive in both
/// shapes depending on the model's mood, so the wire format accepts both.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TokenSet {
    One(String),
    Many(Vec<String>),
}

impl TokenSet {
    pub fn tokens(&self) -> Vec<&str> {
        match self {
            TokenSet::One(value) => vec![value.as_str()],
            TokenSet::Many(values) => values.iter().map(|v| v.as_str()).collect(),
        }
    }
}

/// One desired garment within a generated look.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutfitSlotItem {
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<TokenSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fabric: Option<TokenSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<TokenSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<TokenSet>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LookPart {
    Top,
    Bottom,
    Full,
    Shoes,
    Outerwear,
    Accessories,
}

impl LookPart {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookPart::Top => "top",
            LookPart::Bottom => "bottom",
            LookPart::Full => "full",
            LookPart::Shoes => "shoes",
            LookPart::Outerwear => "outerwear",
            LookPart::Accessories => "accessories",
        }
    }
}

/// Structured look returned by the look-request boundary. At least one
/// wearable base part (top+bottom or full) is expected by convention, but
/// an empty part simply yields no candidates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedLook {
    pub sex: Gender,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<String>,
    #[serde(default)]
    pub top: Vec<OutfitSlotItem>,
    #[serde(default)]
    pub bottom: Vec<OutfitSlotItem>,
    #[serde(default)]
    pub full: Vec<OutfitSlotItem>,
    #[serde(default)]
    pub shoes: Vec<OutfitSlotItem>,
    #[serde(default)]
    pub outerwear: Vec<OutfitSlotItem>,
    #[serde(default)]
    pub accessories: Vec<OutfitSlotItem>,
}

impl GeneratedLook {
    pub fn parts(&self) -> [(LookPart, &[OutfitSlotItem]); 6] {
        [
            (LookPart::Top, self.top.as_slice()),
            (LookPart::Bottom, self.bottom.as_slice()),
            (LookPart::Full, self.full.as_slice()),
            (LookPart::Shoes, self.shoes.as_slice()),
            (LookPart::Outerwear, self.outerwear.as_slice()),
            (LookPart::Accessories, self.accessories.as_slice()),
        ]
    }
}

/// Identity of one outfit slot: part name, item category and positional
/// index within the part list. Serialized as `part/category/index`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SlotKey {
    pub part: LookPart,
    pub category: String,
    pub index: usize,
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.part.as_str(), self.category, self.index)
    }
}

impl Serialize for SlotKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Per-slot candidate sets for one query. Regenerated fully on every query,
/// never persisted; slots with no candidates are omitted.
#[derive(Debug, Clone, Serialize, Default)]
pub struct MatchResult {
    pub slots: BTreeMap<SlotKey, Vec<CatalogRow>>,
}

/// Outcome counters for one enrichment run.
#[derive(Debug, Clone, Serialize, Default)]
pub struct EnrichSummary {
    pub mode: Option<EnrichMode>,
    pub rows_total: usize,
    pub rows_deduplicated: usize,
    pub rows_classified: usize,
    pub rows_enriched: usize,
    pub rows_already_enriched: usize,
    pub rows_skipped_unknown_meta: usize,
    pub rows_skipped_no_name: usize,
    pub rows_skipped_no_asset: usize,
    pub rows_skipped_unreachable: usize,
    pub rows_dropped_missing_item: usize,
    pub rows_failed: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
