//! Raw record → canonical [`MenuItem`] mapping.

use std::sync::LazyLock;

use campusmenu_extract::{DietaryTag, ExtractorKind, RawRecord};
use campusmenu_shared::{ConfidenceConfig, DietaryInfo, MenuItem, NutritionInfo};
use regex::Regex;
use tracing::{instrument, warn};

static FIRST_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));

/// Items from one run plus the count of records that could not become items.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    pub items: Vec<MenuItem>,
    /// Records dropped for a missing or blank name.
    pub dropped: usize,
}

/// Maps extractor output onto the canonical schema.
#[derive(Debug, Clone)]
pub struct Normalizer {
    confidence: ConfidenceConfig,
    default_station: String,
}

impl Normalizer {
    pub fn new(confidence: ConfidenceConfig, default_station: impl Into<String>) -> Self {
        Self {
            confidence,
            default_station: default_station.into(),
        }
    }

    /// Fixed confidence for a provenance, clamped to `[0, 1]`.
    pub fn confidence_for(&self, kind: ExtractorKind) -> f32 {
        let value = match kind {
            ExtractorKind::StructuredDom => self.confidence.structured_dom,
            ExtractorKind::FreeText => self.confidence.free_text,
            ExtractorKind::Markdown => self.confidence.markdown,
            ExtractorKind::JsonApi => self.confidence.json_api,
        };
        value.clamp(0.0, 1.0)
    }

    /// Normalize one record under the given id. Returns `None` when the record
    /// has no usable name.
    pub fn normalize(&self, record: &RawRecord, kind: ExtractorKind, id: u32) -> Option<MenuItem> {
        let name = record.name.as_deref().map(str::trim).filter(|n| !n.is_empty())?;

        let station = record
            .station
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(self.default_station.as_str());

        let vegan = record.has(DietaryTag::Vegan);
        let dietary = DietaryInfo {
            vegetarian: vegan || record.has(DietaryTag::Vegetarian),
            vegan,
            gluten_free: record.has(DietaryTag::GlutenFree),
            no_dairy: record.has(DietaryTag::NoDairy),
            eat_well: record.has(DietaryTag::EatWell),
            low_carbon: record.has(DietaryTag::LowCarbon),
        };

        Some(MenuItem {
            id,
            name: name.to_string(),
            station: station.to_string(),
            dietary,
            nutrition: NutritionInfo {
                calories: parse_calories(record.calories_text.as_deref()),
                ..NutritionInfo::default()
            },
            confidence: self.confidence_for(kind),
            description: record
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
        })
    }

    /// Normalize a run's records in order. Ids are 1-based and contiguous over
    /// the accepted items.
    #[instrument(skip_all, fields(records = records.len(), extractor = %kind))]
    pub fn normalize_all(&self, records: &[RawRecord], kind: ExtractorKind) -> Normalized {
        let mut out = Normalized::default();
        for record in records {
            let id = out.items.len() as u32 + 1;
            match self.normalize(record, kind, id) {
                Some(item) => out.items.push(item),
                None => out.dropped += 1,
            }
        }

        if out.dropped > 0 {
            warn!(dropped = out.dropped, extractor = %kind, "records without a name were dropped");
        }
        out
    }
}

/// First run of digits in the calorie text, or 0.
fn parse_calories(text: Option<&str>) -> u32 {
    text.and_then(|t| FIRST_NUMBER.find(t))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}
