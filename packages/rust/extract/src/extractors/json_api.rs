//! JSON menu API extractor.
//!
//! The API returns the whole day: periods, stations, and products, linked by
//! ids. Ids arrive as strings or numbers depending on the endpoint version,
//! so they are normalized to strings on the way in.

use std::collections::{BTreeSet, HashMap};

use campusmenu_shared::{ContentFormat, ExtractConfig, MenuError, Result, SourceBody};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use super::{Extractor, wrong_shape};
use crate::record::{DietaryTag, ExtractorKind, RawRecord};

/// Name used for products without a marketing name.
const UNKNOWN_ITEM: &str = "Unknown Item";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Top-level menu API response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MenuApiResponse {
    pub date: Option<String>,
    #[serde(deserialize_with = "id_string")]
    pub selected_period_id: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub menu: ApiMenu,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ApiMenu {
    #[serde(deserialize_with = "null_as_default")]
    pub menu_periods: Vec<ApiPeriod>,
    #[serde(deserialize_with = "null_as_default")]
    pub menu_products: Vec<ApiMenuProduct>,
    #[serde(deserialize_with = "null_as_default")]
    pub menu_stations: Vec<ApiStation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ApiPeriod {
    #[serde(deserialize_with = "id_string")]
    pub period_id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ApiStation {
    #[serde(deserialize_with = "id_string")]
    pub station_id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ApiMenuProduct {
    #[serde(deserialize_with = "id_string")]
    pub menu_product_id: Option<String>,
    #[serde(deserialize_with = "id_string")]
    pub station_id: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub product: ApiProduct,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ApiProduct {
    #[serde(deserialize_with = "id_string")]
    pub product_id: Option<String>,
    pub marketing_name: Option<String>,
    pub description: Option<String>,
    /// Usually a numeric string; sometimes a bare number.
    #[serde(deserialize_with = "id_string")]
    pub calories: Option<String>,
    pub is_vegan: Option<bool>,
    pub is_vegetarian: Option<bool>,
    pub is_gluten_free: Option<bool>,
}

impl MenuApiResponse {
    /// Decode an already-parsed JSON document.
    pub fn from_value(value: &Value) -> Result<Self> {
        Self::deserialize(value)
            .map_err(|e| MenuError::parse(format!("unexpected menu API shape: {e}")))
    }

    /// Display name of the selected period, if the response names one.
    pub fn selected_period_name(&self) -> Option<&str> {
        let selected = self.selected_period_id.as_deref()?;
        self.menu
            .menu_periods
            .iter()
            .find(|p| p.period_id.as_deref() == Some(selected))
            .and_then(|p| p.name.as_deref())
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }

    fn station_names(&self) -> HashMap<&str, &str> {
        self.menu
            .menu_stations
            .iter()
            .filter_map(|s| Some((s.station_id.as_deref()?, s.name.as_deref()?.trim())))
            .filter(|(_, name)| !name.is_empty())
            .collect()
    }
}

fn id_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

pub struct JsonApiExtractor {
    default_station: String,
}

impl JsonApiExtractor {
    pub fn new(config: &ExtractConfig) -> Self {
        Self {
            default_station: config.default_station.clone(),
        }
    }

    fn extract_response(&self, response: &MenuApiResponse) -> Vec<RawRecord> {
        let stations = response.station_names();

        let records: Vec<RawRecord> = response
            .menu
            .menu_products
            .iter()
            .map(|entry| {
                let product = &entry.product;
                let name = product
                    .marketing_name
                    .as_deref()
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .unwrap_or(UNKNOWN_ITEM);
                let station = entry
                    .station_id
                    .as_deref()
                    .and_then(|id| stations.get(id).copied())
                    .unwrap_or(self.default_station.as_str());

                let mut dietary = BTreeSet::new();
                if product.is_vegan == Some(true) {
                    dietary.insert(DietaryTag::Vegan);
                    dietary.insert(DietaryTag::Vegetarian);
                }
                if product.is_vegetarian == Some(true) {
                    dietary.insert(DietaryTag::Vegetarian);
                }
                if product.is_gluten_free == Some(true) {
                    dietary.insert(DietaryTag::GlutenFree);
                }

                RawRecord {
                    name: Some(name.to_string()),
                    station: Some(station.to_string()),
                    calories_text: product.calories.clone(),
                    dietary,
                    description: product
                        .description
                        .as_deref()
                        .map(str::trim)
                        .filter(|d| !d.is_empty())
                        .map(str::to_string),
                }
            })
            .collect();

        debug!(
            products = records.len(),
            stations = stations.len(),
            date = response.date.as_deref().unwrap_or(""),
            "menu API decoded"
        );
        records
    }
}

impl Extractor for JsonApiExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::JsonApi
    }

    fn accepts(&self) -> ContentFormat {
        ContentFormat::Json
    }

    fn extract(&self, body: &SourceBody) -> Result<Vec<RawRecord>> {
        match body {
            SourceBody::Json(value) => {
                let response = MenuApiResponse::from_value(value)?;
                Ok(self.extract_response(&response))
            }
            other => Err(wrong_shape(self.kind(), other)),
        }
    }
}
