//! Core domain types for campusmenu: acquired content, canonical menu items,
//! and the per-run pipeline result.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MenuError, Result, StrategyFailure};

/// Station name used when the source does not say where an item is served.
pub const DEFAULT_STATION: &str = "General";

// ---------------------------------------------------------------------------
// Acquired content
// ---------------------------------------------------------------------------

/// Shape of the content an acquisition path produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    Html,
    Markdown,
    Json,
}

impl fmt::Display for ContentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Html => "html",
            Self::Markdown => "markdown",
            Self::Json => "json",
        })
    }
}

/// Payload of a successful acquisition, tagged by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceBody {
    Html(String),
    Markdown(String),
    Json(serde_json::Value),
}

impl SourceBody {
    /// The tag extractor dispatch is keyed on.
    pub fn format(&self) -> ContentFormat {
        match self {
            Self::Html(_) => ContentFormat::Html,
            Self::Markdown(_) => ContentFormat::Markdown,
            Self::Json(_) => ContentFormat::Json,
        }
    }
}

/// Raw content as retrieved by one acquisition strategy. Never mutated after
/// the source client hands it over.
#[derive(Debug, Clone)]
pub struct RawSourceContent {
    /// The decoded payload.
    pub body: SourceBody,
    /// When the winning strategy returned.
    pub retrieved_at: DateTime<Utc>,
    /// Label of the strategy that produced the payload.
    pub strategy: String,
    /// SHA-256 of the payload bytes as received (after envelope unwrapping).
    pub content_hash: String,
    /// Strategies that failed before the winning one, in trial order.
    pub prior_failures: Vec<StrategyFailure>,
}

impl RawSourceContent {
    /// Content tag of the payload.
    pub fn format(&self) -> ContentFormat {
        self.body.format()
    }
}

// ---------------------------------------------------------------------------
// MenuItem
// ---------------------------------------------------------------------------

/// Dietary flags. `vegan` always implies `vegetarian` on normalized items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DietaryInfo {
    pub vegetarian: bool,
    pub vegan: bool,
    pub gluten_free: bool,
    /// Dairy-free badge (markdown source only).
    #[serde(default)]
    pub no_dairy: bool,
    /// "Eat Well" badge (markdown source only).
    #[serde(default)]
    pub eat_well: bool,
    /// Low-carbon / CoolFood badge (markdown source only).
    #[serde(default)]
    pub low_carbon: bool,
}

/// Nutrition facts. Only calories are populated today; macros stay zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NutritionInfo {
    pub calories: u32,
    pub protein: u32,
    pub carbs: u32,
    pub fat: u32,
}

/// A canonical, normalized menu item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    /// 1-based, unique within one pipeline run, in extraction order.
    pub id: u32,
    /// Non-empty display name.
    pub name: String,
    /// Serving station (`"General"` when unknown).
    pub station: String,
    pub dietary: DietaryInfo,
    pub nutrition: NutritionInfo,
    /// Provenance confidence in `[0, 1]`.
    pub confidence: f32,
    /// Free-text description, when the source carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// PipelineResult
// ---------------------------------------------------------------------------

/// Non-fatal conditions observed during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineWarning {
    /// Some records were dropped for missing mandatory fields.
    PartialExtraction { dropped: usize },
    /// The primary extractor found nothing and the fallback produced the items.
    FallbackUsed { from: String, to: String },
}

/// Where a result came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    /// Winning acquisition strategy.
    pub strategy: String,
    /// Content tag of the acquired payload.
    pub format: ContentFormat,
    /// Extractor variant whose records became the items.
    pub extractor: String,
    /// SHA-256 of the acquired payload.
    pub content_hash: String,
    /// Correlation id of the run (also recorded on tracing spans).
    pub run_id: Uuid,
    /// Strategies that failed before the winning one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_attempts: Vec<StrategyFailure>,
}

/// The single, immutable output of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    /// Lowercase meal period (e.g. `breakfast`).
    pub meal_period: String,
    /// Items in extraction order.
    pub items: Vec<MenuItem>,
    /// Acquisition timestamp.
    pub retrieved_at: DateTime<Utc>,
    pub source: SourceInfo,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<PipelineWarning>,
}

impl PipelineResult {
    /// Whether the result is still inside the caller's freshness window.
    pub fn is_fresh(&self, window: Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.retrieved_at) <= window
    }
}

// ---------------------------------------------------------------------------
// Scrape result envelope
// ---------------------------------------------------------------------------

/// Wire envelope `{ success, mealPeriod, items, scrapedAt, error? }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeEnvelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meal_period: Option<String>,
    #[serde(default)]
    pub items: Vec<MenuItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scraped_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A successful envelope, unpacked.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedMenu {
    pub meal_period: String,
    pub items: Vec<MenuItem>,
    pub scraped_at: DateTime<Utc>,
}

impl ScrapeEnvelope {
    /// Render a pipeline outcome as an envelope.
    pub fn from_outcome(outcome: &Result<PipelineResult>) -> Self {
        match outcome {
            Ok(result) => Self {
                success: true,
                meal_period: Some(result.meal_period.clone()),
                items: result.items.clone(),
                scraped_at: Some(result.retrieved_at),
                error: None,
            },
            Err(e) => Self {
                success: false,
                meal_period: None,
                items: Vec::new(),
                scraped_at: None,
                error: Some(e.to_string()),
            },
        }
    }

    /// Decode an envelope body. Anything that is not an envelope is malformed.
    pub fn parse(body: &str) -> Result<Self> {
        serde_json::from_str(body)
            .map_err(|e| MenuError::malformed("scrape-envelope", format!("not an envelope: {e}")))
    }

    /// Turn the envelope into a typed menu, classifying `success = false`.
    pub fn into_result(self) -> Result<ScrapedMenu> {
        if !self.success {
            return Err(MenuError::ScrapeFailed {
                message: self.error.unwrap_or_else(|| "scrape failed".into()),
            });
        }

        let meal_period = self.meal_period.ok_or_else(|| {
            MenuError::malformed("scrape-envelope", "successful envelope without mealPeriod")
        })?;
        let scraped_at = self.scraped_at.ok_or_else(|| {
            MenuError::malformed("scrape-envelope", "successful envelope without scrapedAt")
        })?;

        Ok(ScrapedMenu {
            meal_period,
            items: self.items,
            scraped_at,
        })
    }
}
