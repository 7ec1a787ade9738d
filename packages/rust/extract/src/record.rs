//! Loose intermediate records emitted by extractors.

use std::collections::BTreeSet;
use std::fmt;

/// A dietary keyword hit found next to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DietaryTag {
    Vegetarian,
    Vegan,
    GlutenFree,
    NoDairy,
    EatWell,
    LowCarbon,
}

/// Which extractor variant produced a record. Drives confidence assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtractorKind {
    StructuredDom,
    FreeText,
    Markdown,
    JsonApi,
}

impl ExtractorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StructuredDom => "structured-dom",
            Self::FreeText => "free-text",
            Self::Markdown => "markdown",
            Self::JsonApi => "json-api",
        }
    }
}

impl fmt::Display for ExtractorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One item as an extractor saw it. Every field may be missing; the
/// normalizer decides what is usable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    pub name: Option<String>,
    pub station: Option<String>,
    /// Text the calorie count is read from (e.g. `"320 Calories"`).
    pub calories_text: Option<String>,
    pub dietary: BTreeSet<DietaryTag>,
    pub description: Option<String>,
}

impl RawRecord {
    /// A record with just a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn has(&self, tag: DietaryTag) -> bool {
        self.dietary.contains(&tag)
    }
}
