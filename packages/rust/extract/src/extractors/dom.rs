//! Structured-DOM extractor.
//!
//! Finds item elements by class-name fragments rather than exact layout, so a
//! redesign of the dining site usually keeps working. Station, calories, and
//! dietary flags are read from the markup around each item.

use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use campusmenu_shared::{ContentFormat, ExtractConfig, Result, SourceBody};
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use tracing::debug;

use super::{Extractor, clean_text, wrong_shape};
use crate::record::{DietaryTag, ExtractorKind, RawRecord};

static ITEM: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        r#"[class*="menu-item"], [class*="MenuItem"], [class*="item-name"], [class*="ItemName"], [role="button"][class*="item"], a[href*="label"]"#,
    )
    .expect("valid item selector")
});

static STATION: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"[class*="station"], [class*="Station"]"#).expect("valid station selector")
});

static STATION_NAME: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        r#"h2, h3, [class*="station-name"], [class*="StationName"], [class*="header"]"#,
    )
    .expect("valid station name selector")
});

static CALORIES: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"[class*="calor"], [class*="Calor"]"#).expect("valid calorie selector")
});

static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));

/// Reads items out of an HTML document by element heuristics.
pub struct DomExtractor {
    min_name_len: usize,
    max_name_len: usize,
    default_station: String,
}

impl DomExtractor {
    pub fn new(config: &ExtractConfig) -> Self {
        Self {
            min_name_len: config.min_dom_name_len,
            max_name_len: config.max_dom_name_len,
            default_station: config.default_station.clone(),
        }
    }

    fn extract_document(&self, doc: &Html) -> Vec<RawRecord> {
        let candidates: Vec<ElementRef<'_>> = doc.select(&ITEM).collect();
        let ids: HashSet<_> = candidates.iter().map(|el| el.id()).collect();

        let mut station = self.default_station.clone();
        let mut records = Vec::new();

        for el in &candidates {
            // An item wrapper that contains another candidate is a container;
            // the innermost candidate carries the name.
            if el.descendants().skip(1).any(|n| ids.contains(&n.id())) {
                continue;
            }

            let name = clean_text(&name_text(*el));
            let len = name.chars().count();
            if len < self.min_name_len || len > self.max_name_len {
                continue;
            }

            if let Some(label) = station_label(*el) {
                station = label;
            }

            records.push(RawRecord {
                name: Some(name),
                station: Some(station.clone()),
                calories_text: calorie_text(*el),
                dietary: dietary_tags(*el),
                description: None,
            });
        }

        debug!(candidates = candidates.len(), records = records.len(), "dom scan complete");
        records
    }
}

impl Extractor for DomExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::StructuredDom
    }

    fn accepts(&self) -> ContentFormat {
        ContentFormat::Html
    }

    fn extract(&self, body: &SourceBody) -> Result<Vec<RawRecord>> {
        match body {
            SourceBody::Html(html) => Ok(self.extract_document(&Html::parse_document(html))),
            other => Err(wrong_shape(self.kind(), other)),
        }
    }
}

/// Text of an item element, leaving out any calorie badge nested inside it.
fn name_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    push_name_text(el, &mut out);
    out
}

fn push_name_text(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    if !CALORIES.matches(&child) {
                        out.push(' ');
                        push_name_text(child, out);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Name of the nearest enclosing station container, if it has one.
fn station_label(el: ElementRef<'_>) -> Option<String> {
    let container = std::iter::once(el)
        .chain(el.ancestors().filter_map(ElementRef::wrap))
        .find(|e| STATION.matches(e))?;

    container
        .select(&STATION_NAME)
        .map(|h| clean_text(&h.text().collect::<String>()))
        .find(|s| !s.is_empty())
}

/// Calorie text from inside the item, else from its immediate container.
fn calorie_text(el: ElementRef<'_>) -> Option<String> {
    calorie_text_within(el).or_else(|| parent_element(el).and_then(calorie_text_within))
}

fn calorie_text_within(scope: ElementRef<'_>) -> Option<String> {
    scope
        .select(&CALORIES)
        .map(|c| clean_text(&c.text().collect::<String>()))
        .find(|t| DIGITS.is_match(t))
}

/// Dietary keywords in the item's markup and its container's markup.
fn dietary_tags(el: ElementRef<'_>) -> BTreeSet<DietaryTag> {
    let mut context = el.inner_html().to_lowercase();
    if let Some(parent) = parent_element(el) {
        context.push_str(&parent.inner_html().to_lowercase());
    }

    let mut tags = BTreeSet::new();
    if context.contains("vegetarian") || context.contains("vegan") {
        tags.insert(DietaryTag::Vegetarian);
    }
    if context.contains("vegan") {
        tags.insert(DietaryTag::Vegan);
    }
    if context.contains("no gluten")
        || context.contains("gluten-free")
        || context.contains("glutenfree")
    {
        tags.insert(DietaryTag::GlutenFree);
    }
    tags
}

fn parent_element(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
    el.parent().and_then(ElementRef::wrap)
}
