//! Markdown-section extractor for pages rendered to Markdown by a scrape
//! service. Stations are `## ` headings, items are `### ` headings beneath
//! them, and the lines under an item carry calories, badges, and a blurb.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use campusmenu_shared::{ContentFormat, ExtractConfig, Result, SourceBody};
use regex::Regex;
use tracing::debug;

use super::{Extractor, wrong_shape};
use crate::record::{DietaryTag, ExtractorKind, RawRecord};

static CALORIES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*Calories").expect("valid regex"));

static LEADING_CALORIES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\s*Calories").expect("valid regex"));

/// Placeholder heading the site uses for an upsell block, not a dish.
const ALSO_AVAILABLE: &str = "Also Available";

/// Line prefixes that are never an item description.
const NON_DESCRIPTION_PREFIXES: &[&str] = &["!", "Add ", "Mark ", ALSO_AVAILABLE, "[", "---"];

/// Descriptions must be longer than this.
const MIN_DESCRIPTION_LEN: usize = 5;

/// Badge keywords (case-sensitive, as rendered from image alt text).
const BADGES: &[(&[&str], DietaryTag)] = &[
    (&["No Gluten", "GlutenFree"], DietaryTag::GlutenFree),
    (&["No Dairy", "NoDairy"], DietaryTag::NoDairy),
    (&["Eat Well", "EatWell"], DietaryTag::EatWell),
    (&["CoolFood", "Low Carbon"], DietaryTag::LowCarbon),
];

pub struct MarkdownExtractor {
    lookahead: usize,
    footer_marker: String,
}

impl MarkdownExtractor {
    pub fn new(config: &ExtractConfig) -> Self {
        Self {
            lookahead: config.markdown_lookahead,
            footer_marker: config.footer_marker.clone(),
        }
    }

    fn extract_text(&self, markdown: &str) -> Vec<RawRecord> {
        let mut lines: Vec<&str> = markdown.lines().map(str::trim).collect();

        // The highlights block repeats items from the real menu.
        if let Some(idx) = lines.iter().position(|l| *l == self.footer_marker) {
            if idx > 0 {
                lines.truncate(idx);
            }
        }

        let mut station: Option<String> = None;
        let mut records = Vec::new();

        for (i, line) in lines.iter().enumerate() {
            if let Some(label) = line.strip_prefix("## ") {
                station = Some(label.trim().to_string());
                continue;
            }

            let Some(heading) = line.strip_prefix("### ") else {
                continue;
            };
            let Some(current) = station.as_ref() else {
                continue;
            };

            let name = heading.trim();
            if name.is_empty() || name == ALSO_AVAILABLE {
                continue;
            }

            let end = (i + self.lookahead).min(lines.len()).max(i + 1);
            let body: Vec<&str> = lines[i + 1..end]
                .iter()
                .copied()
                .take_while(|l| !l.starts_with("## ") && !l.starts_with("### "))
                .collect();

            records.push(RawRecord {
                name: Some(name.to_string()),
                station: Some(current.clone()),
                calories_text: body
                    .iter()
                    .find_map(|l| CALORIES.find(l))
                    .map(|m| m.as_str().to_string()),
                dietary: badges(&body),
                description: body
                    .iter()
                    .rev()
                    .find(|l| is_description(l))
                    .map(|l| l.to_string()),
            });
        }

        debug!(lines = lines.len(), records = records.len(), "markdown scan complete");
        records
    }
}

impl Extractor for MarkdownExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Markdown
    }

    fn accepts(&self) -> ContentFormat {
        ContentFormat::Markdown
    }

    fn extract(&self, body: &SourceBody) -> Result<Vec<RawRecord>> {
        match body {
            SourceBody::Markdown(text) => Ok(self.extract_text(text)),
            other => Err(wrong_shape(self.kind(), other)),
        }
    }
}

fn badges(lines: &[&str]) -> BTreeSet<DietaryTag> {
    let mut tags = BTreeSet::new();
    for line in lines {
        if line.contains("Vegan") {
            tags.insert(DietaryTag::Vegan);
            tags.insert(DietaryTag::Vegetarian);
        } else if line.contains("Vegetarian") {
            tags.insert(DietaryTag::Vegetarian);
        }
        for (keywords, tag) in BADGES {
            if keywords.iter().any(|k| line.contains(k)) {
                tags.insert(*tag);
            }
        }
    }
    tags
}

fn is_description(line: &str) -> bool {
    line.chars().count() > MIN_DESCRIPTION_LEN
        && !NON_DESCRIPTION_PREFIXES.iter().any(|p| line.starts_with(p))
        && !LEADING_CALORIES.is_match(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(md: &str) -> Vec<RawRecord> {
        MarkdownExtractor::new(&ExtractConfig::default())
            .extract(&SourceBody::Markdown(md.into()))
            .unwrap()
    }

    #[test]
    fn salmon_under_grill() {
        let md = "## Grill\n### Salmon\nGrilled salmon\nAdd to Meal Calculator320 Calories\n";
        let records = extract(md);
        assert_eq!(records.len(), 1);

        let r = &records[0];
        assert_eq!(r.name.as_deref(), Some("Salmon"));
        assert_eq!(r.station.as_deref(), Some("Grill"));
        assert_eq!(r.calories_text.as_deref(), Some("320 Calories"));
        assert!(r.dietary.is_empty());
        assert_eq!(r.description.as_deref(), Some("Grilled salmon"));
    }

    #[test]
    fn also_available_is_not_an_item() {
        let md = "## Deli\n### Also Available\nChips and fruit\n### Turkey Wrap\n450 Calories\n";
        let records = extract(md);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name.as_deref(), Some("Turkey Wrap"));
    }

    #[test]
    fn items_before_any_station_are_ignored() {
        let records = extract("### Orphan Dish\n100 Calories\n## Grill\n### Burger\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name.as_deref(), Some("Burger"));
    }

    #[test]
    fn footer_is_cut_off() {
        let md = "## Grill\n### Burger\n600 Calories\n## Menu Highlights\n### Burger\n600 Calories\n";
        let records = extract(md);
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn footer_marker_on_first_line_is_kept() {
        let md = "## Menu Highlights\n### Featured Tacos\n500 Calories\n";
        let records = extract(md);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].station.as_deref(), Some("Menu Highlights"));
    }

    #[test]
    fn badge_lines_set_dietary_tags() {
        let md = "## Salad Bar\n### Quinoa Salad\n![Vegan](vegan.png)\n![No Gluten](ng.png)\n![EatWell](ew.png)\n![CoolFood](cf.png)\n\
                  ### Caprese\n![Vegetarian](veg.png)\n![No Dairy](nd.png)\n";
        let records = extract(md);
        assert_eq!(records.len(), 2);

        let quinoa = &records[0];
        for tag in [
            DietaryTag::Vegan,
            DietaryTag::Vegetarian,
            DietaryTag::GlutenFree,
            DietaryTag::EatWell,
            DietaryTag::LowCarbon,
        ] {
            assert!(quinoa.has(tag), "missing {tag:?}");
        }
        assert!(!quinoa.has(DietaryTag::NoDairy));

        let caprese = &records[1];
        assert!(caprese.has(DietaryTag::Vegetarian));
        assert!(!caprese.has(DietaryTag::Vegan));
        assert!(caprese.has(DietaryTag::NoDairy));
        // Image lines are never descriptions.
        assert_eq!(caprese.description, None);
    }

    #[test]
    fn first_calorie_match_wins() {
        let md = "## Grill\n### Combo\n250 Calories\nAdd side 180 Calories\n";
        let records = extract(md);
        assert_eq!(records[0].calories_text.as_deref(), Some("250 Calories"));
    }

    #[test]
    fn lookahead_is_bounded() {
        let mut md = String::from("## Grill\n### Slow Roast\n");
        for _ in 0..25 {
            md.push_str("[Details](#)\n");
        }
        md.push_str("700 Calories\n");
        let records = extract(&md);
        assert_eq!(records[0].calories_text, None);
    }

    #[test]
    fn last_plain_line_is_the_description() {
        let md = "## Pasta\n### Penne\nShort\nPenne with marinara\nMark as favorite\nTossed in basil pesto\n[Nutrition](#)\n";
        let records = extract(md);
        assert_eq!(records[0].description.as_deref(), Some("Tossed in basil pesto"));
    }
}
