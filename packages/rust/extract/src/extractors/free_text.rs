//! Free-text extractor: the last resort for HTML with no recognisable item
//! markup. Reads the page as lines and pairs a name-like line with a calorie
//! line directly below it.

use std::sync::LazyLock;

use campusmenu_shared::{ContentFormat, ExtractConfig, Result, SourceBody};
use regex::Regex;
use scraper::{ElementRef, Html, Node};
use tracing::debug;

use super::{Extractor, clean_text, wrong_shape};
use crate::record::{ExtractorKind, RawRecord};

/// `<digits> Cal`, case-insensitive, anywhere in the line.
static CALORIE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*cal").expect("valid regex"));

const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template", "head"];

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "fieldset",
    "figcaption", "figure", "footer", "form", "header", "hr", "li", "main", "nav", "ol", "p",
    "pre", "section", "table", "td", "th", "tr", "ul",
];

const HEADING_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];

/// One line of flattened page text.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Line {
    text: String,
    /// The line was a heading's text.
    heading: bool,
}

/// Pairs candidate name lines with the calorie line that follows them.
pub struct FreeTextExtractor {
    min_line_len: usize,
    max_line_len: usize,
    denylist_prefixes: Vec<String>,
    denylist_substrings: Vec<String>,
    default_station: String,
}

impl FreeTextExtractor {
    pub fn new(config: &ExtractConfig) -> Self {
        Self {
            min_line_len: config.min_line_len,
            max_line_len: config.max_line_len,
            denylist_prefixes: config.denylist_prefixes.clone(),
            denylist_substrings: config.denylist_substrings.clone(),
            default_station: config.default_station.clone(),
        }
    }

    fn is_candidate(&self, line: &str) -> bool {
        let len = line.chars().count();
        if len <= self.min_line_len || len >= self.max_line_len {
            return false;
        }
        if !line.starts_with(|c: char| c.is_ascii_uppercase()) {
            return false;
        }
        if self.denylist_substrings.iter().any(|s| line.contains(s.as_str())) {
            return false;
        }
        !self.denylist_prefixes.iter().any(|p| line.starts_with(p.as_str()))
    }

    fn extract_lines(&self, lines: &[Line]) -> Vec<RawRecord> {
        let mut station = self.default_station.clone();
        let mut records = Vec::new();

        for (i, line) in lines.iter().enumerate() {
            if self.is_candidate(&line.text) {
                let calorie_line = lines
                    .get(i + 1)
                    .filter(|next| positive_calories(&next.text));

                if let Some(next) = calorie_line {
                    records.push(RawRecord {
                        name: Some(line.text.clone()),
                        station: Some(station.clone()),
                        calories_text: Some(next.text.clone()),
                        ..RawRecord::default()
                    });
                    continue;
                }
            }

            if line.heading {
                station = line.text.clone();
            }
        }

        debug!(lines = lines.len(), records = records.len(), "free-text scan complete");
        records
    }
}

impl Extractor for FreeTextExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::FreeText
    }

    fn accepts(&self) -> ContentFormat {
        ContentFormat::Html
    }

    fn extract(&self, body: &SourceBody) -> Result<Vec<RawRecord>> {
        match body {
            SourceBody::Html(html) => {
                let doc = Html::parse_document(html);
                Ok(self.extract_lines(&flatten(&doc)))
            }
            other => Err(wrong_shape(self.kind(), other)),
        }
    }
}

fn positive_calories(line: &str) -> bool {
    CALORIE_LINE
        .captures(line)
        .and_then(|c| c[1].parse::<u64>().ok())
        .is_some_and(|n| n > 0)
}

// ---------------------------------------------------------------------------
// Flattening
// ---------------------------------------------------------------------------

/// Render the document as non-empty, whitespace-collapsed lines, breaking at
/// block elements and at newlines inside text.
fn flatten(doc: &Html) -> Vec<Line> {
    let mut flat = Flattener::default();
    flat.walk(doc.root_element());
    flat.flush();
    flat.lines
}

#[derive(Default)]
struct Flattener {
    lines: Vec<Line>,
    buf: String,
    heading_depth: usize,
}

impl Flattener {
    fn walk(&mut self, el: ElementRef<'_>) {
        for child in el.children() {
            match child.value() {
                Node::Text(text) => self.buf.push_str(text),
                Node::Element(e) => {
                    let name = e.name();
                    if SKIPPED_TAGS.contains(&name) {
                        continue;
                    }
                    let Some(child) = ElementRef::wrap(child) else {
                        continue;
                    };

                    if HEADING_TAGS.contains(&name) {
                        self.flush();
                        self.heading_depth += 1;
                        self.walk(child);
                        self.flush();
                        self.heading_depth -= 1;
                    } else if BLOCK_TAGS.contains(&name) {
                        self.flush();
                        self.walk(child);
                        self.flush();
                    } else {
                        self.walk(child);
                    }
                }
                _ => {}
            }
        }
    }

    fn flush(&mut self) {
        let heading = self.heading_depth > 0;
        for piece in self.buf.split('\n') {
            let text = clean_text(piece);
            if !text.is_empty() {
                self.lines.push(Line { text, heading });
            }
        }
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(html: &str) -> Vec<RawRecord> {
        FreeTextExtractor::new(&ExtractConfig::default())
            .extract(&SourceBody::Html(html.into()))
            .unwrap()
    }

    #[test]
    fn pairs_name_with_following_calorie_line() {
        let html = "<body><p>Tomato Basil Soup</p><p>180 Cal</p><p>Caesar Salad</p><p>240 cal</p></body>";
        let records = extract(html);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name.as_deref(), Some("Tomato Basil Soup"));
        assert_eq!(records[0].calories_text.as_deref(), Some("180 Cal"));
        assert_eq!(records[0].station.as_deref(), Some("General"));
        assert!(records[0].dietary.is_empty());
        assert_eq!(records[1].name.as_deref(), Some("Caesar Salad"));
    }

    #[test]
    fn newlines_inside_text_split_lines() {
        let html = "<body>\nFrench Toast\n310 Calories\n</body>";
        let records = extract(html);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name.as_deref(), Some("French Toast"));
    }

    #[test]
    fn denylisted_lines_are_not_items() {
        let html = "<body>\
            <p>Menu Of The Day</p><p>100 Cal</p>\
            <p>Location Hours</p><p>100 Cal</p>\
            <p>Filter Results</p><p>100 Cal</p>\
            <p>Copyright © 2026</p><p>100 Cal</p>\
            <p>See https://example.edu</p><p>100 Cal</p>\
            <p>lowercase item</p><p>100 Cal</p>\
            <p>Egg</p><p>100 Cal</p>\
            </body>";
        assert!(extract(html).is_empty());
    }

    #[test]
    fn zero_or_missing_calories_drop_the_candidate() {
        let html = "<body><p>Water Station</p><p>0 Cal</p><p>Fruit Cup</p><p>Fresh daily</p></body>";
        assert!(extract(html).is_empty());
    }

    #[test]
    fn headings_become_the_station() {
        let html = "<body><h2>Bakery</h2><p>Blueberry Muffin</p><p>420 Cal</p></body>";
        let records = extract(html);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].station.as_deref(), Some("Bakery"));
    }

    #[test]
    fn scripts_are_ignored() {
        let html = "<body><script>Tracker Init\n12 cal</script><p>Bean Burrito</p><p>530 Cal</p></body>";
        let records = extract(html);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name.as_deref(), Some("Bean Burrito"));
    }
}
