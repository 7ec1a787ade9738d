//! Extractor trait and the registry that dispatches on the content tag.
//!
//! Each extractor is a pure function of the acquired body. The registry pairs
//! every content format with a primary extractor and an optional fallback that
//! runs once when the primary finds nothing.

mod dom;
mod free_text;
mod json_api;
mod markdown;

use campusmenu_shared::{ContentFormat, ExtractConfig, MenuError, Result, SourceBody};
use tracing::{debug, instrument};

use crate::record::{ExtractorKind, RawRecord};

pub use dom::DomExtractor;
pub use free_text::FreeTextExtractor;
pub use json_api::{JsonApiExtractor, MenuApiResponse};
pub use markdown::MarkdownExtractor;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// One way of reading menu records out of acquired content.
pub trait Extractor: Send + Sync {
    /// Provenance stamped on everything this extractor emits.
    fn kind(&self) -> ExtractorKind;

    /// The only body shape this extractor understands.
    fn accepts(&self) -> ContentFormat;

    /// Emit records in source order. Returns a parse error when handed a body
    /// of the wrong shape.
    fn extract(&self, body: &SourceBody) -> Result<Vec<RawRecord>>;
}

fn wrong_shape(kind: ExtractorKind, body: &SourceBody) -> MenuError {
    MenuError::parse(format!("{kind} extractor cannot read {} content", body.format()))
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Records from one extraction pass, with the variant that produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub records: Vec<RawRecord>,
    pub extractor: ExtractorKind,
    /// Set when the primary extractor came up empty and the fallback ran.
    pub fallback_from: Option<ExtractorKind>,
}

struct Route {
    primary: Box<dyn Extractor>,
    fallback: Option<Box<dyn Extractor>>,
}

/// Extractors keyed by the content format they serve.
pub struct ExtractorRegistry {
    routes: Vec<Route>,
}

impl ExtractorRegistry {
    /// All built-in extractors: HTML goes to the DOM extractor with the
    /// free-text extractor behind it.
    pub fn new(config: &ExtractConfig) -> Self {
        let mut registry = Self::empty();
        registry.register(
            Box::new(DomExtractor::new(config)),
            Some(Box::new(FreeTextExtractor::new(config))),
        );
        registry.register(Box::new(MarkdownExtractor::new(config)), None);
        registry.register(Box::new(JsonApiExtractor::new(config)), None);
        registry
    }

    /// A registry with no routes.
    pub fn empty() -> Self {
        Self { routes: Vec::new() }
    }

    /// Route the primary's format to it, replacing any existing route.
    pub fn register(&mut self, primary: Box<dyn Extractor>, fallback: Option<Box<dyn Extractor>>) {
        let format = primary.accepts();
        self.routes.retain(|r| r.primary.accepts() != format);
        self.routes.push(Route { primary, fallback });
    }

    /// Extract records from `body`, running the fallback once if the primary
    /// extractor yields nothing.
    #[instrument(skip_all, fields(format = %body.format()))]
    pub fn extract(&self, body: &SourceBody) -> Result<Extraction> {
        let format = body.format();
        let route = self
            .routes
            .iter()
            .find(|r| r.primary.accepts() == format)
            .ok_or_else(|| MenuError::parse(format!("no extractor registered for {format} content")))?;

        let primary = route.primary.kind();
        let records = route.primary.extract(body)?;
        debug!(extractor = %primary, records = records.len(), "primary extraction done");

        if !records.is_empty() {
            return Ok(Extraction {
                records,
                extractor: primary,
                fallback_from: None,
            });
        }

        match &route.fallback {
            Some(fallback) => {
                let kind = fallback.kind();
                debug!(from = %primary, to = %kind, "primary found nothing, trying fallback");
                let records = fallback.extract(body)?;
                debug!(extractor = %kind, records = records.len(), "fallback extraction done");
                Ok(Extraction {
                    records,
                    extractor: kind,
                    fallback_from: Some(primary),
                })
            }
            None => Ok(Extraction {
                records,
                extractor: primary,
                fallback_from: None,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers shared by the text-based extractors
// ---------------------------------------------------------------------------

/// Trim and collapse internal whitespace runs to single spaces.
pub(crate) fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
