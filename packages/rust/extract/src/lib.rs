//! Menu extraction: turns acquired content into loose [`RawRecord`]s.
//!
//! This crate provides:
//! - [`extractors`] — the four extractor variants (structured DOM, free text,
//!   markdown sections, JSON API)
//! - [`ExtractorRegistry`] — dispatch on the content tag, with the DOM to
//!   free-text fallback

pub mod extractors;
mod record;

pub use extractors::{
    DomExtractor, Extraction, Extractor, ExtractorRegistry, FreeTextExtractor, JsonApiExtractor,
    MarkdownExtractor, MenuApiResponse,
};
pub use record::{DietaryTag, ExtractorKind, RawRecord};
