//! Shared types, error model, and configuration for campusmenu.
//!
//! This crate is the foundation depended on by all other campusmenu crates.
//! It provides:
//! - [`MenuError`] — the unified, classified error type
//! - Domain types ([`RawSourceContent`], [`MenuItem`], [`PipelineResult`], [`ScrapeEnvelope`])
//! - Configuration ([`AppConfig`], [`SourceConfig`], [`ExtractConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CacheConfig, ConfidenceConfig, ExtractConfig, SourceConfig, StrategyConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from, validate_config,
    validate_scrape_keys,
};
pub use error::{FailureKind, MenuError, Result, StrategyFailure};
pub use types::{
    ContentFormat, DEFAULT_STATION, DietaryInfo, MenuItem, NutritionInfo, PipelineResult,
    PipelineWarning, RawSourceContent, ScrapeEnvelope, ScrapedMenu, SourceBody, SourceInfo,
};
