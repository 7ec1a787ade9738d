//! Core pipeline orchestration and domain logic for campusmenu.
//!
//! This crate ties together acquisition, extraction, normalization, and meal
//! period detection into a single call, [`MenuPipeline::fetch_menu`].

pub mod meal_period;
pub mod normalizer;
pub mod pipeline;

pub use meal_period::{DEFAULT_MEAL_PERIOD, MealPeriodDetector};
pub use normalizer::{Normalized, Normalizer};
pub use pipeline::{MenuPipeline, PipelineState, ProgressReporter, SilentProgress};
