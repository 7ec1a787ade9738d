//! Error types for campusmenu.
//!
//! Library crates use [`MenuError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::ContentFormat;

/// One failed acquisition attempt, recorded in the order strategies were tried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyFailure {
    /// Strategy label (e.g. `direct`, `envelope-relay`).
    pub strategy: String,
    /// Why the strategy was rejected.
    pub reason: String,
}

impl fmt::Display for StrategyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.strategy, self.reason)
    }
}

/// Top-level error type for all campusmenu operations.
#[derive(Debug, thiserror::Error)]
pub enum MenuError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during a single acquisition attempt.
    #[error("network error: {0}")]
    Network(String),

    /// Markup or document parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad target, invalid date, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A strategy's response could not be decoded into its expected shape.
    #[error("malformed envelope from {strategy}: {message}")]
    MalformedEnvelope { strategy: String, message: String },

    /// Every acquisition strategy was tried and failed.
    #[error("source unavailable after {} attempt(s): {}", .attempts.len(), join_attempts(.attempts))]
    SourceUnavailable { attempts: Vec<StrategyFailure> },

    /// Acquisition and extraction succeeded but nothing normalized into an item.
    #[error("no menu items found in {format} content from {strategy}")]
    NoItemsFound {
        format: ContentFormat,
        strategy: String,
    },

    /// An upstream scrape envelope reported `success = false`.
    #[error("scrape failed: {message}")]
    ScrapeFailed { message: String },

    /// The run was cancelled while a strategy was in flight.
    #[error("menu fetch cancelled")]
    Cancelled,
}

/// Classification of a surfaced failure, for callers that only need to branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    SourceUnavailable,
    MalformedEnvelope,
    NoItemsFound,
    ScrapeFailed,
    Cancelled,
    Internal,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, MenuError>;

impl MenuError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a malformed-envelope error for the named strategy.
    pub fn malformed(strategy: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::MalformedEnvelope {
            strategy: strategy.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The classified failure kind callers render retry affordances from.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::SourceUnavailable { .. } => FailureKind::SourceUnavailable,
            Self::MalformedEnvelope { .. } => FailureKind::MalformedEnvelope,
            Self::NoItemsFound { .. } => FailureKind::NoItemsFound,
            Self::ScrapeFailed { .. } => FailureKind::ScrapeFailed,
            Self::Cancelled => FailureKind::Cancelled,
            _ => FailureKind::Internal,
        }
    }

    /// Per-strategy failure log, empty unless every strategy was exhausted.
    pub fn attempts(&self) -> &[StrategyFailure] {
        match self {
            Self::SourceUnavailable { attempts } => attempts,
            _ => &[],
        }
    }
}

fn join_attempts(attempts: &[StrategyFailure]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
