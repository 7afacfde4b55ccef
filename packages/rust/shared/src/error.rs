//! Error types for orgenrich.
//!
//! Library crates use [`EnrichError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all orgenrich operations.
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to the generation service or the index.
    #[error("network error: {0}")]
    Network(String),

    /// Dataset or template parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Generation service error (request, response shape, or exhausted retries).
    #[error("generation error: {0}")]
    Generation(String),

    /// Bulk index payload or transport error.
    #[error("index error: {0}")]
    Index(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (wrong top-level type, non-object record, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, EnrichError>;

impl EnrichError {
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

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a generation call that failed with this error is worth repeating.
    ///
    /// Config and validation problems will fail the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Generation(_))
    }
}
