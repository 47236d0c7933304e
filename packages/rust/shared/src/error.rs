//! Error types for Atomizer.
//!
//! Library crates use [`AtomizerError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Atomizer operations.
#[derive(Debug, thiserror::Error)]
pub enum AtomizerError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Malformed input text or payload.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// A store round trip failed while assembling a result.
    #[error("lookup failed: {0}")]
    Lookup(String),

    /// A referenced id was absent where its presence is assumed.
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    /// Two vectors of unequal length were combined.
    #[error("vector length mismatch {expected} vs {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The structural graph refers back to a context already being visited.
    #[error("cycle detected at context {id}")]
    CycleDetected { id: String },

    /// Embedding provider failure (HTTP, API, or response shape).
    #[error("embedding error: {0}")]
    Embedding(String),

    /// A single queued job failed.
    #[error("job {job_id} failed: {message}")]
    Job { job_id: i64, message: String },

    /// Work was interrupted by a shutdown signal.
    #[error("cancelled: {reason}")]
    Cancelled { reason: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad request body, non-text content, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, AtomizerError>;

impl AtomizerError {
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

    /// Create a not-found error for the given kind of record.
    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            id: id.into(),
        }
    }

    /// Wrap any store failure as a lookup failure, keeping its message.
    pub fn lookup(err: impl std::fmt::Display) -> Self {
        Self::Lookup(err.to_string())
    }

    /// Create a per-job failure.
    pub fn job(job_id: i64, msg: impl Into<String>) -> Self {
        Self::Job {
            job_id,
            message: msg.into(),
        }
    }

    /// The message without its category prefix.
    pub fn detail(&self) -> String {
        match self {
            Self::Config { message }
            | Self::Parse { message }
            | Self::Validation { message }
            | Self::Job { message, .. } => message.clone(),
            Self::Storage(message) | Self::Lookup(message) | Self::Embedding(message) => {
                message.clone()
            }
            Self::Cancelled { reason } => reason.clone(),
            other => other.to_string(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
