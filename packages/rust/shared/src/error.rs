//! Error types for the lineage crawler.
//!
//! Library crates use [`LineageError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all lineage crawler operations.
#[derive(Debug, thiserror::Error)]
pub enum LineageError {
    /// The profile page does not exist upstream.
    #[error("profile not found: {external_id}")]
    NotFound { external_id: String },

    /// The page was fetched but no parsing strategy could read it.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Transient network/HTTP failure (timeout, connection reset, 5xx).
    #[error("network error: {0}")]
    Network(String),

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad stored value, broken invariant, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The crawl was cancelled between fetches.
    #[error("crawl cancelled")]
    Cancelled,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LineageError>;

impl LineageError {
    /// Create a not-found error for an external profile identifier.
    pub fn not_found(external_id: impl Into<String>) -> Self {
        Self::NotFound {
            external_id: external_id.into(),
        }
    }

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

    /// Whether this error only affects a single profile.
    ///
    /// Node failures prune the branch and are counted in the run summary;
    /// every other kind aborts the run.
    pub fn is_node_failure(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::Parse { .. } | Self::Network(_)
        )
    }

    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}
