//! Error types for gradesync.
//!
//! Library crates use [`GradeSyncError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all gradesync operations.
#[derive(Debug, thiserror::Error)]
pub enum GradeSyncError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level failure (connect, timeout, body read).
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("network error: {url}: HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    /// An expected marker (e.g. `var groups =`) is absent from the content.
    #[error("extraction error: {message}")]
    Extraction { message: String },

    /// A captured payload is not valid structured data.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// A record is missing a required identity field or holds an invalid value.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The run was cancelled before it could commit.
    #[error("run cancelled")]
    Cancelled,

    /// Terminal run failure (zero catalog links, authoritative dataset failure).
    #[error("run failed during {phase}: {reason}")]
    RunFailed { phase: String, reason: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, GradeSyncError>;

impl GradeSyncError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an extraction error from any displayable message.
    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::Extraction {
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

    /// Create a terminal run failure for the given phase.
    pub fn run_failed(phase: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Self::RunFailed {
            phase: phase.to_string(),
            reason: reason.into(),
        }
    }

    /// Short taxonomy label used in run statistics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) | Self::HttpStatus { .. } => "network",
            Self::Extraction { .. } => "extraction",
            Self::Parse { .. } => "parse",
            Self::Validation { .. } => "validation",
            Self::Config { .. } => "config",
            Self::Storage(_) => "storage",
            Self::Io { .. } => "io",
            Self::Cancelled => "cancelled",
            Self::RunFailed { .. } => "run",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = GradeSyncError::config("missing archive root");
        assert_eq!(err.to_string(), "config error: missing archive root");

        let err = GradeSyncError::HttpStatus {
            url: "https://example.com/a".into(),
            status: 503,
        };
        assert_eq!(err.to_string(), "network error: https://example.com/a: HTTP 503");

        let err = GradeSyncError::run_failed("fetching-links", "no catalog links found");
        assert!(err.to_string().contains("fetching-links"));
    }

    #[test]
    fn error_kinds() {
        assert_eq!(GradeSyncError::Network("x".into()).kind(), "network");
        assert_eq!(GradeSyncError::extraction("x").kind(), "extraction");
        assert_eq!(GradeSyncError::parse("x").kind(), "parse");
        assert_eq!(GradeSyncError::validation("x").kind(), "validation");
    }
}
