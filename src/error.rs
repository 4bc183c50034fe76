//! Unified error handling for the relist crate
//!
//! Per-item fetch failures ([`FetchError`]) are recovered inside the loops.
//! Everything else in [`Error`] is surfaced to the caller: a registry call on
//! an unknown id is a caller bug, and a failed journal append breaks the
//! recovery guarantee, so both stop the loop that hit them.
//!
//! # Usage
//!
//! ```rust,ignore
//! use relist::error::{Error, RelistErrorTrait};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         tracing::warn!(error = %err, "Skipping item");
//!     } else {
//!         tracing::error!(error = %err, category = ?err.category(), "Loop stopped");
//!     }
//! }
//! ```

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub use crate::utils::error::{FetchError, ParseError};

/// Common trait for relist error types
pub trait RelistErrorTrait: std::error::Error {
    /// Check if this error is recoverable (the item can be retried later)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-related errors (HTTP, timeout, rate limit)
    Network,
    /// Parsing and data extraction errors
    Parsing,
    /// Journal, run-id store and other I/O
    Storage,
    /// Registry misuse
    Registry,
    /// Configuration and validation errors
    Config,
}

/// Unified error type for the relist crate
#[derive(Error, Debug)]
pub enum Error {
    /// A registry operation referenced an id that was never recorded
    #[error("Unknown item: {id}")]
    UnknownItem { id: String },

    /// A durable journal append failed
    #[error("Journal write to {} failed: {source}", path.display())]
    JournalWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A journal line other than the last could not be decoded
    #[error("Corrupt journal record at line {line}: {reason}")]
    JournalCorrupt { line: usize, reason: String },

    /// The run-id file could not be read or written
    #[error("Run id store {} failed: {reason}", path.display())]
    RunIdStore { path: PathBuf, reason: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),
}

impl RelistErrorTrait for FetchError {
    fn is_recoverable(&self) -> bool {
        FetchError::is_recoverable(self)
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Parse(_) => ErrorCategory::Parsing,
            Self::InvalidUrl(_) => ErrorCategory::Config,
            _ => ErrorCategory::Network,
        }
    }
}

impl RelistErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::UnknownItem { .. } => false,
            Self::JournalWrite { .. } | Self::JournalCorrupt { .. } => false,
            Self::RunIdStore { .. } => false,
            Self::Io(_) => true,
            Self::Json(_) => false,
            Self::Config(_) => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::UnknownItem { .. } => ErrorCategory::Registry,
            Self::JournalWrite { .. }
            | Self::JournalCorrupt { .. }
            | Self::RunIdStore { .. }
            | Self::Io(_) => ErrorCategory::Storage,
            Self::Json(_) => ErrorCategory::Parsing,
            Self::Config(_) => ErrorCategory::Config,
        }
    }
}

impl Error {
    /// Create an unknown-item error
    pub fn unknown_item(id: impl Into<String>) -> Self {
        Self::UnknownItem { id: id.into() }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        assert_eq!(FetchError::Timeout.category(), ErrorCategory::Network);

        let parse_err = FetchError::Parse(ParseError::MissingElement(".body"));
        assert_eq!(parse_err.category(), ErrorCategory::Parsing);

        assert_eq!(
            Error::unknown_item("42").category(),
            ErrorCategory::Registry
        );
    }

    #[test]
    fn test_gone_page_is_not_retried() {
        let err = FetchError::ServerError(404);
        assert!(!RelistErrorTrait::is_recoverable(&err));
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn test_journal_write_is_fatal() {
        let err = Error::JournalWrite {
            path: PathBuf::from("data/journal.jsonl"),
            source: io::Error::new(io::ErrorKind::Other, "disk full"),
        };
        assert!(!err.is_recoverable());
        assert_eq!(err.category(), ErrorCategory::Storage);
        assert!(err.to_string().contains("data/journal.jsonl"));
    }

    #[test]
    fn test_unknown_item_message() {
        let err = Error::unknown_item("7801234567");
        assert_eq!(err.to_string(), "Unknown item: 7801234567");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("batch_size must be greater than 0");
        assert_eq!(err.category(), ErrorCategory::Config);
        assert!(!err.is_recoverable());
    }
}
