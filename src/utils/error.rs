//! Error types for fetching and parsing
//!
//! These are the per-item failures of the discovery and detail capabilities.
//! The scheduling loops log them and move on; see [`crate::error::Error`] for
//! the failures that stop a loop.

use thiserror::Error;

/// Errors that can occur while fetching a listing or post page
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server error with status code
    #[error("Server error: {0}")]
    ServerError(u16),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Page fetched but could not be parsed
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
}

impl FetchError {
    /// Whether retrying the same request may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(e) => !e.is_builder(),
            Self::Timeout => true,
            Self::ServerError(status) => matches!(status, 429 | 500 | 502 | 503 | 504),
            Self::InvalidUrl(_) | Self::Parse(_) => false,
        }
    }

    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ServerError(status) => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Errors that can occur while extracting fields from a page
#[derive(Error, Debug)]
pub enum ParseError {
    /// A required element is absent from the page
    #[error("Required element not found: {0}")]
    MissingElement(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_recoverability() {
        assert!(FetchError::ServerError(503).is_recoverable());
        assert!(FetchError::ServerError(429).is_recoverable());
        assert!(!FetchError::ServerError(404).is_recoverable());
        assert!(!FetchError::ServerError(410).is_recoverable());
    }

    #[test]
    fn test_parse_error_not_recoverable() {
        let err: FetchError = ParseError::MissingElement(".body").into();
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains(".body"));
    }

    #[test]
    fn test_status() {
        assert_eq!(FetchError::ServerError(410).status(), Some(410));
        assert_eq!(FetchError::Timeout.status(), None);
    }
}
