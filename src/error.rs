//! Error types for storefront asset handling
//!
//! Provides structured error types for the cache, the uploader, the
//! migration pipeline and the adapters that sit at the system boundary.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Input Errors
    // =========================================================================
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {kind}/{id}")]
    NotFound { kind: String, id: String },

    // =========================================================================
    // Network Errors
    // =========================================================================
    #[error("Network error for {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("Timed out after {duration:?} during {operation}")]
    Timeout { operation: String, duration: Duration },

    // =========================================================================
    // Storage Errors
    // =========================================================================
    #[error("Storage unavailable: {reason}")]
    StorageUnavailable { reason: String },

    #[error("Blob store {operation} failed for {path}: {reason}")]
    BlobStore {
        operation: String,
        path: String,
        reason: String,
    },

    #[error("Catalog error: {0}")]
    Catalog(String),

    // =========================================================================
    // Encoding Errors
    // =========================================================================
    #[error("Compression failed: {0}")]
    Compression(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Action to take when an operation fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Retry with exponential backoff
    RetryWithBackoff,
    /// Retry after a fixed delay
    RetryAfter(Duration),
    /// Permanent failure, do not retry
    NoRetry,
}

impl Error {
    /// Shorthand for a network failure against `url`
    pub fn network(url: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::Network {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand for a missing entity
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            Error::Network { .. } | Error::BlobStore { .. } | Error::Io(_) => {
                ErrorAction::RetryWithBackoff
            }

            Error::Timeout { .. } => ErrorAction::RetryAfter(Duration::from_secs(30)),

            Error::StorageUnavailable { .. } => ErrorAction::RetryAfter(Duration::from_secs(60)),

            Error::Validation(_)
            | Error::NotFound { .. }
            | Error::Configuration(_)
            | Error::Compression(_)
            | Error::Json(_)
            | Error::Yaml(_) => ErrorAction::NoRetry,

            Error::Catalog(_) | Error::Internal(_) => ErrorAction::RetryWithBackoff,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRetry)
    }

    /// Check if this error is transient (network level)
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Network { .. } | Error::Timeout { .. })
    }
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_actions() {
        let err = Error::Timeout {
            operation: "fetch".into(),
            duration: Duration::from_secs(5),
        };
        assert_eq!(err.action(), ErrorAction::RetryAfter(Duration::from_secs(30)));

        let err = Error::Validation("too large".into());
        assert_eq!(err.action(), ErrorAction::NoRetry);

        let err = Error::network("http://cdn/a.jpg", "connection reset");
        assert_eq!(err.action(), ErrorAction::RetryWithBackoff);
    }

    #[test]
    fn test_error_retryable() {
        let transient = Error::network("http://cdn/a.jpg", "503");
        assert!(transient.is_retryable());
        assert!(transient.is_transient());

        let missing = Error::not_found("backup", "p1");
        assert!(!missing.is_retryable());
        assert!(!missing.is_transient());
        assert_eq!(missing.to_string(), "Not found: backup/p1");
    }
}
