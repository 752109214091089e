//! Error types shared across codeask crates.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Whether a failure is expected to go away on retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Network blips, rate limits, server errors, timeouts.
    Transient,
    /// Bad credentials, malformed requests, cancellation.
    Permanent,
}

/// Errors returned by an [`AiClient`](crate::AiClient).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Connection could not be established or was reset.
    #[error("Network error: {message}")]
    Network { message: String },

    /// The request did not complete within the per-call timeout.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The provider asked us to slow down.
    #[error("Rate limited: {message}")]
    RateLimited { message: String },

    /// The provider failed on its side (5xx).
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// The response body could not be interpreted.
    #[error("Malformed response: {message}")]
    MalformedResponse { message: String },

    /// Credentials were rejected.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The provider rejected the request itself.
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// The client could not be constructed from its settings.
    #[error("Provider configuration error: {message}")]
    Configuration { message: String },

    /// The run was cancelled while the request was in flight.
    #[error("Request cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a malformed response error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Classify this error as transient or permanent.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Network { .. }
            | Self::Timeout { .. }
            | Self::RateLimited { .. }
            | Self::Server { .. }
            | Self::MalformedResponse { .. } => ErrorClass::Transient,
            Self::Authentication { .. }
            | Self::InvalidRequest { .. }
            | Self::Configuration { .. }
            | Self::Cancelled => ErrorClass::Permanent,
        }
    }

    /// Check if retrying could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

/// Errors that can occur while discovering source files.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Root path is not a directory.
    #[error("Root path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// A glob pattern failed to compile.
    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl SourceError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_io() {
        let err = SourceError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, SourceError::PermissionDenied { .. }));
    }

    #[test]
    fn test_transient_errors_are_retryable() {
        assert!(ProviderError::network("reset").is_retryable());
        assert!(ProviderError::Timeout { timeout_ms: 10 }.is_retryable());
        assert!(
            ProviderError::RateLimited {
                message: "slow down".into()
            }
            .is_retryable()
        );
        assert!(
            ProviderError::Server {
                status: 503,
                message: "unavailable".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_permanent_errors_are_not_retryable() {
        let auth = ProviderError::Authentication {
            message: "bad key".into(),
        };
        assert_eq!(auth.class(), ErrorClass::Permanent);
        assert!(!auth.is_retryable());
        assert!(!ProviderError::Cancelled.is_retryable());
        assert!(
            !ProviderError::InvalidRequest {
                message: "too long".into()
            }
            .is_retryable()
        );
    }
}
