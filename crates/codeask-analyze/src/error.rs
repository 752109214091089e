//! Analysis run errors.

use thiserror::Error;

use crate::store::StoreError;

/// Errors that abort an analysis run.
///
/// Per-file AI failures never show up here; they are recorded on the
/// file's record and the run carries on.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The state could not be persisted.
    #[error("Failed to persist analysis state: {0}")]
    Storage(#[from] StoreError),

    /// The engine configuration cannot be used.
    #[error("Invalid analyzer configuration: {message}")]
    InvalidConfig { message: String },
}

impl AnalysisError {
    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
