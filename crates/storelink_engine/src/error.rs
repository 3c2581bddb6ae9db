//! Error types for the sync engine.

use storelink_core::CoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during imports, exports and jobs.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The remote record does not exist (any more).
    #[error("record {id} not found on the backend")]
    NotFoundRemotely {
        /// Remote id that was requested.
        id: String,
    },

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The remote refused a creation because the record already exists.
    #[error("record already exists on the backend: {0}")]
    AlreadyExists(String),

    /// Another job holds the advisory lock for the same record.
    #[error("lock '{0}' is held by another job")]
    LockConflict(String),

    /// A remote record could not be mapped, e.g. a dependency is missing.
    #[error("mapping error: {0}")]
    Mapping(String),

    /// Mapped values failed validation before persisting.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Permanent failure that needs an operator.
    #[error("job failed: {0}")]
    Failed(String),

    /// No unit registered for a backend/capability/model combination.
    #[error("no {capability} registered for model {model} on {backend}")]
    NoUnit {
        /// Backend type and version.
        backend: String,
        /// Requested capability.
        capability: String,
        /// Requested model.
        model: String,
    },

    /// Malformed remote response.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The configured API location is not a valid URL.
    #[error("invalid API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Local store error.
    #[error("store error: {0}")]
    Store(#[from] CoreError),

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a mapping error.
    pub fn mapping(message: impl Into<String>) -> Self {
        Self::Mapping(message.into())
    }

    /// Creates an invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData(message.into())
    }

    /// Creates a permanent job failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::LockConflict(_) => true,
            SyncError::Store(CoreError::LockConflict { .. }) => true,
            // a concurrent job bound the same record first; the retry sees it
            SyncError::Store(CoreError::DuplicateBinding { .. }) => true,
            _ => false,
        }
    }

    /// Returns true if the error must be surfaced to an operator rather
    /// than retried or ignored.
    pub fn requires_attention(&self) -> bool {
        !self.is_retryable() && !matches!(self, SyncError::NotFoundRemotely { .. })
    }
}
