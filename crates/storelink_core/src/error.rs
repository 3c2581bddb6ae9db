//! Error types for storelink core.

use crate::types::{BackendId, RecordId};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in store and transaction operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Record not found.
    #[error("record not found: {model}({id})")]
    RecordNotFound {
        /// The model searched.
        model: String,
        /// The missing record id.
        id: RecordId,
    },

    /// Binding not found.
    #[error("binding not found: {id}")]
    BindingNotFound {
        /// The missing binding id.
        id: u64,
    },

    /// A binding would break one of the uniqueness rules.
    #[error("duplicate binding on {model} for backend {backend_id}: {detail}")]
    DuplicateBinding {
        /// Binding model.
        model: String,
        /// Backend of the binding.
        backend_id: BackendId,
        /// Which key collided.
        detail: String,
    },

    /// Advisory lock held by another transaction.
    #[error("lock '{name}' is held by another transaction")]
    LockConflict {
        /// Name of the lock.
        name: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}
