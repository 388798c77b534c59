//! Error types shared by every component of the processing core.
//!
//! Only request-level problems become a `CoreError`. Declines, timeouts and
//! ledger inconsistencies are business outcomes recorded on the transaction.

use clearline_shared::AppError;
use thiserror::Error;

use crate::store::StoreError;
use crate::transaction::TransactionStatus;

/// Errors returned synchronously to callers of the core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Bad input, rejected before any state change.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown transaction, standing order, batch or dispute.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of record that was looked up.
        entity: &'static str,
        /// The identifier that was not found.
        id: String,
    },

    /// The operation is not allowed given the current state.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Attempted a status change the state machine does not allow.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidStateTransition {
        /// The current status.
        from: TransactionStatus,
        /// The attempted target status.
        to: TransactionStatus,
    },

    /// External reference already belongs to another transaction.
    #[error("External reference {0} is already recorded on another transaction")]
    DuplicateExternalReference(String),

    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CoreError {
    /// Shorthand for a `NotFound` error.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound { .. } => 404,
            Self::InvalidOperation(_) | Self::InvalidStateTransition { .. } => 422,
            Self::DuplicateExternalReference(_) => 409,
            Self::Store(StoreError::StaleWrite(_) | StoreError::Conflict(_)) => 409,
            Self::Store(StoreError::Backend(_)) => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidOperation(_) => "INVALID_OPERATION",
            Self::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            Self::DuplicateExternalReference(_) => "DUPLICATE_EXTERNAL_REFERENCE",
            Self::Store(StoreError::StaleWrite(_)) => "CONCURRENT_UPDATE",
            Self::Store(StoreError::Conflict(_)) => "CONFLICT",
            Self::Store(StoreError::Backend(_)) => "STORE_ERROR",
        }
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::Validation(_) => Self::Validation(message),
            CoreError::NotFound { .. } => Self::NotFound(message),
            CoreError::InvalidOperation(_) | CoreError::InvalidStateTransition { .. } => {
                Self::InvalidOperation(message)
            }
            CoreError::DuplicateExternalReference(_)
            | CoreError::Store(StoreError::StaleWrite(_) | StoreError::Conflict(_)) => {
                Self::Conflict(message)
            }
            CoreError::Store(StoreError::Backend(_)) => Self::Database(message),
        }
    }
}
