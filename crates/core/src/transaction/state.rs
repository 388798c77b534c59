//! Transaction state machine.
//!
//! The transition table lives here and nowhere else. Every status change in
//! the crate goes through [`StateMachine::validate`] via the registry.

use crate::error::CoreError;
use crate::transaction::types::TransactionStatus;

/// Stateless validator for transaction status transitions.
///
/// The valid transitions are:
/// - Pending → Processing, PendingApproval
/// - Processing → Successful, Failed, Timeout, PartiallySuccessful,
///   AwaitingRetry, PendingApproval, FlaggedSuspicion
/// - AwaitingRetry → Processing, Failed
/// - PendingApproval → Processing, Cancelled
/// - FlaggedSuspicion → Processing, Cancelled
/// - Successful → Reversed
pub struct StateMachine;

impl StateMachine {
    /// Returns true if `from → to` is in the transition table.
    #[must_use]
    pub fn is_valid_transition(from: TransactionStatus, to: TransactionStatus) -> bool {
        use TransactionStatus::{
            AwaitingRetry, Cancelled, Failed, FlaggedSuspicion, PartiallySuccessful, Pending,
            PendingApproval, Processing, Reversed, Successful, Timeout,
        };

        matches!(
            (from, to),
            (Pending, Processing | PendingApproval)
                | (
                    Processing,
                    Successful
                        | Failed
                        | Timeout
                        | PartiallySuccessful
                        | AwaitingRetry
                        | PendingApproval
                        | FlaggedSuspicion
                )
                | (AwaitingRetry, Processing | Failed)
                | (PendingApproval | FlaggedSuspicion, Processing | Cancelled)
                | (Successful, Reversed)
        )
    }

    /// Validates a transition.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidStateTransition` if the table does not allow it.
    pub fn validate(from: TransactionStatus, to: TransactionStatus) -> Result<(), CoreError> {
        if Self::is_valid_transition(from, to) {
            Ok(())
        } else {
            Err(CoreError::InvalidStateTransition { from, to })
        }
    }

    /// All statuses reachable in one step from `from`.
    #[must_use]
    pub fn targets(from: TransactionStatus) -> Vec<TransactionStatus> {
        TransactionStatus::ALL
            .into_iter()
            .filter(|to| Self::is_valid_transition(from, *to))
            .collect()
    }
}
