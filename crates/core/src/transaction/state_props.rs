//! Property-based tests for the transaction state machine.

use proptest::prelude::*;

use crate::transaction::state::StateMachine;
use crate::transaction::types::TransactionStatus;

/// Strategy for generating random TransactionStatus values.
fn arb_status() -> impl Strategy<Value = TransactionStatus> {
    proptest::sample::select(TransactionStatus::ALL.to_vec())
}

/// Strategy for generating a walk of attempted transitions.
fn arb_walk() -> impl Strategy<Value = Vec<TransactionStatus>> {
    proptest::collection::vec(arb_status(), 1..40)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Nothing ever transitions back to PENDING.
    #[test]
    fn prop_pending_is_never_reentered(from in arb_status()) {
        prop_assert!(!StateMachine::is_valid_transition(from, TransactionStatus::Pending));
    }

    /// A status never transitions to itself.
    #[test]
    fn prop_no_self_transitions(status in arb_status()) {
        prop_assert!(!StateMachine::is_valid_transition(status, status));
    }

    /// Only SUCCESSFUL leaves a terminal status, and only to REVERSED.
    #[test]
    fn prop_terminal_statuses_are_final(from in arb_status(), to in arb_status()) {
        if from.is_terminal() && StateMachine::is_valid_transition(from, to) {
            prop_assert_eq!(from, TransactionStatus::Successful);
            prop_assert_eq!(to, TransactionStatus::Reversed);
        }
    }

    /// Only a held status or a retry step re-enters PROCESSING.
    #[test]
    fn prop_processing_reentry_requires_hold_or_retry(from in arb_status()) {
        if from != TransactionStatus::Pending
            && StateMachine::is_valid_transition(from, TransactionStatus::Processing)
        {
            prop_assert!(from.is_held() || from == TransactionStatus::AwaitingRetry);
        }
    }

    /// Applying only the valid steps of any walk reverses at most once.
    #[test]
    fn prop_walk_reverses_at_most_once(walk in arb_walk()) {
        let mut current = TransactionStatus::Pending;
        let mut reversals = 0;
        for next in walk {
            if StateMachine::validate(current, next).is_ok() {
                if next == TransactionStatus::Reversed {
                    reversals += 1;
                }
                current = next;
            }
        }
        prop_assert!(reversals <= 1);
    }
}
