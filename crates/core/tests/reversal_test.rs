//! Reversal of settled transactions.

#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unwrap_used)]

mod common;

use clearline_core::CoreError;
use clearline_core::clients::{LedgerAccount, PostingOutcome};
use clearline_core::transaction::request::{DepositInstruction, RequestMeta};
use clearline_core::transaction::{
    Channel, NewTransaction, StatusUpdate, Transaction, TransactionCategory, TransactionId,
    TransactionRequest, TransactionStatus,
};
use clearline_shared::types::{Currency, Money};
use rust_decimal_macros::dec;

use common::{Harness, SUSPENSE_GL, harness, inter_bank, intra_bank};

/// Stores a mirror of `original` the way `reverse_transaction` does, without settling it.
async fn stored_mirror(h: &Harness, original: &Transaction) -> Transaction {
    h.service
        .registry()
        .create(
            NewTransaction::new(
                TransactionCategory::FundsTransfer,
                Channel::IntraBank,
                Money::new(original.amount, original.currency),
                Some(original.credit.clone()),
                original.debit.clone().unwrap(),
                format!("Reversal of {}: customer error", original.id),
                "supervisor-1",
            )
            .reversing(original.id.clone()),
        )
        .await
        .unwrap()
}

// ============================================================================
// Book transfers
// ============================================================================

#[tokio::test]
async fn test_reversal_mirrors_original_and_marks_it_reversed() {
    let h = harness();
    let original = h.run(intra_bank("1000000001", "1000000002", dec!(10000))).await;
    assert_eq!(original.status, TransactionStatus::Successful);

    let mirror = h
        .service
        .reverse_transaction(&original.id, "customer error", "supervisor-1")
        .await
        .unwrap();

    assert_eq!(mirror.status, TransactionStatus::Successful);
    assert!(mirror.is_reversal);
    assert_eq!(mirror.original_transaction_id.as_ref(), Some(&original.id));
    assert_eq!(mirror.amount, original.amount);
    assert_eq!(mirror.debit.as_ref().unwrap().account_number, "1000000002");
    assert_eq!(mirror.credit.account_number, "1000000001");
    assert_eq!(mirror.initiated_by, "supervisor-1");
    assert!(mirror.narration.contains(original.id.as_str()));

    let original = h.service.get_transaction(&original.id).await.unwrap();
    assert_eq!(original.status, TransactionStatus::Reversed);
    assert!(
        original
            .system_remarks
            .as_deref()
            .unwrap()
            .contains(mirror.id.as_str())
    );

    let postings = h.ledger.postings();
    assert_eq!(postings.len(), 2);
    assert_eq!(postings[1].from, LedgerAccount::Customer("1000000002".into()));
    assert_eq!(postings[1].to, LedgerAccount::Customer("1000000001".into()));
    assert_eq!(postings[1].idempotency_ref, mirror.id.to_string());
}

#[tokio::test]
async fn test_second_reversal_is_rejected() {
    let h = harness();
    let original = h.run(intra_bank("1000000001", "1000000002", dec!(10000))).await;
    h.service
        .reverse_transaction(&original.id, "customer error", "supervisor-1")
        .await
        .unwrap();

    let err = h
        .service
        .reverse_transaction(&original.id, "again", "supervisor-1")
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::InvalidOperation(_)), "{err:?}");
    assert_eq!(h.ledger.postings().len(), 2);
}

#[tokio::test]
async fn test_reversal_of_a_reversal_is_rejected() {
    let h = harness();
    let original = h.run(intra_bank("1000000001", "1000000002", dec!(10000))).await;
    let mirror = h
        .service
        .reverse_transaction(&original.id, "customer error", "supervisor-1")
        .await
        .unwrap();

    let err = h
        .service
        .reverse_transaction(&mirror.id, "undo", "supervisor-1")
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::InvalidOperation(_)));
}

#[tokio::test]
async fn test_only_successful_transactions_are_reversible() {
    let h = harness();
    h.ledger.script([Ok(PostingOutcome::InsufficientFunds)]);
    let failed = h.run(intra_bank("1000000001", "1000000002", dec!(10000))).await;
    assert_eq!(failed.status, TransactionStatus::Failed);

    let err = h
        .service
        .reverse_transaction(&failed.id, "customer error", "supervisor-1")
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::InvalidOperation(_)));
    assert!(
        h.service
            .registry()
            .find_reversals_of(&failed.id)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_reversal_requires_reason_and_existing_original() {
    let h = harness();
    let original = h.run(intra_bank("1000000001", "1000000002", dec!(10))).await;

    let err = h
        .service
        .reverse_transaction(&original.id, " ", "supervisor-1")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));

    let err = h
        .service
        .reverse_transaction(&TransactionId::from_string("CLTNOPE"), "x", "supervisor-1")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound { .. }));
}

#[tokio::test]
async fn test_failed_mirror_leaves_original_and_allows_retry() {
    let h = harness();
    let original = h.run(intra_bank("1000000001", "1000000002", dec!(10000))).await;
    h.ledger.script([Ok(PostingOutcome::InsufficientFunds)]);

    let mirror = h
        .service
        .reverse_transaction(&original.id, "customer error", "supervisor-1")
        .await
        .unwrap();
    assert_eq!(mirror.status, TransactionStatus::Failed);
    let unchanged = h.service.get_transaction(&original.id).await.unwrap();
    assert_eq!(unchanged.status, TransactionStatus::Successful);

    let retried = h
        .service
        .reverse_transaction(&original.id, "customer error", "supervisor-1")
        .await
        .unwrap();
    assert_eq!(retried.status, TransactionStatus::Successful);
    assert_ne!(retried.id, mirror.id);
    let reversed = h.service.get_transaction(&original.id).await.unwrap();
    assert_eq!(reversed.status, TransactionStatus::Reversed);
}

#[tokio::test]
async fn test_pure_credit_is_not_reversible() {
    let h = harness();
    let deposit = h
        .run(TransactionRequest::CashDeposit(DepositInstruction {
            meta: RequestMeta {
                amount: dec!(2000),
                currency: Currency::Ngn,
                narration: "Branch deposit".into(),
                initiated_by: "teller-7".into(),
                channel: None,
            },
            account: "1000000001".into(),
        }))
        .await;
    assert_eq!(deposit.status, TransactionStatus::Successful);

    let err = h
        .service
        .reverse_transaction(&deposit.id, "wrong account", "supervisor-1")
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::InvalidOperation(_)));
}

// ============================================================================
// Inter-bank
// ============================================================================

#[tokio::test]
async fn test_inter_bank_reversal_returns_funds_from_suspense() {
    let h = harness();
    let original = h.run(inter_bank("1000000001", "2200000001", dec!(4000))).await;
    assert_eq!(original.status, TransactionStatus::Successful);

    let mirror = h
        .service
        .reverse_transaction(&original.id, "beneficiary bank returned funds", "recon-desk")
        .await
        .unwrap();

    assert_eq!(mirror.status, TransactionStatus::Successful);
    // the return never goes back through the switch
    assert_eq!(h.gateway.transfer_requests().len(), 1);

    let postings = h.ledger.postings();
    let ret = postings
        .iter()
        .find(|p| p.idempotency_ref == mirror.id.to_string())
        .unwrap();
    assert_eq!(ret.from, LedgerAccount::GeneralLedger(SUSPENSE_GL.into()));
    assert_eq!(ret.to, LedgerAccount::Customer("1000000001".into()));

    let original = h.service.get_transaction(&original.id).await.unwrap();
    assert_eq!(original.status, TransactionStatus::Reversed);
}

// ============================================================================
// Interrupted reversals
// ============================================================================

#[tokio::test]
async fn test_mirror_settled_by_a_worker_reverses_the_original() {
    let h = harness();
    let original = h.run(intra_bank("1000000001", "1000000002", dec!(10000))).await;
    // crash right after the mirror was stored
    let mirror = stored_mirror(&h, &original).await;

    let settled = h.service.process_transaction(&mirror.id).await.unwrap();

    assert_eq!(settled.status, TransactionStatus::Successful);
    let original_after = h.service.get_transaction(&original.id).await.unwrap();
    assert_eq!(original_after.status, TransactionStatus::Reversed);
    assert!(
        original_after
            .system_remarks
            .as_deref()
            .unwrap()
            .contains(mirror.id.as_str())
    );

    let err = h
        .service
        .reverse_transaction(&original.id, "again", "supervisor-1")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidOperation(_)), "{err:?}");
    assert_eq!(h.ledger.postings().len(), 2);
}

#[tokio::test]
async fn test_unstamped_settled_mirror_is_completed_on_next_attempt() {
    let h = harness();
    let original = h.run(intra_bank("1000000001", "1000000002", dec!(10000))).await;
    let mirror = stored_mirror(&h, &original).await;
    // mirror settled, process died before the original was stamped
    {
        let registry = h.service.registry();
        let guard = registry.lock(&mirror.id).await;
        registry
            .transition(&guard, StatusUpdate::to(TransactionStatus::Processing))
            .await
            .unwrap();
        registry
            .transition(&guard, StatusUpdate::to(TransactionStatus::Successful))
            .await
            .unwrap();
    }

    let err = h
        .service
        .reverse_transaction(&original.id, "customer error", "supervisor-1")
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::InvalidOperation(_)), "{err:?}");
    let original_after = h.service.get_transaction(&original.id).await.unwrap();
    assert_eq!(original_after.status, TransactionStatus::Reversed);
}

#[tokio::test]
async fn test_reprocessing_a_settled_mirror_stamps_once() {
    let h = harness();
    let original = h.run(intra_bank("1000000001", "1000000002", dec!(10000))).await;
    let mirror = h
        .service
        .reverse_transaction(&original.id, "customer error", "supervisor-1")
        .await
        .unwrap();

    let again = h.service.process_transaction(&mirror.id).await.unwrap();

    assert_eq!(again, mirror);
    let original_after = h.service.get_transaction(&original.id).await.unwrap();
    assert_eq!(original_after.status, TransactionStatus::Reversed);
    assert_eq!(
        original_after
            .system_remarks
            .as_deref()
            .unwrap()
            .matches("Reversed by")
            .count(),
        1
    );
}
