//! Book transfers end to end through the service.
//!
//! Covers ledger outcome mapping, retry of transient ledger failures,
//! fee posting after settlement and the compliance hold workflow.

#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;

use clearline_core::CoreError;
use clearline_core::clients::{ClientError, LedgerAccount, PostingOutcome};
use clearline_core::standing_order::FailurePolicy;
use clearline_core::transaction::{ChannelDetail, TransactionStatus};
use clearline_shared::types::PageRequest;
use rust_decimal_macros::dec;

use common::{FlatFee, HoldAbove, harness, harness_with, intra_bank};

// ============================================================================
// Ledger outcomes
// ============================================================================

#[tokio::test]
async fn test_book_transfer_settles() {
    let h = harness();
    let settled = h.run(intra_bank("1000000001", "1000000002", dec!(10000))).await;

    assert_eq!(settled.status, TransactionStatus::Successful);
    assert_eq!(settled.response_code.as_deref(), Some("00"));
    assert!(settled.processed_at.is_some());
    assert_eq!(settled.retry_count, 0);

    let postings = h.ledger.postings();
    assert_eq!(postings.len(), 1);
    assert_eq!(postings[0].from, LedgerAccount::Customer("1000000001".into()));
    assert_eq!(postings[0].to, LedgerAccount::Customer("1000000002".into()));
    assert_eq!(postings[0].amount, dec!(10000));
    assert_eq!(postings[0].idempotency_ref, settled.id.to_string());

    let detail = h.service.registry().channel_detail(&settled.id).await.unwrap();
    assert_eq!(
        detail,
        Some(ChannelDetail::Ledger {
            posting_reference: settled.id.to_string()
        })
    );
}

#[tokio::test]
async fn test_insufficient_funds_fails_with_51() {
    let h = harness();
    h.ledger.script([Ok(PostingOutcome::InsufficientFunds)]);

    let settled = h.run(intra_bank("1000000001", "1000000002", dec!(500))).await;

    assert_eq!(settled.status, TransactionStatus::Failed);
    assert_eq!(settled.response_code.as_deref(), Some("51"));
    assert!(h.ledger.postings().is_empty());
}

#[tokio::test]
async fn test_unknown_account_fails_with_07() {
    let h = harness();
    h.ledger
        .reject_account("1000000009", PostingOutcome::AccountNotFound);

    let settled = h.run(intra_bank("1000000001", "1000000009", dec!(500))).await;

    assert_eq!(settled.status, TransactionStatus::Failed);
    assert_eq!(settled.response_code.as_deref(), Some("07"));
}

#[tokio::test]
async fn test_ledger_system_error_fails_with_96_and_remark() {
    let h = harness();
    h.ledger
        .script([Ok(PostingOutcome::SystemError("posting engine down".into()))]);

    let settled = h.run(intra_bank("1000000001", "1000000002", dec!(500))).await;

    assert_eq!(settled.status, TransactionStatus::Failed);
    assert_eq!(settled.response_code.as_deref(), Some("96"));
    assert!(
        settled
            .system_remarks
            .as_deref()
            .unwrap()
            .contains("posting engine down")
    );
}

// ============================================================================
// Retries
// ============================================================================

#[tokio::test]
async fn test_transient_ledger_failure_is_retried() {
    let h = harness();
    h.ledger
        .script([Err(ClientError::Unavailable("connection refused".into()))]);

    let settled = h.run(intra_bank("1000000001", "1000000002", dec!(750))).await;

    assert_eq!(settled.status, TransactionStatus::Successful);
    assert_eq!(settled.retry_count, 1);
    assert_eq!(h.ledger.calls(), 2);
    assert!(
        settled
            .system_remarks
            .as_deref()
            .unwrap()
            .contains("ledger posting attempt 1 failed")
    );
}

#[tokio::test]
async fn test_exhausted_timeouts_end_in_timeout_97() {
    let h = harness();
    h.ledger.script([
        Err(ClientError::Timeout),
        Err(ClientError::Timeout),
        Err(ClientError::Timeout),
    ]);

    let settled = h.run(intra_bank("1000000001", "1000000002", dec!(750))).await;

    assert_eq!(settled.status, TransactionStatus::Timeout);
    assert_eq!(settled.response_code.as_deref(), Some("97"));
    assert_eq!(settled.retry_count, 2);
    assert_eq!(h.ledger.calls(), 3);
}

#[tokio::test]
async fn test_exhausted_unavailability_ends_in_failed_96() {
    let h = harness();
    h.ledger.script([
        Err(ClientError::Unavailable("down".into())),
        Err(ClientError::Unavailable("down".into())),
        Err(ClientError::Unavailable("down".into())),
    ]);

    let settled = h.run(intra_bank("1000000001", "1000000002", dec!(750))).await;

    assert_eq!(settled.status, TransactionStatus::Failed);
    assert_eq!(settled.response_code.as_deref(), Some("96"));
}

#[tokio::test]
async fn test_protocol_error_is_not_retried() {
    let h = harness();
    h.ledger
        .script([Err(ClientError::Protocol("unexpected body".into()))]);

    let settled = h.run(intra_bank("1000000001", "1000000002", dec!(750))).await;

    assert_eq!(settled.status, TransactionStatus::Failed);
    assert_eq!(h.ledger.calls(), 1);
    assert_eq!(settled.retry_count, 0);
}

#[tokio::test]
async fn test_processing_twice_posts_once() {
    let h = harness();
    let settled = h.run(intra_bank("1000000001", "1000000002", dec!(100))).await;

    let again = h.service.process_transaction(&settled.id).await.unwrap();

    assert_eq!(again, settled);
    assert_eq!(h.ledger.calls(), 1);
}

// ============================================================================
// Fees
// ============================================================================

#[tokio::test]
async fn test_fees_are_recorded_and_posted_after_settlement() {
    let h = harness_with(
        |clients| clients.with_fees(Arc::new(FlatFee(dec!(50)))),
        FailurePolicy::never(),
    );

    let settled = h.run(intra_bank("1000000001", "1000000002", dec!(10000))).await;

    assert_eq!(settled.status, TransactionStatus::Successful);
    assert_eq!(settled.fee_amount, dec!(50));
    assert_eq!(settled.tax_amount, dec!(3.75));

    let postings = h.ledger.postings();
    assert_eq!(postings.len(), 3);
    let fee = postings
        .iter()
        .find(|p| p.idempotency_ref == format!("{}-FEE", settled.id))
        .unwrap();
    assert_eq!(fee.to, LedgerAccount::GeneralLedger("GL-FEE-INCOME".into()));
    assert_eq!(fee.amount, dec!(50));
    let tax = postings
        .iter()
        .find(|p| p.idempotency_ref == format!("{}-TAX", settled.id))
        .unwrap();
    assert_eq!(tax.to, LedgerAccount::GeneralLedger("GL-VAT-PAYABLE".into()));
    assert_eq!(tax.amount, dec!(3.75));
}

#[tokio::test]
async fn test_failed_fee_posting_leaves_principal_successful() {
    let h = harness_with(
        |clients| clients.with_fees(Arc::new(FlatFee(dec!(50)))),
        FailurePolicy::never(),
    );
    h.ledger.reject_account(
        "GL-FEE-INCOME",
        PostingOutcome::SystemError("GL closed".into()),
    );

    let settled = h.run(intra_bank("1000000001", "1000000002", dec!(10000))).await;

    assert_eq!(settled.status, TransactionStatus::Successful);
    let remarks = settled.system_remarks.unwrap();
    assert!(remarks.contains("Fee posting failed"), "{}", remarks);
    assert!(!remarks.contains("Tax posting failed"), "{}", remarks);
}

#[tokio::test]
async fn test_failed_transaction_posts_no_fees() {
    let h = harness_with(
        |clients| clients.with_fees(Arc::new(FlatFee(dec!(50)))),
        FailurePolicy::never(),
    );
    h.ledger.script([Ok(PostingOutcome::InsufficientFunds)]);

    let settled = h.run(intra_bank("1000000001", "1000000002", dec!(10000))).await;

    assert_eq!(settled.status, TransactionStatus::Failed);
    assert!(h.ledger.postings().is_empty());
}

// ============================================================================
// Compliance holds
// ============================================================================

fn held_harness() -> common::Harness {
    harness_with(
        |clients| {
            clients
                .with_compliance(Arc::new(HoldAbove(dec!(1000000))))
                .with_fees(Arc::new(FlatFee(dec!(100))))
        },
        FailurePolicy::never(),
    )
}

#[tokio::test]
async fn test_large_transfer_is_held_then_released() {
    let h = held_harness();

    let held = h
        .run(intra_bank("1000000001", "1000000002", dec!(5000000)))
        .await;
    assert_eq!(held.status, TransactionStatus::PendingApproval);
    assert_eq!(held.fee_amount, dec!(100));
    assert_eq!(h.ledger.calls(), 0);

    let released = h
        .service
        .release_transaction(&held.id, "compliance-officer-2")
        .await
        .unwrap();
    assert_eq!(released.status, TransactionStatus::Successful);
    assert!(
        released
            .system_remarks
            .as_deref()
            .unwrap()
            .contains("Released by compliance-officer-2")
    );
    // principal, fee and tax
    assert_eq!(h.ledger.postings().len(), 3);
}

#[tokio::test]
async fn test_held_transfer_can_be_cancelled() {
    let h = held_harness();
    let held = h
        .run(intra_bank("1000000001", "1000000002", dec!(5000000)))
        .await;

    let cancelled = h
        .service
        .cancel_transaction(&held.id, "sanctions match", "compliance-officer-2")
        .await
        .unwrap();

    assert_eq!(cancelled.status, TransactionStatus::Cancelled);
    assert!(cancelled.processed_at.is_some());
    assert_eq!(h.ledger.calls(), 0);
}

#[tokio::test]
async fn test_only_held_transactions_can_be_released() {
    let h = held_harness();
    let settled = h.run(intra_bank("1000000001", "1000000002", dec!(10))).await;
    assert_eq!(settled.status, TransactionStatus::Successful);

    let err = h
        .service
        .release_transaction(&settled.id, "officer")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidOperation(_)));

    let err = h
        .service
        .cancel_transaction(&settled.id, "mistake", "officer")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidOperation(_)));
}

#[tokio::test]
async fn test_cancel_requires_reason() {
    let h = held_harness();
    let held = h
        .run(intra_bank("1000000001", "1000000002", dec!(5000000)))
        .await;

    let err = h
        .service
        .cancel_transaction(&held.id, "  ", "officer")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
}

// ============================================================================
// Queries
// ============================================================================

#[tokio::test]
async fn test_account_history_lists_both_sides() {
    let h = harness();
    h.run(intra_bank("1000000001", "1000000002", dec!(10))).await;
    h.run(intra_bank("1000000002", "1000000003", dec!(20))).await;
    h.run(intra_bank("1000000004", "1000000005", dec!(30))).await;

    let page = h
        .service
        .list_transactions_for_account("1000000002", PageRequest::default())
        .await
        .unwrap();

    assert_eq!(page.meta.total, 2);
    assert_eq!(page.data.len(), 2);
    // newest first
    assert_eq!(page.data[0].amount, dec!(20));
}

#[tokio::test]
async fn test_invalid_request_is_rejected_before_storage() {
    let h = harness();

    let err = h
        .service
        .create_transaction(intra_bank("1000000001", "1000000002", dec!(0)))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));

    let err = h
        .service
        .create_transaction(intra_bank("1000000001", "1000000001", dec!(5)))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));

    let page = h
        .service
        .list_transactions_for_account("1000000001", PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.meta.total, 0);
}
