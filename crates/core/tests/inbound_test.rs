//! Credits received from other banks through the switch.
//!
//! Covers the clearing GL posting, redelivered notifications and the
//! suspicion flag raised when the customer cannot be credited.

#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unwrap_used)]

mod common;

use clearline_core::CoreError;
use clearline_core::channel::InboundCreditNotification;
use clearline_core::clients::{LedgerAccount, PostingOutcome};
use clearline_core::transaction::{
    ChannelDetail, Party, TransactionCategory, TransactionStatus,
};
use clearline_shared::types::{Currency, Money};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use common::{BANK_CODE, REMOTE_BANK, harness, inter_bank};

const CLEARING_GL: &str = "GL-INWARD-CLEARING";

fn notification(session_id: &str, beneficiary: &str, amount: Decimal) -> InboundCreditNotification {
    InboundCreditNotification {
        session_id: session_id.to_string(),
        name_enquiry_ref: Some(format!("NE-{session_id}")),
        originator: Party::at_bank("0011223344", REMOTE_BANK).with_name("CHIDI OKEKE"),
        beneficiary_account: beneficiary.to_string(),
        beneficiary_name: Some("ADA OBI".to_string()),
        money: Money::new(amount, Currency::Ngn),
        narration: "School fees".to_string(),
    }
}

// ============================================================================
// Crediting
// ============================================================================

#[tokio::test]
async fn test_inward_credit_posts_from_clearing_gl() {
    let h = harness();
    let credited = h
        .service
        .receive_inbound_credit(notification("IN-0001", "1000000009", dec!(25000)))
        .await
        .unwrap();

    assert_eq!(credited.status, TransactionStatus::Successful);
    assert_eq!(credited.category, TransactionCategory::InwardTransfer);
    assert_eq!(credited.external_reference.as_deref(), Some("IN-0001"));
    assert_eq!(credited.response_code.as_deref(), Some("00"));
    assert_eq!(credited.fee_amount, Decimal::ZERO);
    assert!(credited.id.as_str().starts_with("CLI"));

    let postings = h.ledger.postings();
    assert_eq!(postings.len(), 1);
    assert_eq!(postings[0].from, LedgerAccount::GeneralLedger(CLEARING_GL.into()));
    assert_eq!(postings[0].to, LedgerAccount::Customer("1000000009".into()));
    assert_eq!(postings[0].amount, dec!(25000));
    assert_eq!(postings[0].idempotency_ref, credited.id.to_string());

    let Some(ChannelDetail::Switch(detail)) =
        h.service.registry().channel_detail(&credited.id).await.unwrap()
    else {
        panic!("expected switch detail");
    };
    assert_eq!(detail.session_id, "IN-0001");
    assert_eq!(detail.name_enquiry_ref.as_deref(), Some("NE-IN-0001"));
    assert_eq!(detail.destination_bank_code, BANK_CODE);
}

#[tokio::test]
async fn test_empty_narration_names_the_sender() {
    let h = harness();
    let mut incoming = notification("IN-0002", "1000000009", dec!(100));
    incoming.narration = "  ".to_string();

    let credited = h.service.receive_inbound_credit(incoming).await.unwrap();

    assert_eq!(credited.narration, "Inward transfer from CHIDI OKEKE");
}

#[tokio::test]
async fn test_duplicate_notification_credits_once() {
    let h = harness();
    let first = h
        .service
        .receive_inbound_credit(notification("IN-0003", "1000000009", dec!(5000)))
        .await
        .unwrap();
    let again = h
        .service
        .receive_inbound_credit(notification("IN-0003", "1000000009", dec!(5000)))
        .await
        .unwrap();

    assert_eq!(again.id, first.id);
    assert_eq!(again.status, TransactionStatus::Successful);
    assert_eq!(h.ledger.postings().len(), 1);
}

// ============================================================================
// Failed customer credit
// ============================================================================

#[tokio::test]
async fn test_failed_customer_credit_flags_suspicion() {
    let h = harness();
    h.ledger
        .reject_account("1000000009", PostingOutcome::AccountNotFound);

    let flagged = h
        .service
        .receive_inbound_credit(notification("IN-0004", "1000000009", dec!(7500)))
        .await
        .unwrap();

    assert_eq!(flagged.status, TransactionStatus::FlaggedSuspicion);
    assert!(flagged.processed_at.is_some());
    let remarks = flagged.system_remarks.unwrap();
    assert!(remarks.contains("session IN-0004"), "{remarks}");
    assert!(remarks.contains("customer credit failed"), "{remarks}");
    assert!(h.ledger.postings().is_empty());

    // a redelivery neither credits nor re-attempts the flagged record
    let calls = h.ledger.calls();
    let again = h
        .service
        .receive_inbound_credit(notification("IN-0004", "1000000009", dec!(7500)))
        .await
        .unwrap();
    assert_eq!(again.id, flagged.id);
    assert_eq!(again.status, TransactionStatus::FlaggedSuspicion);
    assert_eq!(h.ledger.calls(), calls);
}

#[tokio::test]
async fn test_released_inward_credit_posts_once() {
    let h = harness();
    h.ledger
        .script([Ok(PostingOutcome::SystemError("ledger offline".into()))]);

    let flagged = h
        .service
        .receive_inbound_credit(notification("IN-0005", "1000000009", dec!(1200)))
        .await
        .unwrap();
    assert_eq!(flagged.status, TransactionStatus::FlaggedSuspicion);

    let released = h
        .service
        .release_transaction(&flagged.id, "ops.lead")
        .await
        .unwrap();

    assert_eq!(released.status, TransactionStatus::Successful);
    assert_eq!(h.ledger.postings().len(), 1);
    let Some(ChannelDetail::Switch(detail)) =
        h.service.registry().channel_detail(&released.id).await.unwrap()
    else {
        panic!("switch detail written at receipt should survive");
    };
    assert_eq!(detail.session_id, "IN-0005");
}

// ============================================================================
// Rejected notifications
// ============================================================================

#[tokio::test]
async fn test_session_of_outbound_transfer_is_rejected() {
    let h = harness();
    let outbound = h
        .run(inter_bank("1000000001", "2000000002", dec!(3000)))
        .await;
    let session = outbound.external_reference.clone().unwrap();

    let err = h
        .service
        .receive_inbound_credit(notification(&session, "1000000009", dec!(3000)))
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::DuplicateExternalReference(_)));
    let postings = h.ledger.postings();
    assert!(
        postings
            .iter()
            .all(|posting| posting.from != LedgerAccount::GeneralLedger(CLEARING_GL.into()))
    );
}

#[tokio::test]
async fn test_originator_must_be_another_bank() {
    let h = harness();
    let mut incoming = notification("IN-0006", "1000000009", dec!(100));
    incoming.originator = Party::local("1000000001");

    let err = h.service.receive_inbound_credit(incoming).await.unwrap_err();

    assert!(matches!(err, CoreError::Validation(_)));
    assert!(h.ledger.postings().is_empty());
}

#[tokio::test]
async fn test_inward_credit_cannot_be_reversed() {
    let h = harness();
    let credited = h
        .service
        .receive_inbound_credit(notification("IN-0007", "1000000009", dec!(900)))
        .await
        .unwrap();

    let err = h
        .service
        .reverse_transaction(&credited.id, "Sent in error", "ops.lead")
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::InvalidOperation(_)));
    let stored = h.service.get_transaction(&credited.id).await.unwrap();
    assert_eq!(stored.status, TransactionStatus::Successful);
}
