//! Transfers to other banks through the settlement gateway.
//!
//! The switch leg runs before the local ledger leg. These tests pin down how
//! each gateway answer maps onto the transaction, and that a transfer the
//! switch already accepted is never sent twice.

#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unwrap_used)]

mod common;

use clearline_core::clients::{ClientError, LedgerAccount, NameEnquiryResponse, PostingOutcome};
use clearline_core::transaction::{ChannelDetail, TransactionStatus};
use rust_decimal_macros::dec;

use common::{REMOTE_BANK, SUSPENSE_GL, harness, inter_bank, transfer_answer};

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
async fn test_inter_bank_transfer_settles_with_switch_detail() {
    let h = harness();

    let settled = h.run(inter_bank("1000000001", "2200000001", dec!(25000))).await;

    assert_eq!(settled.status, TransactionStatus::Successful);
    assert_eq!(settled.response_code.as_deref(), Some("00"));
    let session = format!("SW-{}", settled.id);
    assert_eq!(settled.external_reference.as_deref(), Some(session.as_str()));
    assert!(settled.external_system_at.is_some());

    let requests = h.gateway.transfer_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].payment_reference, settled.id.to_string());
    assert_eq!(requests[0].name_enquiry_ref.as_deref(), Some("NE-0001"));
    assert_eq!(requests[0].credit.account_name.as_deref(), Some("ADA OBI"));

    let postings = h.ledger.postings();
    assert_eq!(postings.len(), 1);
    assert_eq!(postings[0].from, LedgerAccount::Customer("1000000001".into()));
    assert_eq!(postings[0].to, LedgerAccount::GeneralLedger(SUSPENSE_GL.into()));

    let Some(ChannelDetail::Switch(detail)) =
        h.service.registry().channel_detail(&settled.id).await.unwrap()
    else {
        panic!("expected switch detail");
    };
    assert_eq!(detail.session_id, session);
    assert_eq!(detail.destination_bank_code, REMOTE_BANK);
    assert_eq!(detail.beneficiary_name.as_deref(), Some("ADA OBI"));
}

#[tokio::test]
async fn test_session_id_is_searchable() {
    let h = harness();
    let settled = h.run(inter_bank("1000000001", "2200000001", dec!(100))).await;

    let found = h
        .service
        .registry()
        .find_by_external_reference(settled.external_reference.as_deref().unwrap())
        .await
        .unwrap();
    assert_eq!(found.map(|tx| tx.id), Some(settled.id));
}

// ============================================================================
// Name enquiry
// ============================================================================

#[tokio::test]
async fn test_name_enquiry_decline_fails_without_transfer() {
    let h = harness();
    h.gateway.script_enquiries([Ok(NameEnquiryResponse {
        account_name: None,
        bvn: None,
        response_code: "25".into(),
        session_id: Some("NE-0002".into()),
    })]);

    let settled = h.run(inter_bank("1000000001", "2200000001", dec!(100))).await;

    assert_eq!(settled.status, TransactionStatus::Failed);
    assert_eq!(settled.response_code.as_deref(), Some("25"));
    assert!(h.gateway.transfer_requests().is_empty());
    assert!(h.ledger.postings().is_empty());
}

#[tokio::test]
async fn test_unreachable_name_enquiry_fails_with_91() {
    let h = harness();
    h.gateway.script_enquiries([
        Err(ClientError::Unavailable("refused".into())),
        Err(ClientError::Timeout),
        Err(ClientError::Unavailable("refused".into())),
    ]);

    let settled = h.run(inter_bank("1000000001", "2200000001", dec!(100))).await;

    assert_eq!(settled.status, TransactionStatus::Failed);
    assert_eq!(settled.response_code.as_deref(), Some("91"));
    assert_eq!(h.gateway.enquiry_calls(), 3);
    assert_eq!(settled.retry_count, 2);
}

#[tokio::test]
async fn test_timed_out_name_enquiry_fails_instead_of_timing_out() {
    let h = harness();
    h.gateway.script_enquiries([
        Err(ClientError::Timeout),
        Err(ClientError::Timeout),
        Err(ClientError::Timeout),
    ]);

    let settled = h.run(inter_bank("1000000001", "2200000001", dec!(100))).await;

    assert_eq!(settled.status, TransactionStatus::Failed);
    assert_eq!(settled.response_code.as_deref(), Some("91"));
    assert!(h.gateway.transfer_requests().is_empty());
    assert!(h.ledger.postings().is_empty());
}

// ============================================================================
// Funds transfer
// ============================================================================

#[tokio::test]
async fn test_switch_decline_keeps_upstream_code() {
    let h = harness();
    h.gateway
        .script_transfers([Ok(transfer_answer("51", Some("SW-DECLINED")))]);

    let settled = h.run(inter_bank("1000000001", "2200000001", dec!(100))).await;

    assert_eq!(settled.status, TransactionStatus::Failed);
    assert_eq!(settled.response_code.as_deref(), Some("51"));
    assert_eq!(settled.response_message.as_deref(), Some("Declined"));
    assert!(h.ledger.postings().is_empty());
}

#[tokio::test]
async fn test_switch_timeout_is_not_retried() {
    let h = harness();
    h.gateway.script_transfers([Err(ClientError::Timeout)]);

    let settled = h.run(inter_bank("1000000001", "2200000001", dec!(100))).await;

    assert_eq!(settled.status, TransactionStatus::Timeout);
    assert_eq!(settled.response_code.as_deref(), Some("97"));
    assert_eq!(h.gateway.transfer_requests().len(), 1);
    assert!(h.ledger.postings().is_empty());
}

#[tokio::test]
async fn test_garbled_switch_answer_is_a_timeout() {
    let h = harness();
    h.gateway
        .script_transfers([Err(ClientError::Protocol("truncated body".into()))]);

    let settled = h.run(inter_bank("1000000001", "2200000001", dec!(100))).await;

    assert_eq!(settled.status, TransactionStatus::Timeout);
    assert_eq!(h.gateway.transfer_requests().len(), 1);
}

#[tokio::test]
async fn test_undelivered_transfer_retries_then_fails_with_91() {
    let h = harness();
    h.gateway.script_transfers([
        Err(ClientError::Unavailable("no route".into())),
        Err(ClientError::Unavailable("no route".into())),
        Err(ClientError::Unavailable("no route".into())),
    ]);

    let settled = h.run(inter_bank("1000000001", "2200000001", dec!(100))).await;

    assert_eq!(settled.status, TransactionStatus::Failed);
    assert_eq!(settled.response_code.as_deref(), Some("91"));
    assert_eq!(h.gateway.transfer_requests().len(), 3);
}

#[tokio::test]
async fn test_undelivered_transfer_recovers_on_retry() {
    let h = harness();
    h.gateway
        .script_transfers([Err(ClientError::Unavailable("no route".into()))]);

    let settled = h.run(inter_bank("1000000001", "2200000001", dec!(100))).await;

    assert_eq!(settled.status, TransactionStatus::Successful);
    let requests = h.gateway.transfer_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].payment_reference, requests[1].payment_reference);
}

#[tokio::test]
async fn test_approval_without_session_is_a_timeout() {
    let h = harness();
    h.gateway.script_transfers([Ok(transfer_answer("00", None))]);

    let settled = h.run(inter_bank("1000000001", "2200000001", dec!(100))).await;

    assert_eq!(settled.status, TransactionStatus::Timeout);
    assert!(settled.external_reference.is_none());
    assert!(h.ledger.postings().is_empty());
}

// ============================================================================
// Ledger leg after switch acceptance
// ============================================================================

#[tokio::test]
async fn test_ledger_failure_after_switch_flags_suspicion() {
    let h = harness();
    h.ledger
        .script([Ok(PostingOutcome::SystemError("journal locked".into()))]);

    let flagged = h.run(inter_bank("1000000001", "2200000001", dec!(100))).await;

    assert_eq!(flagged.status, TransactionStatus::FlaggedSuspicion);
    assert!(flagged.processed_at.is_some());
    let session = format!("SW-{}", flagged.id);
    assert_eq!(flagged.external_reference.as_deref(), Some(session.as_str()));
    let remarks = flagged.system_remarks.unwrap();
    assert!(remarks.contains(&session), "{}", remarks);
    assert!(remarks.contains("journal locked"), "{}", remarks);
}

#[tokio::test]
async fn test_releasing_flagged_transfer_reposts_ledger_only() {
    let h = harness();
    h.ledger
        .script([Ok(PostingOutcome::SystemError("journal locked".into()))]);
    let flagged = h.run(inter_bank("1000000001", "2200000001", dec!(100))).await;
    assert_eq!(flagged.status, TransactionStatus::FlaggedSuspicion);

    let released = h
        .service
        .release_transaction(&flagged.id, "recon-desk")
        .await
        .unwrap();

    assert_eq!(released.status, TransactionStatus::Successful);
    assert_eq!(h.gateway.transfer_requests().len(), 1);
    assert_eq!(h.gateway.enquiry_calls(), 1);
    assert_eq!(h.ledger.postings().len(), 1);
}

#[tokio::test]
async fn test_flagged_transfer_can_be_cancelled() {
    let h = harness();
    h.ledger.script([Ok(PostingOutcome::AccountNotFound)]);
    let flagged = h.run(inter_bank("1000000001", "2200000001", dec!(100))).await;
    assert_eq!(flagged.status, TransactionStatus::FlaggedSuspicion);

    let cancelled = h
        .service
        .cancel_transaction(&flagged.id, "refunded by switch", "recon-desk")
        .await
        .unwrap();
    assert_eq!(cancelled.status, TransactionStatus::Cancelled);
}

// ============================================================================
// Reused session ids
// ============================================================================

#[tokio::test]
async fn test_approval_with_reused_session_flags_suspicion() {
    let h = harness();
    h.gateway.script_transfers([
        Ok(transfer_answer("00", Some("SW-DUP"))),
        Ok(transfer_answer("00", Some("SW-DUP"))),
    ]);

    let first = h.run(inter_bank("1000000001", "2200000001", dec!(100))).await;
    let second = h.run(inter_bank("1000000003", "2200000002", dec!(200))).await;

    assert_eq!(first.status, TransactionStatus::Successful);
    assert_eq!(second.status, TransactionStatus::FlaggedSuspicion);
    assert_eq!(second.external_reference, None);
    assert!(second.system_remarks.as_deref().unwrap().contains("SW-DUP"));

    // a second pass must not send the transfer again
    let again = h.service.process_transaction(&second.id).await.unwrap();
    assert_eq!(again.status, TransactionStatus::FlaggedSuspicion);
    assert_eq!(h.gateway.transfer_requests().len(), 2);
    assert_eq!(h.ledger.postings().len(), 1);
}

#[tokio::test]
async fn test_decline_with_reused_session_still_fails() {
    let h = harness();
    h.gateway.script_transfers([
        Ok(transfer_answer("00", Some("SW-DUP"))),
        Ok(transfer_answer("51", Some("SW-DUP"))),
    ]);

    let first = h.run(inter_bank("1000000001", "2200000001", dec!(100))).await;
    let declined = h.run(inter_bank("1000000003", "2200000002", dec!(200))).await;

    assert_eq!(first.external_reference.as_deref(), Some("SW-DUP"));
    assert_eq!(declined.status, TransactionStatus::Failed);
    assert_eq!(declined.response_code.as_deref(), Some("51"));
    assert_eq!(declined.external_reference, None);
    assert!(
        declined
            .system_remarks
            .as_deref()
            .unwrap()
            .contains("already belongs to another transaction")
    );
}
