//! Disputes logged against transactions.

#![allow(clippy::unwrap_used)]

mod common;

use clearline_core::CoreError;
use clearline_core::dispute::DisputeStatus;
use clearline_core::transaction::TransactionId;
use rust_decimal_macros::dec;

use common::{harness, intra_bank};

#[tokio::test]
async fn test_dispute_lifecycle() {
    let h = harness();
    let settled = h.run(intra_bank("1000000001", "1000000002", dec!(500))).await;

    let dispute = h
        .service
        .log_dispute(&settled.id, "Beneficiary says funds never arrived", "contact-centre")
        .await
        .unwrap();
    assert_eq!(dispute.status, DisputeStatus::Open);
    assert_eq!(dispute.transaction_id, settled.id);

    let disputes = h.service.disputes();
    let investigating = disputes.start_investigation(dispute.id).await.unwrap();
    assert_eq!(investigating.status, DisputeStatus::Investigating);

    let resolved = disputes
        .resolve(dispute.id, "Credit confirmed on statement")
        .await
        .unwrap();
    assert_eq!(resolved.status, DisputeStatus::Resolved);
    assert!(resolved.resolved_at.is_some());

    let err = disputes.resolve(dispute.id, "again").await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidOperation(_)));

    let listed = disputes.list_for_transaction(&settled.id).await.unwrap();
    assert_eq!(listed, vec![resolved]);
}

#[tokio::test]
async fn test_dispute_can_skip_investigation() {
    let h = harness();
    let settled = h.run(intra_bank("1000000001", "1000000002", dec!(500))).await;
    let dispute = h
        .service
        .log_dispute(&settled.id, "Duplicate debit", "contact-centre")
        .await
        .unwrap();

    let resolved = h
        .service
        .disputes()
        .resolve(dispute.id, "Single debit confirmed")
        .await
        .unwrap();
    assert_eq!(resolved.status, DisputeStatus::Resolved);

    let err = h
        .service
        .disputes()
        .start_investigation(dispute.id)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidOperation(_)));
}

#[tokio::test]
async fn test_dispute_needs_reason_and_transaction() {
    let h = harness();
    let settled = h.run(intra_bank("1000000001", "1000000002", dec!(500))).await;

    let err = h
        .service
        .log_dispute(&settled.id, "   ", "contact-centre")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));

    let err = h
        .service
        .log_dispute(&TransactionId::from_string("CLTGHOST"), "Unknown", "contact-centre")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound { .. }));
}

#[tokio::test]
async fn test_disputes_do_not_change_the_transaction() {
    let h = harness();
    let settled = h.run(intra_bank("1000000001", "1000000002", dec!(500))).await;
    h.service
        .log_dispute(&settled.id, "Wrong amount", "contact-centre")
        .await
        .unwrap();

    let after = h.service.get_transaction(&settled.id).await.unwrap();
    assert_eq!(after, settled);
}
