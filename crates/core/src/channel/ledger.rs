//! Ledger postings made on behalf of a transaction.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::retry::RetryPolicy;
use crate::clients::{ClientError, LedgerClient, PostingInstruction, PostingOutcome, with_timeout};
use crate::error::CoreError;
use crate::transaction::{
    ChannelDetail, StatusUpdate, Transaction, TransactionGuard, TransactionRegistry,
    TransactionStatus, codes,
};

/// Posts to the ledger under a transaction's lock.
#[derive(Clone)]
pub(crate) struct LedgerLeg {
    ledger: Arc<dyn LedgerClient>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl LedgerLeg {
    pub(crate) fn new(ledger: Arc<dyn LedgerClient>, timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            ledger,
            timeout,
            retry,
        }
    }

    /// Posts with retries on transport failures.
    pub(crate) async fn post(
        &self,
        registry: &TransactionRegistry,
        guard: &TransactionGuard,
        instruction: &PostingInstruction,
    ) -> Result<Result<PostingOutcome, ClientError>, CoreError> {
        self.retry
            .run(
                registry,
                guard,
                "ledger posting",
                ClientError::is_transient,
                || with_timeout(self.timeout, self.ledger.post(instruction)),
            )
            .await
    }

    /// Posts once, without touching the transaction's status.
    pub(crate) async fn post_once(
        &self,
        instruction: &PostingInstruction,
    ) -> Result<PostingOutcome, ClientError> {
        with_timeout(self.timeout, self.ledger.post(instruction)).await
    }

    /// Posts the principal and moves the transaction to its terminal status.
    pub(crate) async fn settle(
        &self,
        registry: &TransactionRegistry,
        guard: &TransactionGuard,
        instruction: &PostingInstruction,
    ) -> Result<Transaction, CoreError> {
        let update = match self.post(registry, guard, instruction).await? {
            Ok(PostingOutcome::Posted) => StatusUpdate::to(TransactionStatus::Successful)
                .with_response(codes::SUCCESS, "Approved or completed successfully")
                .with_detail(ChannelDetail::Ledger {
                    posting_reference: instruction.idempotency_ref.clone(),
                }),
            Ok(PostingOutcome::InsufficientFunds) => StatusUpdate::to(TransactionStatus::Failed)
                .with_response(codes::INSUFFICIENT_FUNDS, "Insufficient funds"),
            Ok(PostingOutcome::AccountNotFound) => StatusUpdate::to(TransactionStatus::Failed)
                .with_response(codes::ACCOUNT_NOT_FOUND, "Account not found"),
            Ok(PostingOutcome::SystemError(detail)) => StatusUpdate::to(TransactionStatus::Failed)
                .with_response(codes::SYSTEM_MALFUNCTION, "System malfunction")
                .with_remark(format!("Ledger error: {detail}")),
            Err(ClientError::Timeout) => {
                warn!(txn_id = %guard.key(), "Ledger posting outcome unknown");
                StatusUpdate::to(TransactionStatus::Timeout)
                    .with_response(codes::EXTERNAL_TIMEOUT, "Ledger did not respond")
                    .with_remark("Ledger posting timed out, posting state unknown")
            }
            Err(err) => StatusUpdate::to(TransactionStatus::Failed)
                .with_response(codes::SYSTEM_MALFUNCTION, "System malfunction")
                .with_remark(format!("Ledger unreachable: {err}")),
        };
        registry.transition(guard, update).await
    }
}
