//! Transfers to other banks through the settlement gateway.
//!
//! The switch leg runs first. Once the switch reports `00` the money has
//! left the bank, so the session id is persisted before the local ledger
//! leg. From then on the transaction can only end `SUCCESSFUL` or
//! `FLAGGED_SUSPICION`, and a resumed run goes straight to the ledger leg.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use super::ChannelProcessor;
use super::ledger::LedgerLeg;
use super::retry::RetryPolicy;
use crate::clients::{
    ClientError, FundsTransferRequest, FundsTransferResponse, LedgerAccount, NameEnquiryResponse,
    PostingInstruction, PostingOutcome, SettlementGateway, with_timeout,
};
use crate::error::CoreError;
use crate::transaction::{
    ChannelDetail, Party, SettlementRoute, StatusUpdate, SwitchDetail, Transaction,
    TransactionGuard, TransactionRegistry, TransactionStatus, codes,
};

/// Settles a transaction across the inter-bank switch.
pub struct InterBankProcessor {
    registry: Arc<TransactionRegistry>,
    gateway: Arc<dyn SettlementGateway>,
    ledger: LedgerLeg,
    retry: RetryPolicy,
    gateway_timeout: Duration,
    suspense_gl: String,
}

impl InterBankProcessor {
    pub(crate) fn new(
        registry: Arc<TransactionRegistry>,
        gateway: Arc<dyn SettlementGateway>,
        ledger: LedgerLeg,
        retry: RetryPolicy,
        gateway_timeout: Duration,
        suspense_gl: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            gateway,
            ledger,
            retry,
            gateway_timeout,
            suspense_gl: suspense_gl.into(),
        }
    }

    async fn fail(
        &self,
        guard: &TransactionGuard,
        code: &str,
        message: &str,
        remark: String,
    ) -> Result<Transaction, CoreError> {
        self.registry
            .transition(
                guard,
                StatusUpdate::to(TransactionStatus::Failed)
                    .with_response(code, message)
                    .with_remark(remark),
            )
            .await
    }

    /// Resolves the beneficiary at the destination bank.
    ///
    /// Returns `Err` with the failed transaction when the enquiry does not
    /// come back `00`. An enquiry that times out fails with `91` rather than
    /// `TIMEOUT`: no money has moved yet, so there is nothing to reconcile.
    async fn name_enquiry(
        &self,
        guard: &TransactionGuard,
        bank_code: &str,
        account_number: &str,
    ) -> Result<Result<NameEnquiryResponse, Transaction>, CoreError> {
        let answer = self
            .retry
            .run(
                &self.registry,
                guard,
                "name enquiry",
                ClientError::is_transient,
                || {
                    with_timeout(
                        self.gateway_timeout,
                        self.gateway.name_enquiry(bank_code, account_number),
                    )
                },
            )
            .await?;

        match answer {
            Ok(response) if response.response_code == codes::SUCCESS => Ok(Ok(response)),
            Ok(response) => {
                let failed = self
                    .fail(
                        guard,
                        &response.response_code,
                        "Name enquiry declined",
                        format!(
                            "Name enquiry for {account_number} at {bank_code} returned {}",
                            response.response_code
                        ),
                    )
                    .await?;
                Ok(Err(failed))
            }
            Err(err) => {
                let failed = self
                    .fail(
                        guard,
                        codes::SWITCH_UNAVAILABLE,
                        "Destination institution unavailable",
                        format!("Name enquiry failed: {err}"),
                    )
                    .await?;
                Ok(Err(failed))
            }
        }
    }

    /// Debits the customer into the settlement suspense GL after the switch accepted.
    async fn ledger_leg(
        &self,
        guard: &TransactionGuard,
        transaction: &Transaction,
        enquiry: Option<&NameEnquiryResponse>,
    ) -> Result<Transaction, CoreError> {
        let session_id = transaction.external_reference.clone().unwrap_or_default();
        let destination_bank_code = transaction
            .remote_bank_code(self.registry.bank_code())
            .unwrap_or_default()
            .to_string();
        let Some(debit) = &transaction.debit else {
            return self.flag(guard, &session_id, "no debit party to post").await;
        };

        let instruction = PostingInstruction {
            from: LedgerAccount::Customer(debit.account_number.clone()),
            to: LedgerAccount::GeneralLedger(self.suspense_gl.clone()),
            amount: transaction.amount,
            currency: transaction.currency,
            narration: transaction.narration.clone(),
            idempotency_ref: transaction.id.to_string(),
        };

        let failure = match self.ledger.post(&self.registry, guard, &instruction).await? {
            Ok(PostingOutcome::Posted) => {
                let detail = SwitchDetail {
                    session_id: session_id.clone(),
                    name_enquiry_ref: enquiry.and_then(|e| e.session_id.clone()),
                    beneficiary_name: enquiry
                        .and_then(|e| e.account_name.clone())
                        .or_else(|| transaction.credit.account_name.clone()),
                    destination_bank_code,
                };
                info!(txn_id = %transaction.id, session_id, "Inter-bank transfer settled");
                return self
                    .registry
                    .transition(
                        guard,
                        StatusUpdate::to(TransactionStatus::Successful)
                            .with_response(codes::SUCCESS, "Approved or completed successfully")
                            .with_detail(ChannelDetail::Switch(detail)),
                    )
                    .await;
            }
            Ok(outcome) => outcome.to_string(),
            Err(err) => err.to_string(),
        };
        self.flag(guard, &session_id, &failure).await
    }

    async fn flag(
        &self,
        guard: &TransactionGuard,
        session_id: &str,
        failure: &str,
    ) -> Result<Transaction, CoreError> {
        error!(
            txn_id = %guard.key(),
            session_id,
            failure,
            "Switch settled but ledger posting failed, flagging for reconciliation"
        );
        self.registry
            .transition(
                guard,
                StatusUpdate::to(TransactionStatus::FlaggedSuspicion).with_remark(format!(
                    "Switch session {session_id} returned {} but ledger posting failed: {failure}",
                    codes::SUCCESS
                )),
            )
            .await
    }

    /// Records a switch decline. A session id already owned by another
    /// transaction is kept out of the record and noted in remarks.
    async fn decline(
        &self,
        guard: &TransactionGuard,
        response: &FundsTransferResponse,
    ) -> Result<Transaction, CoreError> {
        let remark = format!("Switch declined with {}", response.response_code);
        let declined = StatusUpdate::to(TransactionStatus::Failed)
            .with_response(&response.response_code, &response.response_message);
        match self
            .registry
            .transition(
                guard,
                declined
                    .clone()
                    .with_external_reference(response.session_id.clone())
                    .with_remark(remark.clone()),
            )
            .await
        {
            Err(CoreError::DuplicateExternalReference(session_id)) => {
                warn!(
                    txn_id = %guard.key(),
                    session_id = %session_id,
                    "Declined session id already recorded elsewhere"
                );
                self.registry
                    .transition(
                        guard,
                        declined.with_remark(format!(
                            "{remark}; session {session_id} already belongs to another transaction"
                        )),
                    )
                    .await
            }
            result => result,
        }
    }

    /// The switch approved with a session id another transaction owns. Money
    /// may have left the bank, so the record goes to reconciliation.
    async fn flag_reused_session(
        &self,
        guard: &TransactionGuard,
        session_id: &str,
    ) -> Result<Transaction, CoreError> {
        error!(
            txn_id = %guard.key(),
            session_id,
            "Switch approved with a session id owned by another transaction"
        );
        self.registry
            .transition(
                guard,
                StatusUpdate::to(TransactionStatus::FlaggedSuspicion)
                    .with_response(codes::SUCCESS, "Approved with a reused session id")
                    .with_remark(format!(
                        "Switch session {session_id} returned {} but is already recorded on another transaction",
                        codes::SUCCESS
                    )),
            )
            .await
    }

    /// Returns a reversed inter-bank transfer from the suspense GL.
    async fn settle_return(
        &self,
        guard: &TransactionGuard,
        transaction: &Transaction,
    ) -> Result<Transaction, CoreError> {
        let instruction = PostingInstruction {
            from: LedgerAccount::GeneralLedger(self.suspense_gl.clone()),
            to: LedgerAccount::Customer(transaction.credit.account_number.clone()),
            amount: transaction.amount,
            currency: transaction.currency,
            narration: transaction.narration.clone(),
            idempotency_ref: transaction.id.to_string(),
        };
        self.ledger.settle(&self.registry, guard, &instruction).await
    }
}

#[async_trait]
impl ChannelProcessor for InterBankProcessor {
    fn route(&self) -> SettlementRoute {
        SettlementRoute::InterBank
    }

    async fn settle(
        &self,
        guard: &TransactionGuard,
        transaction: Transaction,
    ) -> Result<Transaction, CoreError> {
        if transaction.is_reversal {
            return self.settle_return(guard, &transaction).await;
        }
        if transaction.switch_accepted() {
            info!(txn_id = %transaction.id, "Switch already accepted, resuming ledger leg");
            return self.ledger_leg(guard, &transaction, None).await;
        }

        let bank_code = transaction
            .remote_bank_code(self.registry.bank_code())
            .map(str::to_string)
            .ok_or_else(|| {
                CoreError::InvalidOperation(format!(
                    "{} has no party at another bank",
                    transaction.id
                ))
            })?;
        let debit = transaction.debit.clone().ok_or_else(|| {
            CoreError::InvalidOperation(format!("{} has no debit party", transaction.id))
        })?;

        let enquiry = match self
            .name_enquiry(guard, &bank_code, &transaction.credit.account_number)
            .await?
        {
            Ok(enquiry) => enquiry,
            Err(failed) => return Ok(failed),
        };

        let mut credit: Party = transaction.credit.clone();
        if let Some(name) = &enquiry.account_name {
            credit.account_name = Some(name.clone());
        }
        let request = FundsTransferRequest {
            payment_reference: transaction.id.to_string(),
            debit,
            credit,
            amount: transaction.amount,
            currency: transaction.currency,
            narration: transaction.narration.clone(),
            name_enquiry_ref: enquiry.session_id.clone(),
        };

        let answer = self
            .retry
            .run(
                &self.registry,
                guard,
                "funds transfer",
                ClientError::is_undelivered,
                || with_timeout(self.gateway_timeout, self.gateway.funds_transfer(&request)),
            )
            .await?;

        let response = match answer {
            Ok(response) => response,
            Err(ClientError::Unavailable(detail)) => {
                return self
                    .fail(
                        guard,
                        codes::SWITCH_UNAVAILABLE,
                        "Destination institution unavailable",
                        format!("Funds transfer not delivered: {detail}"),
                    )
                    .await;
            }
            Err(err) => {
                warn!(txn_id = %transaction.id, error = %err, "Funds transfer outcome unknown");
                return self
                    .registry
                    .transition(
                        guard,
                        StatusUpdate::to(TransactionStatus::Timeout)
                            .with_response(codes::EXTERNAL_TIMEOUT, "Switch did not respond")
                            .with_remark(format!("Funds transfer outcome unknown: {err}")),
                    )
                    .await;
            }
        };

        if response.response_code != codes::SUCCESS {
            return self.decline(guard, &response).await;
        }

        let Some(session_id) = response.session_id else {
            warn!(txn_id = %transaction.id, "Switch approved without a session id");
            return self
                .registry
                .transition(
                    guard,
                    StatusUpdate::to(TransactionStatus::Timeout)
                        .with_response(codes::EXTERNAL_TIMEOUT, "Switch response incomplete")
                        .with_remark("Switch returned 00 without a session id"),
                )
                .await;
        };

        let accepted = match self
            .registry
            .record_switch_acceptance(
                guard,
                &session_id,
                &response.response_code,
                &response.response_message,
            )
            .await
        {
            Ok(accepted) => accepted,
            Err(CoreError::DuplicateExternalReference(_)) => {
                return self.flag_reused_session(guard, &session_id).await;
            }
            Err(err) => return Err(err),
        };
        self.ledger_leg(guard, &accepted, Some(&enquiry)).await
    }
}
