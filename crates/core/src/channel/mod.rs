//! Channel processing: from `PENDING` to a terminal or held status.
//!
//! The [`ChannelRouter`] owns the pipeline shared by every route
//! (compliance screening, fee pricing, resume after restart, fee posting)
//! and hands settlement to the [`ChannelProcessor`] for the transaction's
//! route. Every step runs under the transaction's lock. Credits arriving
//! from other banks enter through [`ChannelRouter::receive_inward`].

mod inbound;
mod inter_bank;
mod intra_bank;
mod ledger;
mod retry;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clearline_shared::config::ProcessingConfig;
use clearline_shared::types::money::round_to_minor_units;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

pub use inbound::{InboundCreditNotification, InwardProcessor, SWITCH_INITIATOR};
pub use inter_bank::InterBankProcessor;
pub use intra_bank::IntraBankProcessor;

use crate::clients::{
    Clients, ComplianceHook, FeeCalculator, FeeContext, LedgerAccount, PostingInstruction,
    PostingOutcome, with_timeout,
};
use crate::error::CoreError;
use crate::transaction::{
    ChannelDetail, SettlementRoute, StatusUpdate, Transaction, TransactionGuard, TransactionId,
    TransactionRegistry, TransactionStatus,
};
use ledger::LedgerLeg;
use retry::RetryPolicy;

/// Settlement of a `PROCESSING` transaction on one route.
#[async_trait]
pub trait ChannelProcessor: Send + Sync {
    /// The route this processor settles.
    fn route(&self) -> SettlementRoute;

    /// Drives `transaction` from `PROCESSING` to its outcome.
    async fn settle(
        &self,
        guard: &TransactionGuard,
        transaction: Transaction,
    ) -> Result<Transaction, CoreError>;
}

/// Routes transactions to their channel processor.
pub struct ChannelRouter {
    registry: Arc<TransactionRegistry>,
    intra_bank: IntraBankProcessor,
    inter_bank: InterBankProcessor,
    inward: InwardProcessor,
    ledger: LedgerLeg,
    fees: Arc<dyn FeeCalculator>,
    compliance: Arc<dyn ComplianceHook>,
    advisory_timeout: Duration,
    fee_income_gl: String,
    tax_payable_gl: String,
}

impl ChannelRouter {
    /// Wires the processors for both routes.
    pub fn new(
        registry: Arc<TransactionRegistry>,
        clients: &Clients,
        config: &ProcessingConfig,
    ) -> Self {
        let retry = RetryPolicy::from_config(config);
        let ledger = LedgerLeg::new(Arc::clone(&clients.ledger), config.ledger_timeout(), retry);
        Self {
            intra_bank: IntraBankProcessor::new(
                Arc::clone(&registry),
                ledger.clone(),
                &config.cash_gl,
            ),
            inter_bank: InterBankProcessor::new(
                Arc::clone(&registry),
                Arc::clone(&clients.gateway),
                ledger.clone(),
                retry,
                config.gateway_timeout(),
                &config.settlement_suspense_gl,
            ),
            inward: InwardProcessor::new(
                Arc::clone(&registry),
                ledger.clone(),
                &config.inward_clearing_gl,
            ),
            registry,
            ledger,
            fees: Arc::clone(&clients.fees),
            compliance: Arc::clone(&clients.compliance),
            advisory_timeout: config.advisory_timeout(),
            fee_income_gl: config.fee_income_gl.clone(),
            tax_payable_gl: config.tax_payable_gl.clone(),
        }
    }

    /// The registry the router writes through.
    #[must_use]
    pub fn registry(&self) -> &Arc<TransactionRegistry> {
        &self.registry
    }

    /// The processor settling `route`.
    #[must_use]
    pub fn processor(&self, route: SettlementRoute) -> &dyn ChannelProcessor {
        match route {
            SettlementRoute::IntraBank => &self.intra_bank,
            SettlementRoute::InterBank => &self.inter_bank,
            SettlementRoute::InwardSwitch => &self.inward,
        }
    }

    /// Locks and processes a transaction.
    ///
    /// Safe to call repeatedly: a transaction already past processing is
    /// returned unchanged, and an interrupted one resumes with its original
    /// reference.
    pub async fn process(&self, id: &TransactionId) -> Result<Transaction, CoreError> {
        let guard = self.registry.lock(id).await;
        self.process_locked(&guard).await
    }

    /// Processes a transaction whose lock the caller already holds.
    pub async fn process_locked(&self, guard: &TransactionGuard) -> Result<Transaction, CoreError> {
        let transaction = self.registry.get(guard.key()).await?;
        match transaction.status {
            TransactionStatus::Pending => self.start(guard, transaction).await,
            TransactionStatus::Processing => self.settle(guard, transaction).await,
            TransactionStatus::AwaitingRetry => {
                let resumed = self
                    .registry
                    .transition(
                        guard,
                        StatusUpdate::to(TransactionStatus::Processing)
                            .with_remark("Resumed after interruption"),
                    )
                    .await?;
                self.settle(guard, resumed).await
            }
            TransactionStatus::Successful if transaction.is_reversal => {
                self.complete_reversal(transaction).await
            }
            _ => Ok(transaction),
        }
    }

    /// Records and credits a transfer another bank sent through the switch.
    ///
    /// A notification for a session already on file is a redelivery: the
    /// existing record is returned, resumed first if it was interrupted, and
    /// the customer is never credited twice.
    ///
    /// # Errors
    ///
    /// - `Validation` if the notification is malformed
    /// - `DuplicateExternalReference` if the session id belongs to an outbound transfer
    pub async fn receive_inward(
        &self,
        notification: &InboundCreditNotification,
    ) -> Result<Transaction, CoreError> {
        notification.validate(self.registry.bank_code())?;
        let session_id = notification.session_id.trim();
        if let Some(existing) = self.registry.find_by_external_reference(session_id).await? {
            return self.redelivered(existing, session_id).await;
        }

        let recorded = match self
            .registry
            .record_inward(notification.to_new_transaction(), session_id)
            .await
        {
            Ok(recorded) => recorded,
            Err(CoreError::DuplicateExternalReference(reference)) => {
                // lost the insert race against a concurrent redelivery
                return match self.registry.find_by_external_reference(session_id).await? {
                    Some(existing) => self.redelivered(existing, session_id).await,
                    None => Err(CoreError::DuplicateExternalReference(reference)),
                };
            }
            Err(err) => return Err(err),
        };

        let guard = self.registry.lock(&recorded.id).await;
        let current = self.registry.get(&recorded.id).await?;
        if current.status != TransactionStatus::Pending {
            return self.process_locked(&guard).await;
        }
        let detail = notification.switch_detail(self.registry.bank_code());
        let processing = self
            .registry
            .transition(
                &guard,
                StatusUpdate::to(TransactionStatus::Processing)
                    .with_detail(ChannelDetail::Switch(detail)),
            )
            .await?;
        self.settle(&guard, processing).await
    }

    async fn redelivered(
        &self,
        existing: Transaction,
        session_id: &str,
    ) -> Result<Transaction, CoreError> {
        if !existing.is_inward() {
            warn!(
                txn_id = %existing.id,
                session_id,
                "Inward notification reuses the session id of an outbound transfer"
            );
            return Err(CoreError::DuplicateExternalReference(session_id.to_string()));
        }
        info!(
            txn_id = %existing.id,
            session_id,
            status = %existing.status,
            "Duplicate inward notification"
        );
        self.process(&existing.id).await
    }

    /// Releases a held transaction and settles it.
    pub async fn release(
        &self,
        id: &TransactionId,
        released_by: &str,
    ) -> Result<Transaction, CoreError> {
        let guard = self.registry.lock(id).await;
        let transaction = self.held(&guard).await?;
        info!(txn_id = %id, from = %transaction.status, released_by, "Releasing held transaction");
        let released = self
            .registry
            .transition(
                &guard,
                StatusUpdate::to(TransactionStatus::Processing)
                    .with_remark(format!("Released by {released_by}")),
            )
            .await?;
        self.settle(&guard, released).await
    }

    /// Cancels a held transaction.
    pub async fn cancel(
        &self,
        id: &TransactionId,
        reason: &str,
        cancelled_by: &str,
    ) -> Result<Transaction, CoreError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(CoreError::Validation("cancellation reason is required".into()));
        }
        let guard = self.registry.lock(id).await;
        self.held(&guard).await?;
        self.registry
            .transition(
                &guard,
                StatusUpdate::to(TransactionStatus::Cancelled)
                    .with_remark(format!("Cancelled by {cancelled_by}: {reason}")),
            )
            .await
    }

    async fn held(&self, guard: &TransactionGuard) -> Result<Transaction, CoreError> {
        let transaction = self.registry.get(guard.key()).await?;
        if transaction.status.is_held() {
            Ok(transaction)
        } else {
            Err(CoreError::InvalidOperation(format!(
                "{} is {}, only held transactions can be released or cancelled",
                transaction.id, transaction.status
            )))
        }
    }

    async fn start(
        &self,
        guard: &TransactionGuard,
        transaction: Transaction,
    ) -> Result<Transaction, CoreError> {
        if !transaction.is_reversal && !transaction.is_inward() {
            // priced before screening so a released transaction still carries its charges
            let (fee, tax) = self.price(&transaction).await;
            if !fee.is_zero() || !tax.is_zero() {
                self.registry.record_fees(guard, fee, tax).await?;
            }
            if let Some(reason) = self.screen(&transaction).await {
                info!(txn_id = %transaction.id, reason, "Transaction held for approval");
                return self
                    .registry
                    .transition(
                        guard,
                        StatusUpdate::to(TransactionStatus::PendingApproval).with_remark(reason),
                    )
                    .await;
            }
        }

        let processing = self
            .registry
            .transition(guard, StatusUpdate::to(TransactionStatus::Processing))
            .await?;
        self.settle(guard, processing).await
    }

    /// Returns the hold reason, if compliance holds the transaction.
    async fn screen(&self, transaction: &Transaction) -> Option<String> {
        match with_timeout(self.advisory_timeout, self.compliance.should_hold(transaction)).await {
            Ok(false) => None,
            Ok(true) => Some("Held by compliance screening".to_string()),
            Err(err) => {
                warn!(txn_id = %transaction.id, error = %err, "Compliance screening failed");
                Some(format!("Compliance screening unavailable: {err}"))
            }
        }
    }

    /// Fee and tax totals. An unavailable calculator charges nothing.
    async fn price(&self, transaction: &Transaction) -> (Decimal, Decimal) {
        let context = FeeContext::for_transaction(transaction);
        match with_timeout(self.advisory_timeout, self.fees.calculate(&context)).await {
            Ok(lines) => {
                let fee: Decimal = lines.iter().map(|line| line.fee).sum();
                let tax: Decimal = lines.iter().map(|line| line.tax).sum();
                (round_to_minor_units(fee), round_to_minor_units(tax))
            }
            Err(err) => {
                warn!(txn_id = %transaction.id, error = %err, "Fee calculation failed, charging no fees");
                (Decimal::ZERO, Decimal::ZERO)
            }
        }
    }

    async fn settle(
        &self,
        guard: &TransactionGuard,
        transaction: Transaction,
    ) -> Result<Transaction, CoreError> {
        let route = self.registry.route_of(&transaction);
        debug!(txn_id = %transaction.id, route = %route, "Settling transaction");
        let settled = self.processor(route).settle(guard, transaction).await?;

        match settled.status {
            TransactionStatus::Successful if settled.is_reversal => {
                self.complete_reversal(settled).await
            }
            TransactionStatus::Successful => self.post_fees(guard, settled).await,
            _ => Ok(settled),
        }
    }

    /// Stamps the original of a settled mirror `REVERSED`.
    ///
    /// Runs on every settlement path, so a mirror finished by a worker or a
    /// recovery pass completes the reversal too. Takes the original's lock
    /// while the caller holds the mirror's.
    async fn complete_reversal(&self, mirror: Transaction) -> Result<Transaction, CoreError> {
        let Some(original_id) = mirror.original_transaction_id.clone() else {
            return Ok(mirror);
        };
        let original_guard = self.registry.lock(&original_id).await;
        self.registry
            .mark_reversed(&original_guard, &mirror.id)
            .await?;
        Ok(mirror)
    }

    /// Posts fee and tax after the principal settled.
    ///
    /// A failed fee posting is recorded in remarks and never changes the
    /// principal outcome.
    async fn post_fees(
        &self,
        guard: &TransactionGuard,
        transaction: Transaction,
    ) -> Result<Transaction, CoreError> {
        let Some(debit_account) = transaction
            .debit
            .as_ref()
            .map(|debit| debit.account_number.clone())
        else {
            return Ok(transaction);
        };

        let lines = [
            (transaction.fee_amount, &self.fee_income_gl, "FEE", "Fee"),
            (transaction.tax_amount, &self.tax_payable_gl, "TAX", "Tax"),
        ];
        let mut failures = Vec::new();
        for (amount, gl, suffix, label) in lines {
            if amount <= Decimal::ZERO {
                continue;
            }
            let instruction = PostingInstruction {
                from: LedgerAccount::Customer(debit_account.clone()),
                to: LedgerAccount::GeneralLedger(gl.clone()),
                amount,
                currency: transaction.currency,
                narration: format!("{label} on {}", transaction.id),
                idempotency_ref: format!("{}-{suffix}", transaction.id),
            };
            match self.ledger.post_once(&instruction).await {
                Ok(PostingOutcome::Posted) => {
                    debug!(txn_id = %transaction.id, amount = %amount, label, "Posted charge");
                }
                Ok(outcome) => failures.push(format!("{label} posting failed: {outcome}")),
                Err(err) => failures.push(format!("{label} posting failed: {err}")),
            }
        }

        if failures.is_empty() {
            return Ok(transaction);
        }
        let remark = failures.join("; ");
        warn!(txn_id = %transaction.id, remark, "Charge posting failed");
        self.registry.annotate(guard, &remark).await
    }
}
