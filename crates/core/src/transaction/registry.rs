//! Transaction registry.
//!
//! Owns creation and every mutation of [`Transaction`] records. Mutations
//! require a [`TransactionGuard`] for the record, so holding the per-id lock
//! is enforced by the type system rather than by convention. Reads never
//! take the lock.

use std::sync::Arc;

use chrono::Utc;
use clearline_shared::types::money::{MINOR_UNIT_SCALE, has_minor_unit_precision};
use clearline_shared::types::{BatchId, PageRequest, PageResponse};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::error::CoreError;
use crate::locks::{RowGuard, RowLocks};
use crate::store::{StoreError, TransactionStore};
use crate::transaction::id::{IdPrefix, TransactionId};
use crate::transaction::state::StateMachine;
use crate::transaction::types::{
    ChannelDetail, NewTransaction, Party, SettlementRoute, Transaction, TransactionCategory,
    TransactionStatus, codes,
};

/// Exclusive lock on one transaction.
pub type TransactionGuard = RowGuard<TransactionId>;

/// A status change together with the fields recorded alongside it.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    status: TransactionStatus,
    response_code: Option<String>,
    response_message: Option<String>,
    external_reference: Option<String>,
    remark: Option<String>,
    detail: Option<ChannelDetail>,
    counts_retry: bool,
}

impl StatusUpdate {
    /// A bare move to `status`.
    #[must_use]
    pub fn to(status: TransactionStatus) -> Self {
        Self {
            status,
            response_code: None,
            response_message: None,
            external_reference: None,
            remark: None,
            detail: None,
            counts_retry: false,
        }
    }

    /// Records a response code and message.
    #[must_use]
    pub fn with_response(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.response_code = Some(code.into());
        self.response_message = Some(message.into());
        self
    }

    /// Records the gateway session id.
    #[must_use]
    pub fn with_external_reference(mut self, reference: Option<String>) -> Self {
        self.external_reference = reference;
        self
    }

    /// Appends an audit remark.
    #[must_use]
    pub fn with_remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = Some(remark.into());
        self
    }

    /// Writes a channel detail in the same store operation.
    #[must_use]
    pub fn with_detail(mut self, detail: ChannelDetail) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Counts this step against the transaction's retry counter.
    #[must_use]
    pub fn counting_retry(mut self) -> Self {
        self.counts_retry = true;
        self
    }

    /// Target status.
    #[must_use]
    pub fn status(&self) -> TransactionStatus {
        self.status
    }
}

/// Canonical owner of transaction records.
pub struct TransactionRegistry {
    store: Arc<dyn TransactionStore>,
    locks: RowLocks<TransactionId>,
    bank_code: String,
}

impl TransactionRegistry {
    /// Creates a registry for the bank identified by `bank_code`.
    pub fn new(store: Arc<dyn TransactionStore>, bank_code: impl Into<String>) -> Self {
        Self {
            store,
            locks: RowLocks::new(),
            bank_code: bank_code.into(),
        }
    }

    /// Institution code of this bank.
    #[must_use]
    pub fn bank_code(&self) -> &str {
        &self.bank_code
    }

    /// Settlement route of a transaction for this bank.
    #[must_use]
    pub fn route_of(&self, transaction: &Transaction) -> SettlementRoute {
        transaction.settlement_route(&self.bank_code)
    }

    /// Validates input and builds a `PENDING` record without storing it.
    pub fn prepare(&self, new: NewTransaction) -> Result<Transaction, CoreError> {
        validate_new(&new, &self.bank_code)?;

        let prefix = if new.reverses.is_some() {
            IdPrefix::Reversal
        } else if new.batch_id.is_some() {
            IdPrefix::BulkItem
        } else if new.standing_order_id.is_some() {
            IdPrefix::StandingOrder
        } else if new.category == TransactionCategory::InwardTransfer {
            IdPrefix::Inward
        } else {
            IdPrefix::Transfer
        };

        let mut amount = new.money.amount;
        amount.rescale(MINOR_UNIT_SCALE);
        let now = Utc::now();

        Ok(Transaction {
            id: TransactionId::generate(prefix),
            category: new.category,
            channel: new.channel,
            status: TransactionStatus::Pending,
            amount,
            currency: new.money.currency,
            debit: new.debit,
            credit: new.credit,
            narration: new.narration.trim().to_string(),
            initiated_by: new.initiated_by.trim().to_string(),
            fee_amount: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            external_reference: None,
            response_code: None,
            response_message: None,
            system_remarks: None,
            retry_count: 0,
            is_reversal: new.reverses.is_some(),
            original_transaction_id: new.reverses,
            batch_id: new.batch_id,
            standing_order_id: new.standing_order_id,
            initiated_at: now,
            processed_at: None,
            external_system_at: None,
            updated_at: now,
        })
    }

    /// Validates input and stores a new `PENDING` transaction.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` without persisting anything when the
    /// input is invalid.
    pub async fn create(&self, new: NewTransaction) -> Result<Transaction, CoreError> {
        let transaction = self.prepare(new)?;
        self.store.insert(&transaction).await?;
        info!(
            txn_id = %transaction.id,
            category = %transaction.category,
            channel = %transaction.channel,
            amount = %transaction.amount,
            currency = %transaction.currency,
            "Transaction created"
        );
        Ok(transaction)
    }

    /// Stores a credit the switch already settled, keyed by its session id.
    ///
    /// The record starts `PENDING` with the session id and the switch's
    /// approval already recorded.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateExternalReference` when another record holds the
    /// session id, including one stored by a concurrent notification.
    pub async fn record_inward(
        &self,
        new: NewTransaction,
        session_id: &str,
    ) -> Result<Transaction, CoreError> {
        let mut transaction = self.prepare(new)?;
        transaction.external_reference = Some(session_id.to_string());
        transaction.external_system_at = Some(transaction.initiated_at);
        transaction.response_code = Some(codes::SUCCESS.to_string());
        transaction.response_message = Some("Inward credit received".to_string());

        match self.store.insert(&transaction).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => {
                return Err(CoreError::DuplicateExternalReference(session_id.to_string()));
            }
            Err(err) => return Err(err.into()),
        }
        info!(
            txn_id = %transaction.id,
            session_id,
            amount = %transaction.amount,
            currency = %transaction.currency,
            "Inward credit recorded"
        );
        Ok(transaction)
    }

    /// Waits for and acquires the exclusive lock on a transaction.
    pub async fn lock(&self, id: &TransactionId) -> TransactionGuard {
        self.locks.lock(id).await
    }

    /// Applies a status change under the caller's lock.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the transaction does not exist
    /// - `InvalidStateTransition` if the state machine forbids the change
    /// - `DuplicateExternalReference` if the session id belongs to another transaction
    pub async fn transition(
        &self,
        guard: &TransactionGuard,
        update: StatusUpdate,
    ) -> Result<Transaction, CoreError> {
        let mut transaction = self.load(guard).await?;
        let from = transaction.status;
        StateMachine::validate(from, update.status)?;

        let now = Utc::now();
        transaction.status = update.status;
        if update.response_code.is_some() {
            transaction.response_code = update.response_code;
            transaction.response_message = update.response_message;
        }
        if let Some(reference) = update.external_reference {
            self.ensure_reference_free(&transaction.id, &reference).await?;
            transaction.external_reference = Some(reference);
            transaction.external_system_at = Some(now);
        }
        if let Some(remark) = &update.remark {
            transaction.append_remark(remark);
        }
        if update.counts_retry {
            transaction.retry_count += 1;
        }
        if update.status.stamps_processed_at() {
            transaction.processed_at = Some(now);
        }
        transaction.updated_at = now;

        self.save(&transaction, from, update.detail.as_ref()).await?;
        info!(
            txn_id = %transaction.id,
            from = %from,
            to = %transaction.status,
            response_code = transaction.response_code.as_deref().unwrap_or(""),
            "Transaction status changed"
        );
        Ok(transaction)
    }

    /// Records computed fee and tax sub-amounts on a `PENDING` transaction.
    pub async fn record_fees(
        &self,
        guard: &TransactionGuard,
        fee: Decimal,
        tax: Decimal,
    ) -> Result<Transaction, CoreError> {
        let mut transaction = self.load(guard).await?;
        if transaction.status != TransactionStatus::Pending {
            return Err(CoreError::InvalidOperation(format!(
                "fees can only be recorded while PENDING, {} is {}",
                transaction.id, transaction.status
            )));
        }
        transaction.fee_amount = fee;
        transaction.tax_amount = tax;
        transaction.updated_at = Utc::now();
        self.save(&transaction, TransactionStatus::Pending, None)
            .await?;
        debug!(txn_id = %transaction.id, fee = %fee, tax = %tax, "Fees recorded");
        Ok(transaction)
    }

    /// Persists a switch acceptance while the transaction stays `PROCESSING`.
    ///
    /// Written before the local ledger leg so a restart resumes from the
    /// ledger posting instead of calling the switch again.
    pub async fn record_switch_acceptance(
        &self,
        guard: &TransactionGuard,
        session_id: &str,
        response_code: &str,
        response_message: &str,
    ) -> Result<Transaction, CoreError> {
        let mut transaction = self.load(guard).await?;
        if transaction.status != TransactionStatus::Processing {
            return Err(CoreError::InvalidOperation(format!(
                "switch acceptance can only be recorded while PROCESSING, {} is {}",
                transaction.id, transaction.status
            )));
        }
        self.ensure_reference_free(&transaction.id, session_id)
            .await?;
        let now = Utc::now();
        transaction.external_reference = Some(session_id.to_string());
        transaction.external_system_at = Some(now);
        transaction.response_code = Some(response_code.to_string());
        transaction.response_message = Some(response_message.to_string());
        transaction.updated_at = now;
        self.save(&transaction, TransactionStatus::Processing, None)
            .await?;
        info!(txn_id = %transaction.id, session_id, "Switch accepted transfer");
        Ok(transaction)
    }

    /// Marks a `SUCCESSFUL` original as `REVERSED` by `reversal_id`.
    ///
    /// Already reversed originals are returned unchanged, so settling the
    /// same mirror twice stamps once.
    pub async fn mark_reversed(
        &self,
        guard: &TransactionGuard,
        reversal_id: &TransactionId,
    ) -> Result<Transaction, CoreError> {
        let original = self.load(guard).await?;
        if original.status == TransactionStatus::Reversed {
            return Ok(original);
        }
        let reversed = self
            .transition(
                guard,
                StatusUpdate::to(TransactionStatus::Reversed)
                    .with_remark(format!("Reversed by {reversal_id}")),
            )
            .await?;
        info!(txn_id = %reversed.id, reversal_id = %reversal_id, "Transaction reversed");
        Ok(reversed)
    }

    /// Appends a remark without changing status.
    pub async fn annotate(
        &self,
        guard: &TransactionGuard,
        remark: &str,
    ) -> Result<Transaction, CoreError> {
        let mut transaction = self.load(guard).await?;
        let status = transaction.status;
        transaction.append_remark(remark);
        transaction.updated_at = Utc::now();
        self.save(&transaction, status, None).await?;
        Ok(transaction)
    }

    /// Fetches a transaction.
    pub async fn get(&self, id: &TransactionId) -> Result<Transaction, CoreError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| CoreError::not_found("transaction", id))
    }

    /// Fetches a transaction if it exists.
    pub async fn find(&self, id: &TransactionId) -> Result<Option<Transaction>, CoreError> {
        Ok(self.store.get(id).await?)
    }

    /// Transactions on an account, newest first.
    pub async fn list_by_account(
        &self,
        account_number: &str,
        page: PageRequest,
    ) -> Result<PageResponse<Transaction>, CoreError> {
        let (data, total) = self.store.list_by_account(account_number, page).await?;
        Ok(PageResponse::new(data, page, total))
    }

    /// Transactions in any of the given statuses, least recently updated first.
    pub async fn list_by_status(
        &self,
        statuses: &[TransactionStatus],
        limit: u64,
    ) -> Result<Vec<Transaction>, CoreError> {
        Ok(self.store.list_by_status(statuses, limit).await?)
    }

    /// Item transactions of a bulk batch.
    pub async fn list_by_batch(&self, batch_id: BatchId) -> Result<Vec<Transaction>, CoreError> {
        Ok(self.store.list_by_batch(batch_id).await?)
    }

    /// Reversal mirrors of a transaction.
    pub async fn find_reversals_of(
        &self,
        original: &TransactionId,
    ) -> Result<Vec<Transaction>, CoreError> {
        Ok(self.store.find_reversals_of(original).await?)
    }

    /// The transaction carrying a gateway session id.
    pub async fn find_by_external_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Transaction>, CoreError> {
        Ok(self.store.find_by_external_reference(reference).await?)
    }

    /// The channel detail of a settled transaction.
    pub async fn channel_detail(
        &self,
        id: &TransactionId,
    ) -> Result<Option<ChannelDetail>, CoreError> {
        Ok(self.store.channel_detail(id).await?)
    }

    async fn load(&self, guard: &TransactionGuard) -> Result<Transaction, CoreError> {
        self.get(guard.key()).await
    }

    async fn ensure_reference_free(
        &self,
        id: &TransactionId,
        reference: &str,
    ) -> Result<(), CoreError> {
        match self.store.find_by_external_reference(reference).await? {
            Some(owner) if &owner.id != id => {
                Err(CoreError::DuplicateExternalReference(reference.to_string()))
            }
            _ => Ok(()),
        }
    }

    async fn save(
        &self,
        transaction: &Transaction,
        expected: TransactionStatus,
        detail: Option<&ChannelDetail>,
    ) -> Result<(), CoreError> {
        match self.store.update(transaction, expected, detail).await {
            Ok(()) => Ok(()),
            Err(StoreError::Conflict(_)) if transaction.external_reference.is_some() => Err(
                CoreError::DuplicateExternalReference(
                    transaction.external_reference.clone().unwrap_or_default(),
                ),
            ),
            Err(err) => Err(err.into()),
        }
    }
}

fn validate_party(party: &Party, role: &str) -> Result<(), CoreError> {
    if party.account_number.trim().is_empty() {
        return Err(CoreError::Validation(format!(
            "{role} account number is required"
        )));
    }
    if party
        .bank_code
        .as_deref()
        .is_some_and(|code| code.trim().is_empty())
    {
        return Err(CoreError::Validation(format!(
            "{role} bank code must not be empty"
        )));
    }
    Ok(())
}

fn validate_new(new: &NewTransaction, bank_code: &str) -> Result<(), CoreError> {
    let amount = new.money.amount;
    if amount <= Decimal::ZERO {
        return Err(CoreError::Validation("amount must be positive".into()));
    }
    if !has_minor_unit_precision(amount) {
        return Err(CoreError::Validation(
            "amount must have at most 2 decimal places".into(),
        ));
    }
    validate_party(&new.credit, "credit")?;
    if let Some(debit) = &new.debit {
        validate_party(debit, "debit")?;
        let same_bank = if debit.is_local(bank_code) {
            new.credit.is_local(bank_code)
        } else {
            debit.bank_code == new.credit.bank_code
        };
        if same_bank && debit.account_number == new.credit.account_number {
            return Err(CoreError::Validation(
                "debit and credit accounts must differ".into(),
            ));
        }
    }
    if new.narration.trim().is_empty() {
        return Err(CoreError::Validation("narration is required".into()));
    }
    if new.initiated_by.trim().is_empty() {
        return Err(CoreError::Validation("initiator is required".into()));
    }
    if new.category == TransactionCategory::InwardTransfer && new.reverses.is_none() {
        let from_remote = new.debit.as_ref().is_some_and(|debit| !debit.is_local(bank_code));
        if !from_remote || !new.credit.is_local(bank_code) {
            return Err(CoreError::Validation(
                "inward credits move money from another bank to an account of this bank".into(),
            ));
        }
    }
    if new.reverses.is_none() && !new.credit.is_local(bank_code) && new.debit.is_none() {
        return Err(CoreError::Validation(
            "inter-bank transfers require a debit party".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
