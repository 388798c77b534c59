//! Bulk payment batch coordinator.

use std::sync::Arc;

use chrono::Utc;
use clearline_shared::types::{BatchId, Money};
use futures::{StreamExt, future, stream};
use rust_decimal::Decimal;
use tracing::{error, info};

use super::types::{BatchStatus, BulkBatchRequest, BulkPaymentBatch};
use crate::channel::ChannelRouter;
use crate::error::CoreError;
use crate::locks::RowLocks;
use crate::store::BatchStore;
use crate::transaction::{
    Channel, NewTransaction, Party, Transaction, TransactionCategory, TransactionRegistry,
    TransactionStatus,
};

/// Accepts bulk batches and drives their items.
pub struct BulkBatchCoordinator {
    batches: Arc<dyn BatchStore>,
    registry: Arc<TransactionRegistry>,
    router: Arc<ChannelRouter>,
    locks: RowLocks<BatchId>,
    item_concurrency: usize,
}

impl BulkBatchCoordinator {
    /// Creates a coordinator processing at most `item_concurrency` items at once.
    pub fn new(
        batches: Arc<dyn BatchStore>,
        router: Arc<ChannelRouter>,
        item_concurrency: usize,
    ) -> Self {
        Self {
            batches,
            registry: Arc::clone(router.registry()),
            router,
            locks: RowLocks::new(),
            item_concurrency: item_concurrency.max(1),
        }
    }

    /// Validates a batch and stores it with one `PENDING` transaction per item.
    ///
    /// Nothing is stored unless the whole batch is valid.
    ///
    /// # Errors
    ///
    /// - `Validation` for an empty batch, a blank field or an invalid item
    /// - `InvalidOperation` if the declared total or count does not match the items
    pub async fn submit(&self, request: BulkBatchRequest) -> Result<BulkPaymentBatch, CoreError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(CoreError::Validation("batch name is required".into()));
        }
        if request.debit_account.trim().is_empty() {
            return Err(CoreError::Validation("debit account is required".into()));
        }
        if request.items.is_empty() {
            return Err(CoreError::Validation(
                "a batch needs at least one item".into(),
            ));
        }

        let item_count = u32::try_from(request.items.len())
            .map_err(|_| CoreError::Validation("too many items in batch".into()))?;
        if let Some(declared) = request.declared_count
            && declared != item_count
        {
            return Err(CoreError::InvalidOperation(format!(
                "declared item count {declared} does not match {item_count} items"
            )));
        }
        let batch_id = BatchId::new();
        let mut items = Vec::with_capacity(request.items.len());
        for (index, item) in request.items.into_iter().enumerate() {
            let new = NewTransaction::new(
                TransactionCategory::BulkPaymentItem,
                Channel::Bulk,
                Money::new(item.amount, request.currency),
                Some(Party::local(request.debit_account.trim())),
                item.credit,
                item.narration.unwrap_or_else(|| name.to_string()),
                request.initiated_by.clone(),
            )
            .in_batch(batch_id);
            let prepared = self.registry.prepare(new).map_err(|err| match err {
                CoreError::Validation(message) => {
                    CoreError::Validation(format!("item {}: {message}", index + 1))
                }
                other => other,
            })?;
            items.push(prepared);
        }

        let sum: Decimal = items.iter().map(|item| item.amount).sum();
        if sum != request.declared_total {
            return Err(CoreError::InvalidOperation(format!(
                "declared total {} does not match item sum {sum}",
                request.declared_total
            )));
        }

        let batch = BulkPaymentBatch {
            id: batch_id,
            name: name.to_string(),
            debit_account: request.debit_account.trim().to_string(),
            currency: request.currency,
            total_amount: request.declared_total,
            item_count,
            status: BatchStatus::PendingProcessing,
            successful_count: 0,
            failed_count: 0,
            initiated_by: request.initiated_by,
            created_at: Utc::now(),
            processed_at: None,
        };
        self.batches.insert_batch(&batch, &items).await?;
        info!(
            batch_id = %batch.id,
            items = item_count,
            total = %batch.total_amount,
            "Bulk batch accepted"
        );
        Ok(batch)
    }

    /// Processes every item of a batch and records the outcome.
    ///
    /// Items are independent: one item's error is logged without affecting
    /// its siblings. Counters are rolled up from the stored items, so a batch
    /// with items still held or in flight stays `PROCESSING` and is finished
    /// by a later drive once every item is terminal. Driving a finished batch
    /// returns it unchanged.
    pub async fn drive(&self, batch_id: BatchId) -> Result<BulkPaymentBatch, CoreError> {
        let _batch_guard = self.locks.lock(&batch_id).await;
        let mut batch = self.get(batch_id).await?;
        if batch.status.is_finished() {
            return Ok(batch);
        }

        if batch.status != BatchStatus::Processing {
            batch.status = BatchStatus::Processing;
            self.batches.update_batch(&batch).await?;
        }

        let items = self.registry.list_by_batch(batch_id).await?;
        let errors = stream::iter(items)
            .map(|item| self.drive_item(item))
            .buffer_unordered(self.item_concurrency)
            .filter(|ok| future::ready(!*ok))
            .count()
            .await;

        let tally = ItemTally::of(&self.registry.list_by_batch(batch_id).await?);
        batch.successful_count = tally.successful;
        batch.failed_count = tally.failed;
        if tally.open > 0 {
            self.batches.update_batch(&batch).await?;
            info!(
                batch_id = %batch.id,
                successful = tally.successful,
                failed = tally.failed,
                open = tally.open,
                errors,
                "Bulk batch waiting on unfinished items"
            );
            return Ok(batch);
        }

        batch.status = if tally.failed == 0 {
            BatchStatus::Completed
        } else {
            BatchStatus::CompletedWithDiscrepancies
        };
        batch.processed_at = Some(Utc::now());
        self.batches.update_batch(&batch).await?;

        info!(
            batch_id = %batch.id,
            status = %batch.status,
            successful = batch.successful_count,
            failed = batch.failed_count,
            "Bulk batch finished"
        );
        Ok(batch)
    }

    /// Returns false if processing the item returned an error.
    async fn drive_item(&self, item: Transaction) -> bool {
        match self.router.process(&item.id).await {
            Ok(_) => true,
            Err(err) => {
                error!(txn_id = %item.id, batch_id = ?item.batch_id, error = %err, "Bulk item failed");
                false
            }
        }
    }

    /// Fetches a batch header.
    pub async fn get(&self, batch_id: BatchId) -> Result<BulkPaymentBatch, CoreError> {
        self.batches
            .get_batch(batch_id)
            .await?
            .ok_or_else(|| CoreError::not_found("batch", batch_id))
    }

    /// Item transactions of a batch.
    pub async fn items(&self, batch_id: BatchId) -> Result<Vec<Transaction>, CoreError> {
        self.get(batch_id).await?;
        self.registry.list_by_batch(batch_id).await
    }

    /// Batches accepted or interrupted but not yet finished.
    pub async fn unfinished(&self) -> Result<Vec<BulkPaymentBatch>, CoreError> {
        Ok(self
            .batches
            .batches_by_status(&[BatchStatus::PendingProcessing, BatchStatus::Processing])
            .await?)
    }
}

/// Item outcomes of a batch.
#[derive(Debug, Default, PartialEq, Eq)]
struct ItemTally {
    successful: u32,
    failed: u32,
    // held or still in flight
    open: u32,
}

impl ItemTally {
    fn of(items: &[Transaction]) -> Self {
        let mut tally = Self::default();
        for item in items {
            match item.status {
                TransactionStatus::Successful | TransactionStatus::Reversed => {
                    tally.successful += 1;
                }
                status if status.is_terminal() => tally.failed += 1,
                _ => tally.open += 1,
            }
        }
        tally
    }
}
