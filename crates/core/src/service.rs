//! The operations the processing core exposes to its callers.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use clearline_shared::config::ProcessingConfig;
use clearline_shared::types::{BatchId, PageRequest, PageResponse};
use tracing::warn;

use crate::bulk::{BulkBatchCoordinator, BulkBatchRequest, BulkPaymentBatch};
use crate::channel::{ChannelRouter, InboundCreditNotification};
use crate::clients::Clients;
use crate::dispute::{DisputeLog, TransactionDispute};
use crate::error::CoreError;
use crate::queue::{Job, JobRunner, ProcessingQueue, RecoveryScan};
use crate::reversal::ReversalCoordinator;
use crate::standing_order::{
    CreateStandingOrder, FailurePolicy, RunSummary, StandingOrder, StandingOrderScheduler,
};
use crate::store::Stores;
use crate::transaction::{Transaction, TransactionId, TransactionRegistry, TransactionRequest};

/// Facade over the registry and the coordinators.
///
/// With a queue attached, new transactions and batches are processed by the
/// worker pool. Without one, callers drive processing themselves through
/// [`Self::process_transaction`] and [`Self::drive_bulk_batch`].
pub struct TransactionService {
    registry: Arc<TransactionRegistry>,
    router: Arc<ChannelRouter>,
    reversals: ReversalCoordinator,
    scheduler: Arc<StandingOrderScheduler>,
    bulk: Arc<BulkBatchCoordinator>,
    disputes: DisputeLog,
    queue: Option<ProcessingQueue>,
}

impl TransactionService {
    /// Wires the core over `stores` and `clients`.
    pub fn new(
        stores: &Stores,
        clients: &Clients,
        config: &ProcessingConfig,
        policy: FailurePolicy,
    ) -> Self {
        let registry = Arc::new(TransactionRegistry::new(
            Arc::clone(&stores.transactions),
            &config.bank_code,
        ));
        let router = Arc::new(ChannelRouter::new(Arc::clone(&registry), clients, config));
        Self {
            reversals: ReversalCoordinator::new(Arc::clone(&router)),
            scheduler: Arc::new(StandingOrderScheduler::new(
                Arc::clone(&stores.standing_orders),
                Arc::clone(&router),
                policy,
            )),
            bulk: Arc::new(BulkBatchCoordinator::new(
                Arc::clone(&stores.batches),
                Arc::clone(&router),
                config.bulk_item_concurrency,
            )),
            disputes: DisputeLog::new(
                Arc::clone(&stores.disputes),
                Arc::clone(&stores.transactions),
            ),
            registry,
            router,
            queue: None,
        }
    }

    /// Hands new work to `queue` instead of leaving it to the caller.
    #[must_use]
    pub fn with_queue(mut self, queue: ProcessingQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    /// The transaction registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<TransactionRegistry> {
        &self.registry
    }

    /// The standing order scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &Arc<StandingOrderScheduler> {
        &self.scheduler
    }

    /// The bulk batch coordinator.
    #[must_use]
    pub fn bulk(&self) -> &Arc<BulkBatchCoordinator> {
        &self.bulk
    }

    /// The dispute log.
    #[must_use]
    pub fn disputes(&self) -> &DisputeLog {
        &self.disputes
    }

    /// A job runner for a worker pool.
    #[must_use]
    pub fn job_runner(&self) -> Arc<JobRunner> {
        Arc::new(JobRunner::new(Arc::clone(&self.router), Arc::clone(&self.bulk)))
    }

    /// A recovery scan feeding `queue`.
    #[must_use]
    pub fn recovery_scan(
        &self,
        queue: ProcessingQueue,
        stale_after: Duration,
        batch_size: u64,
    ) -> RecoveryScan {
        RecoveryScan::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.bulk),
            Arc::clone(&self.scheduler),
            queue,
            stale_after,
            batch_size,
        )
    }

    /// Records a requested movement as `PENDING`.
    pub async fn create_transaction(
        &self,
        request: TransactionRequest,
    ) -> Result<Transaction, CoreError> {
        let transaction = self
            .registry
            .create(request.into_new_transaction())
            .await?;
        if let Some(queue) = &self.queue {
            queue.enqueue(Job::Transaction(transaction.id.clone()));
        }
        Ok(transaction)
    }

    /// Records and credits a transfer received from another bank.
    ///
    /// Redelivered notifications return the record of the first delivery.
    pub async fn receive_inbound_credit(
        &self,
        notification: InboundCreditNotification,
    ) -> Result<Transaction, CoreError> {
        self.router.receive_inward(&notification).await
    }

    /// Processes a transaction now.
    pub async fn process_transaction(&self, id: &TransactionId) -> Result<Transaction, CoreError> {
        self.router.process(id).await
    }

    /// Fetches a transaction.
    pub async fn get_transaction(&self, id: &TransactionId) -> Result<Transaction, CoreError> {
        self.registry.get(id).await
    }

    /// Transactions on an account, newest first.
    pub async fn list_transactions_for_account(
        &self,
        account_number: &str,
        page: PageRequest,
    ) -> Result<PageResponse<Transaction>, CoreError> {
        self.registry.list_by_account(account_number, page).await
    }

    /// Reverses a settled transaction. Returns the reversal mirror.
    pub async fn reverse_transaction(
        &self,
        id: &TransactionId,
        reason: &str,
        initiated_by: &str,
    ) -> Result<Transaction, CoreError> {
        self.reversals.reverse(id, reason, initiated_by).await
    }

    /// Releases a held transaction and settles it.
    pub async fn release_transaction(
        &self,
        id: &TransactionId,
        released_by: &str,
    ) -> Result<Transaction, CoreError> {
        let released = self.router.release(id, released_by).await?;
        self.refresh_batch(&released).await;
        Ok(released)
    }

    /// Cancels a held transaction.
    pub async fn cancel_transaction(
        &self,
        id: &TransactionId,
        reason: &str,
        cancelled_by: &str,
    ) -> Result<Transaction, CoreError> {
        let cancelled = self.router.cancel(id, reason, cancelled_by).await?;
        self.refresh_batch(&cancelled).await;
        Ok(cancelled)
    }

    /// Rolls the owning batch up again after one of its items left a hold.
    async fn refresh_batch(&self, item: &Transaction) {
        let Some(batch_id) = item.batch_id else {
            return;
        };
        if let Some(queue) = &self.queue {
            queue.enqueue(Job::Batch(batch_id));
        } else if let Err(err) = self.bulk.drive(batch_id).await {
            warn!(batch_id = %batch_id, txn_id = %item.id, error = %err, "Batch roll-up failed");
        }
    }

    /// Sets up a standing order starting today or later.
    pub async fn create_standing_order(
        &self,
        request: CreateStandingOrder,
    ) -> Result<StandingOrder, CoreError> {
        self.scheduler
            .create(request, Utc::now().date_naive())
            .await
    }

    /// Executes every standing order due on `as_of`.
    pub async fn run_standing_orders(&self, as_of: NaiveDate) -> Result<RunSummary, CoreError> {
        self.scheduler.run_due(as_of).await
    }

    /// Accepts a bulk batch.
    pub async fn submit_bulk_batch(
        &self,
        request: BulkBatchRequest,
    ) -> Result<BulkPaymentBatch, CoreError> {
        let batch = self.bulk.submit(request).await?;
        if let Some(queue) = &self.queue {
            queue.enqueue(Job::Batch(batch.id));
        }
        Ok(batch)
    }

    /// Processes every item of a batch now.
    pub async fn drive_bulk_batch(&self, id: BatchId) -> Result<BulkPaymentBatch, CoreError> {
        self.bulk.drive(id).await
    }

    /// Logs a customer dispute against a transaction.
    pub async fn log_dispute(
        &self,
        transaction_id: &TransactionId,
        reason: &str,
        logged_by: &str,
    ) -> Result<TransactionDispute, CoreError> {
        self.disputes.log(transaction_id, reason, logged_by).await
    }
}
