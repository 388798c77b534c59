//! Recovery scan.
//!
//! Finds work that was interrupted or never queued and puts it back on the
//! processing queue. Processing resumes with the original transaction id as
//! reference, so the ledger and the gateway dedupe anything that already
//! went through. A standing order occurrence is only resumed while its order
//! still points at it; an occurrence whose order moved on without it was
//! superseded by a concurrent run and must not be paid.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::{Job, ProcessingQueue};
use crate::bulk::BulkBatchCoordinator;
use crate::error::CoreError;
use crate::standing_order::StandingOrderScheduler;
use crate::transaction::{Transaction, TransactionRegistry, TransactionStatus};

const RESUMABLE: [TransactionStatus; 3] = [
    TransactionStatus::Pending,
    TransactionStatus::Processing,
    TransactionStatus::AwaitingRetry,
];

/// What a scan put back on the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Transactions enqueued.
    pub transactions: usize,
    /// Batches enqueued.
    pub batches: usize,
    /// Jobs the queue refused.
    pub dropped: usize,
    /// Standing order occurrences skipped because their order does not reference them.
    pub orphaned: usize,
}

/// Re-enqueues non-terminal work.
pub struct RecoveryScan {
    registry: Arc<TransactionRegistry>,
    bulk: Arc<BulkBatchCoordinator>,
    scheduler: Arc<StandingOrderScheduler>,
    queue: ProcessingQueue,
    stale_after: Duration,
    batch_size: u64,
}

impl RecoveryScan {
    /// Creates a scan resuming transactions untouched for `stale_after`,
    /// at most `batch_size` per scan.
    pub fn new(
        registry: Arc<TransactionRegistry>,
        bulk: Arc<BulkBatchCoordinator>,
        scheduler: Arc<StandingOrderScheduler>,
        queue: ProcessingQueue,
        stale_after: Duration,
        batch_size: u64,
    ) -> Self {
        Self {
            registry,
            bulk,
            scheduler,
            queue,
            stale_after,
            batch_size,
        }
    }

    /// Resumes every non-terminal transaction regardless of age. Run once at startup.
    pub async fn run_startup(&self) -> Result<RecoveryReport, CoreError> {
        self.scan(Utc::now()).await
    }

    /// Resumes non-terminal transactions older than the stale threshold.
    pub async fn run_once(&self) -> Result<RecoveryReport, CoreError> {
        let stale_after =
            chrono::Duration::from_std(self.stale_after).unwrap_or(chrono::Duration::zero());
        self.scan(Utc::now() - stale_after).await
    }

    /// Scans every `interval` until `shutdown` flips to true.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "Recovery scan started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }
            if let Err(err) = self.run_once().await {
                error!(error = %err, "Recovery scan failed");
            }
        }
        info!("Recovery scan stopped");
    }

    async fn scan(&self, cutoff: DateTime<Utc>) -> Result<RecoveryReport, CoreError> {
        let mut report = RecoveryReport::default();

        let stuck = self
            .registry
            .list_by_status(&RESUMABLE, self.batch_size)
            .await?;
        for transaction in stuck.iter().filter(|tx| resumable(tx, cutoff)) {
            if !self.linked_to_its_order(transaction).await? {
                warn!(
                    txn_id = %transaction.id,
                    order_id = ?transaction.standing_order_id,
                    "Skipping standing order occurrence its order does not reference"
                );
                report.orphaned += 1;
                continue;
            }
            debug!(txn_id = %transaction.id, status = %transaction.status, "Recovering transaction");
            if self.queue.enqueue(Job::Transaction(transaction.id.clone())) {
                report.transactions += 1;
            } else {
                report.dropped += 1;
            }
        }

        for batch in self.bulk.unfinished().await? {
            if self.queue.enqueue(Job::Batch(batch.id)) {
                report.batches += 1;
            } else {
                report.dropped += 1;
            }
        }

        if report != RecoveryReport::default() {
            info!(
                transactions = report.transactions,
                batches = report.batches,
                dropped = report.dropped,
                orphaned = report.orphaned,
                "Recovery scan enqueued work"
            );
        }
        Ok(report)
    }
}

impl RecoveryScan {
    /// False for an occurrence its standing order no longer points at.
    async fn linked_to_its_order(&self, transaction: &Transaction) -> Result<bool, CoreError> {
        let Some(order_id) = transaction.standing_order_id else {
            return Ok(true);
        };
        match self.scheduler.get(order_id).await {
            Ok(order) => Ok(order.pending_transaction_id.as_ref() == Some(&transaction.id)),
            Err(CoreError::NotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }
}

/// Pending batch items are left to their batch job.
fn resumable(transaction: &Transaction, cutoff: DateTime<Utc>) -> bool {
    transaction.updated_at <= cutoff
        && !(transaction.batch_id.is_some() && transaction.status == TransactionStatus::Pending)
}
