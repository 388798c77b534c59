//! Asynchronous processing: a bounded job queue, the workers draining it and
//! the recovery scan that refills it after a restart.
//!
//! The queue is an optimisation, not the source of truth. A job that is
//! dropped (full queue, exhausted requeues, crash) leaves its transaction
//! non-terminal in the store, where the next recovery scan finds it.

pub mod recovery;
pub mod worker;

use std::fmt;

use clearline_shared::types::BatchId;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::transaction::TransactionId;

pub use recovery::{RecoveryReport, RecoveryScan};
pub use worker::{JobRunner, WorkerPool, WorkerPoolConfig};

/// Work for the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Process one transaction.
    Transaction(TransactionId),
    /// Drive every item of a bulk batch.
    Batch(BatchId),
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transaction(id) => write!(f, "transaction {id}"),
            Self::Batch(id) => write!(f, "batch {id}"),
        }
    }
}

/// A job with the number of times it has been requeued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedJob {
    /// The work.
    pub job: Job,
    /// Requeues so far.
    pub attempt: u32,
}

/// Receiving end of the queue, handed to a [`WorkerPool`].
pub struct JobReceiver(pub(crate) mpsc::Receiver<QueuedJob>);

/// Producer handle of the processing queue. Cheap to clone.
#[derive(Clone)]
pub struct ProcessingQueue {
    sender: mpsc::Sender<QueuedJob>,
}

impl ProcessingQueue {
    /// Creates a queue holding at most `capacity` jobs.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, JobReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, JobReceiver(receiver))
    }

    /// Enqueues a job without waiting. Returns false if it was dropped.
    pub fn enqueue(&self, job: Job) -> bool {
        self.push(QueuedJob { job, attempt: 0 })
    }

    pub(crate) fn push(&self, queued: QueuedJob) -> bool {
        match self.sender.try_send(queued) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(queued)) => {
                warn!(job = %queued.job, "Processing queue full, leaving job to recovery");
                false
            }
            Err(mpsc::error::TrySendError::Closed(queued)) => {
                debug!(job = %queued.job, "Processing queue closed");
                false
            }
        }
    }

    /// Jobs currently waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    /// Returns true if no job is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let (queue, _receiver) = ProcessingQueue::bounded(1);
        assert!(queue.enqueue(Job::Transaction(TransactionId::from_string("CLT1"))));
        assert!(!queue.enqueue(Job::Transaction(TransactionId::from_string("CLT2"))));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_closed_queue_drops() {
        let (queue, receiver) = ProcessingQueue::bounded(4);
        drop(receiver);
        assert!(!queue.enqueue(Job::Batch(BatchId::new())));
    }

    #[tokio::test]
    async fn test_jobs_arrive_in_order() {
        let (queue, mut receiver) = ProcessingQueue::bounded(4);
        queue.enqueue(Job::Transaction(TransactionId::from_string("CLT1")));
        queue.enqueue(Job::Transaction(TransactionId::from_string("CLT2")));

        let first = receiver.0.recv().await.unwrap();
        assert_eq!(first.job, Job::Transaction(TransactionId::from_string("CLT1")));
        assert_eq!(first.attempt, 0);
        assert!(!queue.is_empty());
    }
}
