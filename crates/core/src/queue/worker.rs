//! Worker pool draining the processing queue.

use std::sync::Arc;
use std::time::Duration;

use clearline_shared::config::WorkerConfig;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{Job, JobReceiver, ProcessingQueue, QueuedJob};
use crate::bulk::BulkBatchCoordinator;
use crate::channel::ChannelRouter;
use crate::error::CoreError;

/// Pool sizing and requeue behaviour.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPoolConfig {
    /// Number of workers.
    pub concurrency: usize,
    /// Requeues of a failing job before it is left to recovery.
    pub max_requeues: u32,
    /// Delay before a failing job is requeued.
    pub requeue_delay: Duration,
}

impl From<&WorkerConfig> for WorkerPoolConfig {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            max_requeues: config.max_requeues,
            requeue_delay: config.requeue_delay(),
        }
    }
}

/// Executes jobs against the core.
pub struct JobRunner {
    router: Arc<ChannelRouter>,
    bulk: Arc<BulkBatchCoordinator>,
}

impl JobRunner {
    /// Creates a runner over the router and batch coordinator.
    pub fn new(router: Arc<ChannelRouter>, bulk: Arc<BulkBatchCoordinator>) -> Self {
        Self { router, bulk }
    }

    /// Runs one job to completion.
    pub async fn run(&self, job: &Job) -> Result<(), CoreError> {
        match job {
            Job::Transaction(id) => {
                let transaction = self.router.process(id).await?;
                debug!(txn_id = %id, status = %transaction.status, "Job processed");
            }
            Job::Batch(id) => {
                let batch = self.bulk.drive(*id).await?;
                debug!(batch_id = %id, status = %batch.status, "Batch job processed");
            }
        }
        Ok(())
    }
}

/// Handles of running workers.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
}

impl WorkerPool {
    /// Spawns `config.concurrency` workers on the current runtime.
    ///
    /// `queue` is the producer side of `receiver`, used to requeue failed jobs.
    pub fn spawn(
        receiver: JobReceiver,
        queue: ProcessingQueue,
        runner: Arc<JobRunner>,
        config: WorkerPoolConfig,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let receiver = Arc::new(Mutex::new(receiver.0));
        let handles = (0..config.concurrency.max(1))
            .map(|worker| {
                tokio::spawn(work(
                    worker,
                    Arc::clone(&receiver),
                    queue.clone(),
                    Arc::clone(&runner),
                    config,
                    shutdown.subscribe(),
                ))
            })
            .collect();
        info!(workers = config.concurrency.max(1), "Worker pool started");
        Self { handles, shutdown }
    }

    /// Stops taking new jobs and waits for in-flight jobs to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(err) = handle.await {
                error!(error = %err, "Worker task panicked");
            }
        }
        info!("Worker pool stopped");
    }
}

async fn work(
    worker: usize,
    receiver: Arc<Mutex<mpsc::Receiver<QueuedJob>>>,
    queue: ProcessingQueue,
    runner: Arc<JobRunner>,
    config: WorkerPoolConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        let next = {
            let mut receiver = receiver.lock().await;
            tokio::select! {
                biased;
                _ = shutdown.changed() => None,
                queued = receiver.recv() => queued,
            }
        };
        let Some(queued) = next else {
            break;
        };

        if let Err(err) = runner.run(&queued.job).await {
            requeue(&queue, queued, &err, &config);
        }
    }
    debug!(worker, "Worker stopped");
}

fn requeue(queue: &ProcessingQueue, queued: QueuedJob, err: &CoreError, config: &WorkerPoolConfig) {
    if queued.attempt >= config.max_requeues {
        error!(
            job = %queued.job,
            attempts = queued.attempt + 1,
            error = %err,
            "Job abandoned, leaving it to recovery"
        );
        return;
    }

    warn!(job = %queued.job, attempt = queued.attempt, error = %err, "Job failed, requeueing");
    let queue = queue.clone();
    let delay = config.requeue_delay;
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        queue.push(QueuedJob {
            job: queued.job,
            attempt: queued.attempt + 1,
        });
    });
}
