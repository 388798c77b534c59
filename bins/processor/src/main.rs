//! Clearline transaction processor
//!
//! Runs the worker pool, the recovery scan and the standing order scheduler
//! until interrupted.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use sea_orm_migration::MigratorTrait;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clearline_connectors::clients_from_config;
use clearline_core::TransactionService;
use clearline_core::queue::{ProcessingQueue, WorkerPool, WorkerPoolConfig};
use clearline_core::standing_order::FailurePolicy;
use clearline_db::migration::Migrator;
use clearline_db::{connect_with, stores};
use clearline_shared::AppConfig;
use clearline_shared::config::LoggingConfig;

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "clearline=debug,sea_orm=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&config.logging);

    let db = connect_with(&config.database).await?;
    info!("Connected to database");
    if config.database.run_migrations {
        Migrator::up(&db, None).await?;
        info!("Migrations applied");
    }

    let clients = clients_from_config(&config.connectors, &config.processing)?;
    let (queue, receiver) = ProcessingQueue::bounded(config.worker.queue_capacity);
    let service = Arc::new(
        TransactionService::new(
            &stores(&db),
            &clients,
            &config.processing,
            FailurePolicy::from(&config.scheduler),
        )
        .with_queue(queue.clone()),
    );

    let pool = WorkerPool::spawn(
        receiver,
        queue.clone(),
        service.job_runner(),
        WorkerPoolConfig::from(&config.worker),
    );

    let recovery = service.recovery_scan(
        queue,
        config.worker.stale_after(),
        config.worker.recovery_batch_size,
    );
    let report = recovery.run_startup().await?;
    info!(
        transactions = report.transactions,
        batches = report.batches,
        dropped = report.dropped,
        "Startup recovery complete"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let recovery_interval = config.worker.recovery_interval();
    let recovery_task = tokio::spawn({
        let shutdown = shutdown_rx.clone();
        async move { recovery.run(recovery_interval, shutdown).await }
    });

    let scheduler_task = tokio::spawn(run_scheduler(
        Arc::clone(&service),
        config.scheduler.tick_interval(),
        shutdown_rx,
    ));

    info!(
        bank_code = %config.processing.bank_code,
        workers = config.worker.concurrency,
        "Processor running"
    );
    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    let _ = shutdown_tx.send(true);
    if let Err(err) = recovery_task.await {
        error!(error = %err, "Recovery task panicked");
    }
    if let Err(err) = scheduler_task.await {
        error!(error = %err, "Scheduler task panicked");
    }
    pool.shutdown().await;

    info!("Processor stopped");
    Ok(())
}

/// Runs due standing orders every `interval` until `shutdown` flips.
async fn run_scheduler(
    service: Arc<TransactionService>,
    interval: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let today = Utc::now().date_naive();
        match service.run_standing_orders(today).await {
            Ok(summary) if summary.due > 0 => info!(
                as_of = %today,
                due = summary.due,
                settled = summary.settled,
                failed = summary.failed,
                in_flight = summary.in_flight,
                deactivated = summary.deactivated,
                errors = summary.errors,
                "Standing orders run"
            ),
            Ok(_) => {}
            Err(err) => error!(error = %err, "Standing order run failed"),
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }
    }
    info!("Scheduler stopped");
}
