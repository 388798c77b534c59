//! Bounded retry of external calls, recorded on the transaction.

use std::future::Future;
use std::time::Duration;

use clearline_shared::config::ProcessingConfig;
use tracing::warn;

use crate::clients::ClientError;
use crate::error::CoreError;
use crate::transaction::{StatusUpdate, TransactionGuard, TransactionRegistry, TransactionStatus};

/// Attempt budget and back-off between attempts.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl RetryPolicy {
    pub(crate) fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub(crate) fn from_config(config: &ProcessingConfig) -> Self {
        Self::new(config.max_attempts, config.retry_backoff())
    }

    /// Runs `call` until it succeeds, fails with a non-retryable error, or the
    /// budget is spent.
    ///
    /// Each retried failure moves the transaction `PROCESSING → AWAITING_RETRY`
    /// (counting the retry) and back to `PROCESSING` after the back-off. The
    /// outer `Result` carries registry failures, the inner one the last
    /// answer of the collaborator. The transaction is `PROCESSING` on return.
    pub(crate) async fn run<T, F, Fut>(
        &self,
        registry: &TransactionRegistry,
        guard: &TransactionGuard,
        operation: &str,
        retryable: fn(&ClientError) -> bool,
        mut call: F,
    ) -> Result<Result<T, ClientError>, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut attempt = 1;
        loop {
            let err = match call().await {
                Ok(value) => return Ok(Ok(value)),
                Err(err) => err,
            };
            if !retryable(&err) || attempt >= self.max_attempts {
                return Ok(Err(err));
            }

            warn!(
                txn_id = %guard.key(),
                operation,
                attempt,
                error = %err,
                "External call failed, retrying"
            );
            registry
                .transition(
                    guard,
                    StatusUpdate::to(TransactionStatus::AwaitingRetry)
                        .with_remark(format!("{operation} attempt {attempt} failed: {err}"))
                        .counting_retry(),
                )
                .await?;
            tokio::time::sleep(self.backoff).await;
            registry
                .transition(guard, StatusUpdate::to(TransactionStatus::Processing))
                .await?;
            attempt += 1;
        }
    }
}
