//! Reversal of settled transactions.
//!
//! A reversal is a mirror transaction with the parties swapped. The original
//! is only marked `REVERSED` once the mirror itself is `SUCCESSFUL`; a failed
//! mirror leaves the original untouched so the reversal can be retried. The
//! stamp is applied by the channel router whenever a mirror settles, so a
//! mirror resumed by recovery completes its reversal as well.

use std::sync::Arc;

use clearline_shared::types::Money;
use tracing::{info, warn};

use crate::channel::ChannelRouter;
use crate::error::CoreError;
use crate::transaction::{
    NewTransaction, Transaction, TransactionGuard, TransactionId, TransactionRegistry,
    TransactionStatus,
};

/// Creates and settles reversal mirrors.
pub struct ReversalCoordinator {
    registry: Arc<TransactionRegistry>,
    router: Arc<ChannelRouter>,
}

/// Returns true if `mirror` blocks another reversal of the same original.
fn blocks_new_reversal(mirror: &Transaction) -> bool {
    !matches!(
        mirror.status,
        TransactionStatus::Failed | TransactionStatus::Cancelled
    )
}

impl ReversalCoordinator {
    /// Creates a coordinator settling mirrors through `router`.
    pub fn new(router: Arc<ChannelRouter>) -> Self {
        Self {
            registry: Arc::clone(router.registry()),
            router,
        }
    }

    /// Reverses a `SUCCESSFUL` transaction.
    ///
    /// Returns the mirror in whatever status its settlement reached.
    ///
    /// # Errors
    ///
    /// - `Validation` if `reason` is blank
    /// - `NotFound` if the original does not exist
    /// - `InvalidOperation` if the original is not `SUCCESSFUL`, is itself a
    ///   reversal or an inward credit, has no debit party, or already has a
    ///   live reversal
    pub async fn reverse(
        &self,
        original_id: &TransactionId,
        reason: &str,
        initiated_by: &str,
    ) -> Result<Transaction, CoreError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(CoreError::Validation("reversal reason is required".into()));
        }

        let mirror = {
            let original_guard = self.registry.lock(original_id).await;
            let original = self.registry.get(original_id).await?;
            self.check_reversible(&original_guard, &original).await?;
            let mirror = self.registry.create(mirror_of(&original, reason, initiated_by)?).await?;
            info!(txn_id = %original.id, reversal_id = %mirror.id, "Reversal created");
            mirror
        };

        let settled = {
            let mirror_guard = self.registry.lock(&mirror.id).await;
            self.router.process_locked(&mirror_guard).await?
        };

        if settled.status != TransactionStatus::Successful {
            warn!(
                txn_id = %original_id,
                reversal_id = %settled.id,
                status = %settled.status,
                "Reversal did not settle, original left unchanged"
            );
        }
        Ok(settled)
    }

    async fn check_reversible(
        &self,
        original_guard: &TransactionGuard,
        original: &Transaction,
    ) -> Result<(), CoreError> {
        if original.is_reversal {
            return Err(CoreError::InvalidOperation(format!(
                "{} is itself a reversal and cannot be reversed",
                original.id
            )));
        }
        if original.is_inward() {
            return Err(CoreError::InvalidOperation(format!(
                "{} was settled by the sending bank; return it with an outbound transfer",
                original.id
            )));
        }
        if original.status != TransactionStatus::Successful {
            return Err(CoreError::InvalidOperation(format!(
                "only SUCCESSFUL transactions can be reversed, {} is {}",
                original.id, original.status
            )));
        }
        let existing = self.registry.find_reversals_of(&original.id).await?;
        if let Some(live) = existing.iter().find(|mirror| blocks_new_reversal(mirror)) {
            if live.status == TransactionStatus::Successful {
                // settled without the stamp, e.g. interrupted before it
                self.registry.mark_reversed(original_guard, &live.id).await?;
                return Err(CoreError::InvalidOperation(format!(
                    "{} was already reversed by {}",
                    original.id, live.id
                )));
            }
            return Err(CoreError::InvalidOperation(format!(
                "{} already has reversal {} in status {}",
                original.id, live.id, live.status
            )));
        }
        Ok(())
    }
}

fn mirror_of(
    original: &Transaction,
    reason: &str,
    initiated_by: &str,
) -> Result<NewTransaction, CoreError> {
    let Some(debit) = original.debit.clone() else {
        return Err(CoreError::InvalidOperation(format!(
            "{} has no debit party to return funds to",
            original.id
        )));
    };
    Ok(NewTransaction::new(
        original.category,
        original.channel,
        Money::new(original.amount, original.currency),
        Some(original.credit.clone()),
        debit,
        format!("Reversal of {}: {reason}", original.id),
        initiated_by,
    )
    .reversing(original.id.clone()))
}
