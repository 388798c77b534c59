//! Customer disputes raised against transactions.
//!
//! Disputes are logged by an external complaints workflow. The core only
//! checks that the disputed transaction exists and keeps the status history
//! monotonic: OPEN → INVESTIGATING → RESOLVED, or OPEN → RESOLVED.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clearline_shared::types::DisputeId;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::CoreError;
use crate::store::{DisputeStore, TransactionStore};
use crate::transaction::TransactionId;

/// Status of a dispute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeStatus {
    /// Logged, not yet picked up.
    Open,
    /// Being investigated.
    Investigating,
    /// Closed with resolution notes.
    Resolved,
}

impl DisputeStatus {
    /// Returns the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Investigating => "INVESTIGATING",
            Self::Resolved => "RESOLVED",
        }
    }

    /// Parses a status from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "OPEN" => Some(Self::Open),
            "INVESTIGATING" => Some(Self::Investigating),
            "RESOLVED" => Some(Self::Resolved),
            _ => None,
        }
    }
}

impl fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A customer claim against a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDispute {
    /// Surrogate id.
    pub id: DisputeId,
    /// The disputed transaction.
    pub transaction_id: TransactionId,
    /// Customer's stated reason.
    pub reason: String,
    /// Who logged the dispute.
    pub logged_by: String,
    /// Current status.
    pub status: DisputeStatus,
    /// Outcome notes, set on resolution.
    pub resolution_notes: Option<String>,
    /// When the dispute was logged.
    pub logged_at: DateTime<Utc>,
    /// When the dispute was resolved.
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Records and progresses disputes.
pub struct DisputeLog {
    disputes: Arc<dyn DisputeStore>,
    transactions: Arc<dyn TransactionStore>,
}

impl DisputeLog {
    /// Creates a dispute log over the given stores.
    pub fn new(disputes: Arc<dyn DisputeStore>, transactions: Arc<dyn TransactionStore>) -> Self {
        Self {
            disputes,
            transactions,
        }
    }

    /// Logs a dispute against an existing transaction.
    pub async fn log(
        &self,
        transaction_id: &TransactionId,
        reason: &str,
        logged_by: &str,
    ) -> Result<TransactionDispute, CoreError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(CoreError::Validation("dispute reason is required".into()));
        }
        if self.transactions.get(transaction_id).await?.is_none() {
            return Err(CoreError::not_found("transaction", transaction_id));
        }

        let dispute = TransactionDispute {
            id: DisputeId::new(),
            transaction_id: transaction_id.clone(),
            reason: reason.to_string(),
            logged_by: logged_by.to_string(),
            status: DisputeStatus::Open,
            resolution_notes: None,
            logged_at: Utc::now(),
            resolved_at: None,
        };
        self.disputes.insert_dispute(&dispute).await?;
        info!(dispute_id = %dispute.id, txn_id = %transaction_id, "Dispute logged");
        Ok(dispute)
    }

    /// Fetches a dispute.
    pub async fn get(&self, id: DisputeId) -> Result<TransactionDispute, CoreError> {
        self.disputes
            .get_dispute(id)
            .await?
            .ok_or_else(|| CoreError::not_found("dispute", id))
    }

    /// Disputes raised against a transaction.
    pub async fn list_for_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Vec<TransactionDispute>, CoreError> {
        Ok(self.disputes.disputes_for_transaction(transaction_id).await?)
    }

    /// Moves an open dispute under investigation.
    pub async fn start_investigation(&self, id: DisputeId) -> Result<TransactionDispute, CoreError> {
        let mut dispute = self.get(id).await?;
        if dispute.status != DisputeStatus::Open {
            return Err(CoreError::InvalidOperation(format!(
                "dispute {id} is {}, expected OPEN",
                dispute.status
            )));
        }
        dispute.status = DisputeStatus::Investigating;
        self.disputes.update_dispute(&dispute).await?;
        Ok(dispute)
    }

    /// Resolves a dispute with notes.
    pub async fn resolve(&self, id: DisputeId, notes: &str) -> Result<TransactionDispute, CoreError> {
        let notes = notes.trim();
        if notes.is_empty() {
            return Err(CoreError::Validation("resolution notes are required".into()));
        }
        let mut dispute = self.get(id).await?;
        if dispute.status == DisputeStatus::Resolved {
            return Err(CoreError::InvalidOperation(format!(
                "dispute {id} is already resolved"
            )));
        }
        dispute.status = DisputeStatus::Resolved;
        dispute.resolution_notes = Some(notes.to_string());
        dispute.resolved_at = Some(Utc::now());
        self.disputes.update_dispute(&dispute).await?;
        info!(dispute_id = %id, txn_id = %dispute.transaction_id, "Dispute resolved");
        Ok(dispute)
    }
}
