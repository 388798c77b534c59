//! Bulk payment batch types.

use chrono::{DateTime, Utc};
use clearline_shared::types::{BatchId, Currency};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::transaction::Party;

/// Lifecycle of a bulk payment batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    /// Accepted, items not yet processed.
    PendingProcessing,
    /// Items are being processed.
    Processing,
    /// Every item settled.
    Completed,
    /// Finished with at least one unsuccessful item.
    CompletedWithDiscrepancies,
}

impl BatchStatus {
    /// Returns the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingProcessing => "PENDING_PROCESSING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::CompletedWithDiscrepancies => "COMPLETED_WITH_DISCREPANCIES",
        }
    }

    /// Parses a status from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PENDING_PROCESSING" => Some(Self::PendingProcessing),
            "PROCESSING" => Some(Self::Processing),
            "COMPLETED" => Some(Self::Completed),
            "COMPLETED_WITH_DISCREPANCIES" => Some(Self::CompletedWithDiscrepancies),
            _ => None,
        }
    }

    /// Returns true once the batch has been driven to the end.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::CompletedWithDiscrepancies)
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Header of a bulk payment batch. Items are transactions carrying its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkPaymentBatch {
    /// Batch id.
    pub id: BatchId,
    /// Name given by the submitter.
    pub name: String,
    /// Account debited by every item.
    pub debit_account: String,
    /// Currency of every item.
    pub currency: Currency,
    /// Declared total, equal to the sum of item amounts.
    pub total_amount: Decimal,
    /// Number of items.
    pub item_count: u32,
    /// Current status.
    pub status: BatchStatus,
    /// Items that reached `SUCCESSFUL`.
    pub successful_count: u32,
    /// Items that ended in any other status.
    pub failed_count: u32,
    /// Submitter.
    pub initiated_by: String,
    /// Submission time.
    pub created_at: DateTime<Utc>,
    /// When the batch finished.
    pub processed_at: Option<DateTime<Utc>>,
}

/// One credit instruction of a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkItem {
    /// Beneficiary.
    pub credit: Party,
    /// Amount credited.
    pub amount: Decimal,
    /// Item narration. Defaults to the batch name.
    #[serde(default)]
    pub narration: Option<String>,
}

/// A batch as submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkBatchRequest {
    /// Batch name.
    pub name: String,
    /// Account debited by every item.
    pub debit_account: String,
    /// Currency of every item.
    pub currency: Currency,
    /// Declared total of all items.
    pub declared_total: Decimal,
    /// Declared number of items, checked when given.
    #[serde(default)]
    pub declared_count: Option<u32>,
    /// Credit instructions.
    pub items: Vec<BulkItem>,
    /// Submitter.
    pub initiated_by: String,
}
