//! Bulk payment batches: one debit account, many credits.

pub mod coordinator;
pub mod types;

pub use coordinator::BulkBatchCoordinator;
pub use types::{BatchStatus, BulkBatchRequest, BulkItem, BulkPaymentBatch};
