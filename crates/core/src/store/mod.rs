//! Persistence contracts for the processing core.
//!
//! Each store is a trait so the core stays free of database dependencies.
//! `clearline-db` implements them on PostgreSQL; [`memory::InMemoryStore`]
//! implements them in process for tests and local runs.
//!
//! Every write of a mutable record is conditional: transactions on their
//! prior status, standing orders on their version. A lost race surfaces as
//! [`StoreError::StaleWrite`] instead of silently overwriting.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use clearline_shared::types::{BatchId, DisputeId, PageRequest, StandingOrderId};
use thiserror::Error;

use crate::bulk::{BatchStatus, BulkPaymentBatch};
use crate::dispute::TransactionDispute;
use crate::standing_order::StandingOrder;
use crate::transaction::{ChannelDetail, Transaction, TransactionId, TransactionStatus};

pub use memory::InMemoryStore;

/// Persistence failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint was violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The record changed since it was read.
    #[error("Stale write: {0}")]
    StaleWrite(String),

    /// The backing store failed.
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Transactions and their channel details.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Inserts a new transaction.
    async fn insert(&self, transaction: &Transaction) -> Result<(), StoreError>;

    /// Replaces a transaction if its stored status still equals `expected`.
    ///
    /// When `detail` is given it is written in the same atomic operation.
    async fn update(
        &self,
        transaction: &Transaction,
        expected: TransactionStatus,
        detail: Option<&ChannelDetail>,
    ) -> Result<(), StoreError>;

    /// Fetches a transaction by id.
    async fn get(&self, id: &TransactionId) -> Result<Option<Transaction>, StoreError>;

    /// Fetches the transaction carrying a gateway session id.
    async fn find_by_external_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Transaction>, StoreError>;

    /// All reversal mirrors pointing at `original`.
    async fn find_reversals_of(
        &self,
        original: &TransactionId,
    ) -> Result<Vec<Transaction>, StoreError>;

    /// Transactions debiting or crediting `account_number`, newest first, plus the total count.
    async fn list_by_account(
        &self,
        account_number: &str,
        page: PageRequest,
    ) -> Result<(Vec<Transaction>, u64), StoreError>;

    /// Transactions in any of `statuses`, oldest update first.
    async fn list_by_status(
        &self,
        statuses: &[TransactionStatus],
        limit: u64,
    ) -> Result<Vec<Transaction>, StoreError>;

    /// Item transactions of a bulk batch, in creation order.
    async fn list_by_batch(&self, batch_id: BatchId) -> Result<Vec<Transaction>, StoreError>;

    /// The channel detail written with the terminal update, if any.
    async fn channel_detail(&self, id: &TransactionId)
    -> Result<Option<ChannelDetail>, StoreError>;
}

/// Standing orders.
#[async_trait]
pub trait StandingOrderStore: Send + Sync {
    /// Inserts a new standing order.
    async fn insert_order(&self, order: &StandingOrder) -> Result<(), StoreError>;

    /// Replaces an order if its stored version still equals `expected_version`.
    async fn update_order(
        &self,
        order: &StandingOrder,
        expected_version: u32,
    ) -> Result<(), StoreError>;

    /// Fetches an order by id.
    async fn get_order(&self, id: StandingOrderId) -> Result<Option<StandingOrder>, StoreError>;

    /// Active orders with `next_execution_date <= as_of` that have not run past their end date.
    async fn due_orders(&self, as_of: NaiveDate) -> Result<Vec<StandingOrder>, StoreError>;

    /// Orders of one customer.
    async fn orders_for_customer(
        &self,
        customer_id: &str,
        active_only: bool,
    ) -> Result<Vec<StandingOrder>, StoreError>;
}

/// Bulk payment batches.
#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Inserts a batch header and all of its item transactions atomically.
    async fn insert_batch(
        &self,
        batch: &BulkPaymentBatch,
        items: &[Transaction],
    ) -> Result<(), StoreError>;

    /// Replaces a batch header.
    async fn update_batch(&self, batch: &BulkPaymentBatch) -> Result<(), StoreError>;

    /// Fetches a batch header by id.
    async fn get_batch(&self, id: BatchId) -> Result<Option<BulkPaymentBatch>, StoreError>;

    /// Batches in any of `statuses`.
    async fn batches_by_status(
        &self,
        statuses: &[BatchStatus],
    ) -> Result<Vec<BulkPaymentBatch>, StoreError>;
}

/// Transaction disputes.
#[async_trait]
pub trait DisputeStore: Send + Sync {
    /// Inserts a new dispute.
    async fn insert_dispute(&self, dispute: &TransactionDispute) -> Result<(), StoreError>;

    /// Replaces a dispute.
    async fn update_dispute(&self, dispute: &TransactionDispute) -> Result<(), StoreError>;

    /// Fetches a dispute by id.
    async fn get_dispute(&self, id: DisputeId) -> Result<Option<TransactionDispute>, StoreError>;

    /// Disputes raised against one transaction, oldest first.
    async fn disputes_for_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Vec<TransactionDispute>, StoreError>;
}

/// One handle per store contract.
#[derive(Clone)]
pub struct Stores {
    /// Transactions and channel details.
    pub transactions: Arc<dyn TransactionStore>,
    /// Standing orders.
    pub standing_orders: Arc<dyn StandingOrderStore>,
    /// Bulk batches.
    pub batches: Arc<dyn BatchStore>,
    /// Disputes.
    pub disputes: Arc<dyn DisputeStore>,
}

impl Stores {
    /// Every contract backed by one shared [`InMemoryStore`].
    #[must_use]
    pub fn in_memory() -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self {
            transactions: Arc::clone(&store) as Arc<dyn TransactionStore>,
            standing_orders: Arc::clone(&store) as Arc<dyn StandingOrderStore>,
            batches: Arc::clone(&store) as Arc<dyn BatchStore>,
            disputes: store,
        }
    }
}
