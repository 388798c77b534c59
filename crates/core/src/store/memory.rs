//! In-process implementation of every store contract.
//!
//! Honours the same conditional-write rules as the PostgreSQL stores, so the
//! coordinators behave identically on top of it.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use clearline_shared::types::{BatchId, DisputeId, PageRequest, StandingOrderId};
use tokio::sync::RwLock;

use super::{BatchStore, DisputeStore, StandingOrderStore, StoreError, TransactionStore};
use crate::bulk::{BatchStatus, BulkPaymentBatch};
use crate::dispute::TransactionDispute;
use crate::standing_order::StandingOrder;
use crate::transaction::{ChannelDetail, Transaction, TransactionId, TransactionStatus};

#[derive(Default)]
struct MemoryState {
    transactions: HashMap<TransactionId, Transaction>,
    // insertion order, oldest first
    sequence: Vec<TransactionId>,
    external_refs: HashMap<String, TransactionId>,
    details: HashMap<TransactionId, ChannelDetail>,
    orders: HashMap<StandingOrderId, StandingOrder>,
    batches: HashMap<BatchId, BulkPaymentBatch>,
    disputes: HashMap<DisputeId, TransactionDispute>,
}

impl MemoryState {
    fn check_external_reference(&self, transaction: &Transaction) -> Result<(), StoreError> {
        if let Some(reference) = &transaction.external_reference
            && let Some(owner) = self.external_refs.get(reference)
            && owner != &transaction.id
        {
            return Err(StoreError::Conflict(format!(
                "external reference {reference} belongs to {owner}"
            )));
        }
        Ok(())
    }

    fn put_transaction(&mut self, transaction: &Transaction) {
        if let Some(reference) = &transaction.external_reference {
            self.external_refs
                .insert(reference.clone(), transaction.id.clone());
        }
        self.transactions
            .insert(transaction.id.clone(), transaction.clone());
    }

    fn insert_transaction(&mut self, transaction: &Transaction) -> Result<(), StoreError> {
        if self.transactions.contains_key(&transaction.id) {
            return Err(StoreError::Conflict(format!(
                "transaction {} already exists",
                transaction.id
            )));
        }
        self.check_external_reference(transaction)?;
        self.put_transaction(transaction);
        self.sequence.push(transaction.id.clone());
        Ok(())
    }
}

/// Store backed by process memory.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<MemoryState>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionStore for InMemoryStore {
    async fn insert(&self, transaction: &Transaction) -> Result<(), StoreError> {
        self.state.write().await.insert_transaction(transaction)
    }

    async fn update(
        &self,
        transaction: &Transaction,
        expected: TransactionStatus,
        detail: Option<&ChannelDetail>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let current = state
            .transactions
            .get(&transaction.id)
            .map(|stored| stored.status)
            .ok_or_else(|| StoreError::StaleWrite(format!("{} does not exist", transaction.id)))?;
        if current != expected {
            return Err(StoreError::StaleWrite(format!(
                "{} is {current}, expected {expected}",
                transaction.id
            )));
        }
        state.check_external_reference(transaction)?;
        state.put_transaction(transaction);
        if let Some(detail) = detail {
            state.details.insert(transaction.id.clone(), detail.clone());
        }
        Ok(())
    }

    async fn get(&self, id: &TransactionId) -> Result<Option<Transaction>, StoreError> {
        Ok(self.state.read().await.transactions.get(id).cloned())
    }

    async fn find_by_external_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Transaction>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .external_refs
            .get(reference)
            .and_then(|id| state.transactions.get(id))
            .cloned())
    }

    async fn find_reversals_of(
        &self,
        original: &TransactionId,
    ) -> Result<Vec<Transaction>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .sequence
            .iter()
            .filter_map(|id| state.transactions.get(id))
            .filter(|tx| tx.original_transaction_id.as_ref() == Some(original))
            .cloned()
            .collect())
    }

    async fn list_by_account(
        &self,
        account_number: &str,
        page: PageRequest,
    ) -> Result<(Vec<Transaction>, u64), StoreError> {
        let state = self.state.read().await;
        let matching: Vec<&Transaction> = state
            .sequence
            .iter()
            .rev()
            .filter_map(|id| state.transactions.get(id))
            .filter(|tx| {
                tx.credit.account_number == account_number
                    || tx
                        .debit
                        .as_ref()
                        .is_some_and(|debit| debit.account_number == account_number)
            })
            .collect();
        let total = matching.len() as u64;
        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(page.limit()).unwrap_or(usize::MAX);
        let data = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Ok((data, total))
    }

    async fn list_by_status(
        &self,
        statuses: &[TransactionStatus],
        limit: u64,
    ) -> Result<Vec<Transaction>, StoreError> {
        let state = self.state.read().await;
        let mut matching: Vec<Transaction> = state
            .transactions
            .values()
            .filter(|tx| statuses.contains(&tx.status))
            .cloned()
            .collect();
        matching.sort_by_key(|tx| tx.updated_at);
        matching.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(matching)
    }

    async fn list_by_batch(&self, batch_id: BatchId) -> Result<Vec<Transaction>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .sequence
            .iter()
            .filter_map(|id| state.transactions.get(id))
            .filter(|tx| tx.batch_id == Some(batch_id))
            .cloned()
            .collect())
    }

    async fn channel_detail(
        &self,
        id: &TransactionId,
    ) -> Result<Option<ChannelDetail>, StoreError> {
        Ok(self.state.read().await.details.get(id).cloned())
    }
}

#[async_trait]
impl StandingOrderStore for InMemoryStore {
    async fn insert_order(&self, order: &StandingOrder) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.orders.contains_key(&order.id) {
            return Err(StoreError::Conflict(format!(
                "standing order {} already exists",
                order.id
            )));
        }
        state.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn update_order(
        &self,
        order: &StandingOrder,
        expected_version: u32,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        match state.orders.get(&order.id) {
            Some(stored) if stored.version == expected_version => {
                state.orders.insert(order.id, order.clone());
                Ok(())
            }
            Some(stored) => Err(StoreError::StaleWrite(format!(
                "standing order {} is at version {}, expected {expected_version}",
                order.id, stored.version
            ))),
            None => Err(StoreError::StaleWrite(format!(
                "standing order {} does not exist",
                order.id
            ))),
        }
    }

    async fn get_order(&self, id: StandingOrderId) -> Result<Option<StandingOrder>, StoreError> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn due_orders(&self, as_of: NaiveDate) -> Result<Vec<StandingOrder>, StoreError> {
        let state = self.state.read().await;
        let mut due: Vec<StandingOrder> = state
            .orders
            .values()
            .filter(|order| order.is_due(as_of))
            .cloned()
            .collect();
        due.sort_by_key(|order| (order.next_execution_date, order.created_at));
        Ok(due)
    }

    async fn orders_for_customer(
        &self,
        customer_id: &str,
        active_only: bool,
    ) -> Result<Vec<StandingOrder>, StoreError> {
        let state = self.state.read().await;
        let mut orders: Vec<StandingOrder> = state
            .orders
            .values()
            .filter(|order| order.customer_id == customer_id && (!active_only || order.is_active))
            .cloned()
            .collect();
        orders.sort_by_key(|order| order.created_at);
        Ok(orders)
    }
}

#[async_trait]
impl BatchStore for InMemoryStore {
    async fn insert_batch(
        &self,
        batch: &BulkPaymentBatch,
        items: &[Transaction],
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.batches.contains_key(&batch.id) {
            return Err(StoreError::Conflict(format!(
                "batch {} already exists",
                batch.id
            )));
        }
        for item in items {
            if state.transactions.contains_key(&item.id) {
                return Err(StoreError::Conflict(format!(
                    "transaction {} already exists",
                    item.id
                )));
            }
        }
        for item in items {
            state.insert_transaction(item)?;
        }
        state.batches.insert(batch.id, batch.clone());
        Ok(())
    }

    async fn update_batch(&self, batch: &BulkPaymentBatch) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if !state.batches.contains_key(&batch.id) {
            return Err(StoreError::StaleWrite(format!(
                "batch {} does not exist",
                batch.id
            )));
        }
        state.batches.insert(batch.id, batch.clone());
        Ok(())
    }

    async fn get_batch(&self, id: BatchId) -> Result<Option<BulkPaymentBatch>, StoreError> {
        Ok(self.state.read().await.batches.get(&id).cloned())
    }

    async fn batches_by_status(
        &self,
        statuses: &[BatchStatus],
    ) -> Result<Vec<BulkPaymentBatch>, StoreError> {
        let state = self.state.read().await;
        let mut batches: Vec<BulkPaymentBatch> = state
            .batches
            .values()
            .filter(|batch| statuses.contains(&batch.status))
            .cloned()
            .collect();
        batches.sort_by_key(|batch| batch.created_at);
        Ok(batches)
    }
}

#[async_trait]
impl DisputeStore for InMemoryStore {
    async fn insert_dispute(&self, dispute: &TransactionDispute) -> Result<(), StoreError> {
        self.state
            .write()
            .await
            .disputes
            .insert(dispute.id, dispute.clone());
        Ok(())
    }

    async fn update_dispute(&self, dispute: &TransactionDispute) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if !state.disputes.contains_key(&dispute.id) {
            return Err(StoreError::StaleWrite(format!(
                "dispute {} does not exist",
                dispute.id
            )));
        }
        state.disputes.insert(dispute.id, dispute.clone());
        Ok(())
    }

    async fn get_dispute(&self, id: DisputeId) -> Result<Option<TransactionDispute>, StoreError> {
        Ok(self.state.read().await.disputes.get(&id).cloned())
    }

    async fn disputes_for_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Vec<TransactionDispute>, StoreError> {
        let state = self.state.read().await;
        let mut disputes: Vec<TransactionDispute> = state
            .disputes
            .values()
            .filter(|dispute| &dispute.transaction_id == transaction_id)
            .cloned()
            .collect();
        disputes.sort_by_key(|dispute| dispute.logged_at);
        Ok(disputes)
    }
}
