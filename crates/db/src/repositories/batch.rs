//! Bulk payment batch repository.

use async_trait::async_trait;
use clearline_core::bulk::{BatchStatus, BulkPaymentBatch};
use clearline_core::store::{BatchStore, StoreError};
use clearline_core::transaction::Transaction;
use clearline_shared::types::{BatchId, Currency};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use tracing::debug;

use super::{corrupt, store_err, to_fixed, to_i32, to_u32, to_utc, transaction};
use crate::entities::{bulk_payment_batches, financial_transactions};

const TABLE: &str = "bulk_payment_batches";

/// Bulk payment batch repository.
#[derive(Debug, Clone)]
pub struct BatchRepository {
    db: DatabaseConnection,
}

impl BatchRepository {
    /// Creates a new batch repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl BatchStore for BatchRepository {
    async fn insert_batch(
        &self,
        batch: &BulkPaymentBatch,
        items: &[Transaction],
    ) -> Result<(), StoreError> {
        let txn = self.db.begin().await.map_err(store_err)?;

        bulk_payment_batches::Entity::insert(to_active(batch))
            .exec(&txn)
            .await
            .map_err(store_err)?;

        // items reference the header, so it goes first
        if !items.is_empty() {
            financial_transactions::Entity::insert_many(items.iter().map(transaction::to_active))
                .exec(&txn)
                .await
                .map_err(store_err)?;
        }

        txn.commit().await.map_err(store_err)?;
        debug!(batch_id = %batch.id, items = items.len(), "Batch stored");
        Ok(())
    }

    async fn update_batch(&self, batch: &BulkPaymentBatch) -> Result<(), StoreError> {
        let result = bulk_payment_batches::Entity::update_many()
            .set(to_active(batch))
            .filter(bulk_payment_batches::Column::Id.eq(batch.id.into_inner()))
            .exec(&self.db)
            .await
            .map_err(store_err)?;

        if result.rows_affected == 0 {
            return Err(StoreError::StaleWrite(format!(
                "batch {} does not exist",
                batch.id
            )));
        }
        Ok(())
    }

    async fn get_batch(&self, id: BatchId) -> Result<Option<BulkPaymentBatch>, StoreError> {
        bulk_payment_batches::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(store_err)?
            .map(to_domain)
            .transpose()
    }

    async fn batches_by_status(
        &self,
        statuses: &[BatchStatus],
    ) -> Result<Vec<BulkPaymentBatch>, StoreError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        bulk_payment_batches::Entity::find()
            .filter(
                bulk_payment_batches::Column::Status
                    .is_in(statuses.iter().map(BatchStatus::as_str)),
            )
            .order_by_asc(bulk_payment_batches::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(store_err)?
            .into_iter()
            .map(to_domain)
            .collect()
    }
}

fn to_active(batch: &BulkPaymentBatch) -> bulk_payment_batches::ActiveModel {
    bulk_payment_batches::ActiveModel {
        id: Set(batch.id.into_inner()),
        name: Set(batch.name.clone()),
        debit_account: Set(batch.debit_account.clone()),
        currency: Set(batch.currency.as_str().to_string()),
        total_amount: Set(batch.total_amount),
        item_count: Set(to_i32(batch.item_count)),
        status: Set(batch.status.as_str().to_string()),
        successful_count: Set(to_i32(batch.successful_count)),
        failed_count: Set(to_i32(batch.failed_count)),
        initiated_by: Set(batch.initiated_by.clone()),
        created_at: Set(to_fixed(batch.created_at)),
        processed_at: Set(batch.processed_at.map(to_fixed)),
    }
}

fn to_domain(row: bulk_payment_batches::Model) -> Result<BulkPaymentBatch, StoreError> {
    let status =
        BatchStatus::parse(&row.status).ok_or_else(|| corrupt(TABLE, "status", &row.status))?;
    let currency: Currency = row
        .currency
        .parse()
        .map_err(|_| corrupt(TABLE, "currency", &row.currency))?;

    Ok(BulkPaymentBatch {
        id: BatchId::from_uuid(row.id),
        name: row.name,
        debit_account: row.debit_account,
        currency,
        total_amount: row.total_amount,
        item_count: to_u32(row.item_count),
        status,
        successful_count: to_u32(row.successful_count),
        failed_count: to_u32(row.failed_count),
        initiated_by: row.initiated_by,
        created_at: to_utc(row.created_at),
        processed_at: row.processed_at.map(to_utc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn row(status: &str) -> bulk_payment_batches::Model {
        bulk_payment_batches::Model {
            id: BatchId::new().into_inner(),
            name: "March payroll".into(),
            debit_account: "1000000001".into(),
            currency: "NGN".into(),
            total_amount: dec!(600),
            item_count: 3,
            status: status.into(),
            successful_count: 2,
            failed_count: 1,
            initiated_by: "payroll-ops".into(),
            created_at: to_fixed(Utc::now()),
            processed_at: None,
        }
    }

    #[rstest]
    #[case("PENDING_PROCESSING", BatchStatus::PendingProcessing)]
    #[case("PROCESSING", BatchStatus::Processing)]
    #[case("COMPLETED", BatchStatus::Completed)]
    #[case("COMPLETED_WITH_DISCREPANCIES", BatchStatus::CompletedWithDiscrepancies)]
    fn test_status_column_maps(#[case] stored: &str, #[case] expected: BatchStatus) {
        let batch = to_domain(row(stored)).unwrap();
        assert_eq!(batch.status, expected);
        assert_eq!(batch.item_count, 3);
    }

    #[test]
    fn test_unknown_currency_is_reported() {
        let mut bad = row("COMPLETED");
        bad.currency = "XYZ".into();
        assert!(matches!(to_domain(bad), Err(StoreError::Backend(_))));
    }
}
