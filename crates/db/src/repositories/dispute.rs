//! Transaction dispute repository.

use async_trait::async_trait;
use clearline_core::dispute::{DisputeStatus, TransactionDispute};
use clearline_core::store::{DisputeStore, StoreError};
use clearline_core::transaction::TransactionId;
use clearline_shared::types::DisputeId;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set};

use super::{corrupt, store_err, to_fixed, to_utc};
use crate::entities::transaction_disputes;

/// Transaction dispute repository.
#[derive(Debug, Clone)]
pub struct DisputeRepository {
    db: DatabaseConnection,
}

impl DisputeRepository {
    /// Creates a new dispute repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DisputeStore for DisputeRepository {
    async fn insert_dispute(&self, dispute: &TransactionDispute) -> Result<(), StoreError> {
        transaction_disputes::Entity::insert(to_active(dispute))
            .exec(&self.db)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn update_dispute(&self, dispute: &TransactionDispute) -> Result<(), StoreError> {
        let result = transaction_disputes::Entity::update_many()
            .set(to_active(dispute))
            .filter(transaction_disputes::Column::Id.eq(dispute.id.into_inner()))
            .exec(&self.db)
            .await
            .map_err(store_err)?;

        if result.rows_affected == 0 {
            return Err(StoreError::StaleWrite(format!(
                "dispute {} does not exist",
                dispute.id
            )));
        }
        Ok(())
    }

    async fn get_dispute(&self, id: DisputeId) -> Result<Option<TransactionDispute>, StoreError> {
        transaction_disputes::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(store_err)?
            .map(to_domain)
            .transpose()
    }

    async fn disputes_for_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Vec<TransactionDispute>, StoreError> {
        transaction_disputes::Entity::find()
            .filter(transaction_disputes::Column::TransactionId.eq(transaction_id.as_str()))
            .order_by_asc(transaction_disputes::Column::LoggedAt)
            .all(&self.db)
            .await
            .map_err(store_err)?
            .into_iter()
            .map(to_domain)
            .collect()
    }
}

fn to_active(dispute: &TransactionDispute) -> transaction_disputes::ActiveModel {
    transaction_disputes::ActiveModel {
        id: Set(dispute.id.into_inner()),
        transaction_id: Set(dispute.transaction_id.to_string()),
        reason: Set(dispute.reason.clone()),
        logged_by: Set(dispute.logged_by.clone()),
        status: Set(dispute.status.as_str().to_string()),
        resolution_notes: Set(dispute.resolution_notes.clone()),
        logged_at: Set(to_fixed(dispute.logged_at)),
        resolved_at: Set(dispute.resolved_at.map(to_fixed)),
    }
}

fn to_domain(row: transaction_disputes::Model) -> Result<TransactionDispute, StoreError> {
    let status = DisputeStatus::parse(&row.status)
        .ok_or_else(|| corrupt("transaction_disputes", "status", &row.status))?;

    Ok(TransactionDispute {
        id: DisputeId::from_uuid(row.id),
        transaction_id: TransactionId::from_string(row.transaction_id),
        reason: row.reason,
        logged_by: row.logged_by,
        status,
        resolution_notes: row.resolution_notes,
        logged_at: to_utc(row.logged_at),
        resolved_at: row.resolved_at.map(to_utc),
    })
}
