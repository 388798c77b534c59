//! Standing order repository.

use async_trait::async_trait;
use chrono::NaiveDate;
use clearline_core::standing_order::{Frequency, StandingOrder};
use clearline_core::store::{StandingOrderStore, StoreError};
use clearline_core::transaction::{Party, TransactionId};
use clearline_shared::types::{Currency, StandingOrderId};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use super::{corrupt, store_err, to_fixed, to_i32, to_u32, to_utc};
use crate::entities::standing_orders;

const TABLE: &str = "standing_orders";

/// Standing order repository.
#[derive(Debug, Clone)]
pub struct StandingOrderRepository {
    db: DatabaseConnection,
}

impl StandingOrderRepository {
    /// Creates a new standing order repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl StandingOrderStore for StandingOrderRepository {
    async fn insert_order(&self, order: &StandingOrder) -> Result<(), StoreError> {
        standing_orders::Entity::insert(to_active(order))
            .exec(&self.db)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn update_order(
        &self,
        order: &StandingOrder,
        expected_version: u32,
    ) -> Result<(), StoreError> {
        let result = standing_orders::Entity::update_many()
            .set(to_active(order))
            .filter(standing_orders::Column::Id.eq(order.id.into_inner()))
            .filter(standing_orders::Column::Version.eq(to_i32(expected_version)))
            .exec(&self.db)
            .await
            .map_err(store_err)?;

        if result.rows_affected == 0 {
            return Err(StoreError::StaleWrite(format!(
                "standing order {} is no longer at version {expected_version}",
                order.id
            )));
        }
        Ok(())
    }

    async fn get_order(&self, id: StandingOrderId) -> Result<Option<StandingOrder>, StoreError> {
        standing_orders::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(store_err)?
            .map(to_domain)
            .transpose()
    }

    async fn due_orders(&self, as_of: NaiveDate) -> Result<Vec<StandingOrder>, StoreError> {
        let within_end_date = Condition::any()
            .add(standing_orders::Column::EndDate.is_null())
            .add(
                Expr::col(standing_orders::Column::EndDate)
                    .gte(Expr::col(standing_orders::Column::NextExecutionDate)),
            );

        standing_orders::Entity::find()
            .filter(standing_orders::Column::IsActive.eq(true))
            .filter(standing_orders::Column::NextExecutionDate.lte(as_of))
            .filter(within_end_date)
            .order_by_asc(standing_orders::Column::NextExecutionDate)
            .order_by_asc(standing_orders::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(store_err)?
            .into_iter()
            .map(to_domain)
            .collect()
    }

    async fn orders_for_customer(
        &self,
        customer_id: &str,
        active_only: bool,
    ) -> Result<Vec<StandingOrder>, StoreError> {
        let mut query = standing_orders::Entity::find()
            .filter(standing_orders::Column::CustomerId.eq(customer_id));
        if active_only {
            query = query.filter(standing_orders::Column::IsActive.eq(true));
        }

        query
            .order_by_asc(standing_orders::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(store_err)?
            .into_iter()
            .map(to_domain)
            .collect()
    }
}

fn to_active(order: &StandingOrder) -> standing_orders::ActiveModel {
    standing_orders::ActiveModel {
        id: Set(order.id.into_inner()),
        customer_id: Set(order.customer_id.clone()),
        debit_account: Set(order.debit_account.clone()),
        credit_account_number: Set(order.credit.account_number.clone()),
        credit_bank_code: Set(order.credit.bank_code.clone()),
        credit_account_name: Set(order.credit.account_name.clone()),
        amount: Set(order.amount),
        currency: Set(order.currency.as_str().to_string()),
        narration: Set(order.narration.clone()),
        frequency: Set(order.frequency.as_str().to_string()),
        start_date: Set(order.start_date),
        end_date: Set(order.end_date),
        next_execution_date: Set(order.next_execution_date),
        last_execution_date: Set(order.last_execution_date),
        is_active: Set(order.is_active),
        failure_count: Set(to_i32(order.failure_count)),
        pending_transaction_id: Set(order.pending_transaction_id.as_ref().map(ToString::to_string)),
        version: Set(to_i32(order.version)),
        created_at: Set(to_fixed(order.created_at)),
        updated_at: Set(to_fixed(order.updated_at)),
    }
}

fn to_domain(row: standing_orders::Model) -> Result<StandingOrder, StoreError> {
    let frequency = Frequency::parse(&row.frequency)
        .ok_or_else(|| corrupt(TABLE, "frequency", &row.frequency))?;
    let currency: Currency = row
        .currency
        .parse()
        .map_err(|_| corrupt(TABLE, "currency", &row.currency))?;

    Ok(StandingOrder {
        id: StandingOrderId::from_uuid(row.id),
        customer_id: row.customer_id,
        debit_account: row.debit_account,
        credit: Party {
            account_number: row.credit_account_number,
            bank_code: row.credit_bank_code,
            account_name: row.credit_account_name,
        },
        amount: row.amount,
        currency,
        narration: row.narration,
        frequency,
        start_date: row.start_date,
        end_date: row.end_date,
        next_execution_date: row.next_execution_date,
        last_execution_date: row.last_execution_date,
        is_active: row.is_active,
        failure_count: to_u32(row.failure_count),
        pending_transaction_id: row.pending_transaction_id.map(TransactionId::from_string),
        version: to_u32(row.version),
        created_at: to_utc(row.created_at),
        updated_at: to_utc(row.updated_at),
    })
}
