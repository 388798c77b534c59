//! Transaction repository: the canonical transaction table and channel details.

use async_trait::async_trait;
use chrono::Utc;
use clearline_core::store::{StoreError, TransactionStore};
use clearline_core::transaction::{
    Channel, ChannelDetail, Party, Transaction, TransactionCategory, TransactionId,
    TransactionStatus,
};
use clearline_shared::types::{BatchId, Currency, PageRequest, StandingOrderId};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait, Order,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use tracing::debug;

use super::{corrupt, store_err, to_fixed, to_i32, to_u32, to_utc};
use crate::entities::{financial_transactions, transaction_channel_details};

const TABLE: &str = "financial_transactions";

/// Identity column giving the insertion order of rows.
const ENTRY_SEQ: &str = "entry_seq";

/// Transaction repository backed by `financial_transactions`.
#[derive(Debug, Clone)]
pub struct TransactionRepository {
    db: DatabaseConnection,
}

impl TransactionRepository {
    /// Creates a new transaction repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn write_detail<C: ConnectionTrait>(
        conn: &C,
        id: &TransactionId,
        detail: &ChannelDetail,
    ) -> Result<(), StoreError> {
        let (kind, body) = encode_detail(detail)?;
        let now = to_fixed(Utc::now());
        let row = transaction_channel_details::ActiveModel {
            transaction_id: Set(id.to_string()),
            kind: Set(kind.to_string()),
            detail: Set(body),
            created_at: Set(now),
            updated_at: Set(now),
        };
        transaction_channel_details::Entity::insert(row)
            .on_conflict(
                OnConflict::column(transaction_channel_details::Column::TransactionId)
                    .update_columns([
                        transaction_channel_details::Column::Kind,
                        transaction_channel_details::Column::Detail,
                        transaction_channel_details::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(conn)
            .await
            .map_err(store_err)?;
        Ok(())
    }
}

#[async_trait]
impl TransactionStore for TransactionRepository {
    async fn insert(&self, transaction: &Transaction) -> Result<(), StoreError> {
        financial_transactions::Entity::insert(to_active(transaction))
            .exec(&self.db)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn update(
        &self,
        transaction: &Transaction,
        expected: TransactionStatus,
        detail: Option<&ChannelDetail>,
    ) -> Result<(), StoreError> {
        let txn = self.db.begin().await.map_err(store_err)?;

        let result = financial_transactions::Entity::update_many()
            .set(to_active(transaction))
            .filter(financial_transactions::Column::Id.eq(transaction.id.as_str()))
            .filter(financial_transactions::Column::Status.eq(expected.as_str()))
            .exec(&txn)
            .await
            .map_err(store_err)?;

        if result.rows_affected == 0 {
            // dropping the transaction rolls it back
            debug!(id = %transaction.id, expected = %expected, "Conditional update lost");
            return Err(StoreError::StaleWrite(format!(
                "{} is no longer {expected}",
                transaction.id
            )));
        }

        if let Some(detail) = detail {
            Self::write_detail(&txn, &transaction.id, detail).await?;
        }

        txn.commit().await.map_err(store_err)
    }

    async fn get(&self, id: &TransactionId) -> Result<Option<Transaction>, StoreError> {
        financial_transactions::Entity::find_by_id(id.as_str())
            .one(&self.db)
            .await
            .map_err(store_err)?
            .map(to_domain)
            .transpose()
    }

    async fn find_by_external_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Transaction>, StoreError> {
        financial_transactions::Entity::find()
            .filter(financial_transactions::Column::ExternalReference.eq(reference))
            .one(&self.db)
            .await
            .map_err(store_err)?
            .map(to_domain)
            .transpose()
    }

    async fn find_reversals_of(
        &self,
        original: &TransactionId,
    ) -> Result<Vec<Transaction>, StoreError> {
        financial_transactions::Entity::find()
            .filter(financial_transactions::Column::IsReversal.eq(true))
            .filter(financial_transactions::Column::OriginalTransactionId.eq(original.as_str()))
            .order_by_asc(financial_transactions::Column::InitiatedAt)
            .all(&self.db)
            .await
            .map_err(store_err)?
            .into_iter()
            .map(to_domain)
            .collect()
    }

    async fn list_by_account(
        &self,
        account_number: &str,
        page: PageRequest,
    ) -> Result<(Vec<Transaction>, u64), StoreError> {
        let either_side = Condition::any()
            .add(financial_transactions::Column::DebitAccountNumber.eq(account_number))
            .add(financial_transactions::Column::CreditAccountNumber.eq(account_number));

        let total = financial_transactions::Entity::find()
            .filter(either_side.clone())
            .count(&self.db)
            .await
            .map_err(store_err)?;

        let rows = financial_transactions::Entity::find()
            .filter(either_side)
            .order_by_desc(financial_transactions::Column::InitiatedAt)
            .order_by(Expr::cust(ENTRY_SEQ), Order::Desc)
            .offset(page.offset())
            .limit(page.limit())
            .all(&self.db)
            .await
            .map_err(store_err)?;

        let data = rows.into_iter().map(to_domain).collect::<Result<_, _>>()?;
        Ok((data, total))
    }

    async fn list_by_status(
        &self,
        statuses: &[TransactionStatus],
        limit: u64,
    ) -> Result<Vec<Transaction>, StoreError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        financial_transactions::Entity::find()
            .filter(
                financial_transactions::Column::Status
                    .is_in(statuses.iter().map(TransactionStatus::as_str)),
            )
            .order_by_asc(financial_transactions::Column::UpdatedAt)
            .limit(limit)
            .all(&self.db)
            .await
            .map_err(store_err)?
            .into_iter()
            .map(to_domain)
            .collect()
    }

    async fn list_by_batch(&self, batch_id: BatchId) -> Result<Vec<Transaction>, StoreError> {
        financial_transactions::Entity::find()
            .filter(financial_transactions::Column::BatchId.eq(batch_id.into_inner()))
            .order_by(Expr::cust(ENTRY_SEQ), Order::Asc)
            .all(&self.db)
            .await
            .map_err(store_err)?
            .into_iter()
            .map(to_domain)
            .collect()
    }

    async fn channel_detail(
        &self,
        id: &TransactionId,
    ) -> Result<Option<ChannelDetail>, StoreError> {
        transaction_channel_details::Entity::find_by_id(id.as_str())
            .one(&self.db)
            .await
            .map_err(store_err)?
            .map(|row| decode_detail(row.detail))
            .transpose()
    }
}

/// Builds a fully-set row from a transaction.
pub(crate) fn to_active(tx: &Transaction) -> financial_transactions::ActiveModel {
    let debit = tx.debit.as_ref();
    financial_transactions::ActiveModel {
        id: Set(tx.id.to_string()),
        category: Set(tx.category.as_str().to_string()),
        channel: Set(tx.channel.as_str().to_string()),
        status: Set(tx.status.as_str().to_string()),
        amount: Set(tx.amount),
        currency: Set(tx.currency.as_str().to_string()),
        debit_account_number: Set(debit.map(|p| p.account_number.clone())),
        debit_bank_code: Set(debit.and_then(|p| p.bank_code.clone())),
        debit_account_name: Set(debit.and_then(|p| p.account_name.clone())),
        credit_account_number: Set(tx.credit.account_number.clone()),
        credit_bank_code: Set(tx.credit.bank_code.clone()),
        credit_account_name: Set(tx.credit.account_name.clone()),
        narration: Set(tx.narration.clone()),
        initiated_by: Set(tx.initiated_by.clone()),
        fee_amount: Set(tx.fee_amount),
        tax_amount: Set(tx.tax_amount),
        external_reference: Set(tx.external_reference.clone()),
        response_code: Set(tx.response_code.clone()),
        response_message: Set(tx.response_message.clone()),
        system_remarks: Set(tx.system_remarks.clone()),
        retry_count: Set(to_i32(tx.retry_count)),
        is_reversal: Set(tx.is_reversal),
        original_transaction_id: Set(tx.original_transaction_id.as_ref().map(ToString::to_string)),
        batch_id: Set(tx.batch_id.map(BatchId::into_inner)),
        standing_order_id: Set(tx.standing_order_id.map(StandingOrderId::into_inner)),
        initiated_at: Set(to_fixed(tx.initiated_at)),
        processed_at: Set(tx.processed_at.map(to_fixed)),
        external_system_at: Set(tx.external_system_at.map(to_fixed)),
        updated_at: Set(to_fixed(tx.updated_at)),
    }
}

/// Reads a row back into a transaction.
pub(crate) fn to_domain(row: financial_transactions::Model) -> Result<Transaction, StoreError> {
    let category = TransactionCategory::parse(&row.category)
        .ok_or_else(|| corrupt(TABLE, "category", &row.category))?;
    let channel =
        Channel::parse(&row.channel).ok_or_else(|| corrupt(TABLE, "channel", &row.channel))?;
    let status = TransactionStatus::parse(&row.status)
        .ok_or_else(|| corrupt(TABLE, "status", &row.status))?;
    let currency: Currency = row
        .currency
        .parse()
        .map_err(|_| corrupt(TABLE, "currency", &row.currency))?;

    let debit = row.debit_account_number.map(|account_number| Party {
        account_number,
        bank_code: row.debit_bank_code,
        account_name: row.debit_account_name,
    });

    Ok(Transaction {
        id: TransactionId::from_string(row.id),
        category,
        channel,
        status,
        amount: row.amount,
        currency,
        debit,
        credit: Party {
            account_number: row.credit_account_number,
            bank_code: row.credit_bank_code,
            account_name: row.credit_account_name,
        },
        narration: row.narration,
        initiated_by: row.initiated_by,
        fee_amount: row.fee_amount,
        tax_amount: row.tax_amount,
        external_reference: row.external_reference,
        response_code: row.response_code,
        response_message: row.response_message,
        system_remarks: row.system_remarks,
        retry_count: to_u32(row.retry_count),
        is_reversal: row.is_reversal,
        original_transaction_id: row.original_transaction_id.map(TransactionId::from_string),
        batch_id: row.batch_id.map(BatchId::from_uuid),
        standing_order_id: row.standing_order_id.map(StandingOrderId::from_uuid),
        initiated_at: to_utc(row.initiated_at),
        processed_at: row.processed_at.map(to_utc),
        external_system_at: row.external_system_at.map(to_utc),
        updated_at: to_utc(row.updated_at),
    })
}

fn encode_detail(detail: &ChannelDetail) -> Result<(&'static str, serde_json::Value), StoreError> {
    let kind = match detail {
        ChannelDetail::Switch(_) => "switch",
        ChannelDetail::Ledger { .. } => "ledger",
    };
    let body = serde_json::to_value(detail)
        .map_err(|e| StoreError::Backend(format!("channel detail not serializable: {e}")))?;
    Ok((kind, body))
}

fn decode_detail(body: serde_json::Value) -> Result<ChannelDetail, StoreError> {
    serde_json::from_value(body)
        .map_err(|e| StoreError::Backend(format!("transaction_channel_details.detail: {e}")))
}
