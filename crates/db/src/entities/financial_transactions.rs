//! `SeaORM` Entity for financial_transactions table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "financial_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub category: String,
    pub channel: String,
    pub status: String,
    #[sea_orm(column_type = "Decimal(Some((19, 2)))")]
    pub amount: Decimal,
    pub currency: String,
    pub debit_account_number: Option<String>,
    pub debit_bank_code: Option<String>,
    pub debit_account_name: Option<String>,
    pub credit_account_number: String,
    pub credit_bank_code: Option<String>,
    pub credit_account_name: Option<String>,
    #[sea_orm(column_type = "Text")]
    pub narration: String,
    pub initiated_by: String,
    #[sea_orm(column_type = "Decimal(Some((19, 2)))")]
    pub fee_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 2)))")]
    pub tax_amount: Decimal,
    #[sea_orm(unique)]
    pub external_reference: Option<String>,
    pub response_code: Option<String>,
    pub response_message: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub system_remarks: Option<String>,
    pub retry_count: i32,
    pub is_reversal: bool,
    pub original_transaction_id: Option<String>,
    pub batch_id: Option<Uuid>,
    pub standing_order_id: Option<Uuid>,
    pub initiated_at: DateTimeWithTimeZone,
    pub processed_at: Option<DateTimeWithTimeZone>,
    pub external_system_at: Option<DateTimeWithTimeZone>,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::bulk_payment_batches::Entity",
        from = "Column::BatchId",
        to = "super::bulk_payment_batches::Column::Id"
    )]
    BulkPaymentBatches,
    #[sea_orm(
        belongs_to = "super::standing_orders::Entity",
        from = "Column::StandingOrderId",
        to = "super::standing_orders::Column::Id"
    )]
    StandingOrders,
    #[sea_orm(has_one = "super::transaction_channel_details::Entity")]
    TransactionChannelDetails,
    #[sea_orm(has_many = "super::transaction_disputes::Entity")]
    TransactionDisputes,
}

impl Related<super::bulk_payment_batches::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BulkPaymentBatches.def()
    }
}

impl Related<super::standing_orders::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StandingOrders.def()
    }
}

impl Related<super::transaction_channel_details::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TransactionChannelDetails.def()
    }
}

impl Related<super::transaction_disputes::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TransactionDisputes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
