//! `SeaORM` Entity for standing_orders table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "standing_orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub customer_id: String,
    pub debit_account: String,
    pub credit_account_number: String,
    pub credit_bank_code: Option<String>,
    pub credit_account_name: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((19, 2)))")]
    pub amount: Decimal,
    pub currency: String,
    #[sea_orm(column_type = "Text")]
    pub narration: String,
    pub frequency: String,
    pub start_date: Date,
    pub end_date: Option<Date>,
    pub next_execution_date: Date,
    pub last_execution_date: Option<Date>,
    pub is_active: bool,
    pub failure_count: i32,
    pub pending_transaction_id: Option<String>,
    pub version: i32,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::financial_transactions::Entity")]
    FinancialTransactions,
}

impl Related<super::financial_transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FinancialTransactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
