//! `SeaORM` entity definitions.
//!
//! Status, category, channel and currency columns are stored as their string
//! representations and parsed back by the repositories.

pub mod bulk_payment_batches;
pub mod financial_transactions;
pub mod standing_orders;
pub mod transaction_channel_details;
pub mod transaction_disputes;

pub mod prelude {
    //! Entity re-exports.

    pub use super::bulk_payment_batches::Entity as BulkPaymentBatches;
    pub use super::financial_transactions::Entity as FinancialTransactions;
    pub use super::standing_orders::Entity as StandingOrders;
    pub use super::transaction_channel_details::Entity as TransactionChannelDetails;
    pub use super::transaction_disputes::Entity as TransactionDisputes;
}
