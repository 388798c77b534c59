//! Transaction processing core for Clearline.
//!
//! Pure business logic with no web or database dependencies. Persistence and
//! the external collaborators (ledger, settlement gateway, fees, compliance)
//! are reached through traits implemented in `clearline-db` and
//! `clearline-connectors`.
//!
//! # Modules
//!
//! - `transaction` - Transaction record, state machine and registry
//! - `channel` - Intra-bank and inter-bank settlement
//! - `reversal` - Reversal mirrors
//! - `standing_order` - Recurring payments
//! - `bulk` - Bulk payment batches
//! - `dispute` - Customer disputes
//! - `queue` - Processing queue, worker pool and recovery
//! - `store` - Persistence contracts and the in-memory store
//! - `clients` - External collaborator contracts
//! - `service` - The exposed operations

pub mod bulk;
pub mod channel;
pub mod clients;
pub mod dispute;
pub mod error;
pub mod locks;
pub mod queue;
pub mod reversal;
pub mod service;
pub mod standing_order;
pub mod store;
pub mod transaction;

pub use error::CoreError;
pub use service::TransactionService;
