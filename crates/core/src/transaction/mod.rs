//! Transactions: the canonical record, its state machine and the registry.
//!
//! # Modules
//!
//! - `types` - Transaction record, statuses, parties and channel details
//! - `id` - Generator-assigned transaction ids
//! - `state` - Transition table
//! - `request` - Tagged requests accepted from callers
//! - `registry` - Creation and every status change

pub mod id;
pub mod registry;
pub mod request;
pub mod state;
pub mod types;

#[cfg(test)]
mod state_props;

pub use id::{IdPrefix, TransactionId};
pub use registry::{StatusUpdate, TransactionGuard, TransactionRegistry};
pub use request::TransactionRequest;
pub use state::StateMachine;
pub use types::{
    Channel, ChannelDetail, NewTransaction, Party, SettlementRoute, SwitchDetail, Transaction,
    TransactionCategory, TransactionStatus, codes,
};
