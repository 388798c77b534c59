//! Store implementations on PostgreSQL.
//!
//! Each repository implements one of the core store contracts. Conditional
//! writes are `UPDATE ... WHERE` statements on the expected status or
//! version; zero affected rows means the record moved on and surfaces as
//! [`StoreError::StaleWrite`].

pub mod batch;
pub mod dispute;
pub mod standing_order;
pub mod transaction;

pub use batch::BatchRepository;
pub use dispute::DisputeRepository;
pub use standing_order::StandingOrderRepository;
pub use transaction::TransactionRepository;

use chrono::{DateTime, FixedOffset, Utc};
use clearline_core::store::StoreError;
use sea_orm::{DbErr, SqlErr};

/// Maps a database error onto the store contract.
pub(crate) fn store_err(err: DbErr) -> StoreError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) => StoreError::Conflict(detail),
        Some(SqlErr::ForeignKeyConstraintViolation(detail)) => StoreError::Conflict(detail),
        _ => StoreError::Backend(err.to_string()),
    }
}

/// A stored value that does not parse back into its domain type.
pub(crate) fn corrupt(table: &str, column: &str, value: &str) -> StoreError {
    StoreError::Backend(format!("{table}.{column} holds unknown value {value:?}"))
}

/// Narrows a counter for an `INTEGER` column.
pub(crate) fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// Reads a counter back from an `INTEGER` column.
pub(crate) fn to_u32(value: i32) -> u32 {
    u32::try_from(value).unwrap_or_default()
}

pub(crate) fn to_utc(value: DateTime<FixedOffset>) -> DateTime<Utc> {
    value.with_timezone(&Utc)
}

pub(crate) fn to_fixed(value: DateTime<Utc>) -> DateTime<FixedOffset> {
    value.fixed_offset()
}
