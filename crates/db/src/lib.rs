//! PostgreSQL persistence for Clearline.
//!
//! This crate provides:
//! - `SeaORM` entity definitions for the processing tables
//! - Database migrations
//! - Implementations of the core store contracts with conditional writes

pub mod entities;
pub mod migration;
pub mod repositories;

pub use repositories::{
    BatchRepository, DisputeRepository, StandingOrderRepository, TransactionRepository,
};

use std::sync::Arc;

use clearline_core::store::Stores;
use clearline_shared::config::DatabaseConfig;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};

/// Establishes a connection to the database.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    Database::connect(database_url).await
}

/// Establishes a pooled connection sized from configuration.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect_with(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .sqlx_logging(false);
    Database::connect(options).await
}

/// Every store contract backed by PostgreSQL.
#[must_use]
pub fn stores(db: &DatabaseConnection) -> Stores {
    Stores {
        transactions: Arc::new(TransactionRepository::new(db.clone())),
        standing_orders: Arc::new(StandingOrderRepository::new(db.clone())),
        batches: Arc::new(BatchRepository::new(db.clone())),
        disputes: Arc::new(DisputeRepository::new(db.clone())),
    }
}
