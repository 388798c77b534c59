//! Shared types, errors, and configuration for Clearline.
//!
//! This crate provides common types used across all other crates:
//! - Money types with two-decimal precision and supported currencies
//! - Typed IDs for standing orders, bulk batches and disputes
//! - Pagination types for account history queries
//! - Application-wide error types
//! - Configuration management

pub mod config;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
