//! Recurring payments.
//!
//! # Modules
//!
//! - `types` - Standing order record and frequencies
//! - `schedule` - Occurrence date arithmetic
//! - `scheduler` - Creation, execution and deactivation

pub mod schedule;
pub mod scheduler;
pub mod types;

#[cfg(test)]
mod schedule_props;

pub use schedule::next_occurrence;
pub use scheduler::{
    Execution, FailurePolicy, OccurrenceOutcome, RunSummary, StandingOrderScheduler,
};
pub use types::{CreateStandingOrder, Frequency, StandingOrder};
