//! Standing order scheduler.
//!
//! An occurrence is created and linked to its order before it is processed,
//! so an interrupted run resumes the same transaction instead of paying
//! twice. Each order is executed under its own lock, and the order lock is
//! always taken before the occurrence's transaction lock.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use clearline_shared::config::SchedulerConfig;
use clearline_shared::types::money::has_minor_unit_precision;
use clearline_shared::types::{Money, StandingOrderId};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, warn};

use super::schedule::next_occurrence;
use super::types::{CreateStandingOrder, StandingOrder};
use crate::channel::ChannelRouter;
use crate::error::CoreError;
use crate::locks::RowLocks;
use crate::store::StandingOrderStore;
use crate::transaction::{
    Channel, NewTransaction, Party, Transaction, TransactionCategory, TransactionRegistry,
    TransactionStatus,
};

const SCHEDULER_INITIATOR: &str = "standing-order-scheduler";

/// When repeated failures deactivate an order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailurePolicy {
    /// Consecutive failures that deactivate the order. `None` never deactivates.
    pub max_consecutive_failures: Option<u32>,
}

impl FailurePolicy {
    /// Never deactivates on failures.
    #[must_use]
    pub const fn never() -> Self {
        Self {
            max_consecutive_failures: None,
        }
    }

    /// Deactivates after `failures` consecutive unsuccessful occurrences.
    #[must_use]
    pub const fn deactivate_after(failures: u32) -> Self {
        Self {
            max_consecutive_failures: Some(failures),
        }
    }

    fn should_deactivate(&self, failure_count: u32) -> bool {
        self.max_consecutive_failures
            .is_some_and(|ceiling| failure_count >= ceiling)
    }
}

impl From<&SchedulerConfig> for FailurePolicy {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            max_consecutive_failures: config.failure_ceiling,
        }
    }
}

/// What happened to one occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "transaction", rename_all = "snake_case")]
pub enum OccurrenceOutcome {
    /// Settled; the order moved to its next date.
    Settled(Transaction),
    /// Ended unsuccessfully; the failure was counted and the date kept.
    Failed(Transaction),
    /// Held or still in flight; picked up again on the next run.
    InFlight(Transaction),
    /// The order is not due on the requested date.
    NotDue,
}

/// Result of executing one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Execution {
    /// The order after the execution was applied.
    pub order: StandingOrder,
    /// The occurrence outcome.
    pub outcome: OccurrenceOutcome,
}

/// Counters of a scheduler run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Orders found due.
    pub due: usize,
    /// Occurrences that settled.
    pub settled: usize,
    /// Occurrences that ended unsuccessfully.
    pub failed: usize,
    /// Occurrences left held or in flight.
    pub in_flight: usize,
    /// Orders deactivated during the run.
    pub deactivated: usize,
    /// Orders whose execution returned an error.
    pub errors: usize,
}

/// Executes standing orders.
pub struct StandingOrderScheduler {
    orders: Arc<dyn StandingOrderStore>,
    registry: Arc<TransactionRegistry>,
    router: Arc<ChannelRouter>,
    locks: RowLocks<StandingOrderId>,
    policy: FailurePolicy,
}

impl StandingOrderScheduler {
    /// Creates a scheduler processing occurrences through `router`.
    pub fn new(
        orders: Arc<dyn StandingOrderStore>,
        router: Arc<ChannelRouter>,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            orders,
            registry: Arc::clone(router.registry()),
            router,
            locks: RowLocks::new(),
            policy,
        }
    }

    /// Sets up a new standing order. The first occurrence is on the start date.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a blank field, a bad amount, a start date
    /// before `today`, or an end date before the start date.
    pub async fn create(
        &self,
        request: CreateStandingOrder,
        today: NaiveDate,
    ) -> Result<StandingOrder, CoreError> {
        validate_create(&request, today)?;

        let now = Utc::now();
        let order = StandingOrder {
            id: StandingOrderId::new(),
            customer_id: request.customer_id.trim().to_string(),
            debit_account: request.debit_account.trim().to_string(),
            credit: request.credit,
            amount: request.amount,
            currency: request.currency,
            narration: request.narration.trim().to_string(),
            frequency: request.frequency,
            start_date: request.start_date,
            end_date: request.end_date,
            next_execution_date: request.start_date,
            last_execution_date: None,
            is_active: true,
            failure_count: 0,
            pending_transaction_id: None,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        self.orders.insert_order(&order).await?;
        info!(
            order_id = %order.id,
            customer_id = %order.customer_id,
            frequency = %order.frequency,
            start_date = %order.start_date,
            "Standing order created"
        );
        Ok(order)
    }

    /// Fetches an order.
    pub async fn get(&self, id: StandingOrderId) -> Result<StandingOrder, CoreError> {
        self.orders
            .get_order(id)
            .await?
            .ok_or_else(|| CoreError::not_found("standing order", id))
    }

    /// Orders due on `as_of`.
    pub async fn due_orders(&self, as_of: NaiveDate) -> Result<Vec<StandingOrder>, CoreError> {
        Ok(self.orders.due_orders(as_of).await?)
    }

    /// Orders of one customer.
    pub async fn list_for_customer(
        &self,
        customer_id: &str,
        active_only: bool,
    ) -> Result<Vec<StandingOrder>, CoreError> {
        Ok(self
            .orders
            .orders_for_customer(customer_id, active_only)
            .await?)
    }

    /// Executes one order for `as_of`.
    ///
    /// An occurrence left in flight by an earlier run is settled first; no
    /// new transaction is created while one exists.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` for an inactive order.
    pub async fn execute(
        &self,
        id: StandingOrderId,
        as_of: NaiveDate,
    ) -> Result<Execution, CoreError> {
        let _order_guard = self.locks.lock(&id).await;
        let mut order = self.get(id).await?;
        if !order.is_active {
            return Err(CoreError::InvalidOperation(format!(
                "standing order {id} is inactive"
            )));
        }

        let transaction = if let Some(pending) = order.pending_transaction_id.clone() {
            info!(order_id = %id, txn_id = %pending, "Resuming in-flight occurrence");
            self.router.process(&pending).await?
        } else {
            if !order.is_due(as_of) {
                return Ok(Execution {
                    order,
                    outcome: OccurrenceOutcome::NotDue,
                });
            }
            let occurrence = self.registry.create(occurrence_of(&order)).await?;
            order.pending_transaction_id = Some(occurrence.id.clone());
            if let Err(err) = self.save(&mut order).await {
                // never processed here, and recovery skips occurrences the order does not reference
                warn!(order_id = %id, txn_id = %occurrence.id, error = %err, "Occurrence left unlinked");
                return Err(err);
            }
            self.router.process(&occurrence.id).await?
        };

        self.apply(order, transaction).await
    }

    async fn apply(
        &self,
        mut order: StandingOrder,
        transaction: Transaction,
    ) -> Result<Execution, CoreError> {
        let outcome = match transaction.status {
            TransactionStatus::Successful => {
                order.last_execution_date = Some(order.next_execution_date);
                order.failure_count = 0;
                order.pending_transaction_id = None;
                match next_occurrence(order.frequency, order.start_date, order.next_execution_date) {
                    Some(next) => {
                        order.next_execution_date = next;
                        if order.end_date.is_some_and(|end| next > end) {
                            order.is_active = false;
                            info!(order_id = %order.id, "Standing order reached its end date");
                        }
                    }
                    None => order.is_active = false,
                }
                OccurrenceOutcome::Settled(transaction)
            }
            status if status.is_terminal() => {
                order.failure_count += 1;
                order.pending_transaction_id = None;
                warn!(
                    order_id = %order.id,
                    txn_id = %transaction.id,
                    status = %status,
                    failures = order.failure_count,
                    "Standing order occurrence failed"
                );
                if self.policy.should_deactivate(order.failure_count) {
                    order.is_active = false;
                    warn!(order_id = %order.id, "Standing order deactivated after repeated failures");
                }
                OccurrenceOutcome::Failed(transaction)
            }
            _ => {
                return Ok(Execution {
                    order,
                    outcome: OccurrenceOutcome::InFlight(transaction),
                });
            }
        };

        self.save(&mut order).await?;
        Ok(Execution { order, outcome })
    }

    /// Executes every order due on `as_of`. One order's error never stops the run.
    pub async fn run_due(&self, as_of: NaiveDate) -> Result<RunSummary, CoreError> {
        let due = self.due_orders(as_of).await?;
        let mut summary = RunSummary {
            due: due.len(),
            ..RunSummary::default()
        };

        for order in due {
            match self.execute(order.id, as_of).await {
                Ok(execution) => {
                    match execution.outcome {
                        OccurrenceOutcome::Settled(_) => summary.settled += 1,
                        OccurrenceOutcome::Failed(_) => summary.failed += 1,
                        OccurrenceOutcome::InFlight(_) => summary.in_flight += 1,
                        OccurrenceOutcome::NotDue => {}
                    }
                    if !execution.order.is_active {
                        summary.deactivated += 1;
                    }
                }
                Err(err) => {
                    error!(order_id = %order.id, error = %err, "Standing order execution failed");
                    summary.errors += 1;
                }
            }
        }

        info!(
            as_of = %as_of,
            due = summary.due,
            settled = summary.settled,
            failed = summary.failed,
            in_flight = summary.in_flight,
            errors = summary.errors,
            "Standing order run finished"
        );
        Ok(summary)
    }

    /// Deactivates an order administratively.
    pub async fn deactivate(&self, id: StandingOrderId) -> Result<StandingOrder, CoreError> {
        let _order_guard = self.locks.lock(&id).await;
        let mut order = self.get(id).await?;
        if !order.is_active {
            return Ok(order);
        }
        order.is_active = false;
        self.save(&mut order).await?;
        info!(order_id = %id, "Standing order deactivated");
        Ok(order)
    }

    async fn save(&self, order: &mut StandingOrder) -> Result<(), CoreError> {
        let expected = order.version;
        order.version += 1;
        order.updated_at = Utc::now();
        self.orders.update_order(order, expected).await?;
        Ok(())
    }
}

fn occurrence_of(order: &StandingOrder) -> NewTransaction {
    NewTransaction::new(
        TransactionCategory::StandingOrderPayment,
        Channel::StandingOrder,
        Money::new(order.amount, order.currency),
        Some(Party::local(order.debit_account.clone())),
        order.credit.clone(),
        order.narration.clone(),
        SCHEDULER_INITIATOR,
    )
    .for_standing_order(order.id)
}

fn validate_create(request: &CreateStandingOrder, today: NaiveDate) -> Result<(), CoreError> {
    let required = [
        (&request.customer_id, "customer id"),
        (&request.debit_account, "debit account"),
        (&request.credit.account_number, "credit account"),
        (&request.narration, "narration"),
    ];
    if let Some((_, field)) = required.iter().find(|(value, _)| value.trim().is_empty()) {
        return Err(CoreError::Validation(format!("{field} is required")));
    }
    if request.amount <= Decimal::ZERO || !has_minor_unit_precision(request.amount) {
        return Err(CoreError::Validation(
            "amount must be positive with at most 2 decimal places".into(),
        ));
    }
    if request.start_date < today {
        return Err(CoreError::Validation(
            "start date cannot be in the past".into(),
        ));
    }
    if request
        .end_date
        .is_some_and(|end| end < request.start_date)
    {
        return Err(CoreError::Validation(
            "end date cannot be before the start date".into(),
        ));
    }
    Ok(())
}
