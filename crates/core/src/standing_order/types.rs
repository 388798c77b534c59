//! Standing order domain types.

use chrono::{DateTime, NaiveDate, Utc};
use clearline_shared::types::{Currency, StandingOrderId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::transaction::{Party, TransactionId};

/// How often a standing order repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Frequency {
    /// Every day.
    Daily,
    /// Every seven days.
    Weekly,
    /// Same day every calendar month.
    Monthly,
    /// Same day every three calendar months.
    Quarterly,
    /// Same day every year.
    Annually,
}

impl Frequency {
    /// Returns the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "DAILY",
            Self::Weekly => "WEEKLY",
            Self::Monthly => "MONTHLY",
            Self::Quarterly => "QUARTERLY",
            Self::Annually => "ANNUALLY",
        }
    }

    /// Parses a frequency from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "DAILY" => Some(Self::Daily),
            "WEEKLY" => Some(Self::Weekly),
            "MONTHLY" => Some(Self::Monthly),
            "QUARTERLY" => Some(Self::Quarterly),
            "ANNUALLY" => Some(Self::Annually),
            _ => None,
        }
    }

    /// Calendar months per period, or `None` for day-based frequencies.
    #[must_use]
    pub const fn months(&self) -> Option<u32> {
        match self {
            Self::Daily | Self::Weekly => None,
            Self::Monthly => Some(1),
            Self::Quarterly => Some(3),
            Self::Annually => Some(12),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recurring payment instruction.
///
/// Never deleted. Deactivated by the scheduler or an administrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandingOrder {
    /// Surrogate id.
    pub id: StandingOrderId,
    /// Owning customer.
    pub customer_id: String,
    /// Account debited on every occurrence.
    pub debit_account: String,
    /// Beneficiary.
    pub credit: Party,
    /// Amount per occurrence.
    pub amount: Decimal,
    /// Currency of `amount`.
    pub currency: Currency,
    /// Statement narration.
    pub narration: String,
    /// Repetition period.
    pub frequency: Frequency,
    /// First occurrence, and the anchor for calendar-month arithmetic.
    pub start_date: NaiveDate,
    /// Last date an occurrence may fall on.
    pub end_date: Option<NaiveDate>,
    /// Date of the next occurrence.
    pub next_execution_date: NaiveDate,
    /// Date of the last successful occurrence.
    pub last_execution_date: Option<NaiveDate>,
    /// Inactive orders are never executed.
    pub is_active: bool,
    /// Consecutive unsuccessful occurrences.
    pub failure_count: u32,
    /// Transaction of the occurrence currently being settled.
    pub pending_transaction_id: Option<TransactionId>,
    /// Optimistic concurrency version, bumped on every save.
    pub version: u32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl StandingOrder {
    /// Returns true if the order should run on `as_of`.
    #[must_use]
    pub fn is_due(&self, as_of: NaiveDate) -> bool {
        self.is_active
            && self.next_execution_date <= as_of
            && self
                .end_date
                .is_none_or(|end| self.next_execution_date <= end)
    }
}

/// Customer request to set up a standing order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStandingOrder {
    /// Owning customer.
    pub customer_id: String,
    /// Account debited on every occurrence.
    pub debit_account: String,
    /// Beneficiary.
    pub credit: Party,
    /// Amount per occurrence.
    pub amount: Decimal,
    /// Currency of `amount`.
    pub currency: Currency,
    /// Statement narration.
    pub narration: String,
    /// Repetition period.
    pub frequency: Frequency,
    /// First occurrence. Must not be in the past.
    pub start_date: NaiveDate,
    /// Last date an occurrence may fall on.
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}
