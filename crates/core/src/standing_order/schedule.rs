//! Occurrence date arithmetic.
//!
//! Calendar-month frequencies are anchored on the order's start date, so an
//! order starting on the 31st runs on the last day of short months and goes
//! back to the 31st when the month allows it.

use chrono::{Datelike, Days, Months, NaiveDate};

use super::types::Frequency;

/// Whole calendar months from `from` to `to`, ignoring the day of month.
fn months_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (i64::from(to.year()) - i64::from(from.year())) * 12 + i64::from(to.month())
        - i64::from(from.month())
}

/// The occurrence after `current` for an order anchored on `start_date`.
///
/// Returns `None` if the date would overflow the calendar.
#[must_use]
pub fn next_occurrence(
    frequency: Frequency,
    start_date: NaiveDate,
    current: NaiveDate,
) -> Option<NaiveDate> {
    match frequency.months() {
        None => {
            let days = if frequency == Frequency::Weekly { 7 } else { 1 };
            current.checked_add_days(Days::new(days))
        }
        Some(period) => {
            let elapsed = u32::try_from(months_between(start_date, current)).ok()?;
            let next = (elapsed / period + 1).checked_mul(period)?;
            start_date.checked_add_months(Months::new(next))
        }
    }
}
