//! Property-based tests for occurrence date arithmetic.

use chrono::{Datelike, NaiveDate};
use proptest::prelude::*;

use crate::standing_order::schedule::next_occurrence;
use crate::standing_order::types::Frequency;

fn arb_frequency() -> impl Strategy<Value = Frequency> {
    prop_oneof![
        Just(Frequency::Daily),
        Just(Frequency::Weekly),
        Just(Frequency::Monthly),
        Just(Frequency::Quarterly),
        Just(Frequency::Annually),
    ]
}

fn arb_start() -> impl Strategy<Value = NaiveDate> {
    (2000i32..2090, 1u32..=12, 1u32..=31).prop_map(|(y, m, d)| {
        (0..4)
            .find_map(|back| NaiveDate::from_ymd_opt(y, m, d - back))
            .unwrap_or_else(|| NaiveDate::from_ymd_opt(y, m, 1).unwrap())
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Every advance moves strictly forward.
    #[test]
    fn prop_occurrences_strictly_increase(
        frequency in arb_frequency(),
        start in arb_start(),
        steps in 1usize..30,
    ) {
        let mut current = start;
        for _ in 0..steps {
            let next = next_occurrence(frequency, start, current).unwrap();
            prop_assert!(next > current);
            current = next;
        }
    }

    /// Month-based occurrences land on the anchor day, or the month end when
    /// the month is shorter.
    #[test]
    fn prop_month_based_dates_keep_anchor_day(
        frequency in prop_oneof![Just(Frequency::Monthly), Just(Frequency::Quarterly), Just(Frequency::Annually)],
        start in arb_start(),
        steps in 1usize..40,
    ) {
        let mut current = start;
        for _ in 0..steps {
            current = next_occurrence(frequency, start, current).unwrap();
            let month_end = current.succ_opt().unwrap().month() != current.month();
            prop_assert!(current.day() == start.day() || (current.day() < start.day() && month_end));
        }
    }

    /// Day-based frequencies advance by a fixed number of days.
    #[test]
    fn prop_day_based_fixed_step(start in arb_start()) {
        let daily = next_occurrence(Frequency::Daily, start, start).unwrap();
        let weekly = next_occurrence(Frequency::Weekly, start, start).unwrap();
        prop_assert_eq!((daily - start).num_days(), 1);
        prop_assert_eq!((weekly - start).num_days(), 7);
    }
}
