//! Property-based test generators using proptest.

use proptest::prelude::*;
use time::{Date, PrimitiveDateTime, Time};

/// Julian day of 1970-01-01.
const EPOCH_JULIAN_DAY: i32 = 2_440_588;

/// Strategy for calendar dates between 1970 and 2069.
pub fn arb_date() -> impl Strategy<Value = Date> {
    (EPOCH_JULIAN_DAY..EPOCH_JULIAN_DAY + 36_525)
        .prop_filter_map("valid julian day", |day| Date::from_julian_day(day).ok())
}

/// Strategy for whole-second timestamps between 1970 and 2069.
pub fn arb_timestamp() -> impl Strategy<Value = PrimitiveDateTime> {
    (arb_date(), 0u8..24, 0u8..60, 0u8..60).prop_filter_map(
        "valid time of day",
        |(date, hour, minute, second)| {
            Time::from_hms(hour, minute, second)
                .ok()
                .map(|time| PrimitiveDateTime::new(date, time))
        },
    )
}

/// Strategy for payment amounts in whole cents up to 100.00.
pub fn arb_amount() -> impl Strategy<Value = f64> {
    (0u32..=10_000).prop_map(|cents| f64::from(cents) / 100.0)
}

/// Strategy for non-negative aggregate values, such as counts and sums.
pub fn arb_measure() -> impl Strategy<Value = f64> {
    (0u32..1_000_000).prop_map(f64::from)
}
