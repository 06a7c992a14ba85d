//! Shared primitive types used across every engine.

use chrono::{Datelike, NaiveDate, NaiveDateTime};

/// A customer identifier as written by the cleaning step.
pub type CustomerId = i64;

/// A cohort label: the first day of the customer's acquisition month.
pub type CohortLabel = NaiveDate;

/// Whole months elapsed between a transaction and its acquisition month.
pub type CohortAge = u32;

/// Truncate a timestamp to the first day of its month.
pub fn month_start(ts: NaiveDateTime) -> NaiveDate {
    first_of_month(ts.date())
}

/// Truncate a date to the first day of its month.
pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    // Day 1 exists in every month.
    date.with_day(1).unwrap_or(date)
}

/// Signed month difference `(later − earlier)` in calendar months.
pub fn months_between(earlier: NaiveDate, later: NaiveDate) -> i64 {
    (later.year() as i64 - earlier.year() as i64) * 12
        + (later.month() as i64 - earlier.month() as i64)
}

/// Format a cohort label the way the dashboard displays it: `YYYY-MM`.
pub fn cohort_key(label: CohortLabel) -> String {
    label.format("%Y-%m").to_string()
}
