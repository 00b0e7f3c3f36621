use chrono::{Datelike, Duration, NaiveDate};

use crate::model::DateKey;

/// Canonical key for the local calendar day containing `date`.
pub fn day_key(date: NaiveDate) -> DateKey {
    DateKey::from_date(date)
}

/// Tolerant inverse of [`day_key`]; malformed input yields `None`.
pub fn parse_day_key(raw: &str) -> Option<NaiveDate> {
    DateKey::parse(raw).and_then(|key| key.to_date())
}

/// Day arithmetic with month/year rollover. Saturates at the calendar range
/// boundary instead of panicking.
pub fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    date.checked_add_signed(Duration::days(days)).unwrap_or(date)
}

/// The Monday at or before `date`; anchor for all weekly-period math.
pub fn monday_of(date: NaiveDate) -> NaiveDate {
    let offset = date.weekday().num_days_from_monday() as i64;
    add_days(date, -offset)
}

/// Monday..Sunday keys of the week containing `date`.
pub fn week_keys(date: NaiveDate) -> [DateKey; 7] {
    let monday = monday_of(date);
    std::array::from_fn(|i| day_key(add_days(monday, i as i64)))
}
