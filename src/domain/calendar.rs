// src/domain/calendar.rs
// UTC day boundaries

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

/// 00:00:00 UTC on `date`.
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Last representable instant of `date` in UTC at microsecond precision.
pub fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    start_of_day(date) + Duration::days(1) - Duration::microseconds(1)
}

/// Every date from `start` through `end`, inclusive. Empty when `start > end`.
pub fn days_between(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|day| *day <= end).collect()
}
