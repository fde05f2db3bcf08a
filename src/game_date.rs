//! Date token for the games-by-date endpoint.
//!
//! The picked calendar date is taken as midnight at UTC+8, that instant is
//! re-expressed in US Eastern time, and the Eastern calendar date becomes the
//! `YYYYMMDD` token. Eastern follows the US rules in force since 2007: EDT
//! from the second Sunday of March 02:00 EST to the first Sunday of November
//! 02:00 EDT.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};

use crate::constants::api::LOCAL_UTC_OFFSET_HOURS;

const EST_HOURS: i64 = -5;
const EDT_HOURS: i64 = -4;

/// Midnight of `date` at UTC+8, as a UTC instant.
pub fn local_midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc() - Duration::hours(LOCAL_UTC_OFFSET_HOURS)
}

/// UTC offset of US Eastern time at `instant`, in hours.
pub fn us_eastern_offset_hours(instant: DateTime<Utc>) -> i64 {
    let year = instant.year();
    // 02:00 EST = 07:00 UTC; 02:00 EDT = 06:00 UTC.
    let start = dst_boundary(year, 3, 2, 7);
    let end = dst_boundary(year, 11, 1, 6);
    match (start, end) {
        (Some(start), Some(end)) if instant >= start && instant < end => EDT_HOURS,
        _ => EST_HOURS,
    }
}

fn dst_boundary(year: i32, month: u32, nth_sunday: u8, utc_hour: u32) -> Option<DateTime<Utc>> {
    NaiveDate::from_weekday_of_month_opt(year, month, Weekday::Sun, nth_sunday)?
        .and_hms_opt(utc_hour, 0, 0)
        .map(|dt| dt.and_utc())
}

/// Calendar date in US Eastern time at `instant`.
pub fn eastern_date(instant: DateTime<Utc>) -> NaiveDate {
    (instant + Duration::hours(us_eastern_offset_hours(instant))).date_naive()
}

/// `YYYYMMDD` token for the games-by-date endpoint.
pub fn games_date_token(date: NaiveDate) -> String {
    eastern_date(local_midnight(date))
        .format("%Y%m%d")
        .to_string()
}

/// The date the scoreboard opens on: today at UTC+8.
pub fn today_local(now: DateTime<Utc>) -> NaiveDate {
    (now + Duration::hours(LOCAL_UTC_OFFSET_HOURS)).date_naive()
}

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_calendar_date(s: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
}
