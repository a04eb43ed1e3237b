//! Text renderings shared by the leaderboard, lap table and chart.

use chrono::{DateTime, NaiveDateTime, Utc};

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Table cell format for lap date-times
pub const TABLE_DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Leaderboard date format
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Render centiseconds as `m:ss.hh`
pub fn format_lap_time(lap_time: i64) -> String {
    let minutes = lap_time.div_euclid(6000);
    let seconds = lap_time.rem_euclid(6000) / 100;
    let hundredths = lap_time.rem_euclid(100);
    format!("{}:{:02}.{:02}", minutes, seconds, hundredths)
}

/// Parse an `m:ss.hh` cell back to a comparable millisecond value.
///
/// Values too large for `i64` milliseconds yield `None`.
pub fn lap_time_to_millis(text: &str) -> Option<i64> {
    let (minutes, rest) = text.trim().split_once(':')?;
    let (seconds, hundredths) = rest.split_once('.')?;

    let minutes: i64 = minutes.parse().ok()?;
    let seconds: i64 = seconds.parse().ok()?;
    let hundredths: i64 = hundredths.parse().ok()?;

    minutes
        .checked_mul(60_000)?
        .checked_add(seconds.checked_mul(1000)?)?
        .checked_add(hundredths.checked_mul(10)?)
}

pub fn format_date(instant: &DateTime<Utc>) -> String {
    instant.format(DATE_FORMAT).to_string()
}

pub fn format_table_date_time(instant: &DateTime<Utc>) -> String {
    instant.format(TABLE_DATE_TIME_FORMAT).to_string()
}

/// Parse a rendered date-time cell; accepts the table format and RFC 3339
pub fn parse_table_date_time(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, TABLE_DATE_TIME_FORMAT)
        .map(|naive| naive.and_utc())
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
}

/// Whole days between two instants, rounded up
pub fn days_between(a: &DateTime<Utc>, b: &DateTime<Utc>) -> i64 {
    let millis = (*a - *b).num_milliseconds().abs();
    (millis + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY
}

/// Relative age of a record, e.g. `Yesterday` or `3 weeks ago`
pub fn age_label(set_at: &DateTime<Utc>, now: &DateTime<Utc>) -> String {
    age_label_for_days(days_between(set_at, now))
}

pub fn age_label_for_days(days: i64) -> String {
    match days {
        0 => "Today".to_string(),
        1 => "Yesterday".to_string(),
        2..=6 => format!("{} days ago", days),
        7..=29 => format!("{} weeks ago", days / 7),
        30..=364 => format!("{} months ago", days / 30),
        _ => format!("{} years ago", days / 365),
    }
}
