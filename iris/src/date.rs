//! Conversions between microsecond timestamps and local-time strings.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};

use crate::error::{Error, Result};

pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const FILE_STAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

const USECS_PER_SEC: i64 = 1_000_000;
const USECS_PER_DAY: f64 = 86_400_000_000.0;

fn local(usecs: i64) -> Option<DateTime<Local>> {
    DateTime::from_timestamp_micros(usecs).map(|utc| utc.with_timezone(&Local))
}

/// `YYYY-MM-DD HH:MM:SS` in local time. Out-of-range values are rendered as the raw number.
pub fn usecs_to_date(usecs: i64) -> String {
    local(usecs).map_or_else(|| usecs.to_string(), |d| d.format(DATE_FORMAT).to_string())
}

/// [`usecs_to_date`] with characters safe for file names.
pub fn file_stamp(usecs: i64) -> String {
    local(usecs).map_or_else(
        || usecs.to_string(),
        |d| d.format(FILE_STAMP_FORMAT).to_string(),
    )
}

/// Parses a local `YYYY-MM-DD HH:MM:SS` (or bare `YYYY-MM-DD`) into whole-second usecs.
pub fn date_to_usecs(date: &str) -> Result<i64> {
    let trimmed = date.trim();
    let naive = match NaiveDateTime::parse_from_str(trimmed, DATE_FORMAT) {
        Ok(naive) => Some(naive),
        Err(_) => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0)),
    }
    .ok_or_else(|| Error::InvalidDate(date.to_string()))?;
    let local = Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| Error::InvalidDate(date.to_string()))?;
    Ok(local.timestamp() * USECS_PER_SEC)
}

fn unit_seconds(unit: &str) -> Option<i64> {
    let secs = match unit.to_lowercase().as_str() {
        "seconds" | "sec" | "secs" => 1,
        "minutes" | "min" | "mins" => 60,
        "hours" | "hour" => 3_600,
        "days" | "day" => 86_400,
        "weeks" | "week" => 604_800,
        "months" | "month" => 2_628_000,
        "years" | "year" => 31_536_000,
        _ => return None,
    };
    Some(secs)
}

/// Usecs timestamp `amount` units before now.
pub fn time_ago(amount: i64, unit: &str) -> Result<i64> {
    let secs = unit_seconds(unit).ok_or_else(|| Error::InvalidTimeUnit(unit.to_string()))?;
    let now = Local::now().timestamp() * USECS_PER_SEC;
    amount
        .checked_mul(secs)
        .and_then(|s| s.checked_mul(USECS_PER_SEC))
        .and_then(|offset| now.checked_sub(offset))
        .ok_or_else(|| Error::TimeOutOfRange {
            amount,
            unit: unit.to_string(),
        })
}

/// Whole days between two usecs timestamps, rounded.
pub fn day_diff(newer: i64, older: i64) -> i64 {
    ((newer as f64 - older as f64) / USECS_PER_DAY).round() as i64
}
