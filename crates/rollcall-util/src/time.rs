//! Clock and calendar helpers for rollcall
//!
//! Batches span a range of calendar months and weekly attendance is
//! addressed by month name, so most helpers here deal in whole months.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `ROLLCALL_MOCK_TIME` environment variable can be set
//! to override the system time. Batch creation timestamps and dashboards then
//! see the mocked clock.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-03-03 08:00:00`)

use chrono::{DateTime, Datelike, Local, Month, Months, NaiveDate, NaiveDateTime, TimeZone};
use std::str::FromStr;
use std::sync::OnceLock;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "ROLLCALL_MOCK_TIME";

/// Cached mock time offset from the real time when the process started.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)] // This is the internal implementation that wraps Local::now()
fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                match NaiveDateTime::parse_from_str(&mock_time_str, "%Y-%m-%d %H:%M:%S") {
                    Ok(naive_dt) => {
                        if let Some(mock_dt) = Local.from_local_datetime(&naive_dt).single() {
                            let offset = mock_dt.signed_duration_since(chrono::Local::now());
                            tracing::info!(
                                mock_time = %mock_time_str,
                                offset_secs = offset.num_seconds(),
                                "Mock time enabled"
                            );
                            return Some(offset);
                        }
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            "Failed to convert mock time to local timezone"
                        );
                    }
                    Err(_) => {
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            expected_format = "%Y-%m-%d %H:%M:%S",
                            "Invalid mock time format"
                        );
                    }
                }
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Get the current local time, respecting mock time settings in debug builds.
#[allow(clippy::disallowed_methods)] // This is the wrapper that provides mock time support
pub fn now() -> DateTime<Local> {
    let real_now = chrono::Local::now();

    if let Some(offset) = get_mock_time_offset() {
        real_now + offset
    } else {
        real_now
    }
}

/// Truncate a date to the first day of its month
pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// First day of every month from `start`'s month through `end`'s month, inclusive.
///
/// Empty when `end` falls in an earlier month than `start`.
pub fn months_in_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let last = first_of_month(end);
    let mut months = Vec::new();
    let mut cur = first_of_month(start);
    while cur <= last {
        months.push(cur);
        match cur.checked_add_months(Months::new(1)) {
            Some(next) => cur = next,
            None => break,
        }
    }
    months
}

/// English name of a month number (1-12)
pub fn month_name(month: u32) -> Option<&'static str> {
    u8::try_from(month)
        .ok()
        .and_then(|m| Month::try_from(m).ok())
        .map(|m| m.name())
}

/// Resolve a month name ("March", "mar", case-insensitive) to its number,
/// provided that month falls within the `[start, end]` month range.
pub fn resolve_month_in_range(name: &str, start: NaiveDate, end: NaiveDate) -> Option<u32> {
    let wanted = Month::from_str(name.trim()).ok()?.number_from_month();
    months_in_range(start, end)
        .iter()
        .any(|m| m.month() == wanted)
        .then_some(wanted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_months_in_range() {
        let months = months_in_range(date(2025, 2, 15), date(2025, 5, 3));
        assert_eq!(
            months,
            vec![date(2025, 2, 1), date(2025, 3, 1), date(2025, 4, 1), date(2025, 5, 1)]
        );
    }

    #[test]
    fn test_months_across_year_boundary() {
        let months = months_in_range(date(2024, 11, 1), date(2025, 1, 31));
        assert_eq!(months.len(), 3);
        assert_eq!(months[2], date(2025, 1, 1));
    }

    #[test]
    fn test_reversed_range_is_empty() {
        assert!(months_in_range(date(2025, 5, 1), date(2025, 2, 1)).is_empty());
    }

    #[test]
    fn test_month_name() {
        assert_eq!(month_name(1), Some("January"));
        assert_eq!(month_name(12), Some("December"));
        assert_eq!(month_name(0), None);
        assert_eq!(month_name(13), None);
    }

    #[test]
    fn test_resolve_month_in_range() {
        let start = date(2025, 2, 1);
        let end = date(2025, 4, 30);

        assert_eq!(resolve_month_in_range("March", start, end), Some(3));
        assert_eq!(resolve_month_in_range("february", start, end), Some(2));
        assert_eq!(resolve_month_in_range("Apr", start, end), Some(4));

        // Valid month names outside the range are rejected
        assert_eq!(resolve_month_in_range("May", start, end), None);
        assert_eq!(resolve_month_in_range("Smarch", start, end), None);
    }
}
