//! `"HH:MM:SS"` attendance durations.
//!
//! Attendance is best-effort telemetry, so nothing here fails: malformed
//! durations count as zero and undatable entries stay out of date-based views.

use std::ops::Range;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::Serialize;

use crate::models::MonthMap;

/// Hour at which an attributed day is assumed to start.
pub const DAY_START_HOUR: u32 = 9;

/// Parses `"HH:MM:SS"` (optionally with a fractional seconds suffix) into
/// seconds. Anything else yields 0.
pub fn parse_duration(raw: &str) -> i64 {
    let raw = raw.trim();
    let whole = raw.split_once('.').map_or(raw, |(whole, _)| whole);
    let mut parts = whole.split(':');

    let (Some(h), Some(m), Some(s), None) = (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return 0;
    };

    match (segment(h, None), segment(m, Some(60)), segment(s, Some(60))) {
        (Some(h), Some(m), Some(s)) => h * 3600 + m * 60 + s,
        _ => 0,
    }
}

pub fn parse_optional(raw: Option<&str>) -> i64 {
    raw.map_or(0, parse_duration)
}

fn segment(raw: &str, bound: Option<i64>) -> Option<i64> {
    if raw.is_empty() || raw.len() > 6 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value = raw.parse::<i64>().ok()?;
    match bound {
        Some(bound) if value >= bound => None,
        _ => Some(value),
    }
}

/// Formats seconds as `"HH:MM:SS"`. Hours grow past two digits when needed.
pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

/// Builds the calendar date for a `"YYYY-MM"` month key and `"DD"` day key.
pub fn entry_date(month_key: &str, day_key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(&format!("{month_key}-{day_key}"), "%Y-%m-%d").ok()
}

/// Inclusive date bounds. An open side is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateWindow {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn is_all(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// The last `months` calendar months up to and including `today`'s month.
    /// A span reaching past the representable calendar is unbounded.
    pub fn recent_months(today: NaiveDate, months: u32) -> Self {
        let back = i32::try_from(months.saturating_sub(1)).ok();
        let start = back
            .and_then(|back| (today.year() * 12 + today.month0() as i32).checked_sub(back))
            .and_then(|index| {
                NaiveDate::from_ymd_opt(index.div_euclid(12), index.rem_euclid(12) as u32 + 1, 1)
            });
        Self { start, end: None }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |start| date >= start) && self.end.map_or(true, |end| date <= end)
    }
}

/// Sum of every logged day in every month.
pub fn total_seconds(months: &MonthMap) -> i64 {
    months
        .values()
        .flat_map(|entry| entry.days.values())
        .map(|value| parse_optional(value.as_deref()))
        .sum()
}

/// Sum restricted to `window`. Entries whose date cannot be built are only
/// counted when the window is unbounded.
pub fn total_seconds_between(months: &MonthMap, window: DateWindow) -> i64 {
    if window.is_all() {
        return total_seconds(months);
    }
    months
        .iter()
        .flat_map(|(month_key, entry)| {
            entry
                .days
                .iter()
                .map(move |(day_key, value)| (month_key, day_key, value))
        })
        .filter(|(month_key, day_key, _)| {
            entry_date(month_key, day_key).is_some_and(|date| window.contains(date))
        })
        .map(|(_, _, value)| parse_optional(value.as_deref()))
        .sum()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeBucket {
    pub day_of_week: Weekday,
    /// Approximate hours covered, assuming the day starts at [`DAY_START_HOUR`].
    pub hours: Range<u32>,
}

/// Attributes a dated duration to a weekday and an approximate hour range.
/// `date_key` is `"YYYY-MM-DD"`; `None` when it does not parse.
pub fn bucket(date_key: &str, seconds: i64) -> Option<TimeBucket> {
    let date = NaiveDate::parse_from_str(date_key, "%Y-%m-%d").ok()?;
    let hours = (seconds.max(0) as u64).div_ceil(3600).min(24) as u32;
    let end = (DAY_START_HOUR + hours).min(24);
    Some(TimeBucket {
        day_of_week: date.weekday(),
        hours: DAY_START_HOUR..end,
    })
}

/// Seconds logged per weekday, Monday first.
pub fn weekday_totals(months: &MonthMap) -> [i64; 7] {
    let mut totals = [0i64; 7];
    for (month_key, entry) in months {
        for (day_key, value) in &entry.days {
            let seconds = parse_optional(value.as_deref());
            let date_key = format!("{month_key}-{day_key}");
            if let Some(bucket) = bucket(&date_key, seconds) {
                totals[bucket.day_of_week.num_days_from_monday() as usize] += seconds;
            }
        }
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MonthEntry;

    fn months(entries: Vec<(&str, Vec<(&str, Option<&str>)>)>) -> MonthMap {
        entries
            .into_iter()
            .map(|(month, days)| {
                let days = days
                    .into_iter()
                    .map(|(day, value)| (day.to_string(), value.map(str::to_string)))
                    .collect();
                (month.to_string(), MonthEntry { days })
            })
            .collect()
    }

    #[test]
    fn parses_well_formed_durations() {
        assert_eq!(parse_duration("02:30:00"), 9000);
        assert_eq!(parse_duration("00:00:00"), 0);
        assert_eq!(parse_duration("100:00:01"), 360_001);
        assert_eq!(parse_duration("01:00:00.123456"), 3600);
    }

    #[test]
    fn malformed_durations_are_zero() {
        for raw in ["bad", "", "1:2", "01:60:00", "01:00:61", "-1:00:00", "a:b:c", "1:2:3:4"] {
            assert_eq!(parse_duration(raw), 0, "{raw}");
        }
        assert_eq!(parse_optional(None), 0);
    }

    #[test]
    fn format_round_trips() {
        for n in [0, 1, 59, 60, 3599, 3600, 9000, 86_399, 359_999] {
            assert_eq!(parse_duration(&format_duration(n)), n);
        }
        assert_eq!(format_duration(9000), "02:30:00");
    }

    #[test]
    fn totals_skip_empty_and_bad_days() {
        let map = months(vec![
            ("2024-03", vec![("01", Some("02:30:00")), ("02", Some("00:00:00")), ("03", None)]),
            ("2024-04", vec![("01", Some("garbage")), ("02", Some("01:00:00"))]),
        ]);
        assert_eq!(total_seconds(&map), 9000 + 3600);
    }

    #[test]
    fn window_restricts_to_month() {
        let map = months(vec![
            ("2024-03", vec![("01", Some("02:30:00")), ("02", Some("00:00:00"))]),
            ("2024-04", vec![("01", Some("01:00:00"))]),
        ]);
        let march = DateWindow::between(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        );
        assert_eq!(total_seconds_between(&map, march), 9000);
        assert_eq!(total_seconds_between(&map, DateWindow::all()), 12_600);
    }

    #[test]
    fn undatable_entries_count_only_in_raw_totals() {
        let map = months(vec![("2024-13", vec![("01", Some("01:00:00"))])]);
        assert_eq!(total_seconds(&map), 3600);
        assert_eq!(weekday_totals(&map), [0; 7]);
        let window = DateWindow {
            start: NaiveDate::from_ymd_opt(2000, 1, 1),
            end: None,
        };
        assert_eq!(total_seconds_between(&map, window), 0);
    }

    #[test]
    fn recent_months_crosses_year_boundary() {
        let today = NaiveDate::from_ymd_opt(2024, 2, 15).unwrap();
        let window = DateWindow::recent_months(today, 3);
        assert_eq!(window.start, NaiveDate::from_ymd_opt(2023, 12, 1));
        assert_eq!(window.end, None);
        let window = DateWindow::recent_months(today, 1);
        assert_eq!(window.start, NaiveDate::from_ymd_opt(2024, 2, 1));
    }

    #[test]
    fn huge_month_spans_never_start_after_today() {
        let today = NaiveDate::from_ymd_opt(2024, 2, 15).unwrap();
        for months in [u32::MAX, i32::MAX as u32, 1 << 31, 100_000_000] {
            let window = DateWindow::recent_months(today, months);
            assert!(window.start.map_or(true, |start| start <= today), "{months}");
            assert!(window.contains(today));
        }
        let window = DateWindow::recent_months(today, 1200);
        assert_eq!(window.start, NaiveDate::from_ymd_opt(1924, 3, 1));
    }

    #[test]
    fn buckets_use_weekday_and_hours() {
        // 2024-03-01 was a Friday.
        let bucket = bucket("2024-03-01", 9000).unwrap();
        assert_eq!(bucket.day_of_week, Weekday::Fri);
        assert_eq!(bucket.hours, 9..12);

        assert_eq!(super::bucket("2024-03-01", 0).unwrap().hours, 9..9);
        assert_eq!(super::bucket("2024-03-01", 86_400).unwrap().hours, 9..24);
        assert!(super::bucket("not-a-date", 60).is_none());
    }

    #[test]
    fn weekday_totals_accumulate() {
        let map = months(vec![("2024-03", vec![("01", Some("02:30:00")), ("08", Some("00:30:00")), ("04", Some("01:00:00"))])]);
        let totals = weekday_totals(&map);
        assert_eq!(totals[Weekday::Fri.num_days_from_monday() as usize], 10_800);
        assert_eq!(totals[Weekday::Mon.num_days_from_monday() as usize], 3600);
    }
}
