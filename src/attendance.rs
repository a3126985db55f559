//! Attendance adapters.
//!
//! Location data arrives either as month maps of daily durations or as raw
//! seat sessions. The store reports which one it holds and the matching
//! [`AttendanceSource`] is built once from it.

use std::collections::HashMap;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::duration::{total_seconds_between, weekday_totals, DateWindow};
use crate::models::{LocationSession, LocationStats};

pub trait AttendanceSource: Send + Sync {
    /// Total logged seconds per login inside `window`.
    fn seconds_by_login(&self, window: DateWindow) -> HashMap<String, i64>;

    /// Seconds per weekday for one login, Monday first, over all history.
    fn weekday_seconds(&self, login: &str) -> [i64; 7];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "encoding", content = "rows", rename_all = "snake_case")]
pub enum AttendanceRecords {
    MonthMap(Vec<LocationStats>),
    Intervals(Vec<LocationSession>),
}

impl AttendanceRecords {
    pub fn encoding(&self) -> &'static str {
        match self {
            AttendanceRecords::MonthMap(_) => "month_map",
            AttendanceRecords::Intervals(_) => "intervals",
        }
    }

    pub fn retain_logins(&mut self, keep: impl Fn(&str) -> bool) {
        match self {
            AttendanceRecords::MonthMap(rows) => rows.retain(|row| keep(&row.login)),
            AttendanceRecords::Intervals(rows) => rows.retain(|row| keep(&row.login)),
        }
    }

    pub fn into_source(self) -> Box<dyn AttendanceSource> {
        match self {
            AttendanceRecords::MonthMap(rows) => Box::new(MonthMapAttendance { rows }),
            AttendanceRecords::Intervals(rows) => Box::new(IntervalAttendance { rows }),
        }
    }
}

pub struct MonthMapAttendance {
    rows: Vec<LocationStats>,
}

impl AttendanceSource for MonthMapAttendance {
    fn seconds_by_login(&self, window: DateWindow) -> HashMap<String, i64> {
        let mut totals = HashMap::new();
        for row in &self.rows {
            *totals.entry(row.login.clone()).or_insert(0) += total_seconds_between(&row.months, window);
        }
        totals
    }

    fn weekday_seconds(&self, login: &str) -> [i64; 7] {
        let mut totals = [0i64; 7];
        for row in self.rows.iter().filter(|row| row.login == login) {
            for (day, seconds) in weekday_totals(&row.months).into_iter().enumerate() {
                totals[day] += seconds;
            }
        }
        totals
    }
}

pub struct IntervalAttendance {
    rows: Vec<LocationSession>,
}

impl AttendanceSource for IntervalAttendance {
    /// Open or inverted sessions count as zero. A session belongs to the
    /// window when it begins inside it.
    fn seconds_by_login(&self, window: DateWindow) -> HashMap<String, i64> {
        let mut totals = HashMap::new();
        for session in &self.rows {
            let entry = totals.entry(session.login.clone()).or_insert(0);
            if !window.contains(session.begin_at.date_naive()) {
                continue;
            }
            if let Some(end) = session.end_at {
                *entry += (end - session.begin_at).num_seconds().max(0);
            }
        }
        totals
    }

    fn weekday_seconds(&self, login: &str) -> [i64; 7] {
        let mut totals = [0i64; 7];
        for session in self.rows.iter().filter(|session| session.login == login) {
            if let Some(end) = session.end_at {
                let day = session.begin_at.weekday().num_days_from_monday() as usize;
                totals[day] += (end - session.begin_at).num_seconds().max(0);
            }
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MonthEntry;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn stats(login: &str, month: &str, days: &[(&str, &str)]) -> LocationStats {
        let days = days
            .iter()
            .map(|(day, value)| (day.to_string(), Some(value.to_string())))
            .collect();
        LocationStats {
            login: login.to_string(),
            months: [(month.to_string(), MonthEntry { days })].into_iter().collect(),
        }
    }

    fn session(login: &str, day: u32, hours: Option<i64>) -> LocationSession {
        let begin_at = Utc.with_ymd_and_hms(2024, 3, day, 9, 0, 0).unwrap();
        LocationSession {
            login: login.to_string(),
            begin_at,
            end_at: hours.map(|h| begin_at + chrono::Duration::hours(h)),
        }
    }

    #[test]
    fn month_map_sums_per_login() {
        let records = AttendanceRecords::MonthMap(vec![
            stats("bob", "2024-03", &[("01", "02:30:00"), ("02", "00:00:00")]),
            stats("eve", "2024-03", &[("05", "bad")]),
        ]);
        let totals = records.into_source().seconds_by_login(DateWindow::all());
        assert_eq!(totals["bob"], 9000);
        assert_eq!(totals["eve"], 0);
    }

    #[test]
    fn intervals_sum_closed_sessions() {
        let records = AttendanceRecords::Intervals(vec![
            session("bob", 1, Some(2)),
            session("bob", 2, None),
            session("bob", 20, Some(1)),
        ]);
        let march_first_week = DateWindow::between(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 7).unwrap(),
        );
        let source = records.into_source();
        assert_eq!(source.seconds_by_login(march_first_week)["bob"], 7200);
        assert_eq!(source.seconds_by_login(DateWindow::all())["bob"], 10_800);
    }

    #[test]
    fn weekday_seconds_agree_across_encodings() {
        // 2024-03-01 is a Friday
        let month_map = AttendanceRecords::MonthMap(vec![
            stats("bob", "2024-03", &[("01", "02:00:00"), ("04", "01:00:00")]),
            stats("eve", "2024-03", &[("01", "05:00:00")]),
        ]);
        let intervals = AttendanceRecords::Intervals(vec![
            session("bob", 1, Some(2)),
            session("bob", 4, Some(1)),
            session("bob", 5, None),
        ]);
        let expected = [3600, 0, 0, 0, 7200, 0, 0];
        assert_eq!(month_map.into_source().weekday_seconds("bob"), expected);
        assert_eq!(intervals.into_source().weekday_seconds("bob"), expected);
    }

    #[test]
    fn retain_drops_other_logins() {
        let mut records = AttendanceRecords::Intervals(vec![session("bob", 1, Some(1)), session("eve", 1, Some(1))]);
        records.retain_logins(|login| login == "bob");
        assert_eq!(records.encoding(), "intervals");
        let totals = records.into_source().seconds_by_login(DateWindow::all());
        assert!(!totals.contains_key("eve"));
    }
}
