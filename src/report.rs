use std::collections::HashMap;
use std::fmt::Write;

use chrono::Weekday;

use crate::duration::format_duration;
use crate::params::{RankingRequest, SortKey};
use crate::response::{RankingResponse, StudentRow};

#[derive(Debug, Clone, PartialEq)]
pub struct GradeSummary {
    pub grade: String,
    pub count: usize,
    pub avg_level: f64,
}

pub fn summarize_by_grade(rows: &[StudentRow]) -> Vec<GradeSummary> {
    let mut map: HashMap<String, (usize, f64)> = HashMap::new();

    for row in rows {
        let grade = row.grade.clone().unwrap_or_else(|| "Unknown".to_string());
        let entry = map.entry(grade).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += row.level;
    }

    let mut summaries: Vec<GradeSummary> = map
        .into_iter()
        .map(|(grade, (count, total_level))| GradeSummary {
            grade,
            count,
            avg_level: if count == 0 {
                0.0
            } else {
                total_level / count as f64
            },
        })
        .collect();

    summaries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.grade.cmp(&b.grade)));
    summaries
}

/// Human-readable label for the filters of a request.
pub fn scope_label(request: &RankingRequest) -> String {
    let mut parts = Vec::new();
    if let Some(campus_id) = request.campus_id {
        parts.push(format!("campus {campus_id}"));
    }
    if let Some(pool) = &request.pool {
        parts.push(format!("pool {}-{}", pool.month, pool.year));
    }
    if let Some(status) = request.status {
        parts.push(format!("status {}", status.name()));
    }
    if let Some(search) = &request.search {
        parts.push(format!("search \"{search}\""));
    }
    if parts.is_empty() {
        "all students".to_string()
    } else {
        parts.join(", ")
    }
}

fn value_label(row: &StudentRow, sort: SortKey) -> String {
    match (sort, row.derived_value()) {
        (SortKey::Derived(_), Some(value)) => format!("{} {}", sort, serde_json::json!(value)),
        (SortKey::Raw(_), _) => format!("level {:.2}", row.level),
        (SortKey::Derived(_), None) => format!("{sort} n/a"),
    }
}

pub fn build_report(request: &RankingRequest, response: &RankingResponse) -> String {
    let summaries = summarize_by_grade(&response.students);
    let pagination = &response.pagination;

    let mut output = String::new();

    let _ = writeln!(output, "# Campus Ranking Report");
    let _ = writeln!(
        output,
        "Generated for {} sorted by {} ({:?}), page {} of {} ({} students)",
        scope_label(request),
        request.sort,
        request.order,
        pagination.page,
        pagination.total_pages,
        pagination.total
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Ranking");

    if response.students.is_empty() {
        let _ = writeln!(output, "No students match this ranking.");
    } else {
        let offset = request.window.skip;
        for (i, row) in response.students.iter().enumerate() {
            let _ = writeln!(
                output,
                "{}. {} ({}, campus {}) {}",
                offset + i as u64 + 1,
                row.login,
                row.displayname,
                row.campus_id,
                value_label(row, request.sort)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Grade Mix");

    if summaries.is_empty() {
        let _ = writeln!(output, "No students on this page.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} students (avg level {:.2})",
                summary.grade, summary.count, summary.avg_level
            );
        }
    }

    output
}

/// Markdown table of logged time per weekday, Monday first.
pub fn build_weekday_table(login: &str, totals: &[i64; 7]) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Attendance for {login}");
    let _ = writeln!(output);
    let _ = writeln!(output, "| Day | Logged |");
    let _ = writeln!(output, "| --- | --- |");

    let mut day = Weekday::Mon;
    for seconds in totals {
        let _ = writeln!(output, "| {day} | {} |", format_duration(*seconds));
        day = day.succ();
    }
    let _ = writeln!(output, "| Total | {} |", format_duration(totals.iter().sum()));

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::DerivedValue;
    use crate::models::Student;
    use crate::params::{DerivedKey, PageWindow, Pool, SortOrder};
    use crate::response::Pagination;

    fn row(login: &str, grade: Option<&str>, level: f64, cheats: i64) -> StudentRow {
        let student: Student = serde_json::from_value(serde_json::json!({
            "id": 1,
            "login": login,
            "displayname": login.to_uppercase(),
            "campus_id": 1,
            "level": level,
            "grade": grade,
        }))
        .unwrap();
        StudentRow::new(student, Some(("cheat_count", DerivedValue::Count(cheats))))
    }

    #[test]
    fn grades_are_counted_and_averaged() {
        let rows = vec![
            row("alice", Some("Cadet"), 4.0, 1),
            row("bob", Some("Cadet"), 2.0, 1),
            row("carol", None, 9.0, 1),
        ];
        let summaries = summarize_by_grade(&rows);
        assert_eq!(summaries[0].grade, "Cadet");
        assert_eq!(summaries[0].count, 2);
        assert!((summaries[0].avg_level - 3.0).abs() < 0.001);
        assert_eq!(summaries[1].grade, "Unknown");
    }

    #[test]
    fn report_lists_ranked_students_with_offsets() {
        let request = RankingRequest {
            campus_id: Some(1),
            pool: Some(Pool { month: "march".into(), year: 2024 }),
            sort: SortKey::Derived(DerivedKey::CheatCount),
            order: SortOrder::Desc,
            window: PageWindow { skip: 10, limit: 10 },
            ..Default::default()
        };
        let response = RankingResponse {
            students: vec![row("alice", Some("Cadet"), 4.0, 2)],
            pagination: Pagination::new(11, 2, 10),
        };
        let report = build_report(&request, &response);
        assert!(report.contains("Generated for campus 1, pool march-2024 sorted by cheat_count"));
        assert!(report.contains("11. alice (ALICE, campus 1) cheat_count 2"));
        assert!(report.contains("- Cadet: 1 students"));
    }

    #[test]
    fn numbering_follows_skip_inside_a_page() {
        let request = RankingRequest {
            window: PageWindow { skip: 3, limit: 5 },
            ..Default::default()
        };
        let response = RankingResponse {
            students: vec![row("dora", None, 1.0, 0), row("emil", None, 1.0, 0)],
            pagination: Pagination::new(5, request.window.page(), 5),
        };
        assert_eq!(response.pagination.page, 1);
        let report = build_report(&request, &response);
        assert!(report.contains("4. dora"));
        assert!(report.contains("5. emil"));
        assert!(!report.contains("1. dora"));
    }

    #[test]
    fn empty_report_says_so() {
        let response = RankingResponse {
            students: Vec::new(),
            pagination: Pagination::new(0, 1, 50),
        };
        let report = build_report(&RankingRequest::default(), &response);
        assert!(report.contains("No students match this ranking."));
        assert!(report.contains("Generated for all students"));
    }

    #[test]
    fn weekday_table_starts_on_monday() {
        let table = build_weekday_table("bob", &[0, 0, 0, 0, 9000, 0, 0]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "# Attendance for bob");
        assert_eq!(lines[4], "| Mon | 00:00:00 |");
        assert_eq!(lines[8], "| Fri | 02:30:00 |");
        assert_eq!(lines[11], "| Total | 02:30:00 |");
    }
}
