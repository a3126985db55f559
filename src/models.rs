use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Project score flagging an academic-integrity case rather than a grade.
pub const CHEAT_SENTINEL: i32 = -42;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Student {
    pub id: i64,
    pub login: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub displayname: String,
    #[serde(default)]
    pub email: String,
    pub campus_id: i32,
    #[serde(default)]
    pub level: f64,
    #[serde(default)]
    pub wallet: i32,
    #[serde(default)]
    pub correction_point: i32,
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub pool_month: Option<String>,
    #[serde(default)]
    pub pool_year: Option<i32>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub alumni: bool,
    #[serde(default)]
    pub staff: bool,
    #[serde(default)]
    pub blackholed: bool,
    #[serde(default)]
    pub freeze: bool,
    #[serde(default)]
    pub sinker: bool,
    #[serde(default)]
    pub test: bool,
    #[serde(default)]
    pub piscine: bool,
}

/// One attempt at a project. Retries produce several records with the same name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProjectRecord {
    pub login: String,
    pub project: String,
    pub date: NaiveDate,
    pub score: i32,
    pub status: String,
    #[serde(default)]
    pub validated: Option<bool>,
}

impl ProjectRecord {
    pub fn is_cheat(&self) -> bool {
        self.score == CHEAT_SENTINEL
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FeedbackRecord {
    pub evaluator_login: String,
    pub evaluated_login: String,
    #[serde(default)]
    pub rating: Option<i32>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Patronage stored as one row per student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PatronageRow {
    pub login: String,
    #[serde(default)]
    pub godfathers: Vec<String>,
    #[serde(default)]
    pub children: Vec<String>,
}

/// Patronage stored as one directed mentor edge per row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PatronageEdge {
    pub user_login: String,
    pub godfather_login: String,
}

/// Day key (`"01"`..`"31"`) to `"HH:MM:SS"` duration, missing values allowed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthEntry {
    #[serde(default)]
    pub days: BTreeMap<String, Option<String>>,
}

/// Month key (`"YYYY-MM"`) to the days logged in that month.
pub type MonthMap = BTreeMap<String, MonthEntry>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationStats {
    pub login: String,
    #[serde(default)]
    pub months: MonthMap,
}

/// A single seat session. An open session has no `end_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LocationSession {
    pub login: String,
    pub begin_at: DateTime<Utc>,
    #[serde(default)]
    pub end_at: Option<DateTime<Utc>>,
}
