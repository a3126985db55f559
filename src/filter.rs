//! Student predicates built from a validated request.
//!
//! The same predicate renders two ways: [`StudentFilter::matches`] for in-memory
//! snapshots and [`StudentFilter::push_where`] for Postgres. Values only ever
//! reach SQL as bind parameters.

use sqlx::{Postgres, QueryBuilder};

use crate::models::Student;
use crate::params::{Pool, RankingRequest, StudentStatus};

/// Student columns matched by free-text search.
pub const SEARCH_COLUMNS: [&str; 5] = ["login", "first_name", "last_name", "displayname", "email"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Active,
    Alumni,
    Staff,
    Blackholed,
    Freeze,
    Sinker,
    Test,
    Piscine,
}

impl Flag {
    pub fn column(&self) -> &'static str {
        match self {
            Flag::Active => "active",
            Flag::Alumni => "alumni",
            Flag::Staff => "staff",
            Flag::Blackholed => "blackholed",
            Flag::Freeze => "freeze",
            Flag::Sinker => "sinker",
            Flag::Test => "test",
            Flag::Piscine => "piscine",
        }
    }

    fn value(&self, student: &Student) -> bool {
        match self {
            Flag::Active => student.active,
            Flag::Alumni => student.alumni,
            Flag::Staff => student.staff,
            Flag::Blackholed => student.blackholed,
            Flag::Freeze => student.freeze,
            Flag::Sinker => student.sinker,
            Flag::Test => student.test,
            Flag::Piscine => student.piscine,
        }
    }
}

/// One conjunct of a status filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Flag(Flag, bool),
    /// Case-insensitive grade equality.
    Grade(&'static str),
}

impl Condition {
    fn matches(&self, student: &Student) -> bool {
        match self {
            Condition::Flag(flag, expected) => flag.value(student) == *expected,
            Condition::Grade(grade) => student
                .grade
                .as_deref()
                .is_some_and(|g| g.eq_ignore_ascii_case(grade)),
        }
    }
}

/// Conditions implied by a status category. Every condition must hold.
pub fn status_conditions(status: StudentStatus) -> Vec<Condition> {
    match status {
        StudentStatus::Active => vec![Condition::Flag(Flag::Active, true)],
        StudentStatus::Inactive => vec![Condition::Flag(Flag::Active, false)],
        StudentStatus::Staff => vec![Condition::Flag(Flag::Staff, true)],
        StudentStatus::Alumni => vec![Condition::Flag(Flag::Alumni, true)],
        StudentStatus::Blackholed => vec![Condition::Flag(Flag::Blackholed, true)],
        StudentStatus::Sinker => vec![Condition::Flag(Flag::Sinker, true)],
        StudentStatus::Freeze => vec![Condition::Flag(Flag::Freeze, true)],
        StudentStatus::Test => vec![Condition::Flag(Flag::Test, true)],
        StudentStatus::Piscine => vec![Condition::Flag(Flag::Piscine, true)],
        StudentStatus::Cadet => vec![
            Condition::Grade("Cadet"),
            Condition::Flag(Flag::Active, true),
        ],
        StudentStatus::Transcender => vec![
            Condition::Grade("Transcender"),
            Condition::Flag(Flag::Active, true),
        ],
    }
}

/// Escapes `\`, `%` and `_` so the term matches literally inside `ILIKE`.
pub fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudentFilter {
    pub campus_id: Option<i32>,
    pub pool: Option<Pool>,
    pub search: Option<String>,
    pub conditions: Vec<Condition>,
}

impl StudentFilter {
    pub fn from_request(request: &RankingRequest) -> Self {
        Self {
            campus_id: request.campus_id.and_then(|id| i32::try_from(id).ok()),
            pool: request.pool.clone(),
            search: request.search.clone().filter(|s| !s.is_empty()),
            conditions: request.status.map(status_conditions).unwrap_or_default(),
        }
    }

    /// Status given by name. Names outside the enumeration add no constraint.
    pub fn with_status_name(mut self, name: &str) -> Self {
        self.conditions = StudentStatus::lookup(name)
            .map(status_conditions)
            .unwrap_or_default();
        self
    }

    pub fn is_unconstrained(&self) -> bool {
        self.campus_id.is_none()
            && self.pool.is_none()
            && self.search.is_none()
            && self.conditions.is_empty()
    }

    pub fn matches(&self, student: &Student) -> bool {
        if let Some(campus_id) = self.campus_id {
            if student.campus_id != campus_id {
                return false;
            }
        }

        if let Some(pool) = &self.pool {
            let same_month = student.pool_month.as_deref() == Some(pool.month.as_str());
            if !same_month || student.pool_year != Some(pool.year) {
                return false;
            }
        }

        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let fields = [
                &student.login,
                &student.first_name,
                &student.last_name,
                &student.displayname,
                &student.email,
            ];
            if !fields
                .iter()
                .any(|field| field.to_lowercase().contains(&needle))
            {
                return false;
            }
        }

        self.conditions.iter().all(|c| c.matches(student))
    }

    /// Appends ` WHERE ...` against the students table aliased as `alias`.
    pub fn push_where(&self, builder: &mut QueryBuilder<'_, Postgres>, alias: &str) {
        builder.push(" WHERE TRUE");
        self.push_conditions(builder, alias);
    }

    /// Appends ` AND ...` conjuncts for each constraint.
    pub fn push_conditions(&self, builder: &mut QueryBuilder<'_, Postgres>, alias: &str) {
        if let Some(campus_id) = self.campus_id {
            builder
                .push(format!(" AND {alias}.campus_id = "))
                .push_bind(campus_id);
        }

        if let Some(pool) = &self.pool {
            builder
                .push(format!(" AND {alias}.pool_month = "))
                .push_bind(pool.month.clone())
                .push(format!(" AND {alias}.pool_year = "))
                .push_bind(pool.year);
        }

        if let Some(search) = &self.search {
            let pattern = format!("%{}%", escape_like(search));
            builder.push(" AND (");
            for (i, column) in SEARCH_COLUMNS.iter().enumerate() {
                if i > 0 {
                    builder.push(" OR ");
                }
                builder
                    .push(format!("{alias}.{column} ILIKE "))
                    .push_bind(pattern.clone())
                    .push(" ESCAPE '\\'");
            }
            builder.push(")");
        }

        for condition in &self.conditions {
            match condition {
                Condition::Flag(flag, expected) => {
                    builder
                        .push(format!(" AND {alias}.{} = ", flag.column()))
                        .push_bind(*expected);
                }
                Condition::Grade(grade) => {
                    builder
                        .push(format!(" AND LOWER({alias}.grade) = LOWER("))
                        .push_bind(grade.to_string())
                        .push(")");
                }
            }
        }
    }
}
