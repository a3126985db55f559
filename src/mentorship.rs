//! Patronage adapters.
//!
//! Godfather/children links are stored either per student (two arrays on the
//! student's row) or as one directed edge per row. [`PatronageRecords`] names
//! the encoding and [`MentorshipSource`] hides it from the aggregators.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::models::{PatronageEdge, PatronageRow};

pub trait MentorshipSource: Send + Sync {
    /// Distinct godfathers per login.
    fn godfather_counts(&self) -> HashMap<String, i64>;

    /// Distinct children per login.
    fn children_counts(&self) -> HashMap<String, i64>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "encoding", content = "rows", rename_all = "snake_case")]
pub enum PatronageRecords {
    PerStudent(Vec<PatronageRow>),
    Edges(Vec<PatronageEdge>),
}

impl PatronageRecords {
    pub fn encoding(&self) -> &'static str {
        match self {
            PatronageRecords::PerStudent(_) => "per_student",
            PatronageRecords::Edges(_) => "edges",
        }
    }

    /// Keeps rows owned by a kept login. Edges survive when either end is kept.
    pub fn retain_logins(&mut self, keep: impl Fn(&str) -> bool) {
        match self {
            PatronageRecords::PerStudent(rows) => rows.retain(|row| keep(&row.login)),
            PatronageRecords::Edges(edges) => {
                edges.retain(|edge| keep(&edge.user_login) || keep(&edge.godfather_login))
            }
        }
    }

    pub fn into_source(self) -> Box<dyn MentorshipSource> {
        match self {
            PatronageRecords::PerStudent(rows) => Box::new(PerStudentPatronage { rows }),
            PatronageRecords::Edges(edges) => Box::new(EdgePatronage { edges }),
        }
    }
}

fn distinct_counts<'a>(pairs: impl Iterator<Item = (&'a str, &'a str)>) -> HashMap<String, i64> {
    let mut seen: HashMap<&str, HashSet<&str>> = HashMap::new();
    for (owner, other) in pairs {
        if owner == other || other.is_empty() {
            continue;
        }
        seen.entry(owner).or_default().insert(other);
    }
    seen.into_iter()
        .map(|(owner, others)| (owner.to_string(), others.len() as i64))
        .collect()
}

pub struct PerStudentPatronage {
    rows: Vec<PatronageRow>,
}

impl MentorshipSource for PerStudentPatronage {
    fn godfather_counts(&self) -> HashMap<String, i64> {
        distinct_counts(self.rows.iter().flat_map(|row| {
            row.godfathers
                .iter()
                .map(move |g| (row.login.as_str(), g.as_str()))
        }))
    }

    fn children_counts(&self) -> HashMap<String, i64> {
        distinct_counts(self.rows.iter().flat_map(|row| {
            row.children
                .iter()
                .map(move |c| (row.login.as_str(), c.as_str()))
        }))
    }
}

pub struct EdgePatronage {
    edges: Vec<PatronageEdge>,
}

impl MentorshipSource for EdgePatronage {
    fn godfather_counts(&self) -> HashMap<String, i64> {
        distinct_counts(
            self.edges
                .iter()
                .map(|e| (e.user_login.as_str(), e.godfather_login.as_str())),
        )
    }

    fn children_counts(&self) -> HashMap<String, i64> {
        distinct_counts(
            self.edges
                .iter()
                .map(|e| (e.godfather_login.as_str(), e.user_login.as_str())),
        )
    }
}
