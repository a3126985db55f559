use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;

use super::{compare_students, RecordStore};
use crate::attendance::AttendanceRecords;
use crate::error::StoreError;
use crate::filter::StudentFilter;
use crate::mentorship::PatronageRecords;
use crate::models::{FeedbackRecord, ProjectRecord, Student};
use crate::params::{PageWindow, RawSortKey, SortOrder};

/// Snapshot of every collection held in memory.
///
/// `patronage` and `attendance` are optional: a snapshot without them behaves
/// like a store where those collections do not exist.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryStore {
    #[serde(default)]
    pub students: Vec<Student>,
    #[serde(default)]
    pub projects: Vec<ProjectRecord>,
    #[serde(default)]
    pub feedbacks: Vec<FeedbackRecord>,
    #[serde(default)]
    pub patronage: Option<PatronageRecords>,
    #[serde(default)]
    pub attendance: Option<AttendanceRecords>,
    /// Delay applied to every read.
    #[serde(skip)]
    pub slow_read: Option<Duration>,
}

impl MemoryStore {
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read fixture {}", path.display()))?;
        let store = serde_json::from_str(&content)
            .with_context(|| format!("fixture {} is not a valid snapshot", path.display()))?;
        Ok(store)
    }

    async fn pause(&self) {
        if let Some(delay) = self.slow_read {
            tokio::time::sleep(delay).await;
        }
    }

    fn filtered(&self, filter: &StudentFilter) -> Vec<&Student> {
        self.students.iter().filter(|s| filter.matches(s)).collect()
    }

    fn logins(&self, filter: &StudentFilter) -> HashSet<&str> {
        self.filtered(filter)
            .into_iter()
            .map(|s| s.login.as_str())
            .collect()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn students_page(
        &self,
        filter: &StudentFilter,
        sort: RawSortKey,
        order: SortOrder,
        window: PageWindow,
    ) -> Result<Vec<Student>, StoreError> {
        self.pause().await;
        let mut students: Vec<Student> = self.filtered(filter).into_iter().cloned().collect();
        students.sort_by(|a, b| compare_students(a, b, sort, order));
        Ok(window.slice(students))
    }

    async fn count_students(&self, filter: &StudentFilter) -> Result<u64, StoreError> {
        self.pause().await;
        Ok(self.filtered(filter).len() as u64)
    }

    async fn students(&self, filter: &StudentFilter) -> Result<Vec<Student>, StoreError> {
        self.pause().await;
        Ok(self.filtered(filter).into_iter().cloned().collect())
    }

    async fn projects(&self, filter: &StudentFilter) -> Result<Vec<ProjectRecord>, StoreError> {
        self.pause().await;
        let logins = self.logins(filter);
        Ok(self
            .projects
            .iter()
            .filter(|p| logins.contains(p.login.as_str()))
            .cloned()
            .collect())
    }

    async fn feedbacks(&self, filter: &StudentFilter) -> Result<Vec<FeedbackRecord>, StoreError> {
        self.pause().await;
        let logins = self.logins(filter);
        Ok(self
            .feedbacks
            .iter()
            .filter(|f| logins.contains(f.evaluated_login.as_str()))
            .cloned()
            .collect())
    }

    async fn patronage(&self, filter: &StudentFilter) -> Result<PatronageRecords, StoreError> {
        self.pause().await;
        let mut records = self
            .patronage
            .clone()
            .ok_or_else(|| StoreError::MissingCollection("patronage".to_string()))?;
        let logins = self.logins(filter);
        records.retain_logins(|login| logins.contains(login));
        Ok(records)
    }

    async fn attendance(&self, filter: &StudentFilter) -> Result<AttendanceRecords, StoreError> {
        self.pause().await;
        let mut records = self
            .attendance
            .clone()
            .ok_or_else(|| StoreError::MissingCollection("locations".to_string()))?;
        let logins = self.logins(filter);
        records.retain_logins(|login| logins.contains(login));
        Ok(records)
    }
}
