//! Join aggregators: one strategy per derived sort key.
//!
//! Each aggregator correlates the filtered students with one secondary
//! collection and yields a value per login. [`aggregate`] turns those values
//! into a sorted, paginated page whose `total` counts the post-join
//! population, so pagination stays consistent when an aggregator drops
//! students (e.g. `cheat_count` only ranks students with at least one flag).

use std::cmp::Ordering;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::duration::DateWindow;
use crate::error::StoreError;
use crate::filter::StudentFilter;
use crate::models::{ProjectRecord, Student};
use crate::params::{DerivedKey, PageWindow, SortOrder};
use crate::store::RecordStore;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DerivedValue {
    Count(i64),
    Mean(f64),
}

impl DerivedValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            DerivedValue::Count(n) => *n as f64,
            DerivedValue::Mean(v) => *v,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.as_f64() == 0.0
    }

    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (DerivedValue::Count(a), DerivedValue::Count(b)) => a.cmp(b),
            _ => self.as_f64().total_cmp(&other.as_f64()),
        }
    }
}

pub type DerivedValues = HashMap<String, DerivedValue>;

/// Which project records count as a successful completion.
///
/// Source revisions disagree (`"success"`, `"finished"`, a `validated` flag),
/// so the vocabulary is configured per deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuccessVocabulary {
    Statuses(Vec<String>),
    ValidatedFlag,
}

impl Default for SuccessVocabulary {
    fn default() -> Self {
        SuccessVocabulary::Statuses(vec!["success".to_string()])
    }
}

impl SuccessVocabulary {
    pub fn is_success(&self, record: &ProjectRecord) -> bool {
        match self {
            SuccessVocabulary::Statuses(statuses) => statuses
                .iter()
                .any(|s| s.eq_ignore_ascii_case(record.status.trim())),
            SuccessVocabulary::ValidatedFlag => record.validated == Some(true),
        }
    }
}

impl FromStr for SuccessVocabulary {
    type Err = String;

    /// `validated` selects the boolean flag; anything else is a comma list.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim() == "validated" {
            return Ok(SuccessVocabulary::ValidatedFlag);
        }
        let statuses: Vec<String> = s
            .split(',')
            .map(|part| part.trim().to_lowercase())
            .filter(|part| !part.is_empty())
            .collect();
        if statuses.is_empty() {
            return Err("no success status given".to_string());
        }
        Ok(SuccessVocabulary::Statuses(statuses))
    }
}

#[async_trait]
pub trait JoinAggregator: Send + Sync {
    fn key(&self) -> DerivedKey;

    /// Students whose value is zero are left out of the ranking entirely.
    fn excludes_zero(&self) -> bool {
        false
    }

    fn zero(&self) -> DerivedValue {
        DerivedValue::Count(0)
    }

    /// Values for logins that have at least one joined record. Logins absent
    /// from the map take [`JoinAggregator::zero`].
    async fn derive(
        &self,
        store: &dyn RecordStore,
        filter: &StudentFilter,
    ) -> Result<DerivedValues, StoreError>;
}

fn count_by<'a>(logins: impl Iterator<Item = &'a str>) -> DerivedValues {
    let mut counts: HashMap<String, i64> = HashMap::new();
    for login in logins {
        *counts.entry(login.to_string()).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .map(|(login, n)| (login, DerivedValue::Count(n)))
        .collect()
}

fn counts_into_values(counts: HashMap<String, i64>) -> DerivedValues {
    counts
        .into_iter()
        .map(|(login, n)| (login, DerivedValue::Count(n)))
        .collect()
}

pub struct ProjectCount {
    pub vocabulary: SuccessVocabulary,
}

#[async_trait]
impl JoinAggregator for ProjectCount {
    fn key(&self) -> DerivedKey {
        DerivedKey::ProjectCount
    }

    async fn derive(
        &self,
        store: &dyn RecordStore,
        filter: &StudentFilter,
    ) -> Result<DerivedValues, StoreError> {
        let projects = store.projects(filter).await?;
        Ok(count_by(
            projects
                .iter()
                .filter(|p| self.vocabulary.is_success(p))
                .map(|p| p.login.as_str()),
        ))
    }
}

pub struct CheatCount;

#[async_trait]
impl JoinAggregator for CheatCount {
    fn key(&self) -> DerivedKey {
        DerivedKey::CheatCount
    }

    fn excludes_zero(&self) -> bool {
        true
    }

    async fn derive(
        &self,
        store: &dyn RecordStore,
        filter: &StudentFilter,
    ) -> Result<DerivedValues, StoreError> {
        let projects = store.projects(filter).await?;
        Ok(count_by(
            projects
                .iter()
                .filter(|p| p.is_cheat())
                .map(|p| p.login.as_str()),
        ))
    }
}

pub struct GodfatherCount;

#[async_trait]
impl JoinAggregator for GodfatherCount {
    fn key(&self) -> DerivedKey {
        DerivedKey::GodfatherCount
    }

    async fn derive(
        &self,
        store: &dyn RecordStore,
        filter: &StudentFilter,
    ) -> Result<DerivedValues, StoreError> {
        let source = store.patronage(filter).await?.into_source();
        Ok(counts_into_values(source.godfather_counts()))
    }
}

pub struct ChildrenCount;

#[async_trait]
impl JoinAggregator for ChildrenCount {
    fn key(&self) -> DerivedKey {
        DerivedKey::ChildrenCount
    }

    async fn derive(
        &self,
        store: &dyn RecordStore,
        filter: &StudentFilter,
    ) -> Result<DerivedValues, StoreError> {
        let source = store.patronage(filter).await?.into_source();
        Ok(counts_into_values(source.children_counts()))
    }
}

pub struct LogTime {
    pub window: DateWindow,
}

#[async_trait]
impl JoinAggregator for LogTime {
    fn key(&self) -> DerivedKey {
        DerivedKey::LogTime
    }

    async fn derive(
        &self,
        store: &dyn RecordStore,
        filter: &StudentFilter,
    ) -> Result<DerivedValues, StoreError> {
        let source = store.attendance(filter).await?.into_source();
        Ok(counts_into_values(source.seconds_by_login(self.window)))
    }
}

pub struct FeedbackCount;

#[async_trait]
impl JoinAggregator for FeedbackCount {
    fn key(&self) -> DerivedKey {
        DerivedKey::FeedbackCount
    }

    async fn derive(
        &self,
        store: &dyn RecordStore,
        filter: &StudentFilter,
    ) -> Result<DerivedValues, StoreError> {
        let feedbacks = store.feedbacks(filter).await?;
        Ok(count_by(feedbacks.iter().map(|f| f.evaluated_login.as_str())))
    }
}

pub struct AvgRating;

#[async_trait]
impl JoinAggregator for AvgRating {
    fn key(&self) -> DerivedKey {
        DerivedKey::AvgRating
    }

    fn zero(&self) -> DerivedValue {
        DerivedValue::Mean(0.0)
    }

    async fn derive(
        &self,
        store: &dyn RecordStore,
        filter: &StudentFilter,
    ) -> Result<DerivedValues, StoreError> {
        let feedbacks = store.feedbacks(filter).await?;
        let mut sums: HashMap<&str, (i64, i64)> = HashMap::new();
        for feedback in &feedbacks {
            if let Some(rating) = feedback.rating {
                let entry = sums.entry(feedback.evaluated_login.as_str()).or_insert((0, 0));
                entry.0 += i64::from(rating);
                entry.1 += 1;
            }
        }
        Ok(sums
            .into_iter()
            .map(|(login, (sum, n))| (login.to_string(), DerivedValue::Mean(sum as f64 / n as f64)))
            .collect())
    }
}

/// Maps each derived sort key to its aggregator.
#[derive(Clone)]
pub struct AggregatorRegistry {
    aggregators: HashMap<DerivedKey, Arc<dyn JoinAggregator>>,
}

impl AggregatorRegistry {
    pub fn empty() -> Self {
        Self {
            aggregators: HashMap::new(),
        }
    }

    /// Registry with the standard aggregator for every derived key.
    pub fn standard(vocabulary: SuccessVocabulary, log_time_window: DateWindow) -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(ProjectCount { vocabulary }));
        registry.register(Arc::new(CheatCount));
        registry.register(Arc::new(GodfatherCount));
        registry.register(Arc::new(ChildrenCount));
        registry.register(Arc::new(LogTime {
            window: log_time_window,
        }));
        registry.register(Arc::new(FeedbackCount));
        registry.register(Arc::new(AvgRating));
        registry
    }

    /// Replaces any aggregator already registered for the same key.
    pub fn register(&mut self, aggregator: Arc<dyn JoinAggregator>) {
        self.aggregators.insert(aggregator.key(), aggregator);
    }

    pub fn get(&self, key: DerivedKey) -> Option<Arc<dyn JoinAggregator>> {
        self.aggregators.get(&key).cloned()
    }
}

#[derive(Debug, Clone)]
pub struct Aggregated {
    pub rows: Vec<(Student, DerivedValue)>,
    pub total: u64,
    /// Set when the secondary join failed and every value fell back to zero.
    pub degraded: bool,
}

/// Runs the filtered student read and the join concurrently, then ranks.
///
/// A failing primary read is returned as is. A failing join degrades: every
/// student takes the aggregator's zero value and the page is still produced.
pub async fn aggregate(
    aggregator: &dyn JoinAggregator,
    store: &dyn RecordStore,
    filter: &StudentFilter,
    order: SortOrder,
    window: PageWindow,
) -> Result<Aggregated, StoreError> {
    let (students, derived) = tokio::join!(store.students(filter), aggregator.derive(store, filter));
    let students = students?;

    let (values, degraded) = match derived {
        Ok(values) => (values, false),
        Err(err) => {
            warn!(
                key = %aggregator.key(),
                error = %err,
                "join failed, derived values degraded to zero"
            );
            (DerivedValues::new(), true)
        }
    };
    debug!(
        key = %aggregator.key(),
        students = students.len(),
        joined = values.len(),
        "join complete"
    );

    let (rows, total) = rank_rows(
        students,
        &values,
        aggregator.zero(),
        aggregator.excludes_zero(),
        order,
        window,
    );
    Ok(Aggregated {
        rows,
        total,
        degraded,
    })
}

/// Attaches values, drops zero rows when `exclude_zero`, sorts by value then
/// login ascending, and slices the requested page.
pub fn rank_rows(
    students: Vec<Student>,
    values: &DerivedValues,
    zero: DerivedValue,
    exclude_zero: bool,
    order: SortOrder,
    window: PageWindow,
) -> (Vec<(Student, DerivedValue)>, u64) {
    let mut rows: Vec<(Student, DerivedValue)> = students
        .into_iter()
        .map(|student| {
            let value = values.get(&student.login).copied().unwrap_or(zero);
            (student, value)
        })
        .filter(|(_, value)| !(exclude_zero && value.is_zero()))
        .collect();

    rows.sort_by(|(a, va), (b, vb)| {
        let primary = match order {
            SortOrder::Asc => va.compare(vb),
            SortOrder::Desc => vb.compare(va),
        };
        primary.then_with(|| a.login.cmp(&b.login))
    });

    let total = rows.len() as u64;
    (window.slice(rows), total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn student(login: &str) -> Student {
        serde_json::from_value(serde_json::json!({
            "id": 1,
            "login": login,
            "campus_id": 1,
        }))
        .unwrap()
    }

    fn project(login: &str, score: i32, status: &str) -> ProjectRecord {
        ProjectRecord {
            login: login.to_string(),
            project: "libft".to_string(),
            date: chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            score,
            status: status.to_string(),
            validated: Some(status == "success"),
        }
    }

    #[test]
    fn vocabulary_parses_lists_and_flag() {
        assert_eq!(
            "success, Finished".parse::<SuccessVocabulary>().unwrap(),
            SuccessVocabulary::Statuses(vec!["success".into(), "finished".into()])
        );
        assert_eq!(
            "validated".parse::<SuccessVocabulary>().unwrap(),
            SuccessVocabulary::ValidatedFlag
        );
        assert!(" , ".parse::<SuccessVocabulary>().is_err());
    }

    #[test]
    fn vocabulary_decides_success() {
        let finished = project("a", 100, "finished");
        assert!(!SuccessVocabulary::default().is_success(&finished));
        assert!("finished".parse::<SuccessVocabulary>().unwrap().is_success(&finished));
        assert!(SuccessVocabulary::ValidatedFlag.is_success(&project("a", 100, "success")));
    }

    #[test]
    fn rank_rows_breaks_ties_by_login() {
        let students = vec![student("dave"), student("bob"), student("carol"), student("alice")];
        let values: DerivedValues = [
            ("dave".to_string(), DerivedValue::Count(2)),
            ("bob".to_string(), DerivedValue::Count(2)),
            ("carol".to_string(), DerivedValue::Count(5)),
        ]
        .into_iter()
        .collect();

        let (rows, total) = rank_rows(
            students,
            &values,
            DerivedValue::Count(0),
            false,
            SortOrder::Desc,
            PageWindow { skip: 0, limit: 10 },
        );
        let logins: Vec<_> = rows.iter().map(|(s, _)| s.login.as_str()).collect();
        assert_eq!(logins, ["carol", "bob", "dave", "alice"]);
        assert_eq!(total, 4);
    }

    #[test]
    fn rank_rows_total_counts_post_exclusion_population() {
        let students = vec![student("a"), student("b"), student("c")];
        let values: DerivedValues = [("b".to_string(), DerivedValue::Count(1))].into_iter().collect();
        let (rows, total) = rank_rows(
            students,
            &values,
            DerivedValue::Count(0),
            true,
            SortOrder::Asc,
            PageWindow { skip: 0, limit: 10 },
        );
        assert_eq!(total, 1);
        assert_eq!(rows[0].0.login, "b");
    }

    #[tokio::test]
    async fn cheat_count_excludes_clean_students() {
        let store = MemoryStore {
            students: vec![student("alice"), student("bob")],
            projects: vec![
                project("alice", 80, "success"),
                project("alice", -42, "fail"),
                project("bob", 100, "success"),
            ],
            ..Default::default()
        };
        let page = aggregate(
            &CheatCount,
            &store,
            &StudentFilter::default(),
            SortOrder::Desc,
            PageWindow::default(),
        )
        .await
        .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.rows[0].0.login, "alice");
        assert_eq!(page.rows[0].1, DerivedValue::Count(1));
        assert!(!page.degraded);
    }

    #[tokio::test]
    async fn avg_rating_keeps_unrated_students_at_zero() {
        let feedback = |from: &str, to: &str, rating: Option<i32>| crate::models::FeedbackRecord {
            evaluator_login: from.to_string(),
            evaluated_login: to.to_string(),
            rating,
            comment: None,
        };
        let store = MemoryStore {
            students: vec![student("alice"), student("bob"), student("carol")],
            feedbacks: vec![
                feedback("bob", "alice", Some(4)),
                feedback("carol", "alice", Some(3)),
                feedback("alice", "bob", None),
            ],
            ..Default::default()
        };
        let page = aggregate(
            &AvgRating,
            &store,
            &StudentFilter::default(),
            SortOrder::Desc,
            PageWindow::default(),
        )
        .await
        .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.rows[0].1, DerivedValue::Mean(3.5));
        assert_eq!(page.rows[1].1, DerivedValue::Mean(0.0));
        assert_eq!(page.rows[1].0.login, "bob");
    }

    #[tokio::test]
    async fn missing_collection_degrades_to_zero() {
        let store = MemoryStore {
            students: vec![student("alice"), student("bob")],
            ..Default::default()
        };
        let page = aggregate(
            &ChildrenCount,
            &store,
            &StudentFilter::default(),
            SortOrder::Desc,
            PageWindow::default(),
        )
        .await
        .unwrap();
        assert!(page.degraded);
        assert_eq!(page.total, 2);
        assert!(page.rows.iter().all(|(_, v)| *v == DerivedValue::Count(0)));
    }

    #[test]
    fn standard_registry_covers_every_key() {
        let registry = AggregatorRegistry::standard(SuccessVocabulary::default(), DateWindow::all());
        for key in DerivedKey::ALL {
            assert_eq!(registry.get(key).map(|a| a.key()), Some(key));
        }
        assert!(AggregatorRegistry::empty().get(DerivedKey::LogTime).is_none());
    }
}
