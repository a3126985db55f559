use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregate::{aggregate, AggregatorRegistry, DerivedValue, SuccessVocabulary};
use crate::duration::DateWindow;
use crate::error::RankError;
use crate::filter::StudentFilter;
use crate::models::Student;
use crate::params::{PageWindow, RankingParams, RankingRequest, RawSortKey, SortKey, SortOrder};
use crate::response::RankingResponse;
use crate::store::RecordStore;

pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub struct RankingSettings {
    pub success_vocabulary: SuccessVocabulary,
    pub log_time_window: DateWindow,
    pub query_timeout: Duration,
}

impl Default for RankingSettings {
    fn default() -> Self {
        Self {
            success_vocabulary: SuccessVocabulary::default(),
            log_time_window: DateWindow::all(),
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RankedRow {
    pub student: Student,
    pub derived: Option<DerivedValue>,
}

#[derive(Debug, Clone)]
pub struct RankedPage {
    pub rows: Vec<RankedRow>,
    /// Size of the filtered (and, for derived keys, joined) population.
    pub total: u64,
    pub window: PageWindow,
    pub sort: SortKey,
    pub degraded: bool,
}

/// Picks the ranking strategy for a sort key and runs it under a time budget.
pub struct Ranker {
    store: Arc<dyn RecordStore>,
    registry: AggregatorRegistry,
    timeout: Duration,
}

impl Ranker {
    pub fn new(store: Arc<dyn RecordStore>, settings: &RankingSettings) -> Self {
        Self {
            store,
            registry: AggregatorRegistry::standard(
                settings.success_vocabulary.clone(),
                settings.log_time_window,
            ),
            timeout: settings.query_timeout,
        }
    }

    pub fn with_registry(
        store: Arc<dyn RecordStore>,
        registry: AggregatorRegistry,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            timeout,
        }
    }

    /// Validates raw parameters, ranks, and shapes the response.
    pub async fn respond(&self, params: &RankingParams) -> Result<RankingResponse, RankError> {
        let request = RankingRequest::from_params(params)?;
        let page = self.rank(&request).await?;
        Ok(RankingResponse::from_page(page))
    }

    #[tracing::instrument(
        skip(self, request),
        fields(
            request_id = %Uuid::new_v4(),
            sort = %request.sort,
            order = ?request.order,
            skip = request.window.skip,
            limit = request.window.limit,
        )
    )]
    pub async fn rank(&self, request: &RankingRequest) -> Result<RankedPage, RankError> {
        let filter = StudentFilter::from_request(request);
        let budget_ms = self.timeout.as_millis() as u64;

        let page = match tokio::time::timeout(self.timeout, self.dispatch(request, &filter)).await {
            Ok(result) => result.map_err(|err| match err {
                RankError::QueryTimeout(0) => RankError::QueryTimeout(budget_ms),
                other => other,
            })?,
            Err(_) => {
                warn!(budget_ms, "ranking exceeded its time budget");
                return Err(RankError::QueryTimeout(budget_ms));
            }
        };

        info!(
            total = page.total,
            returned = page.rows.len(),
            degraded = page.degraded,
            "ranking complete"
        );
        Ok(page)
    }

    async fn dispatch(
        &self,
        request: &RankingRequest,
        filter: &StudentFilter,
    ) -> Result<RankedPage, RankError> {
        match request.sort {
            SortKey::Raw(key) => self.rank_raw(key, request.order, request.window, filter).await,
            SortKey::Derived(key) => {
                let aggregator = self
                    .registry
                    .get(key)
                    .ok_or_else(|| RankError::JoinFailure(key.to_string()))?;
                let aggregated = aggregate(
                    aggregator.as_ref(),
                    self.store.as_ref(),
                    filter,
                    request.order,
                    request.window,
                )
                .await?;
                Ok(RankedPage {
                    rows: aggregated
                        .rows
                        .into_iter()
                        .map(|(student, value)| RankedRow {
                            student,
                            derived: Some(value),
                        })
                        .collect(),
                    total: aggregated.total,
                    window: request.window,
                    sort: request.sort,
                    degraded: aggregated.degraded,
                })
            }
        }
    }

    async fn rank_raw(
        &self,
        key: RawSortKey,
        order: SortOrder,
        window: PageWindow,
        filter: &StudentFilter,
    ) -> Result<RankedPage, RankError> {
        let (students, total) = tokio::try_join!(
            self.store.students_page(filter, key, order, window),
            self.store.count_students(filter),
        )?;
        Ok(RankedPage {
            rows: students
                .into_iter()
                .map(|student| RankedRow {
                    student,
                    derived: None,
                })
                .collect(),
            total,
            window,
            sort: SortKey::Raw(key),
            degraded: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::DerivedKey;
    use crate::store::MemoryStore;

    fn student(login: &str, wallet: i32) -> Student {
        serde_json::from_value(serde_json::json!({
            "id": 1,
            "login": login,
            "campus_id": 1,
            "wallet": wallet,
            "active": true,
        }))
        .unwrap()
    }

    fn ranker(store: MemoryStore) -> Ranker {
        Ranker::new(Arc::new(store), &RankingSettings::default())
    }

    #[tokio::test]
    async fn raw_keys_sort_and_count_without_join() {
        let store = MemoryStore {
            students: vec![student("bob", 10), student("alice", 30), student("carol", 10)],
            ..Default::default()
        };
        let request = RankingRequest {
            sort: SortKey::Raw(RawSortKey::Wallet),
            order: SortOrder::Desc,
            window: PageWindow { skip: 1, limit: 1 },
            ..Default::default()
        };
        let page = ranker(store).rank(&request).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.rows.len(), 1);
        assert_eq!(page.rows[0].student.login, "bob");
        assert!(page.rows[0].derived.is_none());
    }

    #[tokio::test]
    async fn unregistered_key_is_a_join_failure() {
        let ranker = Ranker::with_registry(
            Arc::new(MemoryStore::default()),
            AggregatorRegistry::empty(),
            DEFAULT_QUERY_TIMEOUT,
        );
        let request = RankingRequest {
            sort: SortKey::Derived(DerivedKey::FeedbackCount),
            ..Default::default()
        };
        let err = ranker.rank(&request).await.unwrap_err();
        assert!(matches!(err, RankError::JoinFailure(key) if key == "feedback_count"));
    }

    #[tokio::test]
    async fn slow_store_times_out() {
        let store = MemoryStore {
            students: vec![student("alice", 1)],
            slow_read: Some(Duration::from_millis(200)),
            ..Default::default()
        };
        let ranker = Ranker::with_registry(
            Arc::new(store),
            AggregatorRegistry::empty(),
            Duration::from_millis(20),
        );
        let err = ranker.rank(&RankingRequest::default()).await.unwrap_err();
        assert!(matches!(err, RankError::QueryTimeout(20)));
        assert_eq!(err.status_code(), 504);
    }

    #[tokio::test]
    async fn respond_rejects_bad_sort_before_reading() {
        let params = RankingParams {
            sort: Some("shoe_size".into()),
            ..Default::default()
        };
        let err = ranker(MemoryStore::default()).respond(&params).await.unwrap_err();
        assert_eq!(err.to_body().error, "InvalidSortKey");
    }
}
