use thiserror::Error;

use crate::response::ErrorBody;

/// Failures raised by a [`RecordStore`](crate::store::RecordStore) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Unavailable(String),

    #[error("store query exceeded its execution budget")]
    Timeout,

    #[error("collection `{0}` is not present in this store")]
    MissingCollection(String),

    #[error("query failed: {0}")]
    Query(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => StoreError::Unavailable(err.to_string()),
            sqlx::Error::Database(db) => match db.code().as_deref() {
                // query_canceled, raised by statement_timeout
                Some("57014") => StoreError::Timeout,
                // undefined_table
                Some("42P01") => StoreError::MissingCollection(db.message().to_string()),
                _ => StoreError::Query(err.to_string()),
            },
            _ => StoreError::Query(err.to_string()),
        }
    }
}

/// Client-visible ranking failures.
#[derive(Debug, Error)]
pub enum RankError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("unknown sort key `{0}`")]
    InvalidSortKey(String),

    #[error("no join aggregator registered for `{0}`")]
    JoinFailure(String),

    #[error("ranking query exceeded {0} ms")]
    QueryTimeout(u64),

    #[error("record store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("record store error: {0}")]
    Store(String),
}

impl RankError {
    pub fn status_code(&self) -> u16 {
        match self {
            RankError::InvalidArgument(_) | RankError::InvalidSortKey(_) => 400,
            RankError::JoinFailure(_) | RankError::Store(_) => 500,
            RankError::QueryTimeout(_) => 504,
            RankError::StoreUnavailable(_) => 503,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            RankError::InvalidArgument(_) => "InvalidArgument",
            RankError::InvalidSortKey(_) => "InvalidSortKey",
            RankError::JoinFailure(_) => "JoinFailure",
            RankError::QueryTimeout(_) => "QueryTimeout",
            RankError::StoreUnavailable(_) => "StoreUnavailable",
            RankError::Store(_) => "StoreError",
        }
    }

    /// Timeouts and outages can be retried as a whole request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RankError::QueryTimeout(_) | RankError::StoreUnavailable(_)
        )
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.error_code().to_string(),
            message: self.to_string(),
        }
    }
}

impl From<StoreError> for RankError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(reason) => RankError::StoreUnavailable(reason),
            StoreError::Timeout => RankError::QueryTimeout(0),
            StoreError::MissingCollection(name) => {
                RankError::Store(format!("collection `{name}` is missing"))
            }
            StoreError::Query(reason) => RankError::Store(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_bad_request() {
        assert_eq!(RankError::InvalidArgument("x".into()).status_code(), 400);
        assert_eq!(RankError::InvalidSortKey("x".into()).status_code(), 400);
        assert!(!RankError::InvalidSortKey("x".into()).is_retryable());
    }

    #[test]
    fn store_failures_keep_their_category() {
        let err: RankError = StoreError::Unavailable("refused".into()).into();
        assert_eq!(err.status_code(), 503);
        assert!(err.is_retryable());

        let err: RankError = StoreError::Timeout.into();
        assert_eq!(err.error_code(), "QueryTimeout");
    }

    #[test]
    fn error_body_carries_code_and_message() {
        let body = RankError::InvalidSortKey("height".into()).to_body();
        assert_eq!(body.error, "InvalidSortKey");
        assert_eq!(body.message, "unknown sort key `height`");
    }
}
