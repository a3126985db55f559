//! Student ranking and aggregation for a 42 campus analytics backend.
//!
//! A ranking request is validated into a [`params::RankingRequest`], turned
//! into a [`filter::StudentFilter`], and dispatched by [`rank::Ranker`]
//! either straight to the record store (stored columns) or through the
//! [`aggregate::JoinAggregator`] registered for a derived key. Results are
//! shaped by [`response::RankingResponse`].

pub mod aggregate;
pub mod attendance;
pub mod config;
pub mod duration;
pub mod error;
pub mod filter;
pub mod logging;
pub mod mentorship;
pub mod models;
pub mod output;
pub mod params;
pub mod rank;
pub mod report;
pub mod response;
pub mod store;

pub use error::{RankError, StoreError};
pub use params::{RankingParams, RankingRequest, SortKey, SortOrder};
pub use rank::{Ranker, RankingSettings};
pub use response::RankingResponse;
