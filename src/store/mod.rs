//! Read interface over the campus record collections.

use std::cmp::Ordering;

use async_trait::async_trait;

use crate::attendance::AttendanceRecords;
use crate::error::StoreError;
use crate::filter::StudentFilter;
use crate::mentorship::PatronageRecords;
use crate::models::{FeedbackRecord, ProjectRecord, Student};
use crate::params::{PageWindow, RawSortKey, SortOrder};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Secondary reads (`projects`, `feedbacks`, `patronage`, `attendance`) are
/// restricted to records that relate to a student matched by the filter.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Filtered students sorted by a stored column, login ascending on ties.
    async fn students_page(
        &self,
        filter: &StudentFilter,
        sort: RawSortKey,
        order: SortOrder,
        window: PageWindow,
    ) -> Result<Vec<Student>, StoreError>;

    async fn count_students(&self, filter: &StudentFilter) -> Result<u64, StoreError>;

    /// Every filtered student, unordered.
    async fn students(&self, filter: &StudentFilter) -> Result<Vec<Student>, StoreError>;

    async fn projects(&self, filter: &StudentFilter) -> Result<Vec<ProjectRecord>, StoreError>;

    /// Feedback where a filtered student is the evaluated party.
    async fn feedbacks(&self, filter: &StudentFilter) -> Result<Vec<FeedbackRecord>, StoreError>;

    async fn patronage(&self, filter: &StudentFilter) -> Result<PatronageRecords, StoreError>;

    async fn attendance(&self, filter: &StudentFilter) -> Result<AttendanceRecords, StoreError>;
}

/// Ordering used for raw sort keys. Ties always fall back to login ascending.
pub fn compare_students(a: &Student, b: &Student, sort: RawSortKey, order: SortOrder) -> Ordering {
    let primary = match sort {
        RawSortKey::Login => Ordering::Equal,
        RawSortKey::Level => a.level.total_cmp(&b.level),
        RawSortKey::Wallet => a.wallet.cmp(&b.wallet),
        RawSortKey::CorrectionPoint => a.correction_point.cmp(&b.correction_point),
    };
    let primary = match order {
        SortOrder::Asc => primary,
        SortOrder::Desc => primary.reverse(),
    };
    let login = match (sort, order) {
        (RawSortKey::Login, SortOrder::Desc) => b.login.cmp(&a.login),
        _ => a.login.cmp(&b.login),
    };
    primary.then(login)
}
