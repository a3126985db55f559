//! Typed ranking requests and the validation that produces them.
//!
//! Raw parameters arrive as strings (query string, CLI flags, JSON). Everything
//! here is checked again even though callers are expected to validate first.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RankError;

pub const MAX_CAMPUS_ID: u32 = 999_999;
pub const MAX_SEARCH_LEN: usize = 100;
pub const MIN_POOL_YEAR: i32 = 2000;
pub const MAX_POOL_YEAR: i32 = 2100;
pub const DEFAULT_LIMIT: u32 = 50;
pub const MAX_LIMIT: u32 = 500;
pub const MAX_SKIP: u64 = 100_000;

const MONTH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawSortKey {
    Login,
    Level,
    Wallet,
    CorrectionPoint,
}

impl RawSortKey {
    pub fn column(&self) -> &'static str {
        match self {
            RawSortKey::Login => "login",
            RawSortKey::Level => "level",
            RawSortKey::Wallet => "wallet",
            RawSortKey::CorrectionPoint => "correction_point",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivedKey {
    ProjectCount,
    CheatCount,
    GodfatherCount,
    ChildrenCount,
    LogTime,
    FeedbackCount,
    AvgRating,
}

impl DerivedKey {
    pub const ALL: [DerivedKey; 7] = [
        DerivedKey::ProjectCount,
        DerivedKey::CheatCount,
        DerivedKey::GodfatherCount,
        DerivedKey::ChildrenCount,
        DerivedKey::LogTime,
        DerivedKey::FeedbackCount,
        DerivedKey::AvgRating,
    ];

    /// Name of the extra field carried by each response row.
    pub fn field_name(&self) -> &'static str {
        match self {
            DerivedKey::ProjectCount => "project_count",
            DerivedKey::CheatCount => "cheat_count",
            DerivedKey::GodfatherCount => "godfather_count",
            DerivedKey::ChildrenCount => "children_count",
            DerivedKey::LogTime => "log_time",
            DerivedKey::FeedbackCount => "feedback_count",
            DerivedKey::AvgRating => "avg_rating",
        }
    }
}

impl fmt::Display for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortKey {
    Raw(RawSortKey),
    Derived(DerivedKey),
}

impl Default for SortKey {
    fn default() -> Self {
        SortKey::Raw(RawSortKey::Login)
    }
}

impl SortKey {
    pub fn name(&self) -> &'static str {
        match self {
            SortKey::Raw(key) => key.column(),
            SortKey::Derived(key) => key.field_name(),
        }
    }

    pub fn derived(&self) -> Option<DerivedKey> {
        match self {
            SortKey::Raw(_) => None,
            SortKey::Derived(key) => Some(*key),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SortKey {
    type Err = RankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = match s {
            "login" => SortKey::Raw(RawSortKey::Login),
            "level" => SortKey::Raw(RawSortKey::Level),
            "wallet" => SortKey::Raw(RawSortKey::Wallet),
            "correction_point" => SortKey::Raw(RawSortKey::CorrectionPoint),
            other => DerivedKey::ALL
                .into_iter()
                .find(|key| key.field_name() == other)
                .map(SortKey::Derived)
                .ok_or_else(|| RankError::InvalidSortKey(other.to_string()))?,
        };
        Ok(key)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = RankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(RankError::InvalidArgument(format!(
                "order must be `asc` or `desc`, got `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudentStatus {
    Active,
    Inactive,
    Staff,
    Alumni,
    Blackholed,
    Sinker,
    Freeze,
    Test,
    Piscine,
    Cadet,
    Transcender,
}

impl StudentStatus {
    pub const ALL: [StudentStatus; 11] = [
        StudentStatus::Active,
        StudentStatus::Inactive,
        StudentStatus::Staff,
        StudentStatus::Alumni,
        StudentStatus::Blackholed,
        StudentStatus::Sinker,
        StudentStatus::Freeze,
        StudentStatus::Test,
        StudentStatus::Piscine,
        StudentStatus::Cadet,
        StudentStatus::Transcender,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StudentStatus::Active => "active",
            StudentStatus::Inactive => "inactive",
            StudentStatus::Staff => "staff",
            StudentStatus::Alumni => "alumni",
            StudentStatus::Blackholed => "blackholed",
            StudentStatus::Sinker => "sinker",
            StudentStatus::Freeze => "freeze",
            StudentStatus::Test => "test",
            StudentStatus::Piscine => "piscine",
            StudentStatus::Cadet => "cadet",
            StudentStatus::Transcender => "transcender",
        }
    }

    /// Lenient lookup: `None` for anything outside the enumeration.
    pub fn lookup(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.name() == s)
    }
}

impl FromStr for StudentStatus {
    type Err = RankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::lookup(s)
            .ok_or_else(|| RankError::InvalidArgument(format!("unknown status `{s}`")))
    }
}

/// Intake cohort. `month` is stored as a lowercase English month name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pool {
    pub month: String,
    pub year: i32,
}

impl Pool {
    pub fn new(month: &str, year: &str) -> Result<Self, RankError> {
        Ok(Self {
            month: parse_month(month)?,
            year: parse_year(year)?,
        })
    }
}

impl FromStr for Pool {
    type Err = RankError;

    /// Parses a combined `month-year` token such as `march-2024` or `3-2024`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (month, year) = s.rsplit_once('-').ok_or_else(|| {
            RankError::InvalidArgument(format!("pool must look like `month-year`, got `{s}`"))
        })?;
        Pool::new(month, year)
    }
}

fn parse_month(raw: &str) -> Result<String, RankError> {
    let raw = raw.trim();
    if let Some(name) = MONTH_NAMES.iter().find(|name| **name == raw) {
        return Ok(name.to_string());
    }
    let numeric = (1..=2).contains(&raw.len()) && raw.bytes().all(|b| b.is_ascii_digit());
    match raw.parse::<usize>() {
        Ok(n) if numeric && (1..=12).contains(&n) => Ok(MONTH_NAMES[n - 1].to_string()),
        _ => Err(RankError::InvalidArgument(format!(
            "pool month `{raw}` is not a month name or number"
        ))),
    }
}

fn parse_year(raw: &str) -> Result<i32, RankError> {
    match raw.trim().parse::<i32>() {
        Ok(year) if (MIN_POOL_YEAR..=MAX_POOL_YEAR).contains(&year) => Ok(year),
        _ => Err(RankError::InvalidArgument(format!(
            "pool year must be within [{MIN_POOL_YEAR}, {MAX_POOL_YEAR}], got `{raw}`"
        ))),
    }
}

/// Keeps `[A-Za-z0-9 ._-]`, trims, and truncates to [`MAX_SEARCH_LEN`].
pub fn sanitize_search(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '.' | '_' | '-'))
        .take(MAX_SEARCH_LEN)
        .collect();
    let cleaned = cleaned.trim();
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}

/// Offset/limit pair after clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub skip: u64,
    pub limit: u32,
}

impl Default for PageWindow {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl PageWindow {
    /// 1-based page containing the first returned row. When `skip` is not a
    /// multiple of `limit` the rows start inside that page, so row positions
    /// must come from `skip`, not from `page`.
    pub fn page(&self) -> u64 {
        self.skip / u64::from(self.limit) + 1
    }

    pub fn slice<T>(&self, items: Vec<T>) -> Vec<T> {
        let skip = usize::try_from(self.skip).unwrap_or(usize::MAX);
        items
            .into_iter()
            .skip(skip)
            .take(self.limit as usize)
            .collect()
    }
}

/// Raw, unvalidated ranking parameters as they arrive from a query string.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingParams {
    pub campus_id: Option<String>,
    pub search: Option<String>,
    pub pool: Option<String>,
    pub pool_month: Option<String>,
    pub pool_year: Option<String>,
    pub status: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub limit: Option<String>,
    pub page: Option<String>,
    pub skip: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankingRequest {
    pub campus_id: Option<u32>,
    pub pool: Option<Pool>,
    pub search: Option<String>,
    pub status: Option<StudentStatus>,
    pub sort: SortKey,
    pub order: SortOrder,
    pub window: PageWindow,
}

impl RankingRequest {
    pub fn from_params(params: &RankingParams) -> Result<Self, RankError> {
        Ok(Self {
            campus_id: parse_campus(params.campus_id.as_deref())?,
            pool: parse_pool(params)?,
            search: params.search.as_deref().and_then(sanitize_search),
            status: non_empty(params.status.as_deref())
                .map(str::parse)
                .transpose()?,
            sort: non_empty(params.sort.as_deref())
                .map(str::parse)
                .transpose()?
                .unwrap_or_default(),
            order: non_empty(params.order.as_deref())
                .map(str::parse)
                .transpose()?
                .unwrap_or_default(),
            window: parse_window(params)?,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_campus(raw: Option<&str>) -> Result<Option<u32>, RankError> {
    match non_empty(raw) {
        None | Some("all") => Ok(None),
        Some(value) => match value.parse::<u32>() {
            Ok(id) if id <= MAX_CAMPUS_ID => Ok(Some(id)),
            _ => Err(RankError::InvalidArgument(format!(
                "campusId must be an integer in [0, {MAX_CAMPUS_ID}] or `all`, got `{value}`"
            ))),
        },
    }
}

fn parse_pool(params: &RankingParams) -> Result<Option<Pool>, RankError> {
    if let Some(token) = non_empty(params.pool.as_deref()) {
        return token.parse().map(Some);
    }
    match (
        non_empty(params.pool_month.as_deref()),
        non_empty(params.pool_year.as_deref()),
    ) {
        (Some(month), Some(year)) => Pool::new(month, year).map(Some),
        (None, None) => Ok(None),
        _ => Err(RankError::InvalidArgument(
            "poolMonth and poolYear must be provided together".to_string(),
        )),
    }
}

fn parse_window(params: &RankingParams) -> Result<PageWindow, RankError> {
    let limit = match non_empty(params.limit.as_deref()) {
        None => DEFAULT_LIMIT,
        Some(raw) => raw
            .parse::<i64>()
            .map_err(|_| RankError::InvalidArgument(format!("limit `{raw}` is not an integer")))?
            .clamp(1, i64::from(MAX_LIMIT)) as u32,
    };

    if let Some(raw) = non_empty(params.skip.as_deref()) {
        let skip = raw
            .parse::<i64>()
            .map_err(|_| RankError::InvalidArgument(format!("skip `{raw}` is not an integer")))?;
        if skip > MAX_SKIP as i64 {
            return Err(RankError::InvalidArgument(format!(
                "skip must not exceed {MAX_SKIP}"
            )));
        }
        return Ok(PageWindow {
            skip: skip.max(0) as u64,
            limit,
        });
    }

    let page = match non_empty(params.page.as_deref()) {
        None => 1,
        Some(raw) => raw
            .parse::<i64>()
            .map_err(|_| RankError::InvalidArgument(format!("page `{raw}` is not an integer")))?
            .max(1) as u64,
    };
    let skip = (page - 1).saturating_mul(u64::from(limit));
    if skip > MAX_SKIP {
        return Err(RankError::InvalidArgument(format!(
            "page {page} reaches past the maximum offset of {MAX_SKIP}"
        )));
    }
    Ok(PageWindow { skip, limit })
}
