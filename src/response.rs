//! External response shape shared by every ranking strategy.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::aggregate::DerivedValue;
use crate::models::Student;
use crate::rank::RankedPage;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentRow {
    pub id: i64,
    pub login: String,
    pub first_name: String,
    pub last_name: String,
    pub displayname: String,
    pub email: String,
    pub campus_id: i32,
    pub level: f64,
    pub wallet: i32,
    pub correction_point: i32,
    pub grade: Option<String>,
    pub pool_month: Option<String>,
    pub pool_year: Option<i32>,
    pub active: bool,
    pub alumni: bool,
    pub staff: bool,
    pub blackholed: bool,
    pub freeze: bool,
    pub sinker: bool,
    pub test: bool,
    pub piscine: bool,
    /// Zero or one entry, named after the derived sort key.
    #[serde(flatten)]
    pub derived: BTreeMap<&'static str, DerivedValue>,
}

impl StudentRow {
    pub fn new(student: Student, derived: Option<(&'static str, DerivedValue)>) -> Self {
        Self {
            id: student.id,
            login: student.login,
            first_name: student.first_name,
            last_name: student.last_name,
            displayname: student.displayname,
            email: student.email,
            campus_id: student.campus_id,
            level: student.level,
            wallet: student.wallet,
            correction_point: student.correction_point,
            grade: student.grade,
            pool_month: student.pool_month,
            pool_year: student.pool_year,
            active: student.active,
            alumni: student.alumni,
            staff: student.staff,
            blackholed: student.blackholed,
            freeze: student.freeze,
            sinker: student.sinker,
            test: student.test,
            piscine: student.piscine,
            derived: derived.into_iter().collect(),
        }
    }

    pub fn derived_value(&self) -> Option<DerivedValue> {
        self.derived.values().next().copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub total: u64,
    pub page: u64,
    pub limit: u32,
    #[serde(rename = "totalPages")]
    pub total_pages: u64,
}

impl Pagination {
    pub fn new(total: u64, page: u64, limit: u32) -> Self {
        Self {
            total,
            page,
            limit,
            total_pages: total.div_ceil(u64::from(limit.max(1))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingResponse {
    pub students: Vec<StudentRow>,
    pub pagination: Pagination,
}

impl RankingResponse {
    pub fn from_page(page: RankedPage) -> Self {
        let field = page.sort.derived().map(|key| key.field_name());
        let students = page
            .rows
            .into_iter()
            .map(|row| {
                let derived = field.zip(row.derived);
                StudentRow::new(row.student, derived)
            })
            .collect();
        Self {
            students,
            pagination: Pagination::new(page.total, page.window.page(), page.window.limit),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}
