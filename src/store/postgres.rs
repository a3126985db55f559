use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, info};

use super::RecordStore;
use crate::attendance::AttendanceRecords;
use crate::error::StoreError;
use crate::filter::StudentFilter;
use crate::mentorship::PatronageRecords;
use crate::models::{
    FeedbackRecord, LocationSession, LocationStats, MonthEntry, MonthMap, PatronageEdge,
    PatronageRow, ProjectRecord, Student,
};
use crate::params::{PageWindow, RawSortKey, SortOrder};

const STUDENT_COLUMNS: &str = "s.id, s.login, s.first_name, s.last_name, s.displayname, \
     s.email, s.campus_id, s.level, s.wallet, s.correction_point, s.grade, s.pool_month, \
     s.pool_year, s.active, s.alumni, s.staff, s.blackholed, s.freeze, s.sinker, s.test, \
     s.piscine";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatronageEncoding {
    PerStudent,
    Edges,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceEncoding {
    MonthMap,
    Intervals,
}

/// Postgres-backed store over the `campus` schema.
///
/// Which patronage and attendance tables exist is checked once at connect
/// time; a missing collection surfaces as [`StoreError::MissingCollection`].
pub struct PgStore {
    pool: PgPool,
    patronage: Option<PatronageEncoding>,
    attendance: Option<AttendanceEncoding>,
}

#[derive(FromRow)]
struct LocationStatsRow {
    login: String,
    months: Json<MonthMap>,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: PgPool) -> Result<Self, StoreError> {
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT table_name::text FROM information_schema.tables \
             WHERE table_schema = 'campus' AND table_name = ANY($1)",
        )
        .bind(vec!["patronages", "patronage_edges", "location_stats", "locations"])
        .fetch_all(&pool)
        .await?;
        let has = |name: &str| tables.iter().any(|t| t == name);

        let patronage = if has("patronages") {
            Some(PatronageEncoding::PerStudent)
        } else if has("patronage_edges") {
            Some(PatronageEncoding::Edges)
        } else {
            None
        };
        let attendance = if has("location_stats") {
            Some(AttendanceEncoding::MonthMap)
        } else if has("locations") {
            Some(AttendanceEncoding::Intervals)
        } else {
            None
        };
        info!(?patronage, ?attendance, "record store encodings detected");

        Ok(Self {
            pool,
            patronage,
            attendance,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let students = vec![
        ("alice", "Alice", "Martin", 1, 7.42, 120, 4, "Cadet", "march", true, false),
        ("bob", "Bob", "Durand", 1, 3.10, 35, 2, "Cadet", "march", true, false),
        ("carol", "Carol", "Nguyen", 1, 11.05, 410, 9, "Transcender", "july", true, true),
        ("dave", "Dave", "Moreau", 2, 0.0, 0, 0, "Pisciner", "july", false, false),
    ];

    for (i, (login, first, last, campus, level, wallet, points, grade, month, active, alumni)) in
        students.into_iter().enumerate()
    {
        sqlx::query(
            r#"
            INSERT INTO campus.students
            (id, login, first_name, last_name, displayname, email, campus_id, level, wallet,
             correction_point, grade, pool_month, pool_year, active, alumni)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 2024, $13, $14)
            ON CONFLICT (login) DO UPDATE
            SET level = EXCLUDED.level, wallet = EXCLUDED.wallet,
                correction_point = EXCLUDED.correction_point, grade = EXCLUDED.grade,
                active = EXCLUDED.active, alumni = EXCLUDED.alumni
            "#,
        )
        .bind(1000 + i as i64)
        .bind(login)
        .bind(first)
        .bind(last)
        .bind(format!("{first} {last}"))
        .bind(format!("{login}@student.42.fr"))
        .bind(campus)
        .bind(level)
        .bind(wallet)
        .bind(points)
        .bind(grade)
        .bind(month)
        .bind(active)
        .bind(alumni)
        .execute(pool)
        .await?;
    }

    let projects = vec![
        ("alice", "libft", (2024, 3, 10), 80, "success"),
        ("alice", "get_next_line", (2024, 3, 20), -42, "fail"),
        ("alice", "ft_printf", (2024, 3, 28), 90, "success"),
        ("bob", "libft", (2024, 3, 12), 100, "success"),
        ("carol", "minishell", (2024, 8, 2), 101, "success"),
    ];

    for (login, project, (y, m, d), score, status) in projects {
        let date = NaiveDate::from_ymd_opt(y, m, d)
            .ok_or_else(|| anyhow::anyhow!("invalid seed date {y}-{m}-{d}"))?;
        sqlx::query(
            r#"
            INSERT INTO campus.projects (login, project, date, score, status)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (login, project, date) DO NOTHING
            "#,
        )
        .bind(login)
        .bind(project)
        .bind(date)
        .bind(score)
        .bind(status)
        .execute(pool)
        .await?;
    }

    let feedbacks = vec![
        ("bob", "alice", Some(4), "clear explanations"),
        ("carol", "alice", Some(3), "good defense"),
        ("alice", "bob", None, "no rating left"),
    ];

    for (evaluator, evaluated, rating, comment) in feedbacks {
        sqlx::query(
            r#"
            INSERT INTO campus.feedbacks (evaluator_login, evaluated_login, rating, comment)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(evaluator)
        .bind(evaluated)
        .bind(rating)
        .bind(comment)
        .execute(pool)
        .await?;
    }

    let patronages: Vec<(&str, Vec<&str>, Vec<&str>)> = vec![
        ("alice", vec!["carol"], vec!["bob"]),
        ("bob", vec!["alice"], vec![]),
        ("carol", vec![], vec!["alice", "dave"]),
    ];

    for (login, godfathers, children) in patronages {
        sqlx::query(
            r#"
            INSERT INTO campus.patronages (login, godfathers, children)
            VALUES ($1, $2, $3)
            ON CONFLICT (login) DO UPDATE
            SET godfathers = EXCLUDED.godfathers, children = EXCLUDED.children
            "#,
        )
        .bind(login)
        .bind(godfathers)
        .bind(children)
        .execute(pool)
        .await?;
    }

    let mut bob_march = MonthMap::new();
    bob_march.insert(
        "2024-03".to_string(),
        MonthEntry {
            days: [
                ("01".to_string(), Some("02:30:00".to_string())),
                ("02".to_string(), Some("00:00:00".to_string())),
            ]
            .into_iter()
            .collect(),
        },
    );

    sqlx::query(
        r#"
        INSERT INTO campus.location_stats (login, months)
        VALUES ($1, $2)
        ON CONFLICT (login) DO UPDATE SET months = EXCLUDED.months
        "#,
    )
    .bind("bob")
    .bind(Json(bob_march))
    .execute(pool)
    .await?;

    Ok(())
}

fn students_query(filter: &StudentFilter) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!("SELECT {STUDENT_COLUMNS} FROM campus.students s"));
    filter.push_where(&mut builder, "s");
    builder
}

/// `ORDER BY` for a raw sort. Logins compare bytewise (`COLLATE "C"`) so ties
/// resolve the same way as the in-process ranking of derived keys. Column and
/// keyword come from closed enums, never from input.
fn order_clause(sort: RawSortKey, order: SortOrder) -> String {
    const LOGIN: &str = "s.login COLLATE \"C\"";
    if sort == RawSortKey::Login {
        format!(" ORDER BY {LOGIN} {}", order.keyword())
    } else {
        format!(
            " ORDER BY s.{} {}, {LOGIN} ASC",
            sort.column(),
            order.keyword()
        )
    }
}

/// Appends `IN (SELECT login ...)` restricted by the filter.
fn push_login_subquery(builder: &mut QueryBuilder<'static, Postgres>, filter: &StudentFilter) {
    builder.push(" IN (SELECT s.login FROM campus.students s");
    filter.push_where(builder, "s");
    builder.push(")");
}

#[async_trait]
impl RecordStore for PgStore {
    async fn students_page(
        &self,
        filter: &StudentFilter,
        sort: RawSortKey,
        order: SortOrder,
        window: PageWindow,
    ) -> Result<Vec<Student>, StoreError> {
        let mut builder = students_query(filter);
        builder.push(order_clause(sort, order));
        builder
            .push(" LIMIT ")
            .push_bind(i64::from(window.limit))
            .push(" OFFSET ")
            .push_bind(window.skip as i64);

        debug!(sql = builder.sql(), "students page");
        let rows = builder.build_query_as::<Student>().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    async fn count_students(&self, filter: &StudentFilter) -> Result<u64, StoreError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM campus.students s");
        filter.push_where(&mut builder, "s");
        let count: i64 = builder.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }

    async fn students(&self, filter: &StudentFilter) -> Result<Vec<Student>, StoreError> {
        let mut builder = students_query(filter);
        let rows = builder.build_query_as::<Student>().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    async fn projects(&self, filter: &StudentFilter) -> Result<Vec<ProjectRecord>, StoreError> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT p.login, p.project, p.date, p.score, p.status, p.validated \
             FROM campus.projects p JOIN campus.students s ON s.login = p.login",
        );
        filter.push_where(&mut builder, "s");
        let rows = builder
            .build_query_as::<ProjectRecord>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn feedbacks(&self, filter: &StudentFilter) -> Result<Vec<FeedbackRecord>, StoreError> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT f.evaluator_login, f.evaluated_login, f.rating, f.comment \
             FROM campus.feedbacks f JOIN campus.students s ON s.login = f.evaluated_login",
        );
        filter.push_where(&mut builder, "s");
        let rows = builder
            .build_query_as::<FeedbackRecord>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn patronage(&self, filter: &StudentFilter) -> Result<PatronageRecords, StoreError> {
        match self.patronage {
            Some(PatronageEncoding::PerStudent) => {
                let mut builder = QueryBuilder::<Postgres>::new(
                    "SELECT p.login, p.godfathers, p.children \
                     FROM campus.patronages p JOIN campus.students s ON s.login = p.login",
                );
                filter.push_where(&mut builder, "s");
                let rows = builder
                    .build_query_as::<PatronageRow>()
                    .fetch_all(&self.pool)
                    .await?;
                Ok(PatronageRecords::PerStudent(rows))
            }
            Some(PatronageEncoding::Edges) => {
                let mut builder = QueryBuilder::<Postgres>::new(
                    "SELECT e.user_login, e.godfather_login FROM campus.patronage_edges e \
                     WHERE e.user_login",
                );
                push_login_subquery(&mut builder, filter);
                builder.push(" OR e.godfather_login");
                push_login_subquery(&mut builder, filter);
                let rows = builder
                    .build_query_as::<PatronageEdge>()
                    .fetch_all(&self.pool)
                    .await?;
                Ok(PatronageRecords::Edges(rows))
            }
            None => Err(StoreError::MissingCollection("patronage".to_string())),
        }
    }

    async fn attendance(&self, filter: &StudentFilter) -> Result<AttendanceRecords, StoreError> {
        match self.attendance {
            Some(AttendanceEncoding::MonthMap) => {
                let mut builder = QueryBuilder::<Postgres>::new(
                    "SELECT l.login, l.months \
                     FROM campus.location_stats l JOIN campus.students s ON s.login = l.login",
                );
                filter.push_where(&mut builder, "s");
                let rows = builder
                    .build_query_as::<LocationStatsRow>()
                    .fetch_all(&self.pool)
                    .await?;
                Ok(AttendanceRecords::MonthMap(
                    rows.into_iter()
                        .map(|row| LocationStats {
                            login: row.login,
                            months: row.months.0,
                        })
                        .collect(),
                ))
            }
            Some(AttendanceEncoding::Intervals) => {
                let mut builder = QueryBuilder::<Postgres>::new(
                    "SELECT l.login, l.begin_at, l.end_at \
                     FROM campus.locations l JOIN campus.students s ON s.login = l.login",
                );
                filter.push_where(&mut builder, "s");
                let rows = builder.build().fetch_all(&self.pool).await?;
                let sessions = rows
                    .into_iter()
                    .map(|row| {
                        Ok(LocationSession {
                            login: row.try_get("login")?,
                            begin_at: row.try_get("begin_at")?,
                            end_at: row.try_get("end_at")?,
                        })
                    })
                    .collect::<Result<Vec<_>, sqlx::Error>>()?;
                Ok(AttendanceRecords::Intervals(sessions))
            }
            None => Err(StoreError::MissingCollection("locations".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_ordering_is_bytewise() {
        assert_eq!(
            order_clause(RawSortKey::Login, SortOrder::Desc),
            " ORDER BY s.login COLLATE \"C\" DESC"
        );
        assert_eq!(
            order_clause(RawSortKey::Wallet, SortOrder::Asc),
            " ORDER BY s.wallet ASC, s.login COLLATE \"C\" ASC"
        );
    }
}
