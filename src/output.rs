//! CSV export of a ranking page.

use std::path::Path;

use anyhow::Result;
use csv::Writer;
use tracing::debug;

use crate::response::{RankingResponse, StudentRow};

const BASE_HEADERS: [&str; 13] = [
    "id",
    "login",
    "first_name",
    "last_name",
    "displayname",
    "email",
    "campus_id",
    "level",
    "wallet",
    "correction_point",
    "grade",
    "pool_month",
    "pool_year",
];

fn record(row: &StudentRow) -> Vec<String> {
    let mut fields = vec![
        row.id.to_string(),
        row.login.clone(),
        row.first_name.clone(),
        row.last_name.clone(),
        row.displayname.clone(),
        row.email.clone(),
        row.campus_id.to_string(),
        row.level.to_string(),
        row.wallet.to_string(),
        row.correction_point.to_string(),
        row.grade.clone().unwrap_or_default(),
        row.pool_month.clone().unwrap_or_default(),
        row.pool_year.map(|y| y.to_string()).unwrap_or_default(),
    ];
    if let Some(value) = row.derived_value() {
        fields.push(serde_json::json!(value).to_string());
    }
    fields
}

/// Writes the page to `writer`. `derived_field` names the extra column, if any.
pub fn write_rows<W: std::io::Write>(
    writer: W,
    response: &RankingResponse,
    derived_field: Option<&str>,
) -> Result<()> {
    let mut writer = Writer::from_writer(writer);

    let mut headers: Vec<&str> = BASE_HEADERS.to_vec();
    headers.extend(derived_field);
    writer.write_record(&headers)?;

    for row in &response.students {
        writer.write_record(record(row))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn export_csv(path: &Path, response: &RankingResponse, derived_field: Option<&str>) -> Result<()> {
    debug!(path = %path.display(), rows = response.students.len(), "exporting CSV");
    let file = std::fs::File::create(path)?;
    write_rows(file, response, derived_field)
}
