//! Domain services. Each takes the store handle explicitly; the composition
//! root owns the connection.

pub mod cascade;
pub mod courses;
pub mod grades;
pub mod labs;
pub mod sections;
pub mod students;

use rusqlite::{Connection, OptionalExtension};

use crate::error::{ServiceError, ServiceResult};

pub(crate) fn required_text(field: &str, value: &str) -> ServiceResult<String> {
    let v = value.trim();
    if v.is_empty() {
        return Err(ServiceError::validation(format!("{field} must not be empty")));
    }
    Ok(v.to_string())
}

pub(crate) fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn exists(conn: &Connection, sql: &str, id: &str) -> ServiceResult<bool> {
    let hit: Option<i64> = conn.query_row(sql, [id], |r| r.get(0)).optional()?;
    Ok(hit.is_some())
}

pub(crate) fn count(conn: &Connection, sql: &str, id: &str) -> ServiceResult<i64> {
    Ok(conn.query_row(sql, [id], |r| r.get(0))?)
}
