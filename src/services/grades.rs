use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::optional_text;
use crate::calc;
use crate::db::{new_id, now_stamp};
use crate::error::{ServiceError, ServiceResult};
use crate::model::{DeleteOutcome, Grade, GradeUpdate, GradeView, LabAssignment, RemovedCounts};

use super::labs;

const ENTITY: &str = "grade";
const VIEW_SELECT: &str = "SELECT g.id, g.lab_id, g.student_id, g.score, g.remarks,
                                  g.recorded_at, g.created_at, g.updated_at,
                                  l.seq, l.title, l.max_score, st.name
                           FROM grades g
                           JOIN labs l ON l.id = g.lab_id
                           JOIN students st ON st.id = g.student_id";

fn view_from_row(r: &Row<'_>) -> rusqlite::Result<GradeView> {
    let grade = Grade {
        id: r.get(0)?,
        lab_id: r.get(1)?,
        student_id: r.get(2)?,
        score: r.get(3)?,
        remarks: r.get(4)?,
        recorded_at: r.get(5)?,
        created_at: r.get(6)?,
        updated_at: r.get(7)?,
    };
    let max_score: f64 = r.get(10)?;
    Ok(GradeView {
        percentage: calc::percentage(grade.score, max_score),
        status: calc::approval_status(grade.score, max_score),
        grade,
        lab_seq: r.get(8)?,
        lab_title: r.get(9)?,
        max_score,
        student_name: r.get(11)?,
    })
}

fn check_range(score: Option<f64>, max_score: f64) -> ServiceResult<()> {
    match score {
        Some(s) if !s.is_finite() || s < 0.0 || s > max_score => Err(ServiceError::OutOfRange {
            score: s,
            max: max_score,
        }),
        _ => Ok(()),
    }
}

/// The student must exist and sit in a section of the lab's course.
fn ensure_enrolled(conn: &Connection, student_id: &str, lab: &LabAssignment) -> ServiceResult<()> {
    let course_id: Option<String> = conn
        .query_row(
            "SELECT se.course_id FROM students st
             JOIN sections se ON se.id = st.section_id
             WHERE st.id = ?",
            [student_id],
            |r| r.get(0),
        )
        .optional()?;
    match course_id {
        None => Err(ServiceError::not_found("student", student_id)),
        Some(c) if c != lab.course_id => Err(ServiceError::validation(format!(
            "student {student_id} is not enrolled in the course of lab {}",
            lab.seq
        ))),
        Some(_) => Ok(()),
    }
}

pub fn register(
    conn: &Connection,
    lab_id: &str,
    student_id: &str,
    score: Option<f64>,
    remarks: Option<&str>,
) -> ServiceResult<GradeView> {
    let lab = labs::get(conn, lab_id)?;
    ensure_enrolled(conn, student_id, &lab)?;
    check_range(score, lab.max_score)?;
    if find(conn, lab_id, student_id)?.is_some() {
        return Err(ServiceError::duplicate(
            ENTITY,
            "a grade for this student and lab already exists; update it instead",
        ));
    }

    let id = new_id();
    let now = now_stamp();
    conn.execute(
        "INSERT INTO grades(id, lab_id, student_id, score, remarks, recorded_at, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            lab_id,
            student_id,
            score,
            optional_text(remarks),
            &now,
            &now,
            &now,
        ),
    )
    .map_err(|e| ServiceError::from_insert(ENTITY, e))?;

    info!(grade_id = %id, %lab_id, %student_id, ?score, "grade registered");
    get(conn, &id)
}

pub fn get(conn: &Connection, id: &str) -> ServiceResult<GradeView> {
    conn.query_row(&format!("{VIEW_SELECT} WHERE g.id = ?"), [id], view_from_row)
        .optional()?
        .ok_or_else(|| ServiceError::not_found(ENTITY, id))
}

pub fn find(conn: &Connection, lab_id: &str, student_id: &str) -> ServiceResult<Option<GradeView>> {
    Ok(conn
        .query_row(
            &format!("{VIEW_SELECT} WHERE g.lab_id = ? AND g.student_id = ?"),
            (lab_id, student_id),
            view_from_row,
        )
        .optional()?)
}

pub fn list_by_student(conn: &Connection, student_id: &str) -> ServiceResult<Vec<GradeView>> {
    let mut stmt = conn.prepare(&format!(
        "{VIEW_SELECT} WHERE g.student_id = ? ORDER BY l.seq"
    ))?;
    let rows = stmt
        .query_map([student_id], view_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_by_lab(conn: &Connection, lab_id: &str) -> ServiceResult<Vec<GradeView>> {
    let mut stmt = conn.prepare(&format!(
        "{VIEW_SELECT} WHERE g.lab_id = ? ORDER BY st.name, st.national_id"
    ))?;
    let rows = stmt
        .query_map([lab_id], view_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn update(conn: &Connection, id: &str, changes: &GradeUpdate) -> ServiceResult<GradeView> {
    let current = get(conn, id)?;
    let mut score = current.grade.score;
    let mut remarks = current.grade.remarks.clone();

    if let Some(new_score) = changes.score {
        check_range(Some(new_score), current.max_score)?;
        score = Some(new_score);
    }
    if let Some(new_remarks) = changes.remarks.as_deref() {
        remarks = optional_text(Some(new_remarks));
    }

    conn.execute(
        "UPDATE grades SET score = ?, remarks = ?, updated_at = ? WHERE id = ?",
        (score, &remarks, now_stamp(), id),
    )?;

    info!(grade_id = %id, ?score, "grade updated");
    get(conn, id)
}

pub fn delete(conn: &Connection, id: &str) -> ServiceResult<DeleteOutcome> {
    let current = get(conn, id)?;
    let n = conn.execute("DELETE FROM grades WHERE id = ?", [id])?;

    info!(grade_id = %id, "grade deleted");
    Ok(DeleteOutcome {
        success: true,
        message: format!(
            "grade deleted: {} - {}",
            current.student_name, current.lab_title
        ),
        removed: RemovedCounts {
            grades: n,
            ..Default::default()
        },
    })
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEntry {
    pub student_id: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub created: usize,
    pub updated: usize,
    pub succeeded: usize,
    pub errors: Vec<String>,
    pub message: String,
}

/// Creates or overwrites one grade per entry. A bad entry is reported in
/// `errors` and the remaining entries are still processed; only an unknown
/// lab fails the whole batch.
pub fn batch_register(
    conn: &Connection,
    lab_id: &str,
    entries: &[BatchEntry],
) -> ServiceResult<BatchOutcome> {
    apply_batch(conn, lab_id, entries, Vec::new())
}

/// Like [`batch_register`], for entries straight off the wire: either
/// `[{"studentId", "score"}, ...]` or `{"<studentId>": score, ...}`.
/// Entries that do not parse become `errors` lines.
pub fn batch_register_json(
    conn: &Connection,
    lab_id: &str,
    raw: &serde_json::Value,
) -> ServiceResult<BatchOutcome> {
    labs::get(conn, lab_id)?;
    let (entries, rejected) = parse_batch(raw)?;
    apply_batch(conn, lab_id, &entries, rejected)
}

fn parse_batch(raw: &serde_json::Value) -> ServiceResult<(Vec<BatchEntry>, Vec<String>)> {
    let mut entries = Vec::new();
    let mut rejected = Vec::new();
    match raw {
        serde_json::Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                match serde_json::from_value::<BatchEntry>(item.clone()) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => rejected.push(format!("entry {i}: {e}")),
                }
            }
        }
        serde_json::Value::Object(map) => {
            for (student_id, score) in map {
                match score.as_f64() {
                    Some(score) => entries.push(BatchEntry {
                        student_id: student_id.clone(),
                        score,
                    }),
                    None => rejected.push(format!("student {student_id}: score must be a number")),
                }
            }
        }
        _ => {
            return Err(ServiceError::validation(
                "entries must be a list of {studentId, score} or a map of student id to score",
            ))
        }
    }
    Ok((entries, rejected))
}

fn apply_batch(
    conn: &Connection,
    lab_id: &str,
    entries: &[BatchEntry],
    mut errors: Vec<String>,
) -> ServiceResult<BatchOutcome> {
    let lab = labs::get(conn, lab_id)?;
    let mut created = 0usize;
    let mut updated = 0usize;
    for line in &errors {
        warn!(%lab_id, error = %line, "batch entry rejected");
    }

    for entry in entries {
        let applied = ensure_enrolled(conn, &entry.student_id, &lab)
            .and_then(|_| check_range(Some(entry.score), lab.max_score))
            .and_then(|_| match find(conn, lab_id, &entry.student_id)? {
                Some(existing) => {
                    conn.execute(
                        "UPDATE grades SET score = ?, updated_at = ? WHERE id = ?",
                        (entry.score, now_stamp(), &existing.grade.id),
                    )?;
                    Ok(false)
                }
                None => {
                    register(conn, lab_id, &entry.student_id, Some(entry.score), None)?;
                    Ok(true)
                }
            });

        match applied {
            Ok(true) => created += 1,
            Ok(false) => updated += 1,
            Err(e) => {
                warn!(%lab_id, student_id = %entry.student_id, error = %e, "batch entry rejected");
                errors.push(format!("student {}: {}", entry.student_id, e));
            }
        }
    }

    let succeeded = created + updated;
    info!(%lab_id, succeeded, failed = errors.len(), "batch grades processed");
    Ok(BatchOutcome {
        created,
        updated,
        succeeded,
        message: format!(
            "processed {succeeded} grades, {} errors",
            errors.len()
        ),
        errors,
    })
}
