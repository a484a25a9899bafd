use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::info;

use super::cascade;
use super::{count, exists, optional_text, required_text};
use crate::calc::{self, ScoreSummary};
use crate::db::{new_id, now_stamp};
use crate::error::{ServiceError, ServiceResult};
use crate::model::{DeleteOutcome, DeletePolicy, DependencyReport, LabAssignment, LabUpdate};

const ENTITY: &str = "lab";
const SELECT: &str = "SELECT id, course_id, seq, title, description, max_score, created_at, updated_at
                      FROM labs";

pub const DEFAULT_MAX_SCORE: f64 = 100.0;

fn from_row(r: &Row<'_>) -> rusqlite::Result<LabAssignment> {
    Ok(LabAssignment {
        id: r.get(0)?,
        course_id: r.get(1)?,
        seq: r.get(2)?,
        title: r.get(3)?,
        description: r.get(4)?,
        max_score: r.get(5)?,
        created_at: r.get(6)?,
        updated_at: r.get(7)?,
    })
}

fn validate_max_score(max_score: f64) -> ServiceResult<f64> {
    if !max_score.is_finite() || max_score <= 0.0 {
        return Err(ServiceError::validation("max score must be greater than 0"));
    }
    Ok(max_score)
}

/// Sequence numbers start at 1 and continue from the highest one in the course.
pub fn next_sequence(conn: &Connection, course_id: &str) -> ServiceResult<i64> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(seq) FROM labs WHERE course_id = ?",
        [course_id],
        |r| r.get(0),
    )?;
    Ok(max.unwrap_or(0) + 1)
}

pub fn create(
    conn: &Connection,
    course_id: &str,
    title: &str,
    description: Option<&str>,
    max_score: Option<f64>,
) -> ServiceResult<LabAssignment> {
    if !exists(conn, "SELECT 1 FROM courses WHERE id = ?", course_id)? {
        return Err(ServiceError::not_found("course", course_id));
    }
    let title = required_text("title", title)?;
    let description = optional_text(description);
    let max_score = validate_max_score(max_score.unwrap_or(DEFAULT_MAX_SCORE))?;
    let seq = next_sequence(conn, course_id)?;

    let id = new_id();
    let now = now_stamp();
    conn.execute(
        "INSERT INTO labs(id, course_id, seq, title, description, max_score, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            course_id,
            seq,
            &title,
            &description,
            max_score,
            &now,
            &now,
        ),
    )
    .map_err(|e| ServiceError::from_insert(ENTITY, e))?;

    info!(lab_id = %id, %course_id, seq, "lab created");
    get(conn, &id)
}

pub fn get(conn: &Connection, id: &str) -> ServiceResult<LabAssignment> {
    conn.query_row(&format!("{SELECT} WHERE id = ?"), [id], from_row)
        .optional()?
        .ok_or_else(|| ServiceError::not_found(ENTITY, id))
}

/// Labs of a course by sequence number. An unknown course has none.
pub fn list_by_course(conn: &Connection, course_id: &str) -> ServiceResult<Vec<LabAssignment>> {
    let mut stmt = conn.prepare(&format!("{SELECT} WHERE course_id = ? ORDER BY seq"))?;
    let rows = stmt
        .query_map([course_id], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn update(conn: &Connection, id: &str, changes: &LabUpdate) -> ServiceResult<LabAssignment> {
    let mut lab = get(conn, id)?;

    if let Some(title) = changes.title.as_deref() {
        lab.title = required_text("title", title)?;
    }
    if let Some(description) = changes.description.as_deref() {
        lab.description = optional_text(Some(description));
    }
    if let Some(seq) = changes.seq {
        if seq < 1 {
            return Err(ServiceError::validation("sequence number must be at least 1"));
        }
        if seq != lab.seq {
            let taken = conn
                .query_row(
                    "SELECT 1 FROM labs WHERE course_id = ? AND seq = ? AND id <> ?",
                    (&lab.course_id, seq, id),
                    |r| r.get::<_, i64>(0),
                )
                .optional()?
                .is_some();
            if taken {
                return Err(ServiceError::duplicate(
                    ENTITY,
                    format!("lab {seq} already exists for this course"),
                ));
            }
        }
        lab.seq = seq;
    }
    if let Some(max_score) = changes.max_score {
        let max_score = validate_max_score(max_score)?;
        let highest: Option<f64> = conn.query_row(
            "SELECT MAX(score) FROM grades WHERE lab_id = ?",
            [id],
            |r| r.get(0),
        )?;
        if let Some(highest) = highest.filter(|h| *h > max_score) {
            return Err(ServiceError::OutOfRange {
                score: highest,
                max: max_score,
            });
        }
        lab.max_score = max_score;
    }

    conn.execute(
        "UPDATE labs SET title = ?, description = ?, seq = ?, max_score = ?, updated_at = ?
         WHERE id = ?",
        (
            &lab.title,
            &lab.description,
            lab.seq,
            lab.max_score,
            now_stamp(),
            id,
        ),
    )
    .map_err(|e| ServiceError::from_insert(ENTITY, e))?;

    info!(lab_id = %id, seq = lab.seq, "lab updated");
    get(conn, id)
}

pub fn check_dependencies(conn: &Connection, id: &str) -> ServiceResult<DependencyReport> {
    if !exists(conn, "SELECT 1 FROM labs WHERE id = ?", id)? {
        return Err(ServiceError::not_found(ENTITY, id));
    }
    Ok(DependencyReport {
        grades: count(conn, "SELECT COUNT(*) FROM grades WHERE lab_id = ?", id)?,
        ..Default::default()
    })
}

pub fn delete(conn: &Connection, id: &str, policy: DeletePolicy) -> ServiceResult<DeleteOutcome> {
    let lab = get(conn, id)?;
    let deps = check_dependencies(conn, id)?;

    if policy == DeletePolicy::Abort && deps.grades > 0 {
        return Err(ServiceError::DependencyConflict {
            entity: ENTITY,
            message: format!("cannot delete lab {}: it has {} grades", lab.seq, deps.grades),
            dependencies: deps,
        });
    }

    let removed = cascade::execute(conn, cascade::LAB_PLAN, id)?;
    info!(lab_id = %id, seq = lab.seq, ?removed, "lab deleted");
    Ok(DeleteOutcome {
        success: true,
        message: format!("lab {} ({}) deleted", lab.seq, lab.title),
        removed,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabStats {
    pub lab_id: String,
    pub seq: i64,
    pub title: String,
    pub max_score: f64,
    #[serde(flatten)]
    pub summary: ScoreSummary,
}

/// Count, mean, extremes and pass/fail split of the lab's recorded scores.
pub fn statistics(conn: &Connection, id: &str) -> ServiceResult<LabStats> {
    let lab = get(conn, id)?;
    let mut stmt = conn.prepare("SELECT score FROM grades WHERE lab_id = ?")?;
    let scores = stmt
        .query_map([id], |r| r.get::<_, Option<f64>>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(LabStats {
        summary: calc::summarize(scores.into_iter().map(|s| (s, lab.max_score))),
        lab_id: lab.id,
        seq: lab.seq,
        title: lab.title,
        max_score: lab.max_score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{fixtures, grades};

    #[test]
    fn sequence_is_assigned_per_course() {
        let conn = fixtures::store();
        let c1 = fixtures::course(&conn, "SIS-1110");
        let c2 = fixtures::course(&conn, "SIS-2330");
        let l1 = create(&conn, &c1.id, "Variables", None, None).expect("lab");
        let l2 = create(&conn, &c1.id, "Conditionals", Some("  if/else "), Some(50.0)).expect("lab");
        let other = create(&conn, &c2.id, "SQL", None, None).expect("lab");

        assert_eq!(l1.seq, 1);
        assert_eq!(l1.max_score, 100.0);
        assert_eq!(l2.seq, 2);
        assert_eq!(l2.description.as_deref(), Some("if/else"));
        assert_eq!(other.seq, 1);
    }

    #[test]
    fn sequence_continues_after_gaps() {
        let conn = fixtures::store();
        let course = fixtures::course(&conn, "SIS-1110");
        fixtures::lab(&conn, &course, "One");
        let two = fixtures::lab(&conn, &course, "Two");
        let update = LabUpdate {
            seq: Some(7),
            ..Default::default()
        };
        super::update(&conn, &two.id, &update).expect("renumber");
        assert_eq!(next_sequence(&conn, &course.id).expect("next"), 8);
    }

    #[test]
    fn renumber_rejects_taken_sequence() {
        let conn = fixtures::store();
        let course = fixtures::course(&conn, "SIS-1110");
        fixtures::lab(&conn, &course, "One");
        let two = fixtures::lab(&conn, &course, "Two");
        let clash = LabUpdate {
            seq: Some(1),
            ..Default::default()
        };
        assert!(matches!(
            update(&conn, &two.id, &clash),
            Err(ServiceError::DuplicateKey { .. })
        ));
    }

    #[test]
    fn max_score_must_cover_existing_grades() {
        let conn = fixtures::store();
        let course = fixtures::course(&conn, "SIS-1110");
        let section = fixtures::section(&conn, &course, "A");
        let student = fixtures::student(&conn, &section, "Ana", "1");
        let lab = fixtures::lab(&conn, &course, "Variables");
        grades::register(&conn, &lab.id, &student.id, Some(80.0), None).expect("grade");

        let shrink = LabUpdate {
            max_score: Some(50.0),
            ..Default::default()
        };
        assert!(matches!(
            update(&conn, &lab.id, &shrink),
            Err(ServiceError::OutOfRange { .. })
        ));
        let zero = LabUpdate {
            max_score: Some(0.0),
            ..Default::default()
        };
        assert!(matches!(
            update(&conn, &lab.id, &zero),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn delete_with_three_grades() {
        let conn = fixtures::store();
        let course = fixtures::course(&conn, "SIS-1110");
        let section = fixtures::section(&conn, &course, "A");
        let lab = fixtures::lab(&conn, &course, "Variables");
        for (name, ci) in [("Ana", "1"), ("Bea", "2"), ("Cid", "3")] {
            let s = fixtures::student(&conn, &section, name, ci);
            grades::register(&conn, &lab.id, &s.id, Some(60.0), None).expect("grade");
        }

        match delete(&conn, &lab.id, DeletePolicy::Abort) {
            Err(ServiceError::DependencyConflict { dependencies, .. }) => {
                assert_eq!(dependencies.grades, 3)
            }
            other => panic!("expected dependency conflict, got {other:?}"),
        }
        let outcome = delete(&conn, &lab.id, DeletePolicy::Cascade).expect("cascade");
        assert!(outcome.success);
        assert_eq!(outcome.removed.grades, 3);
        let left: i64 = conn
            .query_row("SELECT COUNT(*) FROM grades", [], |r| r.get(0))
            .expect("count");
        assert_eq!(left, 0);
    }

    #[test]
    fn statistics_use_percentage_threshold() {
        let conn = fixtures::store();
        let course = fixtures::course(&conn, "SIS-1110");
        let section = fixtures::section(&conn, &course, "A");
        let lab = create(&conn, &course.id, "Short quiz", None, Some(20.0)).expect("lab");
        let scores = [Some(18.0), Some(10.0), Some(11.0), None];
        for (i, score) in scores.iter().enumerate() {
            let s = fixtures::student(&conn, &section, &format!("S{i}"), &format!("{i}"));
            grades::register(&conn, &lab.id, &s.id, *score, None).expect("grade");
        }

        let stats = statistics(&conn, &lab.id).expect("stats");
        assert_eq!(stats.summary.count, 3);
        assert_eq!(stats.summary.passed, 2);
        assert_eq!(stats.summary.failed, 1);
        assert_eq!(stats.summary.ungraded, 1);
        assert_eq!(stats.summary.max, Some(18.0));
        assert_eq!(stats.summary.min, Some(10.0));
        assert_eq!(stats.summary.mean, 13.0);
    }
}
