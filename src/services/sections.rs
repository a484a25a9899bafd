use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::info;

use super::cascade;
use super::{count, exists, required_text};
use crate::db::{new_id, now_stamp};
use crate::error::{ServiceError, ServiceResult};
use crate::model::{DeleteOutcome, DeletePolicy, DependencyReport, Section, SectionUpdate};

const ENTITY: &str = "section";
const SELECT: &str =
    "SELECT id, course_id, label, instructor, created_at, updated_at FROM sections";

fn from_row(r: &Row<'_>) -> rusqlite::Result<Section> {
    Ok(Section {
        id: r.get(0)?,
        course_id: r.get(1)?,
        label: r.get(2)?,
        instructor: r.get(3)?,
        created_at: r.get(4)?,
        updated_at: r.get(5)?,
    })
}

fn label_taken(
    conn: &Connection,
    course_id: &str,
    label: &str,
    except_id: Option<&str>,
) -> ServiceResult<bool> {
    let hit: Option<String> = conn
        .query_row(
            "SELECT id FROM sections WHERE course_id = ? AND label = ?",
            (course_id, label),
            |r| r.get(0),
        )
        .optional()?;
    Ok(match (hit, except_id) {
        (Some(found), Some(me)) => found != me,
        (Some(_), None) => true,
        (None, _) => false,
    })
}

pub fn create(
    conn: &Connection,
    course_id: &str,
    label: &str,
    instructor: &str,
) -> ServiceResult<Section> {
    if !exists(conn, "SELECT 1 FROM courses WHERE id = ?", course_id)? {
        return Err(ServiceError::not_found("course", course_id));
    }
    let label = required_text("label", label)?.to_uppercase();
    let instructor = required_text("instructor", instructor)?;
    if label_taken(conn, course_id, &label, None)? {
        return Err(ServiceError::duplicate(
            ENTITY,
            format!("section {label} already exists for this course"),
        ));
    }

    let id = new_id();
    let now = now_stamp();
    conn.execute(
        "INSERT INTO sections(id, course_id, label, instructor, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&id, course_id, &label, &instructor, &now, &now),
    )
    .map_err(|e| ServiceError::from_insert(ENTITY, e))?;

    info!(section_id = %id, %course_id, %label, "section created");
    get(conn, &id)
}

pub fn get(conn: &Connection, id: &str) -> ServiceResult<Section> {
    conn.query_row(&format!("{SELECT} WHERE id = ?"), [id], from_row)
        .optional()?
        .ok_or_else(|| ServiceError::not_found(ENTITY, id))
}

/// Labels are stored upper-cased, so `"a"` finds section `A`.
pub fn get_by_label(conn: &Connection, course_id: &str, label: &str) -> ServiceResult<Option<Section>> {
    let label = label.trim().to_uppercase();
    Ok(conn
        .query_row(
            &format!("{SELECT} WHERE course_id = ? AND label = ?"),
            (course_id, &label),
            from_row,
        )
        .optional()?)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionListing {
    #[serde(flatten)]
    pub section: Section,
    pub student_count: i64,
}

/// Sections of a course ordered by label. An unknown course has none.
pub fn list_by_course(conn: &Connection, course_id: &str) -> ServiceResult<Vec<SectionListing>> {
    let mut stmt = conn.prepare(
        "SELECT se.id, se.course_id, se.label, se.instructor, se.created_at, se.updated_at,
                (SELECT COUNT(*) FROM students st WHERE st.section_id = se.id)
         FROM sections se
         WHERE se.course_id = ?
         ORDER BY se.label",
    )?;
    let rows = stmt
        .query_map([course_id], |r| {
            Ok(SectionListing {
                section: from_row(r)?,
                student_count: r.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn update(conn: &Connection, id: &str, changes: &SectionUpdate) -> ServiceResult<Section> {
    let mut section = get(conn, id)?;

    if let Some(label) = changes.label.as_deref() {
        let label = required_text("label", label)?.to_uppercase();
        if label != section.label && label_taken(conn, &section.course_id, &label, Some(id))? {
            return Err(ServiceError::duplicate(
                ENTITY,
                format!("section {label} already exists for this course"),
            ));
        }
        section.label = label;
    }
    if let Some(instructor) = changes.instructor.as_deref() {
        section.instructor = required_text("instructor", instructor)?;
    }

    conn.execute(
        "UPDATE sections SET label = ?, instructor = ?, updated_at = ? WHERE id = ?",
        (&section.label, &section.instructor, now_stamp(), id),
    )
    .map_err(|e| ServiceError::from_insert(ENTITY, e))?;

    info!(section_id = %id, label = %section.label, "section updated");
    get(conn, id)
}

pub fn check_dependencies(conn: &Connection, id: &str) -> ServiceResult<DependencyReport> {
    if !exists(conn, "SELECT 1 FROM sections WHERE id = ?", id)? {
        return Err(ServiceError::not_found(ENTITY, id));
    }
    Ok(DependencyReport {
        students: count(conn, "SELECT COUNT(*) FROM students WHERE section_id = ?", id)?,
        grades: count(
            conn,
            "SELECT COUNT(*) FROM grades g
             JOIN students st ON st.id = g.student_id
             WHERE st.section_id = ?",
            id,
        )?,
        ..Default::default()
    })
}

pub fn delete(conn: &Connection, id: &str, policy: DeletePolicy) -> ServiceResult<DeleteOutcome> {
    let section = get(conn, id)?;
    let deps = check_dependencies(conn, id)?;

    if policy == DeletePolicy::Abort && deps.students > 0 {
        return Err(ServiceError::DependencyConflict {
            entity: ENTITY,
            message: format!(
                "cannot delete section {}: it has {} students",
                section.label, deps.students
            ),
            dependencies: deps,
        });
    }

    let removed = cascade::execute(conn, cascade::SECTION_PLAN, id)?;
    info!(section_id = %id, label = %section.label, ?removed, "section deleted");
    Ok(DeleteOutcome {
        success: true,
        message: format!("section {} deleted", section.label),
        removed,
    })
}

/// Distinct, sorted group labels in use within a section.
pub fn group_labels(conn: &Connection, id: &str) -> ServiceResult<Vec<String>> {
    get(conn, id)?;
    let mut stmt = conn.prepare(
        "SELECT DISTINCT group_label FROM students
         WHERE section_id = ? AND group_label IS NOT NULL
         ORDER BY group_label",
    )?;
    let rows = stmt
        .query_map([id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// "SIS-1110 - Section A"
pub fn display_label(conn: &Connection, id: &str) -> ServiceResult<String> {
    let (code, label): (String, String) = conn
        .query_row(
            "SELECT c.code, se.label FROM sections se
             JOIN courses c ON c.id = se.course_id
             WHERE se.id = ?",
            [id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?
        .ok_or_else(|| ServiceError::not_found(ENTITY, id))?;
    Ok(format!("{code} - Section {label}"))
}
