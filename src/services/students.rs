use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::info;

use super::cascade;
use super::{count, exists, optional_text, required_text, sections};
use crate::calc;
use crate::db::{new_id, now_stamp};
use crate::error::{ServiceError, ServiceResult};
use crate::model::{
    DeleteOutcome, DeletePolicy, DependencyReport, Student, StudentSort, StudentUpdate,
};

const ENTITY: &str = "student";
const SELECT: &str = "SELECT id, section_id, name, national_id, group_label, created_at, updated_at
                      FROM students";

fn from_row(r: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: r.get(0)?,
        section_id: r.get(1)?,
        name: r.get(2)?,
        national_id: r.get(3)?,
        group: r.get(4)?,
        created_at: r.get(5)?,
        updated_at: r.get(6)?,
    })
}

fn normalize_national_id(national_id: &str) -> ServiceResult<String> {
    Ok(required_text("national id", national_id)?.to_uppercase())
}

/// National ids are unique across the whole store, not per section.
fn national_id_taken(
    conn: &Connection,
    national_id: &str,
    except_id: Option<&str>,
) -> ServiceResult<bool> {
    let hit: Option<String> = conn
        .query_row(
            "SELECT id FROM students WHERE national_id = ?",
            [national_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(match (hit, except_id) {
        (Some(found), Some(me)) => found != me,
        (Some(_), None) => true,
        (None, _) => false,
    })
}

fn ensure_section(conn: &Connection, section_id: &str) -> ServiceResult<()> {
    if !exists(conn, "SELECT 1 FROM sections WHERE id = ?", section_id)? {
        return Err(ServiceError::not_found("section", section_id));
    }
    Ok(())
}

pub fn register(
    conn: &Connection,
    name: &str,
    national_id: &str,
    section_id: &str,
    group: Option<&str>,
) -> ServiceResult<Student> {
    ensure_section(conn, section_id)?;
    let name = required_text("name", name)?;
    let national_id = normalize_national_id(national_id)?;
    let group = optional_text(group);
    if national_id_taken(conn, &national_id, None)? {
        return Err(ServiceError::duplicate(
            ENTITY,
            format!("a student with national id {national_id} is already registered"),
        ));
    }

    let id = new_id();
    let now = now_stamp();
    conn.execute(
        "INSERT INTO students(id, section_id, name, national_id, group_label, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (&id, section_id, &name, &national_id, &group, &now, &now),
    )
    .map_err(|e| ServiceError::from_insert(ENTITY, e))?;

    info!(student_id = %id, %section_id, %national_id, "student registered");
    get(conn, &id)
}

pub fn get(conn: &Connection, id: &str) -> ServiceResult<Student> {
    conn.query_row(&format!("{SELECT} WHERE id = ?"), [id], from_row)
        .optional()?
        .ok_or_else(|| ServiceError::not_found(ENTITY, id))
}

/// Students of a section in the requested order. An unknown section has none.
pub fn list_by_section(
    conn: &Connection,
    section_id: &str,
    sort: StudentSort,
) -> ServiceResult<Vec<Student>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT} WHERE section_id = ? ORDER BY {}",
        sort.order_by()
    ))?;
    let rows = stmt
        .query_map([section_id], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_by_group(
    conn: &Connection,
    section_id: &str,
    group: &str,
) -> ServiceResult<Vec<Student>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT} WHERE section_id = ? AND group_label = ? ORDER BY name"
    ))?;
    let rows = stmt
        .query_map((section_id, group.trim()), from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Exact match on national id.
pub fn search_by_id(conn: &Connection, national_id: &str) -> ServiceResult<Option<Student>> {
    let national_id = national_id.trim().to_uppercase();
    Ok(conn
        .query_row(
            &format!("{SELECT} WHERE national_id = ?"),
            [&national_id],
            from_row,
        )
        .optional()?)
}

fn course_of_section(conn: &Connection, section_id: &str) -> ServiceResult<String> {
    Ok(conn.query_row(
        "SELECT course_id FROM sections WHERE id = ?",
        [section_id],
        |r| r.get(0),
    )?)
}

/// Grades tie a student to the labs of one course, so a graded student may
/// only move between sections of that course.
fn ensure_same_course_if_graded(
    conn: &Connection,
    student: &Student,
    target_section_id: &str,
) -> ServiceResult<()> {
    let from = course_of_section(conn, &student.section_id)?;
    let to = course_of_section(conn, target_section_id)?;
    if from == to {
        return Ok(());
    }
    let graded = count(conn, "SELECT COUNT(*) FROM grades WHERE student_id = ?", &student.id)?;
    if graded > 0 {
        return Err(ServiceError::validation(format!(
            "{} has {graded} recorded grades in another course; delete them before moving sections",
            student.name
        )));
    }
    Ok(())
}

pub fn update(conn: &Connection, id: &str, changes: &StudentUpdate) -> ServiceResult<Student> {
    let mut student = get(conn, id)?;

    if let Some(name) = changes.name.as_deref() {
        student.name = required_text("name", name)?;
    }
    if let Some(national_id) = changes.national_id.as_deref() {
        let national_id = normalize_national_id(national_id)?;
        if national_id != student.national_id && national_id_taken(conn, &national_id, Some(id))? {
            return Err(ServiceError::duplicate(
                ENTITY,
                format!("a student with national id {national_id} is already registered"),
            ));
        }
        student.national_id = national_id;
    }
    if let Some(section_id) = changes.section_id.as_deref() {
        ensure_section(conn, section_id)?;
        if section_id != student.section_id {
            ensure_same_course_if_graded(conn, &student, section_id)?;
        }
        student.section_id = section_id.to_string();
    }
    if let Some(group) = changes.group.as_deref() {
        student.group = optional_text(Some(group));
    }

    conn.execute(
        "UPDATE students
         SET name = ?, national_id = ?, section_id = ?, group_label = ?, updated_at = ?
         WHERE id = ?",
        (
            &student.name,
            &student.national_id,
            &student.section_id,
            &student.group,
            now_stamp(),
            id,
        ),
    )
    .map_err(|e| ServiceError::from_insert(ENTITY, e))?;

    info!(student_id = %id, "student updated");
    get(conn, id)
}

pub fn set_group(conn: &Connection, id: &str, group: Option<&str>) -> ServiceResult<Student> {
    update(
        conn,
        id,
        &StudentUpdate {
            group: Some(group.unwrap_or_default().to_string()),
            ..Default::default()
        },
    )
}

pub fn check_dependencies(conn: &Connection, id: &str) -> ServiceResult<DependencyReport> {
    if !exists(conn, "SELECT 1 FROM students WHERE id = ?", id)? {
        return Err(ServiceError::not_found(ENTITY, id));
    }
    Ok(DependencyReport {
        grades: count(conn, "SELECT COUNT(*) FROM grades WHERE student_id = ?", id)?,
        ..Default::default()
    })
}

pub fn delete(conn: &Connection, id: &str, policy: DeletePolicy) -> ServiceResult<DeleteOutcome> {
    let student = get(conn, id)?;
    let deps = check_dependencies(conn, id)?;

    if policy == DeletePolicy::Abort && deps.grades > 0 {
        return Err(ServiceError::DependencyConflict {
            entity: ENTITY,
            message: format!(
                "cannot delete {}: it has {} recorded grades",
                student.name, deps.grades
            ),
            dependencies: deps,
        });
    }

    let removed = cascade::execute(conn, cascade::STUDENT_PLAN, id)?;
    info!(student_id = %id, national_id = %student.national_id, ?removed, "student deleted");
    Ok(DeleteOutcome {
        success: true,
        message: format!("student {} ({}) deleted", student.name, student.national_id),
        removed,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoGroupOutcome {
    pub groups: usize,
    pub students: usize,
}

/// Splits the section, in name order, into consecutive groups of `group_size`
/// named "Group 1", "Group 2", ... The last group may be smaller. Every
/// student's previous group label is overwritten.
pub fn auto_group(
    conn: &Connection,
    section_id: &str,
    group_size: usize,
) -> ServiceResult<AutoGroupOutcome> {
    if group_size == 0 {
        return Err(ServiceError::validation("group size must be at least 1"));
    }
    ensure_section(conn, section_id)?;
    let roster = list_by_section(conn, section_id, StudentSort::Name)?;

    let tx = conn.unchecked_transaction()?;
    let now = now_stamp();
    let mut groups = 0usize;
    for (i, student) in roster.iter().enumerate() {
        let number = i / group_size + 1;
        tx.execute(
            "UPDATE students SET group_label = ?, updated_at = ? WHERE id = ?",
            (format!("Group {number}"), &now, &student.id),
        )?;
        groups = groups.max(number);
    }
    tx.commit()?;

    info!(%section_id, groups, students = roster.len(), "students auto-grouped");
    Ok(AutoGroupOutcome {
        groups,
        students: roster.len(),
    })
}

/// Mean of the student's recorded scores; 0 when nothing is recorded.
pub fn average(conn: &Connection, id: &str) -> ServiceResult<f64> {
    get(conn, id)?;
    let mut stmt =
        conn.prepare("SELECT score FROM grades WHERE student_id = ? AND score IS NOT NULL")?;
    let scores = stmt
        .query_map([id], |r| r.get::<_, f64>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(calc::mean(&scores))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionStudentStats {
    pub section: String,
    pub total_students: usize,
    pub total_groups: usize,
    pub ungrouped_students: usize,
    pub average_score: f64,
    pub groups: Vec<String>,
}

pub fn section_statistics(conn: &Connection, section_id: &str) -> ServiceResult<SectionStudentStats> {
    let label = sections::display_label(conn, section_id)?;
    let roster = list_by_section(conn, section_id, StudentSort::Name)?;
    let groups = sections::group_labels(conn, section_id)?;

    let mut stmt = conn.prepare(
        "SELECT g.score FROM grades g
         JOIN students st ON st.id = g.student_id
         WHERE st.section_id = ? AND g.score IS NOT NULL",
    )?;
    let scores = stmt
        .query_map([section_id], |r| r.get::<_, f64>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SectionStudentStats {
        section: label,
        total_students: roster.len(),
        total_groups: groups.len(),
        ungrouped_students: roster.iter().filter(|s| s.group.is_none()).count(),
        average_score: calc::mean(&scores),
        groups,
    })
}
