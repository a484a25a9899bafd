use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::info;

use super::cascade;
use super::{count, exists, required_text};
use crate::calc;
use crate::db::{new_id, now_stamp};
use crate::error::{ServiceError, ServiceResult};
use crate::model::{Course, CourseUpdate, DeleteOutcome, DeletePolicy, DependencyReport};

const ENTITY: &str = "course";
const SELECT: &str = "SELECT id, name, code, created_at, updated_at FROM courses";

fn from_row(r: &Row<'_>) -> rusqlite::Result<Course> {
    Ok(Course {
        id: r.get(0)?,
        name: r.get(1)?,
        code: r.get(2)?,
        created_at: r.get(3)?,
        updated_at: r.get(4)?,
    })
}

fn normalize_code(code: &str) -> ServiceResult<String> {
    Ok(required_text("code", code)?.to_uppercase())
}

fn code_taken(conn: &Connection, code: &str, except_id: Option<&str>) -> ServiceResult<bool> {
    let hit: Option<String> = conn
        .query_row(
            "SELECT id FROM courses WHERE code = ? COLLATE NOCASE",
            [code],
            |r| r.get(0),
        )
        .optional()?;
    Ok(match (hit, except_id) {
        (Some(found), Some(me)) => found != me,
        (Some(_), None) => true,
        (None, _) => false,
    })
}

pub fn create(conn: &Connection, name: &str, code: &str) -> ServiceResult<Course> {
    let name = required_text("name", name)?;
    let code = normalize_code(code)?;
    if code_taken(conn, &code, None)? {
        return Err(ServiceError::duplicate(
            ENTITY,
            format!("a course with code {code} already exists"),
        ));
    }

    let id = new_id();
    let now = now_stamp();
    conn.execute(
        "INSERT INTO courses(id, name, code, created_at, updated_at) VALUES(?, ?, ?, ?, ?)",
        (&id, &name, &code, &now, &now),
    )
    .map_err(|e| ServiceError::from_insert(ENTITY, e))?;

    info!(course_id = %id, %code, "course created");
    get(conn, &id)
}

pub fn list(conn: &Connection) -> ServiceResult<Vec<Course>> {
    let mut stmt = conn.prepare(&format!("{SELECT} ORDER BY code"))?;
    let rows = stmt
        .query_map([], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get(conn: &Connection, id: &str) -> ServiceResult<Course> {
    conn.query_row(&format!("{SELECT} WHERE id = ?"), [id], from_row)
        .optional()?
        .ok_or_else(|| ServiceError::not_found(ENTITY, id))
}

pub fn get_by_code(conn: &Connection, code: &str) -> ServiceResult<Option<Course>> {
    let code = code.trim();
    Ok(conn
        .query_row(
            &format!("{SELECT} WHERE code = ? COLLATE NOCASE"),
            [code],
            from_row,
        )
        .optional()?)
}

/// Case-insensitive substring match on name or code.
pub fn search(conn: &Connection, term: &str) -> ServiceResult<Vec<Course>> {
    let escaped = term
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    let pattern = format!("%{escaped}%");
    let mut stmt = conn.prepare(&format!(
        "{SELECT} WHERE name LIKE ?1 ESCAPE '\\' OR code LIKE ?1 ESCAPE '\\' ORDER BY code"
    ))?;
    let rows = stmt
        .query_map([&pattern], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn update(conn: &Connection, id: &str, changes: &CourseUpdate) -> ServiceResult<Course> {
    let mut course = get(conn, id)?;

    if let Some(name) = changes.name.as_deref() {
        course.name = required_text("name", name)?;
    }
    if let Some(code) = changes.code.as_deref() {
        let code = normalize_code(code)?;
        if code != course.code && code_taken(conn, &code, Some(id))? {
            return Err(ServiceError::duplicate(
                ENTITY,
                format!("a course with code {code} already exists"),
            ));
        }
        course.code = code;
    }

    conn.execute(
        "UPDATE courses SET name = ?, code = ?, updated_at = ? WHERE id = ?",
        (&course.name, &course.code, now_stamp(), id),
    )
    .map_err(|e| ServiceError::from_insert(ENTITY, e))?;

    info!(course_id = %id, code = %course.code, "course updated");
    get(conn, id)
}

pub fn check_dependencies(conn: &Connection, id: &str) -> ServiceResult<DependencyReport> {
    if !exists(conn, "SELECT 1 FROM courses WHERE id = ?", id)? {
        return Err(ServiceError::not_found(ENTITY, id));
    }
    Ok(DependencyReport {
        sections: count(conn, "SELECT COUNT(*) FROM sections WHERE course_id = ?", id)?,
        labs: count(conn, "SELECT COUNT(*) FROM labs WHERE course_id = ?", id)?,
        students: count(
            conn,
            "SELECT COUNT(*) FROM students st
             JOIN sections se ON se.id = st.section_id
             WHERE se.course_id = ?",
            id,
        )?,
        grades: count(
            conn,
            "SELECT COUNT(*) FROM grades g
             JOIN labs l ON l.id = g.lab_id
             WHERE l.course_id = ?",
            id,
        )?,
    })
}

pub fn delete(conn: &Connection, id: &str, policy: DeletePolicy) -> ServiceResult<DeleteOutcome> {
    let course = get(conn, id)?;
    let deps = check_dependencies(conn, id)?;

    if policy == DeletePolicy::Abort && !deps.is_clear() {
        return Err(ServiceError::DependencyConflict {
            entity: ENTITY,
            message: format!(
                "cannot delete {}: it has {} sections, {} labs and {} students",
                course.code, deps.sections, deps.labs, deps.students
            ),
            dependencies: deps,
        });
    }

    let removed = cascade::execute(conn, cascade::COURSE_PLAN, id)?;
    info!(course_id = %id, code = %course.code, ?removed, "course deleted");
    Ok(DeleteOutcome {
        success: true,
        message: format!("course {} deleted", course.code),
        removed,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStats {
    pub total_courses: i64,
    pub total_sections: i64,
    pub total_students: i64,
    pub total_labs: i64,
    pub avg_sections_per_course: f64,
    pub avg_students_per_course: f64,
}

pub fn statistics(conn: &Connection) -> ServiceResult<SystemStats> {
    let total = |sql: &str| -> ServiceResult<i64> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };
    let total_courses = total("SELECT COUNT(*) FROM courses")?;
    let total_sections = total("SELECT COUNT(*) FROM sections")?;
    let total_students = total("SELECT COUNT(*) FROM students")?;
    let total_labs = total("SELECT COUNT(*) FROM labs")?;

    Ok(SystemStats {
        total_courses,
        total_sections,
        total_students,
        total_labs,
        avg_sections_per_course: calc::ratio_1(total_sections, total_courses),
        avg_students_per_course: calc::ratio_1(total_students, total_courses),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSummary {
    #[serde(flatten)]
    pub course: Course,
    pub sections: i64,
    pub labs: i64,
    pub students: i64,
}

pub fn summary(conn: &Connection, id: &str) -> ServiceResult<CourseSummary> {
    let course = get(conn, id)?;
    let deps = check_dependencies(conn, id)?;
    Ok(CourseSummary {
        course,
        sections: deps.sections,
        labs: deps.labs,
        students: deps.students,
    })
}
