//! Dependency-ordered deletion plans.
//!
//! A plan is a list of single-statement steps, leaf tables first, each bound
//! to the id of the entity being removed. The whole plan runs inside one
//! transaction: if any step fails the transaction is dropped uncommitted and
//! nothing is removed.

use rusqlite::Connection;
use tracing::info;

use crate::error::ServiceResult;
use crate::model::RemovedCounts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Grades,
    Students,
    Labs,
    Sections,
    Courses,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Table::Grades => "grades",
            Table::Students => "students",
            Table::Labs => "labs",
            Table::Sections => "sections",
            Table::Courses => "courses",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Step {
    pub table: Table,
    pub sql: &'static str,
}

pub const COURSE_PLAN: &[Step] = &[
    Step {
        table: Table::Grades,
        sql: "DELETE FROM grades
              WHERE student_id IN (
                SELECT st.id FROM students st
                JOIN sections se ON se.id = st.section_id
                WHERE se.course_id = ?1
              )
              OR lab_id IN (SELECT id FROM labs WHERE course_id = ?1)",
    },
    Step {
        table: Table::Students,
        sql: "DELETE FROM students
              WHERE section_id IN (SELECT id FROM sections WHERE course_id = ?1)",
    },
    Step {
        table: Table::Labs,
        sql: "DELETE FROM labs WHERE course_id = ?1",
    },
    Step {
        table: Table::Sections,
        sql: "DELETE FROM sections WHERE course_id = ?1",
    },
    Step {
        table: Table::Courses,
        sql: "DELETE FROM courses WHERE id = ?1",
    },
];

pub const SECTION_PLAN: &[Step] = &[
    Step {
        table: Table::Grades,
        sql: "DELETE FROM grades
              WHERE student_id IN (SELECT id FROM students WHERE section_id = ?1)",
    },
    Step {
        table: Table::Students,
        sql: "DELETE FROM students WHERE section_id = ?1",
    },
    Step {
        table: Table::Sections,
        sql: "DELETE FROM sections WHERE id = ?1",
    },
];

pub const STUDENT_PLAN: &[Step] = &[
    Step {
        table: Table::Grades,
        sql: "DELETE FROM grades WHERE student_id = ?1",
    },
    Step {
        table: Table::Students,
        sql: "DELETE FROM students WHERE id = ?1",
    },
];

pub const LAB_PLAN: &[Step] = &[
    Step {
        table: Table::Grades,
        sql: "DELETE FROM grades WHERE lab_id = ?1",
    },
    Step {
        table: Table::Labs,
        sql: "DELETE FROM labs WHERE id = ?1",
    },
];

pub fn execute(conn: &Connection, plan: &[Step], id: &str) -> ServiceResult<RemovedCounts> {
    let tx = conn.unchecked_transaction()?;
    let mut removed = RemovedCounts::default();

    for step in plan {
        let n = tx.execute(step.sql, [id])?;
        match step.table {
            Table::Grades => removed.grades += n,
            Table::Students => removed.students += n,
            Table::Labs => removed.labs += n,
            Table::Sections => removed.sections += n,
            Table::Courses => removed.courses += n,
        }
        if n > 0 {
            info!(table = step.table.as_str(), rows = n, "cascade step");
        }
    }

    tx.commit()?;
    Ok(removed)
}
