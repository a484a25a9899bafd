//! Cross-entity views of a section: the grade matrix and grade statistics.
//! Everything is recomputed from the store on each call.

use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;

use crate::calc::{self, ScoreSummary};
use crate::error::ServiceResult;
use crate::model::StudentSort;
use crate::services::{courses, labs, sections, students};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixColumn {
    pub lab_id: String,
    pub seq: i64,
    pub title: String,
    pub max_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixRow {
    pub student_id: String,
    pub name: String,
    pub national_id: String,
    pub group: Option<String>,
    /// One cell per column; `None` marks an ungraded lab.
    pub cells: Vec<Option<f64>>,
    pub average: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeMatrix {
    pub section_id: String,
    pub course_code: String,
    pub course_name: String,
    pub section_label: String,
    pub instructor: String,
    pub columns: Vec<MatrixColumn>,
    pub rows: Vec<MatrixRow>,
}

/// Students by name against the course's labs by sequence. A student's
/// average only counts labs with a recorded score.
pub fn matrix(conn: &Connection, section_id: &str) -> ServiceResult<GradeMatrix> {
    let section = sections::get(conn, section_id)?;
    let course = courses::get(conn, &section.course_id)?;
    let lab_list = labs::list_by_course(conn, &course.id)?;
    let roster = students::list_by_section(conn, section_id, StudentSort::Name)?;

    let mut stmt = conn.prepare(
        "SELECT g.student_id, g.lab_id, g.score FROM grades g
         JOIN students st ON st.id = g.student_id
         WHERE st.section_id = ?",
    )?;
    let recorded: HashMap<(String, String), Option<f64>> = stmt
        .query_map([section_id], |r| {
            Ok((
                (r.get::<_, String>(0)?, r.get::<_, String>(1)?),
                r.get::<_, Option<f64>>(2)?,
            ))
        })?
        .collect::<Result<_, _>>()?;

    let rows = roster
        .into_iter()
        .map(|student| {
            let cells: Vec<Option<f64>> = lab_list
                .iter()
                .map(|lab| {
                    recorded
                        .get(&(student.id.clone(), lab.id.clone()))
                        .copied()
                        .flatten()
                })
                .collect();
            let scored: Vec<f64> = cells.iter().flatten().copied().collect();
            MatrixRow {
                average: calc::mean(&scored),
                student_id: student.id,
                name: student.name,
                national_id: student.national_id,
                group: student.group,
                cells,
            }
        })
        .collect();

    Ok(GradeMatrix {
        section_id: section.id,
        course_code: course.code,
        course_name: course.name,
        section_label: section.label,
        instructor: section.instructor,
        columns: lab_list
            .into_iter()
            .map(|lab| MatrixColumn {
                lab_id: lab.id,
                seq: lab.seq,
                title: lab.title,
                max_score: lab.max_score,
            })
            .collect(),
        rows,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionGradeStats {
    pub section_id: String,
    pub total_grades: usize,
    pub mean_score: f64,
    pub passed: usize,
    pub failed: usize,
    pub ungraded: usize,
}

/// Recorded grades of the section: mean over scored rows, pass/fail by the
/// percentage cutoff, and grade rows still without a score.
pub fn section_statistics(conn: &Connection, section_id: &str) -> ServiceResult<SectionGradeStats> {
    sections::get(conn, section_id)?;
    let mut stmt = conn.prepare(
        "SELECT g.score, l.max_score FROM grades g
         JOIN students st ON st.id = g.student_id
         JOIN labs l ON l.id = g.lab_id
         WHERE st.section_id = ?",
    )?;
    let pairs = stmt
        .query_map([section_id], |r| {
            Ok((r.get::<_, Option<f64>>(0)?, r.get::<_, f64>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let ScoreSummary {
        count,
        mean,
        passed,
        failed,
        ungraded,
        ..
    } = calc::summarize(pairs);

    Ok(SectionGradeStats {
        section_id: section_id.to_string(),
        total_grades: count,
        mean_score: mean,
        passed,
        failed,
        ungraded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GradeUpdate;
    use crate::services::{fixtures, grades};

    #[test]
    fn matrix_marks_ungraded_cells_and_excludes_them_from_average() {
        let conn = fixtures::store();
        let course = fixtures::course(&conn, "SIS-1110");
        let section = fixtures::section(&conn, &course, "A");
        let zoe = fixtures::student(&conn, &section, "Zoe", "2");
        let ana = fixtures::student(&conn, &section, "Ana", "1");
        let lab1 = fixtures::lab(&conn, &course, "Variables");
        let lab2 = fixtures::lab(&conn, &course, "Loops");
        let lab3 = fixtures::lab(&conn, &course, "Functions");
        grades::register(&conn, &lab1.id, &ana.id, Some(80.0), None).expect("g");
        grades::register(&conn, &lab3.id, &ana.id, Some(60.0), None).expect("g");
        grades::register(&conn, &lab2.id, &zoe.id, None, None).expect("g");

        let m = matrix(&conn, &section.id).expect("matrix");
        assert_eq!(m.course_code, "SIS-1110");
        assert_eq!(m.columns.iter().map(|c| c.seq).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(m.rows[0].name, "Ana");
        assert_eq!(m.rows[0].cells, vec![Some(80.0), None, Some(60.0)]);
        assert_eq!(m.rows[0].average, 70.0);
        assert_eq!(m.rows[1].name, "Zoe");
        assert_eq!(m.rows[1].cells, vec![None, None, None]);
        assert_eq!(m.rows[1].average, 0.0);
    }

    #[test]
    fn section_statistics_are_stable_between_reads() {
        let conn = fixtures::store();
        let course = fixtures::course(&conn, "SIS-1110");
        let section = fixtures::section(&conn, &course, "A");
        let ana = fixtures::student(&conn, &section, "Ana", "1");
        let bea = fixtures::student(&conn, &section, "Bea", "2");
        let lab = fixtures::lab(&conn, &course, "Variables");
        grades::register(&conn, &lab.id, &ana.id, Some(90.0), None).expect("g");
        let pending = grades::register(&conn, &lab.id, &bea.id, None, None).expect("g");

        let first = section_statistics(&conn, &section.id).expect("stats");
        let second = section_statistics(&conn, &section.id).expect("stats");
        assert_eq!(first, second);
        assert_eq!(first.total_grades, 1);
        assert_eq!(first.mean_score, 90.0);
        assert_eq!(first.passed, 1);
        assert_eq!(first.ungraded, 1);

        grades::update(
            &conn,
            &pending.grade.id,
            &GradeUpdate {
                score: Some(30.0),
                remarks: None,
            },
        )
        .expect("update");
        let third = section_statistics(&conn, &section.id).expect("stats");
        assert_eq!(third.total_grades, 2);
        assert_eq!(third.failed, 1);
        assert_eq!(third.ungraded, 0);
        assert_eq!(third.mean_score, 60.0);
    }
}
