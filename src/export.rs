//! Section report export as a CSV document: header block, roster, grade
//! matrix and statistics, one blank line between blocks.

use anyhow::Context;
use rusqlite::Connection;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::reports;
use crate::services::students;

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub students: usize,
    pub labs: usize,
}

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn score_cell(v: Option<f64>) -> String {
    v.map(|s| format!("{s:.2}")).unwrap_or_else(|| "-".to_string())
}

pub fn render_section_csv(conn: &Connection, section_id: &str) -> anyhow::Result<(String, usize, usize)> {
    let matrix = reports::matrix(conn, section_id)?;
    let grade_stats = reports::section_statistics(conn, section_id)?;
    let roster_stats = students::section_statistics(conn, section_id)?;

    let mut out = String::new();
    writeln!(out, "report,lab grades")?;
    writeln!(out, "course,{}", csv_quote(&format!("{} - {}", matrix.course_code, matrix.course_name)))?;
    writeln!(out, "section,{}", csv_quote(&matrix.section_label))?;
    writeln!(out, "instructor,{}", csv_quote(&matrix.instructor))?;
    writeln!(out, "generated_at,{}", chrono::Utc::now().to_rfc3339())?;
    out.push('\n');

    writeln!(out, "no,name,national_id,group")?;
    for (i, row) in matrix.rows.iter().enumerate() {
        writeln!(
            out,
            "{},{},{},{}",
            i + 1,
            csv_quote(&row.name),
            csv_quote(&row.national_id),
            csv_quote(row.group.as_deref().unwrap_or("-"))
        )?;
    }
    out.push('\n');

    let mut header = String::from("name");
    for col in &matrix.columns {
        header.push(',');
        header.push_str(&csv_quote(&format!("Lab {} ({})", col.seq, col.title)));
    }
    header.push_str(",average");
    writeln!(out, "{header}")?;
    for row in &matrix.rows {
        let mut line = csv_quote(&row.name);
        for cell in &row.cells {
            line.push(',');
            line.push_str(&score_cell(*cell));
        }
        write!(line, ",{:.2}", row.average)?;
        writeln!(out, "{line}")?;
    }
    out.push('\n');

    writeln!(out, "statistic,value")?;
    writeln!(out, "total_students,{}", roster_stats.total_students)?;
    writeln!(out, "total_groups,{}", roster_stats.total_groups)?;
    writeln!(out, "total_grades,{}", grade_stats.total_grades)?;
    writeln!(out, "mean_score,{:.2}", grade_stats.mean_score)?;
    writeln!(out, "passed,{}", grade_stats.passed)?;
    writeln!(out, "failed,{}", grade_stats.failed)?;
    writeln!(out, "ungraded,{}", grade_stats.ungraded)?;

    Ok((out, matrix.rows.len(), matrix.columns.len()))
}

pub fn export_section_csv(
    conn: &Connection,
    section_id: &str,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let (csv, students, labs) = render_section_csv(conn, section_id)?;

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    std::fs::write(out_path, csv)
        .with_context(|| format!("failed to write {}", out_path.to_string_lossy()))?;

    info!(%section_id, path = %out_path.to_string_lossy(), students, labs, "section report exported");
    Ok(ExportSummary {
        path: out_path.to_path_buf(),
        students,
        labs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{fixtures, grades};

    #[test]
    fn quoting_escapes_commas_and_quotes() {
        assert_eq!(csv_quote("plain"), "plain");
        assert_eq!(csv_quote("Paz, Ana"), "\"Paz, Ana\"");
        assert_eq!(csv_quote("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn rendered_report_has_matrix_and_statistics() {
        let conn = fixtures::store();
        let course = fixtures::course(&conn, "SIS-1110");
        let section = fixtures::section(&conn, &course, "A");
        let ana = fixtures::student(&conn, &section, "Paz, Ana", "1");
        fixtures::student(&conn, &section, "Bea", "2");
        let lab = fixtures::lab(&conn, &course, "Variables");
        grades::register(&conn, &lab.id, &ana.id, Some(75.0), None).expect("grade");

        let (csv, students, labs) = render_section_csv(&conn, &section.id).expect("render");
        assert_eq!(students, 2);
        assert_eq!(labs, 1);
        assert!(csv.contains("name,Lab 1 (Variables),average"));
        assert!(csv.contains("\"Paz, Ana\",75.00,75.00"));
        assert!(csv.contains("Bea,-,0.00"));
        assert!(csv.contains("total_grades,1"));
        assert!(csv.contains("passed,1"));
    }
}
