//! Entity snapshots, update requests and deletion bookkeeping shared by the
//! services and the IPC layer.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ServiceError;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub name: String,
    pub code: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: String,
    pub course_id: String,
    pub label: String,
    pub instructor: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub section_id: String,
    pub name: String,
    pub national_id: String,
    pub group: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabAssignment {
    pub id: String,
    pub course_id: String,
    pub seq: i64,
    pub title: String,
    pub description: Option<String>,
    pub max_score: f64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub id: String,
    pub lab_id: String,
    pub student_id: String,
    pub score: Option<f64>,
    pub remarks: Option<String>,
    pub recorded_at: String,
    pub created_at: String,
    pub updated_at: String,
}

// Update requests: a `None` field is left untouched.

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CourseUpdate {
    pub name: Option<String>,
    pub code: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SectionUpdate {
    pub label: Option<String>,
    pub instructor: Option<String>,
}

/// `group: Some("")` clears the group label.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StudentUpdate {
    pub name: Option<String>,
    pub national_id: Option<String>,
    pub section_id: Option<String>,
    pub group: Option<String>,
}

/// `description: Some("")` clears the description.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LabUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub max_score: Option<f64>,
    pub seq: Option<i64>,
}

/// `remarks: Some("")` clears the remarks.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GradeUpdate {
    pub score: Option<f64>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletePolicy {
    #[default]
    Abort,
    Cascade,
}

/// Rows that depend on an entity and would block an `Abort` deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyReport {
    pub sections: i64,
    pub labs: i64,
    pub students: i64,
    pub grades: i64,
}

impl DependencyReport {
    pub fn is_clear(&self) -> bool {
        self.sections == 0 && self.labs == 0 && self.students == 0 && self.grades == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovedCounts {
    pub grades: usize,
    pub students: usize,
    pub labs: usize,
    pub sections: usize,
    pub courses: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub success: bool,
    pub message: String,
    pub removed: RemovedCounts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StudentSort {
    #[default]
    Name,
    Group,
    NationalId,
}

impl StudentSort {
    pub(crate) fn order_by(self) -> &'static str {
        match self {
            StudentSort::Name => "name, national_id",
            StudentSort::Group => "group_label IS NULL, group_label, name",
            StudentSort::NationalId => "national_id, name",
        }
    }
}

impl FromStr for StudentSort {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "name" => Ok(StudentSort::Name),
            "group" => Ok(StudentSort::Group),
            "national_id" | "nationalid" => Ok(StudentSort::NationalId),
            other => Err(ServiceError::validation(format!(
                "sort key must be one of: name, group, national_id (got {other})"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ApprovalStatus {
    Approved,
    Failed,
    Ungraded,
}

/// A grade together with the values derived from its lab.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeView {
    #[serde(flatten)]
    pub grade: Grade,
    pub lab_seq: i64,
    pub lab_title: String,
    pub max_score: f64,
    pub student_name: String,
    pub percentage: f64,
    pub status: ApprovalStatus,
}
