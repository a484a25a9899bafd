use serde_json::json;

use super::{
    db_conn, optional_f64, optional_str, parse_param, required_str, respond, svc, to_json,
    HandlerResult,
};
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::model::GradeUpdate;
use crate::services::grades;

fn handle_grades_register(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let lab_id = required_str(req, "labId")?;
    let student_id = required_str(req, "studentId")?;
    let score = optional_f64(req, "score")?;
    let remarks = optional_str(req, "remarks")?;
    let view = grades::register(conn, &lab_id, &student_id, score, remarks.as_deref())
        .map_err(|e| svc(req, e))?;
    to_json(req, &view)
}

fn handle_grades_batch_register(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let lab_id = required_str(req, "labId")?;
    let Some(entries) = req.params.get("entries") else {
        return Err(err(&req.id, "bad_params", "missing entries", None));
    };
    let outcome =
        grades::batch_register_json(conn, &lab_id, entries).map_err(|e| svc(req, e))?;
    to_json(req, &outcome)
}

fn handle_grades_get(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let grade_id = required_str(req, "gradeId")?;
    let view = grades::get(conn, &grade_id).map_err(|e| svc(req, e))?;
    to_json(req, &view)
}

fn handle_grades_find(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let lab_id = required_str(req, "labId")?;
    let student_id = required_str(req, "studentId")?;
    let hit = grades::find(conn, &lab_id, &student_id).map_err(|e| svc(req, e))?;
    Ok(json!({ "grade": to_json(req, &hit)? }))
}

fn handle_grades_list_by_student(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let student_id = required_str(req, "studentId")?;
    let list = grades::list_by_student(conn, &student_id).map_err(|e| svc(req, e))?;
    Ok(json!({ "grades": to_json(req, &list)? }))
}

fn handle_grades_list_by_lab(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let lab_id = required_str(req, "labId")?;
    let list = grades::list_by_lab(conn, &lab_id).map_err(|e| svc(req, e))?;
    Ok(json!({ "grades": to_json(req, &list)? }))
}

fn handle_grades_update(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let grade_id = required_str(req, "gradeId")?;
    let changes: GradeUpdate = parse_param(req, "changes")?;
    let view = grades::update(conn, &grade_id, &changes).map_err(|e| svc(req, e))?;
    to_json(req, &view)
}

fn handle_grades_delete(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let grade_id = required_str(req, "gradeId")?;
    let outcome = grades::delete(conn, &grade_id).map_err(|e| svc(req, e))?;
    to_json(req, &outcome)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "grades.register" => handle_grades_register(state, req),
        "grades.batchRegister" => handle_grades_batch_register(state, req),
        "grades.get" => handle_grades_get(state, req),
        "grades.find" => handle_grades_find(state, req),
        "grades.listByStudent" => handle_grades_list_by_student(state, req),
        "grades.listByLab" => handle_grades_list_by_lab(state, req),
        "grades.update" => handle_grades_update(state, req),
        "grades.delete" => handle_grades_delete(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
