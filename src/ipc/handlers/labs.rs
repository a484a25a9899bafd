use serde_json::json;

use super::{
    db_conn, delete_policy, delete_response, optional_f64, optional_str, parse_param,
    required_str, respond, svc, to_json, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::LabUpdate;
use crate::services::labs;

fn handle_labs_list(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let course_id = required_str(req, "courseId")?;
    let list = labs::list_by_course(conn, &course_id).map_err(|e| svc(req, e))?;
    Ok(json!({ "labs": to_json(req, &list)? }))
}

fn handle_labs_create(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let course_id = required_str(req, "courseId")?;
    let title = required_str(req, "title")?;
    let description = optional_str(req, "description")?;
    let max_score = optional_f64(req, "maxScore")?;
    let lab = labs::create(conn, &course_id, &title, description.as_deref(), max_score)
        .map_err(|e| svc(req, e))?;
    to_json(req, &lab)
}

fn handle_labs_get(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let lab_id = required_str(req, "labId")?;
    let lab = labs::get(conn, &lab_id).map_err(|e| svc(req, e))?;
    to_json(req, &lab)
}

fn handle_labs_update(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let lab_id = required_str(req, "labId")?;
    let changes: LabUpdate = parse_param(req, "changes")?;
    let lab = labs::update(conn, &lab_id, &changes).map_err(|e| svc(req, e))?;
    to_json(req, &lab)
}

fn handle_labs_dependencies(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let lab_id = required_str(req, "labId")?;
    let deps = labs::check_dependencies(conn, &lab_id).map_err(|e| svc(req, e))?;
    to_json(req, &deps)
}

fn handle_labs_delete(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let lab_id = required_str(req, "labId")?;
    let policy = delete_policy(req)?;
    delete_response(req, labs::delete(conn, &lab_id, policy))
}

fn handle_labs_stats(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let lab_id = required_str(req, "labId")?;
    let stats = labs::statistics(conn, &lab_id).map_err(|e| svc(req, e))?;
    to_json(req, &stats)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "labs.list" => handle_labs_list(state, req),
        "labs.create" => handle_labs_create(state, req),
        "labs.get" => handle_labs_get(state, req),
        "labs.update" => handle_labs_update(state, req),
        "labs.dependencies" => handle_labs_dependencies(state, req),
        "labs.delete" => handle_labs_delete(state, req),
        "labs.stats" => handle_labs_stats(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
