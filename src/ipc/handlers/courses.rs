use serde_json::json;

use super::{
    db_conn, delete_policy, delete_response, parse_param, required_str, respond, svc, to_json,
    HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::CourseUpdate;
use crate::services::courses;

fn handle_courses_list(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let list = courses::list(conn).map_err(|e| svc(req, e))?;
    Ok(json!({ "courses": to_json(req, &list)? }))
}

fn handle_courses_create(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let name = required_str(req, "name")?;
    let code = required_str(req, "code")?;
    let course = courses::create(conn, &name, &code).map_err(|e| svc(req, e))?;
    to_json(req, &course)
}

fn handle_courses_get(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let course_id = required_str(req, "courseId")?;
    let course = courses::get(conn, &course_id).map_err(|e| svc(req, e))?;
    to_json(req, &course)
}

fn handle_courses_get_by_code(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let code = required_str(req, "code")?;
    let course = courses::get_by_code(conn, &code).map_err(|e| svc(req, e))?;
    Ok(json!({ "course": to_json(req, &course)? }))
}

fn handle_courses_search(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let term = required_str(req, "term")?;
    let hits = courses::search(conn, &term).map_err(|e| svc(req, e))?;
    Ok(json!({ "courses": to_json(req, &hits)? }))
}

fn handle_courses_update(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let course_id = required_str(req, "courseId")?;
    let changes: CourseUpdate = parse_param(req, "changes")?;
    let course = courses::update(conn, &course_id, &changes).map_err(|e| svc(req, e))?;
    to_json(req, &course)
}

fn handle_courses_dependencies(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let course_id = required_str(req, "courseId")?;
    let deps = courses::check_dependencies(conn, &course_id).map_err(|e| svc(req, e))?;
    to_json(req, &deps)
}

fn handle_courses_delete(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let course_id = required_str(req, "courseId")?;
    let policy = delete_policy(req)?;
    delete_response(req, courses::delete(conn, &course_id, policy))
}

fn handle_courses_stats(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let stats = courses::statistics(conn).map_err(|e| svc(req, e))?;
    to_json(req, &stats)
}

fn handle_courses_summary(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let course_id = required_str(req, "courseId")?;
    let summary = courses::summary(conn, &course_id).map_err(|e| svc(req, e))?;
    to_json(req, &summary)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "courses.list" => handle_courses_list(state, req),
        "courses.create" => handle_courses_create(state, req),
        "courses.get" => handle_courses_get(state, req),
        "courses.getByCode" => handle_courses_get_by_code(state, req),
        "courses.search" => handle_courses_search(state, req),
        "courses.update" => handle_courses_update(state, req),
        "courses.dependencies" => handle_courses_dependencies(state, req),
        "courses.delete" => handle_courses_delete(state, req),
        "courses.stats" => handle_courses_stats(state, req),
        "courses.summary" => handle_courses_summary(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
