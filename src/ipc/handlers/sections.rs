use serde_json::json;

use super::{
    db_conn, delete_policy, delete_response, parse_param, required_str, respond, svc, to_json,
    HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::SectionUpdate;
use crate::services::sections;

fn handle_sections_list(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let course_id = required_str(req, "courseId")?;
    let list = sections::list_by_course(conn, &course_id).map_err(|e| svc(req, e))?;
    Ok(json!({ "sections": to_json(req, &list)? }))
}

fn handle_sections_create(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let course_id = required_str(req, "courseId")?;
    let label = required_str(req, "label")?;
    let instructor = required_str(req, "instructor")?;
    let section =
        sections::create(conn, &course_id, &label, &instructor).map_err(|e| svc(req, e))?;
    to_json(req, &section)
}

fn handle_sections_get(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let section_id = required_str(req, "sectionId")?;
    let section = sections::get(conn, &section_id).map_err(|e| svc(req, e))?;
    let display = sections::display_label(conn, &section_id).map_err(|e| svc(req, e))?;
    let mut v = to_json(req, &section)?;
    v["displayLabel"] = json!(display);
    Ok(v)
}

fn handle_sections_get_by_label(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let course_id = required_str(req, "courseId")?;
    let label = required_str(req, "label")?;
    let section = sections::get_by_label(conn, &course_id, &label).map_err(|e| svc(req, e))?;
    Ok(json!({ "section": to_json(req, &section)? }))
}

fn handle_sections_update(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let section_id = required_str(req, "sectionId")?;
    let changes: SectionUpdate = parse_param(req, "changes")?;
    let section = sections::update(conn, &section_id, &changes).map_err(|e| svc(req, e))?;
    to_json(req, &section)
}

fn handle_sections_dependencies(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let section_id = required_str(req, "sectionId")?;
    let deps = sections::check_dependencies(conn, &section_id).map_err(|e| svc(req, e))?;
    to_json(req, &deps)
}

fn handle_sections_delete(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let section_id = required_str(req, "sectionId")?;
    let policy = delete_policy(req)?;
    delete_response(req, sections::delete(conn, &section_id, policy))
}

fn handle_sections_groups(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let section_id = required_str(req, "sectionId")?;
    let groups = sections::group_labels(conn, &section_id).map_err(|e| svc(req, e))?;
    Ok(json!({ "groups": groups }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "sections.list" => handle_sections_list(state, req),
        "sections.create" => handle_sections_create(state, req),
        "sections.get" => handle_sections_get(state, req),
        "sections.getByLabel" => handle_sections_get_by_label(state, req),
        "sections.update" => handle_sections_update(state, req),
        "sections.dependencies" => handle_sections_dependencies(state, req),
        "sections.delete" => handle_sections_delete(state, req),
        "sections.groups" => handle_sections_groups(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
