use serde_json::json;
use std::str::FromStr;

use super::{
    db_conn, delete_policy, delete_response, optional_str, parse_param, required_str, respond,
    svc, to_json, HandlerResult,
};
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::model::{StudentSort, StudentUpdate};
use crate::services::students;

fn parse_sort(req: &Request) -> Result<StudentSort, serde_json::Value> {
    match optional_str(req, "sort")? {
        None => Ok(StudentSort::default()),
        Some(key) => StudentSort::from_str(&key).map_err(|e| svc(req, e)),
    }
}

fn handle_students_list(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let section_id = required_str(req, "sectionId")?;
    let sort = parse_sort(req)?;
    let roster = students::list_by_section(conn, &section_id, sort).map_err(|e| svc(req, e))?;
    Ok(json!({ "students": to_json(req, &roster)? }))
}

fn handle_students_register(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let name = required_str(req, "name")?;
    let national_id = required_str(req, "nationalId")?;
    let section_id = required_str(req, "sectionId")?;
    let group = optional_str(req, "group")?;
    let student = students::register(conn, &name, &national_id, &section_id, group.as_deref())
        .map_err(|e| svc(req, e))?;
    to_json(req, &student)
}

fn handle_students_get(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let student_id = required_str(req, "studentId")?;
    let student = students::get(conn, &student_id).map_err(|e| svc(req, e))?;
    to_json(req, &student)
}

fn handle_students_search_by_id(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let national_id = required_str(req, "nationalId")?;
    let hit = students::search_by_id(conn, &national_id).map_err(|e| svc(req, e))?;
    Ok(json!({ "student": to_json(req, &hit)? }))
}

fn handle_students_list_by_group(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let section_id = required_str(req, "sectionId")?;
    let group = required_str(req, "group")?;
    let members = students::list_by_group(conn, &section_id, &group).map_err(|e| svc(req, e))?;
    Ok(json!({ "students": to_json(req, &members)? }))
}

fn handle_students_update(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let student_id = required_str(req, "studentId")?;
    let changes: StudentUpdate = parse_param(req, "changes")?;
    let student = students::update(conn, &student_id, &changes).map_err(|e| svc(req, e))?;
    to_json(req, &student)
}

fn handle_students_set_group(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let student_id = required_str(req, "studentId")?;
    let group = optional_str(req, "group")?;
    let student =
        students::set_group(conn, &student_id, group.as_deref()).map_err(|e| svc(req, e))?;
    to_json(req, &student)
}

fn handle_students_dependencies(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let student_id = required_str(req, "studentId")?;
    let deps = students::check_dependencies(conn, &student_id).map_err(|e| svc(req, e))?;
    to_json(req, &deps)
}

fn handle_students_delete(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let student_id = required_str(req, "studentId")?;
    let policy = delete_policy(req)?;
    delete_response(req, students::delete(conn, &student_id, policy))
}

fn handle_students_auto_group(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let section_id = required_str(req, "sectionId")?;
    let Some(group_size) = req.params.get("groupSize").and_then(|v| v.as_u64()) else {
        return Err(err(
            &req.id,
            "bad_params",
            "groupSize must be a non-negative integer",
            None,
        ));
    };
    let outcome = students::auto_group(conn, &section_id, group_size as usize)
        .map_err(|e| svc(req, e))?;
    to_json(req, &outcome)
}

fn handle_students_stats(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let section_id = required_str(req, "sectionId")?;
    let stats = students::section_statistics(conn, &section_id).map_err(|e| svc(req, e))?;
    to_json(req, &stats)
}

fn handle_students_average(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let student_id = required_str(req, "studentId")?;
    let average = students::average(conn, &student_id).map_err(|e| svc(req, e))?;
    Ok(json!({ "studentId": student_id, "average": average }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.list" => handle_students_list(state, req),
        "students.register" => handle_students_register(state, req),
        "students.get" => handle_students_get(state, req),
        "students.searchById" => handle_students_search_by_id(state, req),
        "students.listByGroup" => handle_students_list_by_group(state, req),
        "students.update" => handle_students_update(state, req),
        "students.setGroup" => handle_students_set_group(state, req),
        "students.dependencies" => handle_students_dependencies(state, req),
        "students.delete" => handle_students_delete(state, req),
        "students.autoGroup" => handle_students_auto_group(state, req),
        "students.stats" => handle_students_stats(state, req),
        "students.average" => handle_students_average(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
