use serde_json::json;
use std::path::PathBuf;

use super::{db_conn, optional_str, required_str, respond, svc, to_json, HandlerResult};
use crate::error::ServiceError;
use crate::export;
use crate::ipc::error::{err, service_err};
use crate::ipc::types::{AppState, Request};
use crate::reports;
use tracing::warn;

fn handle_reports_matrix(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let section_id = required_str(req, "sectionId")?;
    let matrix = reports::matrix(conn, &section_id).map_err(|e| svc(req, e))?;
    to_json(req, &matrix)
}

fn handle_reports_section_stats(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let section_id = required_str(req, "sectionId")?;
    let stats = reports::section_statistics(conn, &section_id).map_err(|e| svc(req, e))?;
    to_json(req, &stats)
}

fn handle_reports_export_section_csv(state: &AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let section_id = required_str(req, "sectionId")?;
    let out_path = match optional_str(req, "outPath")? {
        Some(p) => PathBuf::from(p),
        None => {
            let Some(workspace) = state.workspace.as_ref() else {
                return Err(err(&req.id, "bad_params", "missing outPath", None));
            };
            workspace.join("exports").join(format!("section-{section_id}.csv"))
        }
    };

    let summary = export::export_section_csv(conn, &section_id, &out_path).map_err(|e| {
        if let Some(service) = e.downcast_ref::<ServiceError>() {
            return service_err(&req.id, &req.method, service);
        }
        warn!(path = %out_path.to_string_lossy(), error = ?e, "export failed");
        err(
            &req.id,
            "io_failed",
            format!("{e:?}"),
            Some(json!({ "path": out_path.to_string_lossy() })),
        )
    })?;

    Ok(json!({
        "path": summary.path.to_string_lossy(),
        "students": summary.students,
        "labs": summary.labs,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "reports.matrix" => handle_reports_matrix(state, req),
        "reports.sectionStats" => handle_reports_section_stats(state, req),
        "reports.exportSectionCsv" => handle_reports_export_section_csv(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
