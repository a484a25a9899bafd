use crate::db;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};

use super::{required_str, respond, HandlerResult};
use crate::ipc::error::err;

fn health(state: &AppState) -> HandlerResult {
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
        "dbFileName": state.config.db_file_name,
    }))
}

fn workspace_select(state: &mut AppState, req: &Request) -> HandlerResult {
    let path = PathBuf::from(required_str(req, "path")?);
    let conn = db::open_db(&path, &state.config.db_file_name).map_err(|e| {
        warn!(path = %path.to_string_lossy(), error = ?e, "workspace open failed");
        err(&req.id, "db_open_failed", format!("{e:?}"), None)
    })?;

    // Replacing the handle closes the previous workspace's connection.
    state.db = Some(conn);
    state.workspace = Some(path.clone());
    info!(path = %path.to_string_lossy(), "workspace selected");
    Ok(json!({ "workspacePath": path.to_string_lossy() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(respond(req, health(state))),
        "workspace.select" => Some(respond(req, workspace_select(state, req))),
        _ => None,
    }
}
