//! Method handlers, one module per entity. Each `try_handle` claims the
//! methods of its namespace and returns `None` for everything else.

pub mod core;
pub mod courses;
pub mod grades;
pub mod labs;
pub mod reports;
pub mod sections;
pub mod students;

use rusqlite::Connection;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use tracing::warn;

use crate::error::{ServiceError, ServiceResult};
use crate::ipc::error::{err, ok, service_err};
use crate::ipc::types::{AppState, Request};
use crate::model::{DeleteOutcome, DeletePolicy};

/// `Err` already holds the complete error envelope.
type HandlerResult = Result<serde_json::Value, serde_json::Value>;

fn respond(req: &Request, result: HandlerResult) -> serde_json::Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e,
    }
}

fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

fn optional_str(req: &Request, key: &str) -> Result<Option<String>, serde_json::Value> {
    match req.params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be a string", key), None)),
    }
}

fn optional_f64(req: &Request, key: &str) -> Result<Option<f64>, serde_json::Value> {
    match req.params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be a number", key), None)),
    }
}

/// Deserializes `params[key]` into a typed request struct; unknown fields
/// are rejected by the target type.
fn parse_param<T: DeserializeOwned>(req: &Request, key: &str) -> Result<T, serde_json::Value> {
    let Some(raw) = req.params.get(key) else {
        return Err(err(&req.id, "bad_params", format!("missing {}", key), None));
    };
    serde_json::from_value(raw.clone()).map_err(|e| {
        err(
            &req.id,
            "bad_params",
            format!("invalid {}: {}", key, e),
            Some(json!({ "param": key })),
        )
    })
}

fn delete_policy(req: &Request) -> Result<DeletePolicy, serde_json::Value> {
    match req.params.get("policy") {
        None | Some(serde_json::Value::Null) => Ok(DeletePolicy::default()),
        Some(raw) => serde_json::from_value(raw.clone()).map_err(|_| {
            err(
                &req.id,
                "bad_params",
                "policy must be \"abort\" or \"cascade\"",
                None,
            )
        }),
    }
}

fn svc(req: &Request, e: ServiceError) -> serde_json::Value {
    service_err(&req.id, &req.method, &e)
}

fn to_json<T: Serialize>(req: &Request, v: &T) -> HandlerResult {
    serde_json::to_value(v).map_err(|e| err(&req.id, "internal", e.to_string(), None))
}

/// Deletions answer in one structured shape: a refused `abort` is still an
/// `ok` envelope, carrying `success: false` and the blocking counts.
fn delete_response(req: &Request, outcome: ServiceResult<DeleteOutcome>) -> HandlerResult {
    match outcome {
        Ok(done) => to_json(req, &done),
        Err(ServiceError::DependencyConflict {
            entity,
            message,
            dependencies,
        }) => {
            warn!(method = %req.method, %entity, ?dependencies, "deletion refused");
            Ok(json!({
                "success": false,
                "message": message,
                "dependencies": dependencies,
            }))
        }
        Err(e) => Err(svc(req, e)),
    }
}
