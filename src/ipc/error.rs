use serde::Serialize;
use serde_json::Value;
use tracing::{error, warn};

use crate::error::ServiceError;

#[derive(Serialize)]
struct WireError<'a> {
    code: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

#[derive(Serialize)]
struct Envelope<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<WireError<'a>>,
}

impl Envelope<'_> {
    fn into_value(self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

pub fn ok(id: &str, result: Value) -> Value {
    Envelope {
        id: Some(id),
        ok: true,
        result: Some(result),
        error: None,
    }
    .into_value()
}

pub fn err(id: &str, code: &str, message: impl Into<String>, details: Option<Value>) -> Value {
    Envelope {
        id: Some(id),
        ok: false,
        result: None,
        error: Some(WireError {
            code,
            message: message.into(),
            details,
        }),
    }
    .into_value()
}

/// Reply to a line that did not parse as a request; there is no id to echo.
pub fn bad_json(message: impl Into<String>) -> Value {
    Envelope {
        id: None,
        ok: false,
        result: None,
        error: Some(WireError {
            code: "bad_json",
            message: message.into(),
            details: None,
        }),
    }
    .into_value()
}

/// Wire form of a service failure. Storage failures are logged as errors,
/// everything else is a rejected request.
pub fn service_err(id: &str, method: &str, e: &ServiceError) -> Value {
    match e {
        ServiceError::Storage(inner) => error!(%method, error = %inner, "storage failure"),
        other => warn!(%method, code = other.code(), error = %other, "request rejected"),
    }
    err(id, e.code(), e.to_string(), e.details())
}
