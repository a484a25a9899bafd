//! Domain errors raised by the record services.
//!
//! Every failure a service can produce is one of these kinds; nothing else
//! crosses the service boundary. The IPC layer turns them into wire errors
//! using [`ServiceError::code`] and [`ServiceError::details`].

use rusqlite::ErrorCode;
use serde_json::json;
use thiserror::Error;

use crate::model::DependencyReport;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{message}")]
    DuplicateKey {
        entity: &'static str,
        message: String,
    },

    #[error("score {score} is out of range (0 to {max})")]
    OutOfRange { score: f64, max: f64 },

    #[error("{message}")]
    DependencyConflict {
        entity: &'static str,
        message: String,
        dependencies: DependencyReport,
    },

    #[error("{0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        ServiceError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn duplicate(entity: &'static str, message: impl Into<String>) -> Self {
        ServiceError::DuplicateKey {
            entity,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::NotFound { .. } => "not_found",
            ServiceError::DuplicateKey { .. } => "duplicate_key",
            ServiceError::OutOfRange { .. } => "out_of_range",
            ServiceError::DependencyConflict { .. } => "dependency_conflict",
            ServiceError::Validation(_) => "bad_params",
            ServiceError::Storage(_) => "db_query_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            ServiceError::NotFound { entity, id } => Some(json!({ "entity": entity, "id": id })),
            ServiceError::DuplicateKey { entity, .. } => Some(json!({ "entity": entity })),
            ServiceError::OutOfRange { score, max } => Some(json!({ "score": score, "max": max })),
            ServiceError::DependencyConflict {
                entity,
                dependencies,
                ..
            } => Some(json!({ "entity": entity, "dependencies": dependencies })),
            ServiceError::Validation(_) | ServiceError::Storage(_) => None,
        }
    }

    /// Maps a SQLite UNIQUE violation to `DuplicateKey`; everything else stays
    /// a storage error. The explicit pre-checks normally catch these first.
    pub fn from_insert(entity: &'static str, e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(f, msg)
                if f.code == ErrorCode::ConstraintViolation
                    && msg.as_deref().is_some_and(|m| m.contains("UNIQUE")) =>
            {
                ServiceError::duplicate(entity, format!("{entity} already exists"))
            }
            _ => ServiceError::Storage(e),
        }
    }
}
