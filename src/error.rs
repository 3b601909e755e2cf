//! Typed errors and HTTP mapping.

use crate::model::EntityKind;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Problems with the declared entity model or relationship table.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("duplicate entity declaration: {0}")]
    DuplicateEntity(EntityKind),
    #[error("entity {kind} declares field '{field}' twice")]
    DuplicateField { kind: EntityKind, field: String },
    #[error("entity {kind} field '{field}' collides with a system column")]
    ReservedField { kind: EntityKind, field: String },
    #[error("relation {from}.{column} references undeclared column")]
    UnknownRelationColumn { from: EntityKind, column: String },
    #[error("relation {from}.{column} points at undeclared entity {to}")]
    UnknownRelationTarget { from: EntityKind, column: String, to: EntityKind },
}

/// Problems reading process configuration from the environment.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {var}: '{value}'")]
    InvalidValue { var: &'static str, value: String },
    #[error("invalid schema name '{0}': must be a plain lowercase identifier")]
    InvalidSchema(String),
}

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("duplicate migration id: {0}")]
    DuplicateId(String),
    #[error("unknown migration target: {0}")]
    UnknownTarget(String),
    #[error("migration {id} failed at step {step}: {source}")]
    Step {
        id: String,
        step: usize,
        #[source]
        source: Box<AppError>,
    },
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: i64 },
    #[error("unknown entity: {0}")]
    UnknownEntity(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("storage: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    pub fn not_found(kind: EntityKind, id: i64) -> Self {
        AppError::NotFound { kind, id }
    }

    /// Map a Postgres unique violation (SQLSTATE 23505) to `Conflict`; everything else stays a storage error.
    pub fn from_db(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db) = err {
            if db.code().as_deref() == Some("23505") {
                let constraint = db.constraint().unwrap_or("unique constraint").to_string();
                return AppError::Conflict(format!("duplicate value violates {}", constraint));
            }
        }
        AppError::Storage(err)
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Model(_) => (StatusCode::INTERNAL_SERVER_ERROR, "model_error"),
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::Migration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "migration_error"),
            AppError::NotFound { .. } | AppError::UnknownEntity(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::NotFound { kind, id } => Some(serde_json::json!({ "entity": kind.as_str(), "id": id })),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details: self.details(),
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(AppError::not_found(EntityKind::Unit, 4), StatusCode::NOT_FOUND, "not_found")]
    #[case(AppError::Validation("name is required".into()), StatusCode::UNPROCESSABLE_ENTITY, "validation_error")]
    #[case(AppError::Conflict("filename".into()), StatusCode::CONFLICT, "conflict")]
    #[case(AppError::Storage(sqlx::Error::PoolTimedOut), StatusCode::INTERNAL_SERVER_ERROR, "storage_error")]
    fn maps_errors_to_status(#[case] err: AppError, #[case] status: StatusCode, #[case] code: &str) {
        assert_eq!(err.status_and_code(), (status, code));
    }

    #[test]
    fn not_found_carries_entity_and_id() {
        let err = AppError::not_found(EntityKind::Sale, 12);
        assert_eq!(err.to_string(), "sale 12 not found");
        assert_eq!(err.details(), Some(serde_json::json!({ "entity": "sale", "id": 12 })));
    }
}
