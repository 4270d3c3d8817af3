//! API error types and HTTP response conversion.
//!
//! Every error body has the shape `{"detail": "<message>"}`; validation
//! errors may add a `fields` array with per-field details.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::db::DatabaseError;

/// API result type.
pub type ApiResult<T> = Result<T, ApiError>;

/// Custom API error type.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or invalid credentials.
    #[error("{0}")]
    Unauthorized(String),

    /// Resource does not exist (scoped to owner for CRUD).
    #[error("{0}")]
    NotFound(String),

    /// Resource exists or the thread already has an active run.
    #[error("{0}")]
    Conflict(String),

    /// Malformed body, invalid enum, missing required field.
    #[error("{0}")]
    Validation(String),

    /// Validation error with per-field details.
    #[error("{message}")]
    ValidationFields {
        message: String,
        fields: Vec<serde_json::Value>,
    },

    /// Unexpected failure; always logged with its source.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Validation(_) | ApiError::ValidationFields { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn not_found(what: impl std::fmt::Display) -> Self {
        ApiError::NotFound(format!("{} not found", what))
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::Validation(msg.into())
    }

    pub fn internal(msg: impl std::fmt::Display) -> Self {
        ApiError::Internal(msg.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "internal server error");
        }
        let body = match &self {
            ApiError::ValidationFields { message, fields } => {
                json!({"detail": message, "fields": fields})
            }
            other => json!({"detail": other.to_string()}),
        };
        (status, Json(body)).into_response()
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        if err.is_not_found() {
            ApiError::NotFound(err.to_string())
        } else if err.is_constraint_violation() {
            ApiError::Conflict(err.to_string())
        } else {
            ApiError::Internal(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Validation(err.to_string())
    }
}
