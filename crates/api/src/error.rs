//! API error types with HTTP response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{ActionError, UserError};
use serde_json::json;
use store::StoreError;

use crate::validation::ValidationErrors;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Request payload failed validation.
    Validation(ValidationErrors),
    /// A post action failed. The cause has already been logged.
    Action(ActionError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "success": false, "message": msg })),
            )
                .into_response(),
            ApiError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "message": errors.message(), "errors": errors })),
            )
                .into_response(),
            ApiError::Action(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "message": err.to_string() })),
            )
                .into_response(),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "success": false, "message": "Server Error" })),
                )
                    .into_response()
            }
        }
    }
}

impl From<ActionError> for ApiError {
    fn from(err: ActionError) -> Self {
        ApiError::Action(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<UserError> for ApiError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::EmailTaken(_) => ApiError::Validation(ValidationErrors::single(
                "email",
                "The email has already been taken.",
            )),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
