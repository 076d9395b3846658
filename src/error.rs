use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Failures raised by the pure calendar core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalendarError {
    #[error("Validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),

    #[error("Invalid recurrence rule: {0}")]
    InvalidRecurrenceRule(String),

    #[error("Malformed event record {id}: {reason}")]
    MalformedRecord { id: i64, reason: String },
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {0}")]
    DbError(#[from] sqlx::Error),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Calendar(#[from] CalendarError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message, details) = match self {
            AppError::DbError(e) => {
                tracing::error!(error = ?e, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Server Error",
                    "Something went wrong".to_string(),
                    None,
                )
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not Found", msg, None),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Bad Request", msg, None),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "Time conflict", msg, None),
            AppError::Calendar(CalendarError::Validation(errors)) => (
                StatusCode::BAD_REQUEST,
                "Validation failed",
                errors.join(", "),
                Some(errors),
            ),
            AppError::Calendar(e @ CalendarError::InvalidRecurrenceRule(_)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Invalid recurrence rule",
                e.to_string(),
                None,
            ),
            AppError::Calendar(e @ CalendarError::MalformedRecord { .. }) => {
                tracing::error!(error = %e, "stored event could not be decoded");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Server Error",
                    "Something went wrong".to_string(),
                    None,
                )
            }
        };

        let mut body = json!({ "error": error, "message": message });
        if let Some(details) = details {
            body["details"] = json!(details);
        }
        (status, Json(body)).into_response()
    }
}
