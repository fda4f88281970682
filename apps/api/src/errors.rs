use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::job_board::JobBoardError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Job board error: {0}")]
    JobBoard(#[from] JobBoardError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            AppError::Llm(msg) => {
                tracing::error!("LLM error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "LLM_ERROR",
                    "An AI processing error occurred".to_string(),
                )
            }
            AppError::JobBoard(e) => match e.status() {
                Some(401 | 403) => (
                    StatusCode::UNAUTHORIZED,
                    "JOB_BOARD_UNAUTHORIZED",
                    "The job board rejected the stored credentials; reconnect the account".to_string(),
                ),
                Some(404) => (StatusCode::NOT_FOUND, "NOT_FOUND", e.to_string()),
                _ => {
                    tracing::error!("Job board error: {e}");
                    (StatusCode::BAD_GATEWAY, "JOB_BOARD_ERROR", e.to_string())
                }
            },
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AppError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (AppError::Conflict("x".into()), StatusCode::CONFLICT),
            (AppError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (AppError::Llm("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (
                AppError::JobBoard(JobBoardError::MissingResume),
                StatusCode::BAD_GATEWAY,
            ),
            (
                AppError::JobBoard(JobBoardError::Status {
                    status: 403,
                    endpoint: "/me".to_string(),
                    body: String::new(),
                }),
                StatusCode::UNAUTHORIZED,
            ),
            (
                AppError::JobBoard(JobBoardError::Status {
                    status: 404,
                    endpoint: "/vacancies/1".to_string(),
                    body: String::new(),
                }),
                StatusCode::NOT_FOUND,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
