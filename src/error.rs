// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
///
/// Each variant corresponds to one taxonomy kind surfaced to callers as
/// `{ "error": <message>, "kind": <kind> }`. Internal messages are logged,
/// never exposed.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 400 Bad Request (malformed or invalid request payload)
    BadRequest(String),

    // 401 Unauthorized (missing/unparseable identity)
    AuthError(String),

    // 403 Forbidden (caller's role may not perform this operation)
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict: a submission already exists for this (test, student)
    AlreadySubmitted(String),

    // 409 Conflict: the test has live submissions, question set is frozen
    TestLocked(String),

    // 409 Conflict: inactive, outside its window, or has no questions
    TestNotTakeable(String),

    // 422 Unprocessable: manual correction outside [0, question.marks]
    InvalidMarks(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

impl AppError {
    /// Taxonomy kind string included in every error response body.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InternalServerError(_) => "INTERNAL",
            AppError::BadRequest(_) => "VALIDATION",
            AppError::AuthError(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::AlreadySubmitted(_) => "ALREADY_SUBMITTED",
            AppError::TestLocked(_) => "TEST_LOCKED",
            AppError::TestNotTakeable(_) => "TEST_NOT_TAKEABLE",
            AppError::InvalidMarks(_) => "INVALID_MARKS",
        }
    }
}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let (status, error_message) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::AlreadySubmitted(msg)
            | AppError::TestLocked(msg)
            | AppError::TestNotTakeable(msg) => (StatusCode::CONFLICT, msg),
            AppError::InvalidMarks(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
        };
        let body = Json(json!({
            "error": error_message,
            "kind": kind,
        }));

        (status, body).into_response()
    }
}

/// Converts `sqlx::Error` into `AppError::InternalServerError`.
/// Allows using `?` operator on database queries.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
