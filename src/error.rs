// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::{models::quiz_result::ParseError, plot::PlotError};

/// Errors a handler can answer with. Each maps to one HTTP status and a
/// `{"error": "..."}` body.
///
/// Analytics that merely lack data are not errors: they answer 200 with an
/// `Outcome::Unavailable` payload instead.
#[derive(Debug)]
pub enum AppError {
    // 500; the message is logged, never sent to the client
    InternalServerError(String),

    // 400
    BadRequest(String),

    // 401, missing or invalid token
    AuthError(String),

    // 403, e.g. learner not enrolled in the course or not an admin
    Forbidden(String),

    // 404
    NotFound(String),

    // 409, two submissions racing for the same attempt number
    Conflict(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (AppError::InternalServerError(msg)
        | AppError::BadRequest(msg)
        | AppError::AuthError(msg)
        | AppError::Forbidden(msg)
        | AppError::NotFound(msg)
        | AppError::Conflict(msg)) = self;
        write!(f, "{} {}", self.status().as_u16(), msg)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                "Internal Server Error".to_string()
            }
            AppError::BadRequest(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg) => msg,
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Unique violations (two writers claiming the same attempt number or
/// enrollment) surface as a retryable conflict.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => AppError::Conflict(
                "Conflicting concurrent write; please retry".to_string(),
            ),
            _ => AppError::InternalServerError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

/// A stored sub-record that cannot be read is a server-side data problem.
impl From<ParseError> for AppError {
    fn from(err: ParseError) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<PlotError> for AppError {
    fn from(err: PlotError) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}
