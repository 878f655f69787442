//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use jobtrack_core::SessionError;
use thiserror::Error;
use tracing::error;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("OAuth error: {message}")]
    OAuth {
        message: String,
        detail: Option<String>,
    },

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m),
            AppError::Conflict(m) => (StatusCode::CONFLICT, "conflict", m),
            AppError::OAuth { message, detail } => {
                let message = match detail {
                    Some(detail) => format!("{message}: {detail}"),
                    None => message,
                };
                (StatusCode::BAD_GATEWAY, "oauth_error", message)
            }
            AppError::Unavailable(m) => {
                error!(error = %m, "dependency unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "service_unavailable",
                    "Service temporarily unavailable".to_string(),
                )
            }
            AppError::Internal(m) => {
                error!(error = %m, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error".to_string(),
                )
            }
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message,
        });
        (status, body).into_response()
    }
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Authentication(msg) => AppError::Unauthorized(msg),
            SessionError::Conflict(msg) => AppError::Conflict(msg),
            SessionError::Validation(msg) => AppError::Validation(msg),
            SessionError::NotFound(msg) => AppError::NotFound(msg),
            SessionError::OAuth { message, detail } => AppError::OAuth { message, detail },
            SessionError::Unavailable(msg) => AppError::Unavailable(msg),
            SessionError::Configuration(msg) | SessionError::Internal(msg) => {
                AppError::Internal(msg)
            }
        }
    }
}
