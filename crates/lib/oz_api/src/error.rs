//! Application error types.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use oz_core::auth::AuthError;
use oz_core::chat::ChatError;
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

    #[error("Two-factor code required")]
    TwoFactorRequired,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid two-factor code")]
    TwoFactorInvalid,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Account locked for {retry_after_secs}s")]
    LockedOut { retry_after_secs: i64 },

    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, detail) = match &self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m.clone()),
            AppError::TwoFactorRequired => (
                StatusCode::BAD_REQUEST,
                "two_factor_required",
                "Two-factor authentication code is required".to_string(),
            ),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.clone()),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m.clone()),
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "invalid_credentials",
                "Invalid credentials".to_string(),
            ),
            AppError::TwoFactorInvalid => (
                StatusCode::UNAUTHORIZED,
                "two_factor_invalid",
                "Invalid two-factor authentication code".to_string(),
            ),
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, "forbidden", m.clone()),
            AppError::LockedOut { retry_after_secs } => (
                StatusCode::FORBIDDEN,
                "locked_out",
                format!(
                    "Account is locked. Try again in {} minutes.",
                    (retry_after_secs + 59) / 60
                ),
            ),
            AppError::Internal(m) => {
                error!(error = %m, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error".to_string(),
                )
            }
        };

        let retry_after = match self {
            AppError::LockedOut { retry_after_secs } => Some(retry_after_secs),
            _ => None,
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            detail,
            retry_after,
        });
        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after
            && let Ok(value) = HeaderValue::from_str(&secs.to_string())
        {
            response.headers_mut().insert(RETRY_AFTER, value);
        }
        response
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Validation(msg) => AppError::Validation(msg),
            AuthError::NotFound(msg) => AppError::NotFound(msg),
            AuthError::LockedOut { remaining_secs } => AppError::LockedOut {
                retry_after_secs: remaining_secs,
            },
            AuthError::InvalidCredentials => AppError::InvalidCredentials,
            AuthError::TwoFactorRequired => AppError::TwoFactorRequired,
            AuthError::TwoFactorInvalid => AppError::TwoFactorInvalid,
            AuthError::AuthenticationFailed(msg) => AppError::Unauthorized(msg),
            AuthError::Forbidden(msg) => AppError::Forbidden(msg),
            AuthError::Store(e) => AppError::Internal(e.to_string()),
            AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<ChatError> for AppError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::Validation(msg) => AppError::Validation(msg),
            ChatError::MalformedPayload(msg) => AppError::Validation(msg),
            ChatError::Forbidden(msg) => AppError::Forbidden(msg),
            ChatError::Store(e) => AppError::Internal(e.to_string()),
            ChatError::Internal(msg) => AppError::Internal(msg),
        }
    }
}
