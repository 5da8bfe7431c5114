//! Centralized error types for Courseforge.
//!
//! Uses `thiserror` for ergonomic error definitions and provides HTTP-friendly
//! error variants that can be directly converted to API responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::drip::DripError;
use crate::payments::SignatureError;
use crate::schedule::ScheduleError;

/// Core application error type used across all Courseforge services.
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    // === Auth errors ===
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    // === Resource errors ===
    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("{resource} already exists")]
    AlreadyExists { resource: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    // === Validation errors ===
    #[error("Validation failed: {message}")]
    Validation { message: String },

    // === Access errors ===
    #[error("Forbidden")]
    Forbidden,

    #[error("You are not enrolled in this course")]
    MissingEntitlement,

    #[error("Lesson is locked until {unlock_at}")]
    Locked { unlock_at: DateTime<Utc> },

    // === Infrastructure errors ===
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// JSON error response body sent to clients.
#[derive(Serialize)]
struct ErrorResponse {
    code: u16,
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    unlock_at: Option<DateTime<Utc>>,
}

impl ForgeError {
    /// Shorthand for a `NotFound` error.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Shorthand for a `Validation` error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Map error to HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials | Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::TokenExpired => StatusCode::UNAUTHORIZED,
            Self::Unauthorized | Self::InvalidSignature(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::AlreadyExists { .. } | Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Forbidden | Self::MissingEntitlement | Self::Locked { .. } => {
                StatusCode::FORBIDDEN
            }
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Error code string for programmatic handling by clients.
    pub fn error_code(&self) -> &str {
        match self {
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::InvalidSignature(_) => "INVALID_SIGNATURE",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::AlreadyExists { .. } => "ALREADY_EXISTS",
            Self::Conflict { .. } => "CONFLICT",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Forbidden => "FORBIDDEN",
            Self::MissingEntitlement => "NOT_ENROLLED",
            Self::Locked { .. } => "LESSON_LOCKED",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<ScheduleError> for ForgeError {
    fn from(e: ScheduleError) -> Self {
        Self::validation(e.to_string())
    }
}

impl From<DripError> for ForgeError {
    fn from(e: DripError) -> Self {
        Self::validation(e.to_string())
    }
}

impl IntoResponse for ForgeError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't leak internal details to clients
        let message = match &self {
            ForgeError::Database(e) => {
                tracing::error!("Database error: {e}");
                "An internal error occurred".to_string()
            }
            ForgeError::Internal(e) => {
                tracing::error!("Internal error: {e}");
                "An internal error occurred".to_string()
            }
            ForgeError::InvalidSignature(e) => {
                tracing::warn!("Rejected webhook: {e}");
                "Invalid webhook signature".to_string()
            }
            other => other.to_string(),
        };

        let unlock_at = if let ForgeError::Locked { unlock_at } = &self {
            Some(*unlock_at)
        } else {
            None
        };

        let body = ErrorResponse {
            code: status.as_u16(),
            error: self.error_code().to_string(),
            message,
            unlock_at,
        };

        (status, axum::Json(body)).into_response()
    }
}

/// Convenience type alias for Results using ForgeError.
pub type ForgeResult<T> = Result<T, ForgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_and_server_errors_map_to_expected_statuses() {
        assert_eq!(ForgeError::validation("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ForgeError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ForgeError::MissingEntitlement.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ForgeError::not_found("Course").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ForgeError::Conflict { message: "taken".into() }.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ForgeError::Internal(anyhow::anyhow!("boom")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn bad_webhook_signatures_are_unauthorized() {
        for e in [SignatureError::Mismatch, SignatureError::Expired, SignatureError::Malformed] {
            let err: ForgeError = e.into();
            assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
            assert_eq!(err.error_code(), "INVALID_SIGNATURE");
        }
    }

    #[test]
    fn schedule_errors_become_validation_errors() {
        let err: ForgeError = ScheduleError::UnknownDay("funday".into()).into();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn not_found_message_names_the_resource() {
        assert_eq!(ForgeError::not_found("Lesson").to_string(), "Lesson not found");
    }
}
