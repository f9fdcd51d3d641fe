//! # API Error Type
//!
//! What a failed request looks like on the wire.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  handler ──► EngineError ──► ApiError { code, message } ──► HTTP status │
//! │                                                                         │
//! │  { "code": "INVALID_SESSION", "message": "Session s-1 is not active" }  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Storage and delivery failures are logged in full here and reach the
//! caller only as `UPSTREAM_ERROR` with a generic message.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::error;

use tableside_core::error::ErrorKind;
use tableside_core::{CoreError, ValidationError};
use tableside_engine::EngineError;

/// Error body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,
}

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Input validation failed (400)
    ValidationError,
    /// Missing, invalid or expired staff token, or wrong role (401)
    Unauthorized,
    /// Resource not found (404)
    NotFound,
    /// Concurrent or state conflict (409)
    Conflict,
    /// Verification code expired (410)
    Expired,
    /// Wrong verification code (422)
    InvalidOtp,
    /// Verification locked after too many wrong codes (429)
    TooManyAttempts,
    /// Checkout of an empty cart (422)
    EmptyCart,
    /// Session unknown or no longer active (409)
    InvalidSession,
    /// Menu variant does not exist (404)
    UnknownVariant,
    /// Variant or addon switched off (409)
    Unavailable,
    /// Pipeline edge not allowed for this role (409)
    IllegalTransition,
    /// Storage or backend failure (500)
    UpstreamError,
    /// Request took longer than the server allows (408)
    Timeout,
}

impl ErrorCode {
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::NotFound | ErrorCode::UnknownVariant => StatusCode::NOT_FOUND,
            ErrorCode::Conflict
            | ErrorCode::InvalidSession
            | ErrorCode::Unavailable
            | ErrorCode::IllegalTransition => StatusCode::CONFLICT,
            ErrorCode::Expired => StatusCode::GONE,
            ErrorCode::InvalidOtp | ErrorCode::EmptyCart => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::UpstreamError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::Timeout => StatusCode::REQUEST_TIMEOUT,
        }
    }
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ValidationError, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Unauthorized, message)
    }

    pub fn timeout() -> Self {
        ApiError::new(ErrorCode::Timeout, "The request took too long")
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let specific = err.as_core().and_then(|core| match core {
            CoreError::InvalidOtp => Some(ErrorCode::InvalidOtp),
            CoreError::TooManyAttempts => Some(ErrorCode::TooManyAttempts),
            CoreError::EmptyCart { .. } => Some(ErrorCode::EmptyCart),
            CoreError::InvalidSession(_) => Some(ErrorCode::InvalidSession),
            CoreError::UnknownVariant(_) => Some(ErrorCode::UnknownVariant),
            CoreError::Unavailable { .. } => Some(ErrorCode::Unavailable),
            CoreError::IllegalTransition { .. } => Some(ErrorCode::IllegalTransition),
            _ => None,
        });

        let code = specific.unwrap_or(match err.kind() {
            ErrorKind::Validation => ErrorCode::ValidationError,
            ErrorKind::Conflict => ErrorCode::Conflict,
            ErrorKind::NotFound => ErrorCode::NotFound,
            ErrorKind::Unauthorized => ErrorCode::Unauthorized,
            ErrorKind::Expired => ErrorCode::Expired,
            ErrorKind::Upstream => ErrorCode::UpstreamError,
        });

        if code == ErrorCode::UpstreamError {
            error!(error = %err, "Request failed upstream");
        }
        ApiError::new(code, err.public_message())
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::validation(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.code.status(), Json(self)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use tableside_core::{ItemStatus, StaffRole};
    use tableside_db::DbError;

    fn code_of(err: EngineError) -> (ErrorCode, StatusCode) {
        let api = ApiError::from(err);
        (api.code, api.code.status())
    }

    #[test]
    fn test_specific_codes() {
        assert_eq!(
            code_of(EngineError::invalid_session("s-1")),
            (ErrorCode::InvalidSession, StatusCode::CONFLICT)
        );
        assert_eq!(
            code_of(CoreError::InvalidOtp.into()),
            (ErrorCode::InvalidOtp, StatusCode::UNPROCESSABLE_ENTITY)
        );
        assert_eq!(
            code_of(CoreError::TooManyAttempts.into()),
            (ErrorCode::TooManyAttempts, StatusCode::TOO_MANY_REQUESTS)
        );
        assert_eq!(
            code_of(CoreError::OtpExpired.into()),
            (ErrorCode::Expired, StatusCode::GONE)
        );
        assert_eq!(
            code_of(
                CoreError::IllegalTransition {
                    from: ItemStatus::Served,
                    to: ItemStatus::Preparing,
                    role: StaffRole::Kitchen,
                }
                .into()
            ),
            (ErrorCode::IllegalTransition, StatusCode::CONFLICT)
        );
    }

    #[test]
    fn test_fallback_by_kind() {
        assert_eq!(
            code_of(EngineError::not_found("Order", "o-1")),
            (ErrorCode::NotFound, StatusCode::NOT_FOUND)
        );
        assert_eq!(
            code_of(CoreError::PaymentBlocked { order_id: "o-1".into(), pending: 2 }.into()),
            (ErrorCode::Conflict, StatusCode::CONFLICT)
        );
        assert_eq!(
            code_of(CoreError::AddonLimitExceeded { addon: "A1".into(), requested: 3, max: 2 }.into()),
            (ErrorCode::ValidationError, StatusCode::BAD_REQUEST)
        );
    }

    #[test]
    fn test_upstream_detail_hidden() {
        let api = ApiError::from(EngineError::Db(DbError::Internal("disk I/O error at page 7".into())));
        assert_eq!(api.code, ErrorCode::UpstreamError);
        assert!(!api.message.contains("disk"));
    }

    #[test]
    fn test_wire_shape() {
        let json = serde_json::to_value(ApiError::new(ErrorCode::EmptyCart, "empty")).unwrap();
        assert_eq!(json["code"], "EMPTY_CART");
        assert_eq!(json["message"], "empty");
    }
}
