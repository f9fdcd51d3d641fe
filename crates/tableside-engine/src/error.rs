//! # Engine Error Types
//!
//! What every service in this crate returns.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CoreError ───┐                                                         │
//! │  DbError ─────┼──► EngineError ──► kind() ──► API status / client retry│
//! │  config / OTP ┘                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Storage failures keep their detail here; callers that face the outside
//! world log it and show a generic message (see [`EngineError::public_message`]).

use thiserror::Error;

use tableside_core::error::ErrorKind;
use tableside_core::{CoreError, ValidationError};
use tableside_db::DbError;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A business rule said no.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The store failed.
    #[error(transparent)]
    Db(#[from] DbError),

    /// Configuration could not be loaded or is invalid.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The OTP could not be handed to the delivery channel.
    #[error("OTP delivery failed: {0}")]
    Delivery(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Core(CoreError::Validation(err))
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl EngineError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        EngineError::Core(CoreError::not_found(entity, id))
    }

    pub fn invalid_session(session_id: impl Into<String>) -> Self {
        EngineError::Core(CoreError::InvalidSession(session_id.into()))
    }

    /// Coarse classification used for HTTP status and retry decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Core(e) => e.kind(),
            EngineError::Db(DbError::NotFound { .. }) => ErrorKind::NotFound,
            // A unique index fired: two writers raced for the same row
            EngineError::Db(e) if e.is_constraint() => ErrorKind::Conflict,
            EngineError::Db(_)
            | EngineError::Config(_)
            | EngineError::Delivery(_)
            | EngineError::Internal(_) => ErrorKind::Upstream,
        }
    }

    /// The business error, if this is one.
    pub fn as_core(&self) -> Option<&CoreError> {
        match self {
            EngineError::Core(e) => Some(e),
            _ => None,
        }
    }

    /// Message safe to show a caller. Upstream detail stays in the logs.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Upstream => "The service is temporarily unavailable".to_string(),
            ErrorKind::Conflict if matches!(self, EngineError::Db(_)) => {
                "The request conflicts with a concurrent change".to_string()
            }
            _ => self.to_string(),
        }
    }
}
