//! # Error Types
//!
//! Domain-specific error types for tableside-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tableside-core errors (this file)                                     │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  tableside-db errors                                                   │
//! │  └── DbError          - Storage failures                               │
//! │                                                                         │
//! │  tableside-engine errors                                               │
//! │  └── EngineError      - Core | Db, what services return                │
//! │                                                                         │
//! │  apps/api errors                                                       │
//! │  └── ApiError         - What HTTP callers see ({code, message})        │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → ApiError → Client   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::pipeline::{ItemStatus, StaffRole};

// =============================================================================
// Error Kind
// =============================================================================

/// Coarse classification shared by every layer.
///
/// Each [`CoreError`] variant belongs to exactly one kind. The API maps a
/// kind to an HTTP status; the client uses it to decide what is retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or malformed input; never reaches the store.
    Validation,
    /// The request collides with current state (reserved table, stale status).
    Conflict,
    /// The referenced entity does not exist.
    NotFound,
    /// Missing, malformed or expired credentials.
    Unauthorized,
    /// A time window has elapsed (OTP).
    Expired,
    /// The backing store failed.
    Upstream,
}

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Generic lookup miss.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The table is not AVAILABLE for the requested operation.
    ///
    /// ## When This Occurs
    /// - A second phone scans the QR code of an already reserved table
    /// - Staff marked the table for cleaning
    #[error("Table {table_number} is {status}, cannot {operation}")]
    TableUnavailable {
        table_number: String,
        status: String,
        operation: String,
    },

    /// The session is unknown, ended, or bound to a different table/org.
    #[error("Session {0} is not active")]
    InvalidSession(String),

    /// Variant id does not resolve in this organization's catalog.
    #[error("Unknown menu variant: {0}")]
    UnknownVariant(String),

    /// Addon id does not belong to the variant's menu item.
    #[error("Unknown addon for this item: {0}")]
    UnknownAddon(String),

    /// Customization option id does not belong to any group of the item.
    #[error("Unknown customization option for this item: {0}")]
    UnknownOption(String),

    /// A catalog entry exists but is switched off.
    #[error("{what} is currently unavailable: {id}")]
    Unavailable { what: String, id: String },

    /// A required customization group has no selection.
    #[error("A choice is required for '{group}'")]
    MissingRequiredCustomization { group: String },

    /// Addon quantity outside `1..=max_quantity`.
    #[error("Addon '{addon}' quantity {requested} exceeds maximum allowed ({max})")]
    AddonLimitExceeded {
        addon: String,
        requested: i64,
        max: i64,
    },

    /// Cart has exceeded maximum allowed lines.
    #[error("Cart cannot have more than {max} items")]
    CartTooLarge { max: usize },

    /// Item quantity exceeds maximum allowed.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    /// Checkout was requested on a cart with no lines.
    #[error("Cart for session {session_id} is empty")]
    EmptyCart { session_id: String },

    /// The requested status move is not an edge this role owns.
    #[error("Cannot move order item from {from} to {to} as {role}")]
    IllegalTransition {
        from: ItemStatus,
        to: ItemStatus,
        role: StaffRole,
    },

    /// Compare-and-set lost: the item moved since the caller read it.
    #[error("Order item {order_item_id} is {actual}, expected {expected}")]
    StaleStatus {
        order_item_id: String,
        expected: ItemStatus,
        actual: ItemStatus,
    },

    /// Payment recorded before every line reached a terminal status.
    #[error("Order {order_id} still has {pending} item(s) in progress")]
    PaymentBlocked { order_id: String, pending: usize },

    /// The OTP does not match the live challenge.
    #[error("Invalid verification code")]
    InvalidOtp,

    /// The OTP window elapsed or the challenge was already used.
    #[error("Verification code expired")]
    OtpExpired,

    /// Too many wrong codes for this challenge.
    #[error("Too many attempts, request a new code")]
    TooManyAttempts,

    /// Credentials missing or rejected.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Returns the taxonomy bucket for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_)
            | CoreError::MissingRequiredCustomization { .. }
            | CoreError::AddonLimitExceeded { .. }
            | CoreError::CartTooLarge { .. }
            | CoreError::QuantityTooLarge { .. }
            | CoreError::EmptyCart { .. }
            | CoreError::InvalidOtp => ErrorKind::Validation,

            CoreError::NotFound { .. }
            | CoreError::UnknownVariant(_)
            | CoreError::UnknownAddon(_)
            | CoreError::UnknownOption(_) => ErrorKind::NotFound,

            CoreError::TableUnavailable { .. }
            | CoreError::InvalidSession(_)
            | CoreError::Unavailable { .. }
            | CoreError::IllegalTransition { .. }
            | CoreError::StaleStatus { .. }
            | CoreError::PaymentBlocked { .. }
            | CoreError::TooManyAttempts => ErrorKind::Conflict,

            CoreError::OtpExpired => ErrorKind::Expired,
            CoreError::Unauthorized(_) => ErrorKind::Unauthorized,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any store access.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g., invalid UUID, invalid email).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
