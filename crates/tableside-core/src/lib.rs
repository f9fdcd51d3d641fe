//! # tableside-core: Pure Business Logic for Tableside
//!
//! Everything a dine-in visit needs to decide, with no I/O: what a cart line
//! costs, which customization selections survive, which order item status
//! moves are legal and for whom, and when an OTP has lapsed.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tableside Architecture                           │
//! │                                                                         │
//! │  Customer phone ─┐   Kitchen board ─┐   Waiter board ─┐                │
//! │                  ▼                  ▼                 ▼                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   apps/api (axum, JSON over HTTP)               │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │   tableside-engine: reservation, identity, cart, checkout,      │   │
//! │  │   pipeline, per-session locks, change feed                      │   │
//! │  └───────────────┬─────────────────────────────┬───────────────────┘   │
//! │  ┌───────────────▼──────────────┐  ┌───────────▼───────────────────┐   │
//! │  │ ★ tableside-core (THIS) ★    │  │ tableside-db (SQLite)         │   │
//! │  │  types · money · pricing     │◄─│  repositories, transactions   │   │
//! │  │  pipeline · otp · validation │  └───────────────────────────────┘   │
//! │  └──────────────────────────────┘                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`api`] - HTTP request/response bodies
//! - [`types`] - Domain types (Table, TableSession, CartItem, Order, ...)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`pricing`] - Cart line pricing and customization selection policy
//! - [`pipeline`] - Order item status state machine and board projections
//! - [`otp`] - One-time-password window and attempt rules
//! - [`clock`] - Injectable time source
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use tableside_core::pipeline::{ItemStatus, StaffRole};
//!
//! assert!(ItemStatus::ReadyToServe
//!     .check_transition(ItemStatus::Served, StaffRole::Waiter)
//!     .is_ok());
//! assert!(ItemStatus::Served
//!     .check_transition(ItemStatus::Preparing, StaffRole::Kitchen)
//!     .is_err());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod api;
pub mod clock;
pub mod error;
pub mod money;
pub mod otp;
pub mod pipeline;
pub mod pricing;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::{DiscountRate, Money};
pub use pipeline::{BoardGroup, ItemStatus, StaffRole};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default maximum number of lines in one session's cart.
pub const MAX_CART_ITEMS: usize = 100;

/// Default maximum quantity of a single cart line.
///
/// Catches a slipped thumb on a phone keypad (100 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 99;

/// Default OTP validity window in seconds (matches the customer screen timer).
pub const DEFAULT_OTP_VALIDITY_SECS: i64 = 59;

/// Default number of wrong OTP submissions before the challenge locks.
pub const DEFAULT_OTP_MAX_ATTEMPTS: u32 = 3;
