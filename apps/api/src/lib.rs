//! # Tableside API
//!
//! HTTP front door of the engine. See [`routes`] for the route table and
//! [`error`] for the error body every failure uses.

pub mod auth;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::router;
pub use state::AppState;
