//! # Repository Module
//!
//! One repository per aggregate, each a thin handle over the shared pool.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  db.tables()     TableRepository     register, read, reserve, release  │
//! │  db.sessions()   SessionRepository   read, stamp occupant              │
//! │  db.customers()  CustomerRepository  sign-in, OTP challenge, verify    │
//! │  db.catalog()    CatalogRepository   variants, addons, groups          │
//! │  db.carts()      CartRepository      cart lines                         │
//! │  db.orders()     OrderRepository     checkout, item status, payment    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Timestamps are passed in by the caller (from its `Clock`) rather than
//! read here, so tests control time end to end.
//!
//! Inside a transaction a repository only ever uses the transaction's own
//! connection; with a single-connection pool, reaching for the pool while a
//! transaction is open would wait on itself.

pub mod cart;
pub mod catalog;
pub mod customer;
pub mod order;
pub mod session;
pub mod table;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{DbError, DbResult};

/// Serializes an addon / customization snapshot for a JSON column.
pub(crate) fn to_json<T: Serialize>(table: &str, value: &T) -> DbResult<String> {
    serde_json::to_string(value).map_err(|e| DbError::corrupt(table, e))
}

/// Reads back a JSON column written by [`to_json`].
pub(crate) fn from_json<T: DeserializeOwned>(table: &str, raw: &str) -> DbResult<T> {
    serde_json::from_str(raw).map_err(|e| DbError::corrupt(table, e))
}

/// Generates a new entity id (UUID v4).
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
