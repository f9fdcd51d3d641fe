//! # tableside-client: Typed HTTP Client for Tableside
//!
//! Used by the customer phone screens and the kitchen / waiter boards.
//!
//! ```rust,ignore
//! use tableside_client::{ClientConfig, TablesideClient};
//! use tableside_core::{AddToCart, OrderType};
//!
//! let client = TablesideClient::new(ClientConfig::new("http://10.0.0.5:8080"))?;
//! client.reserve("org-1", "T4", Some("QR")).await?;
//! client.add_to_cart(&AddToCart { variant_id: "V1".into(), quantity: 2, ..add }).await?;
//! let order = client.checkout(OrderType::DineIn, Some(&uuid)).await?;
//! ```
//!
//! The session id a front end holds is only a pointer into the server's
//! state. If the server no longer knows it, calls fail with
//! [`ClientError::SessionLost`] and the screen starts over with a scan.

pub mod client;
pub mod config;
pub mod error;
pub mod session;

pub use client::TablesideClient;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use session::SessionContext;
