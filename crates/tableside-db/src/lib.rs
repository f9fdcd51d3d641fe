//! # tableside-db: Database Layer for Tableside
//!
//! SQLite storage for tables, sessions, customers, the menu catalog, carts
//! and orders. Operations that must be atomic (reserve, checkout, OTP
//! verification, payment) are single transactions inside one repository
//! method; callers never hold a transaction themselves.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  tableside-engine services                                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   tableside-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌──────────────────┐   ┌─────────────┐  │   │
//! │  │   │   Database    │    │  Repositories    │   │ Migrations  │  │   │
//! │  │   │   (pool.rs)   │◄───│  tables sessions │   │ (embedded)  │  │   │
//! │  │   │   SqlitePool  │    │  customers       │   │             │  │   │
//! │  │   │               │    │  catalog carts   │   │ 001_initial │  │   │
//! │  │   │               │    │  orders          │   │             │  │   │
//! │  │   └───────────────┘    └──────────────────┘   └─────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (WAL)                                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tableside_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("tableside.db")).await?;
//! let table = db.tables().get("org-1", "T1").await?;
//! ```

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::cart::CartRepository;
pub use repository::catalog::CatalogRepository;
pub use repository::customer::{CustomerRepository, OtpChallenge, VerifyOutcome};
pub use repository::order::{CheckoutOutcome, OrderRepository, PaymentOutcome, PlaceOrder};
pub use repository::session::SessionRepository;
pub use repository::table::{ReleaseOutcome, ReserveOutcome, TableRepository};
