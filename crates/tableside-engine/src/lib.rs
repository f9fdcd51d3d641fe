//! # tableside-engine: Services for Tableside
//!
//! The operations behind every screen of a dine-in visit.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              Engine                                     │
//! │                                                                         │
//! │  reservations()  check_status, reserve, join_by_code, release, ...     │
//! │  identity()      create_guest, create_customer, verify, resend         │
//! │  carts()         add, change_quantity, remove, clear, get              │
//! │  checkout()      checkout, get_orders_by_session, get_order            │
//! │  pipeline()      update_status, board, complete_payment                │
//! │                                                                         │
//! │  shared: Database · Clock · SessionLocks · ChangeFeed · OtpDispatcher  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Services are short-lived borrows of the [`Engine`]; the engine itself is
//! cheap to clone and is what an HTTP server keeps in its state.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tableside_engine::{Engine, EngineConfig};
//!
//! let engine = Engine::open(EngineConfig::load(None)?).await?;
//! let session = engine.reservations().reserve("org-1", "T1", Some("QR")).await?;
//! let cart = engine.carts().get("org-1", &session.session_id).await?;
//! ```

pub mod cart;
pub mod checkout;
pub mod config;
pub mod error;
pub mod identity;
pub mod locks;
pub mod notify;
pub mod pipeline;
pub mod reservation;

pub use cart::CartService;
pub use checkout::CheckoutService;
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use identity::{
    IdentityService, LoggingDispatcher, OtpDispatcher, RecordingDispatcher, SentOtp,
};
pub use locks::SessionLocks;
pub use notify::{ChangeEvent, ChangeFeed, ChangeKind, ChangeSubscription};
pub use pipeline::PipelineService;
pub use reservation::ReservationService;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use tableside_core::otp::OtpPolicy;
use tableside_core::validation::validate_key;
use tableside_core::{Clock, SystemClock, TableSession};
use tableside_db::Database;

// =============================================================================
// Engine
// =============================================================================

struct Inner {
    db: Database,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    locks: SessionLocks,
    feed: ChangeFeed,
    dispatcher: Arc<dyn OtpDispatcher>,
}

/// Shared handle to every service. Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("db", &self.inner.db)
            .field("locked_sessions", &self.inner.locks.len())
            .field("subscribers", &self.inner.feed.subscriber_count())
            .finish()
    }
}

impl Engine {
    pub fn builder(db: Database, config: EngineConfig) -> EngineBuilder {
        EngineBuilder {
            db,
            config,
            clock: None,
            dispatcher: None,
        }
    }

    /// Opens the configured database (running migrations) and builds an
    /// engine with the system clock and the logging OTP dispatcher.
    pub async fn open(config: EngineConfig) -> EngineResult<Engine> {
        config.validate()?;
        let db = Database::new(config.db_config()).await?;
        info!(in_memory = config.db_config().is_in_memory(), "Engine database ready");
        Ok(Engine::builder(db, config).build())
    }

    pub fn db(&self) -> &Database {
        &self.inner.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.inner.feed
    }

    pub fn locks(&self) -> &SessionLocks {
        &self.inner.locks
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    pub(crate) fn otp_policy(&self) -> OtpPolicy {
        self.inner.config.otp_policy()
    }

    pub(crate) fn dispatcher(&self) -> &dyn OtpDispatcher {
        self.inner.dispatcher.as_ref()
    }

    pub(crate) fn publish(&self, organization_id: &str, kind: ChangeKind) {
        self.inner.feed.publish(organization_id, kind);
    }

    /// The session if it is active and belongs to the organization.
    pub(crate) async fn require_session(
        &self,
        organization_id: &str,
        session_id: &str,
    ) -> EngineResult<TableSession> {
        self.inner
            .db
            .sessions()
            .get(session_id)
            .await?
            .filter(|s| s.is_active_in(organization_id))
            .ok_or_else(|| EngineError::invalid_session(session_id))
    }

    // =========================================================================
    // Services
    // =========================================================================

    pub fn reservations(&self) -> ReservationService<'_> {
        ReservationService::new(self)
    }

    pub fn identity(&self) -> IdentityService<'_> {
        IdentityService::new(self)
    }

    pub fn carts(&self) -> CartService<'_> {
        CartService::new(self)
    }

    pub fn checkout(&self) -> CheckoutService<'_> {
        CheckoutService::new(self)
    }

    pub fn pipeline(&self) -> PipelineService<'_> {
        PipelineService::new(self)
    }
}

/// Validates the organization/session pair every session-scoped call takes.
pub(crate) fn session_keys<'a>(
    organization_id: &'a str,
    session_id: &'a str,
) -> EngineResult<(&'a str, &'a str)> {
    Ok((
        validate_key("organizationId", organization_id)?,
        validate_key("sessionId", session_id)?,
    ))
}

// =============================================================================
// Builder
// =============================================================================

pub struct EngineBuilder {
    db: Database,
    config: EngineConfig,
    clock: Option<Arc<dyn Clock>>,
    dispatcher: Option<Arc<dyn OtpDispatcher>>,
}

impl EngineBuilder {
    /// Time source (default: system clock).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// OTP delivery (default: [`LoggingDispatcher`]).
    pub fn dispatcher(mut self, dispatcher: Arc<dyn OtpDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn build(self) -> Engine {
        let feed = ChangeFeed::new(self.config.feed.capacity);
        Engine {
            inner: Arc::new(Inner {
                db: self.db,
                clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
                dispatcher: self
                    .dispatcher
                    .unwrap_or_else(|| Arc::new(LoggingDispatcher)),
                locks: SessionLocks::new(),
                feed,
                config: self.config,
            }),
        }
    }
}
