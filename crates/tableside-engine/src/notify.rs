//! # Change Feed
//!
//! Push notifications for screens that would otherwise poll.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  services ──publish──► broadcast::Sender<ChangeEvent>                   │
//! │                              │                                          │
//! │                 ┌────────────┼────────────┐                             │
//! │                 ▼            ▼            ▼                             │
//! │           kitchen SSE   waiter SSE   customer SSE  (filtered by org)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Events only say *what* changed. A subscriber that lags behind skips the
//! missed events and re-reads the state it cares about; nothing here is
//! authoritative.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use tableside_core::{ItemStatus, OccupantKind, TableStatus};

/// Something observable changed in an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub organization_id: String,
    #[serde(flatten)]
    pub kind: ChangeKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ChangeKind {
    TableStatusChanged {
        table_number: String,
        status: TableStatus,
    },
    SessionStarted {
        table_number: String,
        session_id: String,
    },
    SessionEnded {
        table_number: String,
        session_id: String,
    },
    OccupantResolved {
        session_id: String,
        occupant_kind: OccupantKind,
    },
    CartChanged {
        session_id: String,
    },
    OrderPlaced {
        session_id: String,
        order_id: String,
        order_reference: String,
    },
    OrderItemStatusChanged {
        order_id: String,
        order_item_id: String,
        status: ItemStatus,
    },
    PaymentCompleted {
        session_id: String,
        order_id: String,
    },
}

impl ChangeKind {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            ChangeKind::TableStatusChanged { .. } => "TABLE_STATUS_CHANGED",
            ChangeKind::SessionStarted { .. } => "SESSION_STARTED",
            ChangeKind::SessionEnded { .. } => "SESSION_ENDED",
            ChangeKind::OccupantResolved { .. } => "OCCUPANT_RESOLVED",
            ChangeKind::CartChanged { .. } => "CART_CHANGED",
            ChangeKind::OrderPlaced { .. } => "ORDER_PLACED",
            ChangeKind::OrderItemStatusChanged { .. } => "ORDER_ITEM_STATUS_CHANGED",
            ChangeKind::PaymentCompleted { .. } => "PAYMENT_COMPLETED",
        }
    }
}

/// Fan-out of [`ChangeEvent`]s. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        ChangeFeed { tx }
    }

    /// Publishes an event. Having no subscribers is not an error.
    pub fn publish(&self, organization_id: &str, kind: ChangeKind) {
        let event = ChangeEvent {
            organization_id: organization_id.to_string(),
            kind,
        };
        trace!(event = event.kind.name(), organization_id, "Change published");
        let _ = self.tx.send(event);
    }

    /// Events of one organization. Dropping the subscription unsubscribes.
    pub fn subscribe(&self, organization_id: &str) -> ChangeSubscription {
        ChangeSubscription {
            organization_id: organization_id.to_string(),
            rx: self.tx.subscribe(),
        }
    }

    /// Unfiltered receiver, for adapters that do their own filtering.
    pub fn receiver(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[derive(Debug)]
pub struct ChangeSubscription {
    organization_id: String,
    rx: broadcast::Receiver<ChangeEvent>,
}

impl ChangeSubscription {
    /// Next event for this organization, or `None` once the feed is gone.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.organization_id == self.organization_id => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, organization_id = %self.organization_id, "Change subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next buffered event for this organization without waiting.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if event.organization_id == self.organization_id => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}
