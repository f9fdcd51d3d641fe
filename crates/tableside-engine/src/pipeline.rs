//! # Order Item Pipeline
//!
//! Moves order items through the kitchen and the floor, and closes orders
//! with payment.
//!
//! ```text
//!   ASSIGNED ──► ACCEPTED ──► PREPARING ──► READY_TO_SERVE ──► SERVED
//!      │             │             │          (kitchen)        (waiter)
//!      └─────────────┴─────────────┴──► CANCELLED / OUT_OF_STOCK
//! ```
//!
//! Every move is a compare-and-set on the item's current status, so two
//! screens acting on the same item cannot both win.

use tracing::{info, warn};

use tableside_core::validation::validate_key;
use tableside_core::{
    BoardEntry, BoardGroup, CoreError, ItemStatus, Order, OrderItem, StaffRole, TableStatus,
};
use tableside_db::PaymentOutcome;

use crate::error::{EngineError, EngineResult};
use crate::notify::ChangeKind;
use crate::Engine;

/// Most items a board shows at once.
pub const BOARD_LIMIT: u32 = 500;

pub struct PipelineService<'a> {
    engine: &'a Engine,
}

impl<'a> PipelineService<'a> {
    pub(crate) fn new(engine: &'a Engine) -> Self {
        PipelineService { engine }
    }

    /// Moves an item to `new_status` on behalf of `role`.
    ///
    /// `expected` is the status the caller last saw; when given and the item
    /// has moved since, the call fails with `StaleStatus` instead of acting.
    pub async fn update_status(
        &self,
        organization_id: &str,
        order_item_id: &str,
        new_status: ItemStatus,
        role: StaffRole,
        expected: Option<ItemStatus>,
    ) -> EngineResult<OrderItem> {
        let org = validate_key("organizationId", organization_id)?;
        let item_id = validate_key("orderItemId", order_item_id)?;

        let orders = self.engine.db().orders();
        let current = orders
            .get_item(org, item_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Order item", item_id))?;

        let from = current.item_status;
        if let Some(expected) = expected {
            if expected != from {
                return Err(stale(item_id, expected, from));
            }
        }

        if let Err(e) = from.check_transition(new_status, role) {
            warn!(order_item_id = item_id, %from, to = %new_status, %role, "Illegal status move");
            return Err(e.into());
        }

        let Some(updated) = orders
            .update_item_status(org, item_id, from, new_status, self.engine.now())
            .await?
        else {
            let actual = orders
                .get_item(org, item_id)
                .await?
                .map(|i| i.item_status)
                .unwrap_or(from);
            return Err(stale(item_id, from, actual));
        };

        info!(order_item_id = item_id, %from, to = %new_status, %role, "Order item moved");
        self.engine.publish(
            org,
            ChangeKind::OrderItemStatusChanged {
                order_id: updated.order_id.clone(),
                order_item_id: updated.order_item_id.clone(),
                status: updated.item_status,
            },
        );
        Ok(updated)
    }

    /// Items in one board column, oldest first.
    pub async fn board(
        &self,
        organization_id: &str,
        group: BoardGroup,
    ) -> EngineResult<Vec<BoardEntry>> {
        let org = validate_key("organizationId", organization_id)?;
        Ok(self
            .engine
            .db()
            .orders()
            .board(org, &group.statuses(), BOARD_LIMIT)
            .await?)
    }

    /// Records payment. Repeating it on a paid order returns the order.
    pub async fn complete_payment(
        &self,
        organization_id: &str,
        order_id: &str,
    ) -> EngineResult<Order> {
        let org = validate_key("organizationId", organization_id)?;
        let order_id = validate_key("orderId", order_id)?;

        let outcome = self
            .engine
            .db()
            .orders()
            .complete_payment(org, order_id, self.engine.now())
            .await?;

        match outcome {
            PaymentOutcome::Paid {
                order,
                session_ended,
            } => {
                self.engine.publish(
                    org,
                    ChangeKind::PaymentCompleted {
                        session_id: order.session_id.clone(),
                        order_id: order.order_id.clone(),
                    },
                );
                if session_ended {
                    self.engine.publish(
                        org,
                        ChangeKind::SessionEnded {
                            table_number: order.table_number.clone(),
                            session_id: order.session_id.clone(),
                        },
                    );
                    self.engine.publish(
                        org,
                        ChangeKind::TableStatusChanged {
                            table_number: order.table_number.clone(),
                            status: TableStatus::Available,
                        },
                    );
                }
                Ok(order)
            }
            PaymentOutcome::AlreadyPaid(order) => Ok(order),
            PaymentOutcome::Blocked { pending } => {
                warn!(order_id, pending, "Payment before all items finished");
                Err(CoreError::PaymentBlocked {
                    order_id: order_id.to_string(),
                    pending,
                }
                .into())
            }
            PaymentOutcome::NotFound => Err(EngineError::not_found("Order", order_id)),
        }
    }
}

fn stale(order_item_id: &str, expected: ItemStatus, actual: ItemStatus) -> EngineError {
    CoreError::StaleStatus {
        order_item_id: order_item_id.to_string(),
        expected,
        actual,
    }
    .into()
}
