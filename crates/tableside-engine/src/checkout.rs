//! Checkout: a session's cart becomes an order.
//!
//! The whole conversion is one store transaction (see
//! `OrderRepository::place_order`); this service adds the session lock so no
//! cart write lands between reading the cart and clearing it, and maps the
//! outcomes to errors and change events.

use tracing::{info, warn};

use tableside_core::validation::validate_key;
use tableside_core::{CoreError, Order, OrderType};
use tableside_db::{CheckoutOutcome, PlaceOrder};

use crate::error::{EngineError, EngineResult};
use crate::notify::ChangeKind;
use crate::{session_keys, Engine};

pub struct CheckoutService<'a> {
    engine: &'a Engine,
}

impl<'a> CheckoutService<'a> {
    pub(crate) fn new(engine: &'a Engine) -> Self {
        CheckoutService { engine }
    }

    /// Places an order from the cart.
    ///
    /// With an `idempotency_key`, a retry of a checkout that already went
    /// through returns the same order instead of failing on the now-empty cart.
    pub async fn checkout(
        &self,
        organization_id: &str,
        session_id: &str,
        table_number: &str,
        order_type: OrderType,
        idempotency_key: Option<&str>,
    ) -> EngineResult<Order> {
        let (org, sid) = session_keys(organization_id, session_id)?;
        let table = validate_key("tableNumber", table_number)?;
        let idempotency_key = idempotency_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(|k| validate_key("idempotencyKey", k).map(str::to_string))
            .transpose()?;

        let _guard = self.engine.locks().lock(sid).await;

        let input = PlaceOrder {
            organization_id: org.to_string(),
            session_id: sid.to_string(),
            table_number: table.to_string(),
            order_type,
            idempotency_key,
            now: self.engine.now(),
        };

        match self.engine.db().orders().place_order(&input).await? {
            CheckoutOutcome::Placed(order) => {
                info!(
                    order_id = %order.order_id,
                    order_reference = %order.order_reference,
                    total_cents = order.total_cents,
                    "Checkout complete"
                );
                self.engine.publish(
                    org,
                    ChangeKind::OrderPlaced {
                        session_id: sid.to_string(),
                        order_id: order.order_id.clone(),
                        order_reference: order.order_reference.clone(),
                    },
                );
                self.engine.publish(
                    org,
                    ChangeKind::CartChanged {
                        session_id: sid.to_string(),
                    },
                );
                Ok(order)
            }
            CheckoutOutcome::Replayed(order) => {
                info!(order_id = %order.order_id, "Checkout replayed");
                Ok(order)
            }
            CheckoutOutcome::EmptyCart => Err(CoreError::EmptyCart {
                session_id: sid.to_string(),
            }
            .into()),
            CheckoutOutcome::InvalidSession => {
                warn!(session_id = sid, table_number = table, "Checkout on inactive session");
                Err(EngineError::invalid_session(sid))
            }
        }
    }

    /// Every order of the session, oldest first. Works after the session ended.
    pub async fn get_orders_by_session(
        &self,
        organization_id: &str,
        session_id: &str,
    ) -> EngineResult<Vec<Order>> {
        let (org, sid) = session_keys(organization_id, session_id)?;

        let db = self.engine.db();
        match db.sessions().get(sid).await? {
            Some(session) if session.organization_id == org => {}
            _ => return Err(EngineError::not_found("Session", sid)),
        }

        Ok(db.orders().list_by_session(org, sid).await?)
    }

    pub async fn get_order(&self, organization_id: &str, order_id: &str) -> EngineResult<Order> {
        let org = validate_key("organizationId", organization_id)?;
        let order_id = validate_key("orderId", order_id)?;

        self.engine
            .db()
            .orders()
            .get(org, order_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Order", order_id))
    }
}
