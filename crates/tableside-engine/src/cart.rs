//! # Cart
//!
//! A session's shared cart. Every phone at the table writes to the same rows;
//! writes for one session run one at a time under [`crate::SessionLocks`].
//!
//! ## Add Flow
//! ```text
//! add(org, session, request)
//!   ├─ validate quantity / ids          (no lock, no store)
//!   ├─ lock(session)
//!   ├─ session active?                  → InvalidSession
//!   ├─ variant + extras from catalog    → UnknownVariant
//!   ├─ pricing::price_line              → addon / option / required checks
//!   ├─ same configuration in cart?      → merge quantities (still capped)
//!   │     else cart full?               → CartTooLarge
//!   └─ write, publish CART_CHANGED
//! ```
//!
//! Prices are frozen on the line when it is written; later catalog changes
//! do not reach existing lines.

use tracing::{debug, info};

use tableside_core::pricing::{price_line, PricedLine};
use tableside_core::validation::{validate_key, validate_quantity};
use tableside_core::{AddToCart, Cart, CartItem, CoreError};
use tableside_db::repository::generate_id;

use crate::error::{EngineError, EngineResult};
use crate::notify::ChangeKind;
use crate::{session_keys, Engine};

pub struct CartService<'a> {
    engine: &'a Engine,
}

impl<'a> CartService<'a> {
    pub(crate) fn new(engine: &'a Engine) -> Self {
        CartService { engine }
    }

    fn max_quantity(&self) -> i64 {
        self.engine.config().cart.max_item_quantity
    }

    /// Adds a line, or grows an identical one.
    pub async fn add(
        &self,
        organization_id: &str,
        session_id: &str,
        request: &AddToCart,
    ) -> EngineResult<CartItem> {
        let (org, sid) = session_keys(organization_id, session_id)?;
        let variant_id = validate_key("variantId", &request.variant_id)?;
        let max_quantity = self.max_quantity();
        validate_quantity(request.quantity, max_quantity)?;

        let _guard = self.engine.locks().lock(sid).await;
        self.engine.require_session(org, sid).await?;

        let db = self.engine.db();
        let variant = db
            .catalog()
            .get_variant(org, variant_id)
            .await?
            .ok_or_else(|| CoreError::UnknownVariant(variant_id.to_string()))?;
        let extras = db.catalog().extras_for_item(org, &variant.menu_item_id).await?;
        let line = price_line(&variant, &extras, request, max_quantity)?;

        let carts = db.carts();
        let items = carts.list(org, sid).await?;
        let count = items.len();
        let now = self.engine.now();

        let item = match items.into_iter().find(|i| line.same_configuration(i)) {
            Some(mut existing) => {
                let combined = existing.quantity + line.quantity;
                if combined > max_quantity {
                    return Err(CoreError::QuantityTooLarge {
                        requested: combined,
                        max: max_quantity,
                    }
                    .into());
                }
                existing.set_quantity(combined);
                existing.updated_at = now;
                carts.update_quantity(&existing).await?;
                debug!(cart_item_id = %existing.cart_item_id, quantity = combined, "Merged into existing cart line");
                existing
            }
            None => {
                let max_items = self.engine.config().cart.max_cart_items;
                if count >= max_items {
                    return Err(CoreError::CartTooLarge { max: max_items }.into());
                }
                let item = new_item(org, sid, line, now);
                carts.insert(&item).await?;
                item
            }
        };

        info!(
            session_id = sid,
            variant_id = %item.variant_id,
            quantity = item.quantity,
            line_total_cents = item.line_total_cents,
            "Cart updated"
        );
        self.changed(org, sid);
        Ok(item)
    }

    /// Sets a line's quantity. Zero is rejected; use [`CartService::remove`].
    pub async fn change_quantity(
        &self,
        organization_id: &str,
        session_id: &str,
        cart_item_id: &str,
        quantity: i64,
    ) -> EngineResult<CartItem> {
        let (org, sid) = session_keys(organization_id, session_id)?;
        let item_id = validate_key("cartItemId", cart_item_id)?;
        validate_quantity(quantity, self.max_quantity())?;

        let _guard = self.engine.locks().lock(sid).await;
        self.engine.require_session(org, sid).await?;

        let carts = self.engine.db().carts();
        let mut item = carts
            .get(org, sid, item_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Cart item", item_id))?;

        item.set_quantity(quantity);
        item.updated_at = self.engine.now();
        carts.update_quantity(&item).await?;

        self.changed(org, sid);
        Ok(item)
    }

    /// Removes a line. Removing a missing line is not an error.
    pub async fn remove(
        &self,
        organization_id: &str,
        session_id: &str,
        cart_item_id: &str,
    ) -> EngineResult<()> {
        let (org, sid) = session_keys(organization_id, session_id)?;
        let item_id = validate_key("cartItemId", cart_item_id)?;

        let _guard = self.engine.locks().lock(sid).await;
        self.engine.require_session(org, sid).await?;

        if self.engine.db().carts().delete(org, sid, item_id).await? {
            self.changed(org, sid);
        }
        Ok(())
    }

    pub async fn clear(&self, organization_id: &str, session_id: &str) -> EngineResult<()> {
        let (org, sid) = session_keys(organization_id, session_id)?;

        let _guard = self.engine.locks().lock(sid).await;
        self.engine.require_session(org, sid).await?;

        if self.engine.db().carts().clear(org, sid).await? > 0 {
            self.changed(org, sid);
        }
        Ok(())
    }

    /// The session's cart as currently stored.
    pub async fn get(&self, organization_id: &str, session_id: &str) -> EngineResult<Cart> {
        let (org, sid) = session_keys(organization_id, session_id)?;
        self.engine.require_session(org, sid).await?;

        let items = self.engine.db().carts().list(org, sid).await?;
        Ok(Cart::new(sid, items))
    }

    fn changed(&self, org: &str, sid: &str) {
        self.engine.publish(
            org,
            ChangeKind::CartChanged {
                session_id: sid.to_string(),
            },
        );
    }
}

fn new_item(org: &str, sid: &str, line: PricedLine, now: chrono::DateTime<chrono::Utc>) -> CartItem {
    let line_total_cents = line.line_total().cents();
    CartItem {
        cart_item_id: generate_id(),
        session_id: sid.to_string(),
        organization_id: org.to_string(),
        variant_id: line.variant_id,
        menu_item_name: line.menu_item_name,
        variant_name: line.variant_name,
        quantity: line.quantity,
        unit_price_cents: line.unit_price.cents(),
        addons: line.addons,
        customizations: line.customizations,
        special_instructions: line.special_instructions,
        line_total_cents,
        created_at: now,
        updated_at: now,
    }
}
