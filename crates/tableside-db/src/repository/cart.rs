//! # Cart Repository
//!
//! Persistent cart lines. Reads always hit the store; nothing is cached,
//! so two phones at the same table see the same cart.
//!
//! Writers are expected to hold the engine's per-session lock; this layer
//! does not serialize them itself.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use tableside_core::CartItem;

use crate::error::DbResult;
use crate::repository::{from_json, to_json};

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CartRow {
    cart_item_id: String,
    session_id: String,
    organization_id: String,
    variant_id: String,
    menu_item_name: String,
    variant_name: String,
    quantity: i64,
    unit_price_cents: i64,
    addons_json: String,
    customizations_json: String,
    special_instructions: Option<String>,
    line_total_cents: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CartRow {
    pub(crate) fn into_item(self) -> DbResult<CartItem> {
        Ok(CartItem {
            addons: from_json("cart_items", &self.addons_json)?,
            customizations: from_json("cart_items", &self.customizations_json)?,
            cart_item_id: self.cart_item_id,
            session_id: self.session_id,
            organization_id: self.organization_id,
            variant_id: self.variant_id,
            menu_item_name: self.menu_item_name,
            variant_name: self.variant_name,
            quantity: self.quantity,
            unit_price_cents: self.unit_price_cents,
            special_instructions: self.special_instructions,
            line_total_cents: self.line_total_cents,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub(crate) const CART_COLUMNS: &str = "cart_item_id, session_id, organization_id, variant_id, \
     menu_item_name, variant_name, quantity, unit_price_cents, addons_json, customizations_json, \
     special_instructions, line_total_cents, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct CartRepository {
    pool: SqlitePool,
}

impl CartRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CartRepository { pool }
    }

    /// Lines of a session in insertion order.
    pub async fn list(&self, organization_id: &str, session_id: &str) -> DbResult<Vec<CartItem>> {
        let rows: Vec<CartRow> = sqlx::query_as(&format!(
            "SELECT {CART_COLUMNS} FROM cart_items
             WHERE session_id = ?1 AND organization_id = ?2
             ORDER BY created_at, rowid"
        ))
        .bind(session_id)
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CartRow::into_item).collect()
    }

    pub async fn get(
        &self,
        organization_id: &str,
        session_id: &str,
        cart_item_id: &str,
    ) -> DbResult<Option<CartItem>> {
        let row: Option<CartRow> = sqlx::query_as(&format!(
            "SELECT {CART_COLUMNS} FROM cart_items
             WHERE cart_item_id = ?1 AND session_id = ?2 AND organization_id = ?3"
        ))
        .bind(cart_item_id)
        .bind(session_id)
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CartRow::into_item).transpose()
    }

    pub async fn insert(&self, item: &CartItem) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO cart_items
                (cart_item_id, session_id, organization_id, variant_id, menu_item_name,
                 variant_name, quantity, unit_price_cents, addons_json, customizations_json,
                 special_instructions, line_total_cents, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(&item.cart_item_id)
        .bind(&item.session_id)
        .bind(&item.organization_id)
        .bind(&item.variant_id)
        .bind(&item.menu_item_name)
        .bind(&item.variant_name)
        .bind(item.quantity)
        .bind(item.unit_price_cents)
        .bind(to_json("cart_items", &item.addons)?)
        .bind(to_json("cart_items", &item.customizations)?)
        .bind(&item.special_instructions)
        .bind(item.line_total_cents)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;

        debug!(
            cart_item_id = %item.cart_item_id,
            session_id = %item.session_id,
            quantity = item.quantity,
            line_total_cents = item.line_total_cents,
            "Cart line inserted"
        );
        Ok(())
    }

    /// Stores a new quantity and its recomputed line total.
    pub async fn update_quantity(&self, item: &CartItem) -> DbResult<bool> {
        let changed = sqlx::query(
            r#"
            UPDATE cart_items SET quantity = ?2, line_total_cents = ?3, updated_at = ?4
            WHERE cart_item_id = ?1
            "#,
        )
        .bind(&item.cart_item_id)
        .bind(item.quantity)
        .bind(item.line_total_cents)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        debug!(cart_item_id = %item.cart_item_id, quantity = item.quantity, "Cart line quantity updated");
        Ok(changed > 0)
    }

    /// Removes one line. Returns whether a row was deleted.
    pub async fn delete(
        &self,
        organization_id: &str,
        session_id: &str,
        cart_item_id: &str,
    ) -> DbResult<bool> {
        let deleted = sqlx::query(
            "DELETE FROM cart_items WHERE cart_item_id = ?1 AND session_id = ?2 AND organization_id = ?3",
        )
        .bind(cart_item_id)
        .bind(session_id)
        .bind(organization_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(deleted > 0)
    }

    /// Removes every line of a session. Returns how many were removed.
    pub async fn clear(&self, organization_id: &str, session_id: &str) -> DbResult<u64> {
        let deleted = sqlx::query(
            "DELETE FROM cart_items WHERE session_id = ?1 AND organization_id = ?2",
        )
        .bind(session_id)
        .bind(organization_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        debug!(session_id, deleted, "Cart cleared");
        Ok(deleted)
    }
}

/// Drops the cart of a session that is ending, inside the caller's transaction.
pub(crate) async fn discard_session_cart(
    conn: &mut sqlx::SqliteConnection,
    session_id: &str,
) -> DbResult<u64> {
    let deleted = sqlx::query("DELETE FROM cart_items WHERE session_id = ?1")
        .bind(session_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    if deleted > 0 {
        debug!(session_id, deleted, "Cart of ended session discarded");
    }
    Ok(deleted)
}
