//! # Order Repository
//!
//! Checkout, order item status changes and payment.
//!
//! ## Checkout Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │   1. touch the session row (active, right org, right table)            │
//! │      ── 0 rows ──► ROLLBACK, InvalidSession                             │
//! │   2. idempotency key seen before? ──► ROLLBACK, return that order      │
//! │   3. read cart lines  ── none ──► ROLLBACK, EmptyCart                   │
//! │   4. bump order_sequences(org, day) → NNNN                             │
//! │   5. INSERT order + items (ASSIGNED), DELETE cart lines                │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! Step 1 is a write, so the transaction holds SQLite's write lock from
//! its first statement and concurrent checkouts queue behind it.
//!
//! ## Status Changes
//! A single `UPDATE ... WHERE order_item_id = ? AND item_status = ?expected`.
//! Zero rows means someone else moved the item first.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use tableside_core::types::format_order_reference;
use tableside_core::{BoardEntry, ItemStatus, Order, OrderItem, OrderType};

use crate::error::DbResult;
use crate::repository::cart::{discard_session_cart, CartRow, CART_COLUMNS};
use crate::repository::{from_json, generate_id, to_json};

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    order_id: String,
    organization_id: String,
    order_reference: String,
    session_id: String,
    table_number: String,
    order_type: OrderType,
    idempotency_key: Option<String>,
    total_cents: i64,
    is_payment_completed: bool,
    created_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Order {
        Order {
            order_id: self.order_id,
            organization_id: self.organization_id,
            order_reference: self.order_reference,
            session_id: self.session_id,
            table_number: self.table_number,
            order_type: self.order_type,
            idempotency_key: self.idempotency_key,
            total_cents: self.total_cents,
            is_payment_completed: self.is_payment_completed,
            created_at: self.created_at,
            paid_at: self.paid_at,
            items,
        }
    }
}

const ORDER_COLUMNS: &str = "order_id, organization_id, order_reference, session_id, table_number, \
     order_type, idempotency_key, total_cents, is_payment_completed, created_at, paid_at";

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    order_item_id: String,
    order_id: String,
    organization_id: String,
    variant_id: String,
    menu_item_name: String,
    variant_name: String,
    quantity: i64,
    unit_price_cents: i64,
    total_price_cents: i64,
    addons_json: String,
    customizations_json: String,
    special_instructions: Option<String>,
    item_status: ItemStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderItemRow {
    fn into_item(self) -> DbResult<OrderItem> {
        Ok(OrderItem {
            addons: from_json("order_items", &self.addons_json)?,
            customizations: from_json("order_items", &self.customizations_json)?,
            order_item_id: self.order_item_id,
            order_id: self.order_id,
            organization_id: self.organization_id,
            variant_id: self.variant_id,
            menu_item_name: self.menu_item_name,
            variant_name: self.variant_name,
            quantity: self.quantity,
            unit_price_cents: self.unit_price_cents,
            total_price_cents: self.total_price_cents,
            special_instructions: self.special_instructions,
            item_status: self.item_status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const ITEM_COLUMNS: &str = "i.order_item_id, i.order_id, i.organization_id, i.variant_id, \
     i.menu_item_name, i.variant_name, i.quantity, i.unit_price_cents, i.total_price_cents, \
     i.addons_json, i.customizations_json, i.special_instructions, i.item_status, \
     i.created_at, i.updated_at";

#[derive(Debug, sqlx::FromRow)]
struct BoardRow {
    order_reference: String,
    table_number: String,
    #[sqlx(flatten)]
    item: OrderItemRow,
}

// =============================================================================
// Inputs and Outcomes
// =============================================================================

/// What checkout needs to know beyond the cart itself.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub organization_id: String,
    pub session_id: String,
    pub table_number: String,
    pub order_type: OrderType,
    pub idempotency_key: Option<String>,
    pub now: DateTime<Utc>,
}

#[derive(Debug)]
pub enum CheckoutOutcome {
    Placed(Order),
    /// An order with the same idempotency key already exists; returned unchanged.
    Replayed(Order),
    EmptyCart,
    /// The session is unknown, ended, or not on that table.
    InvalidSession,
}

#[derive(Debug)]
pub enum PaymentOutcome {
    /// Payment recorded. `session_ended` is set when this was the last
    /// unpaid order of the session and the table was released.
    Paid {
        order: Order,
        session_ended: bool,
    },
    AlreadyPaid(Order),
    /// Some items are not terminal yet.
    Blocked { pending: usize },
    NotFound,
}

// =============================================================================
// Repository
// =============================================================================

#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Turns the session's cart into an order, atomically.
    pub async fn place_order(&self, input: &PlaceOrder) -> DbResult<CheckoutOutcome> {
        let mut tx = self.pool.begin().await?;

        let live = sqlx::query(
            r#"
            UPDATE table_sessions SET is_active = 1
            WHERE session_id = ?1 AND organization_id = ?2 AND table_number = ?3 AND is_active = 1
            "#,
        )
        .bind(&input.session_id)
        .bind(&input.organization_id)
        .bind(&input.table_number)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if live == 0 {
            tx.rollback().await?;
            return Ok(CheckoutOutcome::InvalidSession);
        }

        if let Some(key) = &input.idempotency_key {
            let existing: Option<String> = sqlx::query_scalar(
                "SELECT order_id FROM orders WHERE session_id = ?1 AND idempotency_key = ?2",
            )
            .bind(&input.session_id)
            .bind(key)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(order_id) = existing {
                let order = load_order(&mut *tx, &input.organization_id, &order_id).await?;
                tx.rollback().await?;
                if let Some(order) = order {
                    debug!(order_id = %order.order_id, "Checkout replayed by idempotency key");
                    return Ok(CheckoutOutcome::Replayed(order));
                }
                return Ok(CheckoutOutcome::InvalidSession);
            }
        }

        let rows: Vec<CartRow> = sqlx::query_as(&format!(
            "SELECT {CART_COLUMNS} FROM cart_items
             WHERE session_id = ?1 AND organization_id = ?2
             ORDER BY created_at, rowid"
        ))
        .bind(&input.session_id)
        .bind(&input.organization_id)
        .fetch_all(&mut *tx)
        .await?;

        if rows.is_empty() {
            tx.rollback().await?;
            return Ok(CheckoutOutcome::EmptyCart);
        }

        let lines = rows
            .into_iter()
            .map(CartRow::into_item)
            .collect::<DbResult<Vec<_>>>()?;

        let day = input.now.date_naive();
        let sequence: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO order_sequences (organization_id, day, next_value)
            VALUES (?1, ?2, 1)
            ON CONFLICT(organization_id, day) DO UPDATE SET next_value = next_value + 1
            RETURNING next_value
            "#,
        )
        .bind(&input.organization_id)
        .bind(day.format("%Y-%m-%d").to_string())
        .fetch_one(&mut *tx)
        .await?;

        let order_id = generate_id();
        let items: Vec<OrderItem> = lines
            .into_iter()
            .map(|line| OrderItem {
                order_item_id: generate_id(),
                order_id: order_id.clone(),
                organization_id: input.organization_id.clone(),
                variant_id: line.variant_id,
                menu_item_name: line.menu_item_name,
                variant_name: line.variant_name,
                quantity: line.quantity,
                unit_price_cents: line.unit_price_cents,
                total_price_cents: line.line_total_cents,
                addons: line.addons,
                customizations: line.customizations,
                special_instructions: line.special_instructions,
                item_status: ItemStatus::Assigned,
                created_at: input.now,
                updated_at: input.now,
            })
            .collect();

        let order = Order {
            order_reference: format_order_reference(&input.table_number, day, sequence),
            order_id,
            organization_id: input.organization_id.clone(),
            session_id: input.session_id.clone(),
            table_number: input.table_number.clone(),
            order_type: input.order_type,
            idempotency_key: input.idempotency_key.clone(),
            total_cents: items.iter().map(|i| i.total_price_cents).sum(),
            is_payment_completed: false,
            created_at: input.now,
            paid_at: None,
            items,
        };

        sqlx::query(
            r#"
            INSERT INTO orders
                (order_id, organization_id, order_reference, session_id, table_number,
                 order_type, idempotency_key, total_cents, is_payment_completed, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9)
            "#,
        )
        .bind(&order.order_id)
        .bind(&order.organization_id)
        .bind(&order.order_reference)
        .bind(&order.session_id)
        .bind(&order.table_number)
        .bind(order.order_type)
        .bind(&order.idempotency_key)
        .bind(order.total_cents)
        .bind(order.created_at)
        .execute(&mut *tx)
        .await?;

        for item in &order.items {
            sqlx::query(
                r#"
                INSERT INTO order_items
                    (order_item_id, order_id, organization_id, variant_id, menu_item_name,
                     variant_name, quantity, unit_price_cents, total_price_cents, addons_json,
                     customizations_json, special_instructions, item_status, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)
                "#,
            )
            .bind(&item.order_item_id)
            .bind(&item.order_id)
            .bind(&item.organization_id)
            .bind(&item.variant_id)
            .bind(&item.menu_item_name)
            .bind(&item.variant_name)
            .bind(item.quantity)
            .bind(item.unit_price_cents)
            .bind(item.total_price_cents)
            .bind(to_json("order_items", &item.addons)?)
            .bind(to_json("order_items", &item.customizations)?)
            .bind(&item.special_instructions)
            .bind(item.item_status)
            .bind(item.created_at)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("DELETE FROM cart_items WHERE session_id = ?1 AND organization_id = ?2")
            .bind(&order.session_id)
            .bind(&order.organization_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            order_id = %order.order_id,
            order_reference = %order.order_reference,
            session_id = %order.session_id,
            items = order.items.len(),
            total_cents = order.total_cents,
            "Order placed"
        );

        Ok(CheckoutOutcome::Placed(order))
    }

    pub async fn get(&self, organization_id: &str, order_id: &str) -> DbResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        load_order(&mut *conn, organization_id, order_id).await
    }

    /// Every order of a session, oldest first, with items.
    pub async fn list_by_session(
        &self,
        organization_id: &str,
        session_id: &str,
    ) -> DbResult<Vec<Order>> {
        let orders: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders
             WHERE session_id = ?1 AND organization_id = ?2
             ORDER BY created_at, rowid"
        ))
        .bind(session_id)
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        let item_rows: Vec<OrderItemRow> = sqlx::query_as(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items i
             JOIN orders o ON o.order_id = i.order_id
             WHERE o.session_id = ?1 AND o.organization_id = ?2
             ORDER BY i.rowid"
        ))
        .bind(session_id)
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        let mut by_order: HashMap<String, Vec<OrderItem>> = HashMap::new();
        for row in item_rows {
            let item = row.into_item()?;
            by_order.entry(item.order_id.clone()).or_default().push(item);
        }

        Ok(orders
            .into_iter()
            .map(|row| {
                let items = by_order.remove(&row.order_id).unwrap_or_default();
                row.into_order(items)
            })
            .collect())
    }

    pub async fn get_item(
        &self,
        organization_id: &str,
        order_item_id: &str,
    ) -> DbResult<Option<OrderItem>> {
        let row: Option<OrderItemRow> = sqlx::query_as(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items i
             WHERE i.order_item_id = ?1 AND i.organization_id = ?2"
        ))
        .bind(order_item_id)
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(OrderItemRow::into_item).transpose()
    }

    /// Compare-and-set of an item's status. Returns the updated item, or
    /// `None` when the item was not in `expected` (or does not exist).
    pub async fn update_item_status(
        &self,
        organization_id: &str,
        order_item_id: &str,
        expected: ItemStatus,
        next: ItemStatus,
        now: DateTime<Utc>,
    ) -> DbResult<Option<OrderItem>> {
        let columns = ITEM_COLUMNS.replace("i.", "");
        let row: Option<OrderItemRow> = sqlx::query_as(&format!(
            "UPDATE order_items SET item_status = ?4, updated_at = ?5
              WHERE order_item_id = ?1 AND organization_id = ?2 AND item_status = ?3
             RETURNING {columns}"
        ))
        .bind(order_item_id)
        .bind(organization_id)
        .bind(expected)
        .bind(next)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        debug!(
            order_item_id,
            %expected,
            %next,
            applied = row.is_some(),
            "Order item status CAS"
        );
        row.map(OrderItemRow::into_item).transpose()
    }

    /// Items in any of `statuses`, oldest first, with their order's reference and table.
    pub async fn board(
        &self,
        organization_id: &str,
        statuses: &[ItemStatus],
        limit: u32,
    ) -> DbResult<Vec<BoardEntry>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = (0..statuses.len())
            .map(|n| format!("?{}", n + 3))
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!(
            "SELECT o.order_reference, o.table_number, {ITEM_COLUMNS}
             FROM order_items i
             JOIN orders o ON o.order_id = i.order_id
             WHERE i.organization_id = ?1 AND i.item_status IN ({placeholders})
             ORDER BY i.created_at, i.rowid
             LIMIT ?2"
        );

        let mut query = sqlx::query_as::<_, BoardRow>(&sql)
            .bind(organization_id)
            .bind(i64::from(limit));
        for status in statuses {
            query = query.bind(*status);
        }

        let rows = query.fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|row| {
                Ok(BoardEntry {
                    order_reference: row.order_reference,
                    table_number: row.table_number,
                    item: row.item.into_item()?,
                })
            })
            .collect()
    }

    /// Marks an order paid once every item is terminal, releasing the table
    /// when it was the session's last unpaid order.
    pub async fn complete_payment(
        &self,
        organization_id: &str,
        order_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<PaymentOutcome> {
        let mut tx = self.pool.begin().await?;

        let paid: Option<(String, String)> = sqlx::query_as(
            r#"
            UPDATE orders SET is_payment_completed = 1, paid_at = ?3
            WHERE order_id = ?1 AND organization_id = ?2 AND is_payment_completed = 0
              AND NOT EXISTS (
                  SELECT 1 FROM order_items
                  WHERE order_id = ?1
                    AND item_status NOT IN ('SERVED', 'CANCELLED', 'OUT_OF_STOCK')
              )
            RETURNING session_id, table_number
            "#,
        )
        .bind(order_id)
        .bind(organization_id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((session_id, table_number)) = paid else {
            let order = load_order(&mut *tx, organization_id, order_id).await?;
            tx.rollback().await?;

            return Ok(match order {
                None => PaymentOutcome::NotFound,
                Some(order) if order.is_payment_completed => PaymentOutcome::AlreadyPaid(order),
                Some(order) => PaymentOutcome::Blocked {
                    pending: order.pending_items(),
                },
            });
        };

        let unpaid: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders WHERE session_id = ?1 AND is_payment_completed = 0",
        )
        .bind(&session_id)
        .fetch_one(&mut *tx)
        .await?;

        let mut session_ended = false;
        if unpaid == 0 {
            let ended = sqlx::query(
                "UPDATE table_sessions SET is_active = 0, ended_at = ?2 WHERE session_id = ?1 AND is_active = 1",
            )
            .bind(&session_id)
            .bind(now)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if ended > 0 {
                discard_session_cart(&mut *tx, &session_id).await?;
                sqlx::query(
                    r#"
                    UPDATE restaurant_tables SET status = 'AVAILABLE', updated_at = ?3
                    WHERE organization_id = ?1 AND table_number = ?2 AND status = 'RESERVED'
                    "#,
                )
                .bind(organization_id)
                .bind(&table_number)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                session_ended = true;
            }
        }

        let order = load_order(&mut *tx, organization_id, order_id).await?;
        tx.commit().await?;

        info!(order_id, session_id = %session_id, session_ended, "Payment completed");

        match order {
            Some(order) => Ok(PaymentOutcome::Paid {
                order,
                session_ended,
            }),
            None => Ok(PaymentOutcome::NotFound),
        }
    }
}

/// Loads one order with its items on the given connection.
async fn load_order(
    conn: &mut SqliteConnection,
    organization_id: &str,
    order_id: &str,
) -> DbResult<Option<Order>> {
    let row: Option<OrderRow> = sqlx::query_as(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = ?1 AND organization_id = ?2"
    ))
    .bind(order_id)
    .bind(organization_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let items: Vec<OrderItemRow> = sqlx::query_as(&format!(
        "SELECT {ITEM_COLUMNS} FROM order_items i WHERE i.order_id = ?1 ORDER BY i.rowid"
    ))
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;

    let items = items
        .into_iter()
        .map(OrderItemRow::into_item)
        .collect::<DbResult<Vec<_>>>()?;

    Ok(Some(row.into_order(items)))
}

// =============================================================================
// Unit Tests
// =============================================================================
