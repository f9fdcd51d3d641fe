//! # Domain Types
//!
//! The nouns of a dine-in visit, shared by the engine, the HTTP layer and
//! (through ts-rs) the web screens.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Table ──1:0..1 active──► TableSession ──► Customer (when verified)    │
//! │                               │                                         │
//! │                               ├──► Cart = [CartItem]                   │
//! │                               │        │ checkout                       │
//! │                               │        ▼                                │
//! │                               └──► [Order] ──► [OrderItem]             │
//! │                                                    │                    │
//! │                                            ItemStatus pipeline          │
//! │                                                                         │
//! │  Catalog (read-only here):                                              │
//! │  MenuItemVariant ─┬─ Addon                                              │
//! │                   └─ CustomizationGroup ─► CustomizationOption          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Identifiers are UUID v4 strings, except the business keys
//! `table_number` and `order_reference` which humans read aloud.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::{DiscountRate, Money};
use crate::pipeline::ItemStatus;

// =============================================================================
// Table
// =============================================================================

/// Physical table state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum TableStatus {
    Available,
    /// Held by an active session.
    Reserved,
    /// Staff are resetting the table; not reservable.
    Cleaning,
}

impl TableStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableStatus::Available => "AVAILABLE",
            TableStatus::Reserved => "RESERVED",
            TableStatus::Cleaning => "CLEANING",
        }
    }
}

impl std::fmt::Display for TableStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A table of one organization.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Table {
    pub organization_id: String,
    /// Business key printed on the QR code, unique per organization.
    pub table_number: String,
    pub status: TableStatus,
    pub capacity: i64,
    pub section: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Answer to "can I sit here?" after a QR scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TableAvailability {
    pub table_number: String,
    pub status: TableStatus,
    pub available: bool,
}

impl TableAvailability {
    pub fn is_available(&self) -> bool {
        self.available
    }
}

impl From<&Table> for TableAvailability {
    fn from(table: &Table) -> Self {
        TableAvailability {
            table_number: table.table_number.clone(),
            status: table.status,
            available: table.status == TableStatus::Available,
        }
    }
}

// =============================================================================
// Table Session
// =============================================================================

/// Who is sitting at the table, as far as the server knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum OccupantKind {
    /// Reserved, nobody has identified yet.
    #[default]
    None,
    Guest,
    /// A customer who passed OTP verification.
    Customer,
}

/// One visit at one table, shared by every device that knows its id.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TableSession {
    pub session_id: String,
    pub organization_id: String,
    pub table_number: String,
    pub occupant_kind: OccupantKind,
    pub customer_id: Option<String>,
    /// Free-form origin tag supplied by the front end ("qr", "waiter", ...).
    pub reserved_source: Option<String>,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl TableSession {
    /// True when the session is live and belongs to the given organization.
    pub fn is_active_in(&self, organization_id: &str) -> bool {
        self.is_active && self.organization_id == organization_id
    }
}

// =============================================================================
// Customer
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Customer {
    pub customer_id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub verified: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub verified_at: Option<DateTime<Utc>>,
}

/// A sign-in identifier, told apart by the presence of `@`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    Email(String),
    Phone(String),
}

impl Identifier {
    /// The normalized string form used as the challenge key.
    pub fn as_str(&self) -> &str {
        match self {
            Identifier::Email(s) | Identifier::Phone(s) => s,
        }
    }

    pub fn email(&self) -> Option<&str> {
        match self {
            Identifier::Email(s) => Some(s),
            Identifier::Phone(_) => None,
        }
    }

    pub fn phone(&self) -> Option<&str> {
        match self {
            Identifier::Phone(s) => Some(s),
            Identifier::Email(_) => None,
        }
    }
}

/// Returned when a code has been sent and is awaiting verification.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PendingVerification {
    pub customer_id: String,
    pub identifier: String,
    #[ts(as = "String")]
    pub expires_at: DateTime<Utc>,
}

// =============================================================================
// Catalog
// =============================================================================

/// A sellable size/flavour of a menu item.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct MenuItemVariant {
    pub variant_id: String,
    pub organization_id: String,
    pub menu_item_id: String,
    pub menu_item_name: String,
    pub variant_name: String,
    pub base_price_cents: i64,
    /// Discount in basis points; zero means "no final price, use base".
    pub discount_bps: u32,
    pub is_available: bool,
}

impl MenuItemVariant {
    #[inline]
    pub fn base_price(&self) -> Money {
        Money::from_cents(self.base_price_cents)
    }

    /// The price a customer pays for one unit before addons.
    pub fn effective_price(&self) -> Money {
        self.base_price()
            .apply_discount(DiscountRate::from_bps(self.discount_bps))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Addon {
    pub addon_id: String,
    pub organization_id: String,
    pub menu_item_id: String,
    pub name: String,
    pub additional_charge_cents: i64,
    pub max_quantity: i64,
    /// Pre-ticked on the menu screen; never added implicitly.
    pub is_default: bool,
    pub is_available: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum SelectionType {
    /// At most one option of the group.
    Single,
    /// Any number of distinct options.
    Multiple,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CustomizationOption {
    pub option_id: String,
    pub group_id: String,
    pub name: String,
    pub additional_charge_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CustomizationGroup {
    pub group_id: String,
    pub organization_id: String,
    pub menu_item_id: String,
    pub name: String,
    pub selection_type: SelectionType,
    pub is_required: bool,
    pub options: Vec<CustomizationOption>,
}

/// Everything attachable to one menu item: its addons and customization groups.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct MenuItemExtras {
    pub addons: Vec<Addon>,
    pub groups: Vec<CustomizationGroup>,
}

// =============================================================================
// Cart
// =============================================================================

/// An addon the customer asked for, by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AddonRequest {
    pub addon_id: String,
    #[serde(default = "one")]
    pub quantity: i64,
}

fn one() -> i64 {
    1
}

/// Body of "add to cart".
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AddToCart {
    pub variant_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub addons: Vec<AddonRequest>,
    /// Customization option ids, in the order the customer tapped them.
    #[serde(default)]
    pub customizations: Vec<String>,
    #[serde(default)]
    pub special_instructions: Option<String>,
}

/// An addon as captured on a cart line or order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AddonSelection {
    pub addon_id: String,
    pub name: String,
    pub quantity: i64,
    pub additional_charge_cents: i64,
}

impl AddonSelection {
    /// Charge this addon adds to one unit of the line.
    pub fn charge(&self) -> Money {
        Money::from_cents(self.additional_charge_cents).multiply_quantity(self.quantity)
    }
}

/// A customization option as captured on a cart line or order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CustomizationSelection {
    pub group_id: String,
    pub group_name: String,
    pub option_id: String,
    pub option_name: String,
    pub additional_charge_cents: i64,
}

/// One line of a session's cart, priced when it was written.
///
/// `unit_price_cents` is frozen at add time; later catalog edits do not
/// move a price the customer already saw.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CartItem {
    pub cart_item_id: String,
    pub session_id: String,
    pub organization_id: String,
    pub variant_id: String,
    pub menu_item_name: String,
    pub variant_name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub addons: Vec<AddonSelection>,
    pub customizations: Vec<CustomizationSelection>,
    pub special_instructions: Option<String>,
    pub line_total_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl CartItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }

    /// Changes the quantity and recomputes the line total from the frozen unit price.
    pub fn set_quantity(&mut self, quantity: i64) {
        self.quantity = quantity;
        self.line_total_cents = self.unit_price().multiply_quantity(quantity).cents();
    }
}

/// All lines of one session, with derived totals.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Cart {
    pub session_id: String,
    pub items: Vec<CartItem>,
    pub grand_total_cents: i64,
    pub item_count: usize,
    pub total_quantity: i64,
}

impl Cart {
    pub fn new(session_id: impl Into<String>, items: Vec<CartItem>) -> Self {
        let grand_total: Money = items.iter().map(CartItem::line_total).sum();
        Cart {
            session_id: session_id.into(),
            grand_total_cents: grand_total.cents(),
            item_count: items.len(),
            total_quantity: items.iter().map(|i| i.quantity).sum(),
            items,
        }
    }

    #[inline]
    pub fn grand_total(&self) -> Money {
        Money::from_cents(self.grand_total_cents)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum OrderType {
    #[default]
    DineIn,
    Takeaway,
}

/// An order line, copied from a cart line at checkout.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct OrderItem {
    pub order_item_id: String,
    pub order_id: String,
    pub organization_id: String,
    pub variant_id: String,
    pub menu_item_name: String,
    pub variant_name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub total_price_cents: i64,
    pub addons: Vec<AddonSelection>,
    pub customizations: Vec<CustomizationSelection>,
    pub special_instructions: Option<String>,
    pub item_status: ItemStatus,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl OrderItem {
    #[inline]
    pub fn total_price(&self) -> Money {
        Money::from_cents(self.total_price_cents)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Order {
    pub order_id: String,
    pub organization_id: String,
    /// `T{table}-{YYYYMMDD}-{NNNN}`, unique per organization.
    pub order_reference: String,
    pub session_id: String,
    pub table_number: String,
    pub order_type: OrderType,
    pub idempotency_key: Option<String>,
    pub total_cents: i64,
    pub is_payment_completed: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub paid_at: Option<DateTime<Utc>>,
    pub items: Vec<OrderItem>,
}

impl Order {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Items not yet in a terminal status.
    pub fn pending_items(&self) -> usize {
        self.items
            .iter()
            .filter(|i| !i.item_status.is_terminal())
            .count()
    }
}

/// Formats an order reference from its parts.
///
/// ```rust
/// use chrono::NaiveDate;
/// use tableside_core::types::format_order_reference;
///
/// let day = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
/// assert_eq!(format_order_reference("T1", day, 7), "TT1-20260309-0007");
/// assert_eq!(format_order_reference("12", day, 42), "T12-20260309-0042");
/// ```
pub fn format_order_reference(table_number: &str, day: chrono::NaiveDate, sequence: i64) -> String {
    format!("T{}-{}-{:04}", table_number, day.format("%Y%m%d"), sequence)
}

/// An order item on a kitchen or waiter board.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct BoardEntry {
    pub order_reference: String,
    pub table_number: String,
    pub item: OrderItem,
}

// =============================================================================
// Unit Tests
// =============================================================================
