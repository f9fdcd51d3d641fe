//! # Money Module
//!
//! Integer minor-unit money for menu prices, cart lines and order totals.
//!
//! ## Where Money Flows
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  MenuItemVariant.base_price ──► discount (bps) ──► effective price     │
//! │                                                        │                │
//! │  Addon.charge × addon qty ─────────────────────────────┤                │
//! │  CustomizationOption.charge ───────────────────────────┤                │
//! │                                                        ▼                │
//! │                                   CartItem.unit_price × quantity        │
//! │                                                        │                │
//! │                                   CartItem.line_total ─┴─► Cart total   │
//! │                                                        │                │
//! │                                   OrderItem.total_price (copied as-is)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Floats never appear: `0.1 + 0.2` style drift would make a checkout total
//! disagree with the cart the customer just saw.
//!
//! ## Usage
//! ```rust
//! use tableside_core::money::{DiscountRate, Money};
//!
//! let base = Money::from_cents(25_000);
//! let effective = base.apply_discount(DiscountRate::from_bps(1_000)); // 10% off
//! assert_eq!(effective.cents(), 22_500);
//! assert_eq!((effective * 2i64).cents(), 45_000);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub};
use ts_rs::TS;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary amount in the smallest currency unit.
///
/// Signed so that intermediate arithmetic can go below zero without
/// wrapping, although nothing in the ordering flow produces a negative
/// total.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    ///
    /// ```rust
    /// use tableside_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(1099).cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Major unit portion (truncated toward zero).
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Minor unit portion, always `0..=99`.
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies a unit price by a line quantity.
    ///
    /// ```rust
    /// use tableside_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(120).multiply_quantity(2).cents(), 240);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Returns the amount after taking a percentage discount off.
    ///
    /// The discount amount is rounded half-up in integer math:
    /// `(amount × bps + 5000) / 10000`, computed in i128 so large menus
    /// cannot overflow.
    ///
    /// ```rust
    /// use tableside_core::money::{DiscountRate, Money};
    ///
    /// // 9.99 with 15% off: discount 1.4985 → 1.50, result 8.49
    /// let price = Money::from_cents(999);
    /// assert_eq!(price.apply_discount(DiscountRate::from_bps(1_500)).cents(), 849);
    /// ```
    pub fn apply_discount(&self, rate: DiscountRate) -> Money {
        if rate.is_zero() {
            return *self;
        }
        let discount = (self.0 as i128 * rate.bps() as i128 + 5000) / 10000;
        Money(self.0 - discount as i64)
    }
}

// =============================================================================
// Discount Rate
// =============================================================================

/// A percentage discount in basis points (100 bps = 1%).
///
/// Menu variants carry an optional discount; basis points keep the
/// percentage integral the same way money is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DiscountRate(u32);

impl DiscountRate {
    /// Full discount, the item is free.
    pub const MAX_BPS: u32 = 10_000;

    /// Creates a rate from basis points, clamped to 100%.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        if bps > Self::MAX_BPS {
            DiscountRate(Self::MAX_BPS)
        } else {
            DiscountRate(bps)
        }
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Debug-oriented rendering; screens format money themselves.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor())
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
