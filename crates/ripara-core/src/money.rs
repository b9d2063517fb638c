//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  A quote screen recomputes totals on every keystroke:                   │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ drift accumulates                │
//! │                                                                         │
//! │  A three-way commission split:                                          │
//! │    €10.00 × 33.33% three times = €9.999 → where did 0.1 cent go?        │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents                                            │
//! │    Every amount is an i64 of cents. Every commission is rounded         │
//! │    once, half-up, and the leftover cent is reported, not hidden.        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use ripara_core::money::Money;
//!
//! let part = Money::from_cents(10000); // €100.00
//! let labor = Money::from_major_minor(50, 0); // €50.00
//! assert_eq!((part + labor).cents(), 15000);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

use crate::types::CommissionRate;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (euro cents).
///
/// ## Design Decisions
/// - **i64 (signed)**: the unallocated split remainder can be -1 cent
/// - **Single field tuple struct**: serializes as a bare integer on the wire
///
/// ## Where Money Flows
/// ```text
/// LineItem.unit_price ──► Totals.grand_total ──► RevenueSplit.gross_margin
///                                                      │
///                              ┌───────────────────────┼───────────────────┐
///                              ▼                       ▼                   ▼
///                     centro_commission      corner_commission   platform_commission
///                              │                       │                   │
///                              └──────────► SettlementLedgerEntry ◄────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ```rust
    /// use ripara_core::money::Money;
    ///
    /// let price = Money::from_cents(1099); // €10.99
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from euros and cents.
    ///
    /// For negative amounts only the major unit carries the sign:
    /// `from_major_minor(-5, 50)` is -€5.50.
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the whole-euro portion.
    #[inline]
    pub const fn euros(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the cents portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
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
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Multiplies money by a quantity, saturating at the `i64` bounds.
    ///
    /// A saturated result is far above `MAX_AMOUNT_CENTS`, so validation
    /// rejects it instead of the arithmetic panicking or wrapping.
    ///
    /// ```rust
    /// use ripara_core::money::Money;
    ///
    /// let unit_price = Money::from_cents(2999);
    /// assert_eq!(unit_price.multiply_quantity(2).cents(), 5998);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0.saturating_mul(qty))
    }

    /// Applies a commission rate, rounding half-up to the cent.
    ///
    /// ## Implementation
    /// Integer math in i128: `(amount * bps + 5000) / 10000`.
    /// The +5000 is the half-cent; callers only pass non-negative margins,
    /// so "half-up" and "half away from zero" coincide.
    ///
    /// ```rust
    /// use ripara_core::money::Money;
    /// use ripara_core::types::CommissionRate;
    ///
    /// let margin = Money::from_cents(9000); // €90.00
    /// let rate = CommissionRate::from_percent(70);
    /// assert_eq!(margin.apply_rate(rate).cents(), 6300);
    ///
    /// // €0.15 at 50% = 7.5 cents → 8 cents
    /// let tiny = Money::from_cents(15);
    /// assert_eq!(tiny.apply_rate(CommissionRate::from_percent(50)).cents(), 8);
    /// ```
    pub fn apply_rate(&self, rate: CommissionRate) -> Money {
        let scaled = self.0 as i128 * rate.bps() as i128;
        let rounded = if scaled >= 0 {
            (scaled + 5000) / 10000
        } else {
            (scaled - 5000) / 10000
        };
        Money::from_cents(rounded as i64)
    }

    /// Subtracts, flooring the result at zero.
    ///
    /// Returns the clamped value and the shortfall that was cut off
    /// (zero when no clamping happened).
    pub fn saturating_sub_floor(self, other: Money) -> (Money, Money) {
        let raw = self - other;
        if raw.is_negative() {
            (Money::zero(), raw.abs())
        } else {
            (raw, Money::zero())
        }
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Debug/log formatting. Localized display belongs to the rendering layer.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}€{}.{:02}", sign, self.euros().abs(), self.cents_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
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

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

/// Quote totals are summed from unvalidated lines, so summing saturates.
impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| Money(acc.0.saturating_add(m.0)))
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| Money(acc.0.saturating_add(m.0)))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.euros(), 10);
        assert_eq!(money.cents_part(), 99);
    }

    #[test]
    fn test_from_major_minor() {
        assert_eq!(Money::from_major_minor(10, 99).cents(), 1099);
        assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1099).to_string(), "€10.99");
        assert_eq!(Money::from_cents(500).to_string(), "€5.00");
        assert_eq!(Money::from_cents(-1).to_string(), "-€0.01");
        assert_eq!(Money::zero().to_string(), "€0.00");
    }

    #[test]
    fn test_arithmetic_and_sum() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);
        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((a * 3).cents(), 3000);

        let total: Money = [a, b, b].iter().sum();
        assert_eq!(total.cents(), 2000);
    }

    #[test]
    fn test_quantity_and_sum_saturate() {
        let half = Money::from_cents(i64::MAX / 2);
        assert_eq!(half.multiply_quantity(3).cents(), i64::MAX);

        let total: Money = [half, half, half].into_iter().sum();
        assert_eq!(total.cents(), i64::MAX);
    }

    #[test]
    fn test_apply_rate_half_up() {
        let margin = Money::from_cents(9000);
        assert_eq!(margin.apply_rate(CommissionRate::from_percent(70)).cents(), 6300);
        assert_eq!(margin.apply_rate(CommissionRate::from_percent(10)).cents(), 900);
        assert_eq!(margin.apply_rate(CommissionRate::from_percent(20)).cents(), 1800);

        // 1 cent at 50% = 0.5 cent → rounds up to 1
        assert_eq!(Money::from_cents(1).apply_rate(CommissionRate::from_percent(50)).cents(), 1);
        // 1 cent at 49.99% stays 0
        assert_eq!(Money::from_cents(1).apply_rate(CommissionRate::from_bps(4999)).cents(), 0);
    }

    #[test]
    fn test_apply_rate_zero_and_full() {
        let margin = Money::from_cents(12345);
        assert!(margin.apply_rate(CommissionRate::zero()).is_zero());
        assert_eq!(margin.apply_rate(CommissionRate::from_percent(100)), margin);
    }

    #[test]
    fn test_saturating_sub_floor() {
        let (value, shortfall) = Money::from_cents(100).saturating_sub_floor(Money::from_cents(30));
        assert_eq!(value.cents(), 70);
        assert!(shortfall.is_zero());

        let (value, shortfall) = Money::from_cents(100).saturating_sub_floor(Money::from_cents(130));
        assert!(value.is_zero());
        assert_eq!(shortfall.cents(), 30);
    }

    #[test]
    fn test_serializes_as_bare_integer() {
        let json = serde_json::to_string(&Money::from_cents(15000)).unwrap();
        assert_eq!(json, "15000");
    }
}
