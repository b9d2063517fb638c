//! # Domain Types
//!
//! Quote and split types shared by the calculator, the split engine, the
//! ledger and the intake protocol.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    LineItem     │   │     Totals      │   │  RevenueSplit   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  kind           │──►│  parts_total    │──►│  gross_margin   │       │
//! │  │  quantity       │   │  labor_total    │   │  3 commissions  │       │
//! │  │  unit_price     │   │  service_total  │   │  unallocated    │       │
//! │  │  purchase_cost  │   │  grand_total    │   │  warnings       │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                      ▲                  │
//! │  ┌─────────────────┐   ┌─────────────────┐           │                  │
//! │  │ CommissionRate  │──►│   SplitRates    │───────────┘                  │
//! │  │  bps (u32)      │   │ centro/corner/  │                              │
//! │  │  7000 = 70%     │   │ platform        │                              │
//! │  └─────────────────┘   └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Counterparties
//! - **centro**: the operating repair facility
//! - **corner**: the referring collection point
//! - **platform**: the marketplace operator

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Commission Rate
// =============================================================================

/// Commission rate in basis points (1 bps = 0.01%).
///
/// ## Why Basis Points?
/// Rates are configured as percentages, sometimes with decimals (12.5%).
/// Basis points keep them integral: 12.5% = 1250 bps, 100% = 10000 bps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CommissionRate(u32);

/// 100% expressed in basis points.
pub const FULL_RATE_BPS: u32 = 10000;

impl CommissionRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        CommissionRate(bps)
    }

    /// Creates a rate from a whole percentage (70 → 70%).
    #[inline]
    pub const fn from_percent(pct: u32) -> Self {
        CommissionRate(pct * 100)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[inline]
    pub const fn zero() -> Self {
        CommissionRate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// True when the rate lies in 0%..=100%.
    #[inline]
    pub const fn is_in_range(&self) -> bool {
        self.0 <= FULL_RATE_BPS
    }
}

impl Default for CommissionRate {
    fn default() -> Self {
        CommissionRate::zero()
    }
}

// =============================================================================
// Line Items
// =============================================================================

/// What a quote line bills for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LineItemKind {
    /// A physical spare part. Only parts carry a purchase cost.
    Part,
    /// Technician time.
    Labor,
    /// Flat-fee service (diagnostics, data transfer, cleaning).
    Service,
}

/// A priced line on a repair quote.
///
/// Immutable once the quote is finalized; the calculator only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub id: String,
    pub description: String,
    pub kind: LineItemKind,
    /// Always >= 1.
    pub quantity: i64,
    /// Billed price per unit.
    pub unit_price: Money,
    /// What the facility paid per unit. Meaningful only for parts.
    #[serde(default)]
    pub purchase_cost: Money,
}

impl LineItem {
    /// Creates a part line.
    pub fn part(
        id: impl Into<String>,
        description: impl Into<String>,
        quantity: i64,
        unit_price: Money,
        purchase_cost: Money,
    ) -> Self {
        LineItem {
            id: id.into(),
            description: description.into(),
            kind: LineItemKind::Part,
            quantity,
            unit_price,
            purchase_cost,
        }
    }

    /// Creates a labor line.
    pub fn labor(
        id: impl Into<String>,
        description: impl Into<String>,
        quantity: i64,
        unit_price: Money,
    ) -> Self {
        LineItem {
            id: id.into(),
            description: description.into(),
            kind: LineItemKind::Labor,
            quantity,
            unit_price,
            purchase_cost: Money::zero(),
        }
    }

    /// Creates a service line.
    pub fn service(
        id: impl Into<String>,
        description: impl Into<String>,
        quantity: i64,
        unit_price: Money,
    ) -> Self {
        LineItem {
            id: id.into(),
            description: description.into(),
            kind: LineItemKind::Service,
            quantity,
            unit_price,
            purchase_cost: Money::zero(),
        }
    }

    /// Billed amount for the line (unit price × quantity).
    #[inline]
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }

    /// Cost basis for the line. Zero for anything but parts.
    #[inline]
    pub fn line_purchase_cost(&self) -> Money {
        match self.kind {
            LineItemKind::Part => self.purchase_cost.multiply_quantity(self.quantity),
            LineItemKind::Labor | LineItemKind::Service => Money::zero(),
        }
    }
}

// =============================================================================
// Totals
// =============================================================================

/// Kind-filtered subtotals of a quote.
///
/// Invariant: `grand_total == parts_total + labor_total + service_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub parts_total: Money,
    pub labor_total: Money,
    pub service_total: Money,
    pub grand_total: Money,
}

// =============================================================================
// Split Rates
// =============================================================================

/// The three per-counterparty rates applied to the gross margin.
///
/// Frozen into the ledger entry at settlement time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SplitRates {
    pub centro: CommissionRate,
    pub corner: CommissionRate,
    pub platform: CommissionRate,
}

impl SplitRates {
    /// Builds rates from whole percentages.
    pub const fn from_percents(centro: u32, corner: u32, platform: u32) -> Self {
        SplitRates {
            centro: CommissionRate::from_percent(centro),
            corner: CommissionRate::from_percent(corner),
            platform: CommissionRate::from_percent(platform),
        }
    }

    /// Sum of the three rates in basis points.
    pub fn total_bps(&self) -> u32 {
        self.centro.bps() + self.corner.bps() + self.platform.bps()
    }

    /// Same rates with the corner leg removed (facility has no referrer).
    pub fn without_corner(self) -> Self {
        SplitRates {
            corner: CommissionRate::zero(),
            ..self
        }
    }
}

// =============================================================================
// Revenue Split
// =============================================================================

/// A non-fatal condition the split engine reports alongside its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SplitWarning {
    /// Grand total was below the parts purchase cost; margin floored at zero.
    MarginClamped { shortfall: Money },
    /// Independent rounding left cents unallocated (negative: over-allocated).
    UnallocatedRemainder { amount: Money },
}

/// Result of splitting a job's gross margin among the counterparties.
///
/// Each commission is computed from its own rate; none is derived from the
/// others by subtraction. `unallocated` is whatever rounding (or a rate sum
/// below 100%) leaves over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RevenueSplit {
    pub grand_total: Money,
    pub parts_purchase_cost: Money,
    pub gross_margin: Money,
    pub rates: SplitRates,
    pub centro_commission: Money,
    pub corner_commission: Money,
    pub platform_commission: Money,
    /// `gross_margin − Σ commissions`.
    pub unallocated: Money,
    pub warnings: Vec<SplitWarning>,
}

impl RevenueSplit {
    /// Sum of the three commissions.
    pub fn total_commissions(&self) -> Money {
        self.centro_commission + self.corner_commission + self.platform_commission
    }

    /// True when the margin was floored at zero.
    pub fn margin_clamped(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, SplitWarning::MarginClamped { .. }))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
