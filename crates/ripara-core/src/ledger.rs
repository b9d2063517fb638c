//! # Settlement Ledger Types
//!
//! One immutable record per completed job, amended only through two paid
//! flag/timestamp pairs, plus the pure aggregation of what is still owed.
//!
//! ## Entry Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Settlement Entry Lifecycle                          │
//! │                                                                         │
//! │  job completed ──► NewSettlement ──► SettlementLedgerEntry (once)      │
//! │                                              │                          │
//! │        ┌─────────────────────────────────────┤                          │
//! │        ▼                                     ▼                          │
//! │  mark platform paid                    mark corner paid                 │
//! │  (idempotent)                          (idempotent; rejected when       │
//! │                                         collected via_corner)           │
//! │                                                                         │
//! │  State is DERIVED from the flags, never stored:                        │
//! │                                                                         │
//! │                platform unpaid     platform paid                        │
//! │  corner open   Unpaid              PlatformOnlyPaid                     │
//! │  corner done   CornerOnlyPaid      FullyPaid                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{CommissionRate, RevenueSplit, SplitRates};
use crate::validation::validate_required;

// =============================================================================
// Enums
// =============================================================================

/// How the customer's payment reached the facility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentCollectionMethod {
    /// Customer paid the facility directly. Corner commission starts unsettled.
    Direct,
    /// Customer paid at the collection point, which kept its cut before
    /// remitting. Corner commission is settled from the start.
    ViaCorner,
}

impl Default for PaymentCollectionMethod {
    fn default() -> Self {
        PaymentCollectionMethod::Direct
    }
}

/// A counterparty whose leg can be marked paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Counterparty {
    Platform,
    Corner,
}

/// Derived payment state of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SettlementState {
    Unpaid,
    PlatformOnlyPaid,
    CornerOnlyPaid,
    FullyPaid,
}

// =============================================================================
// New Settlement
// =============================================================================

/// Input for recording a settlement: the split plus who was involved.
#[derive(Debug, Clone)]
pub struct NewSettlement {
    pub job_id: String,
    pub facility_id: String,
    /// Referring collection point, when the job came through one.
    pub referrer_id: Option<String>,
    pub split: RevenueSplit,
    pub payment_collection_method: PaymentCollectionMethod,
}

impl NewSettlement {
    /// Checks the inputs that the split engine cannot see.
    ///
    /// ## Rules
    /// - job and facility ids present
    /// - `via_corner` needs a referrer to have collected the payment
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_required("job_id", &self.job_id)?;
        validate_required("facility_id", &self.facility_id)?;

        let has_referrer = self
            .referrer_id
            .as_deref()
            .is_some_and(|r| !r.trim().is_empty());

        if self.payment_collection_method == PaymentCollectionMethod::ViaCorner && !has_referrer {
            return Err(ValidationError::required(
                "referrer_id (payment collected via_corner)",
            ));
        }

        Ok(())
    }
}

// =============================================================================
// Settlement Ledger Entry
// =============================================================================

/// One settlement record per completed job.
///
/// Numeric fields and rates are frozen at creation. Afterwards only the two
/// paid/paid_at pairs change (unpaid to paid, never back) and the collection
/// method may be corrected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SettlementLedgerEntry {
    pub id: String,
    pub job_id: String,
    pub facility_id: String,
    pub referrer_id: Option<String>,

    pub grand_total_cents: i64,
    pub parts_purchase_cost_cents: i64,
    pub gross_margin_cents: i64,
    pub centro_commission_cents: i64,
    pub corner_commission_cents: i64,
    pub platform_commission_cents: i64,
    pub unallocated_cents: i64,

    /// Rates at settlement time (bps). Later rate edits never reach here.
    pub centro_rate_bps: u32,
    pub corner_rate_bps: u32,
    pub platform_rate_bps: u32,

    pub payment_collection_method: PaymentCollectionMethod,

    pub platform_paid: bool,
    #[ts(as = "Option<String>")]
    pub platform_paid_at: Option<DateTime<Utc>>,
    pub corner_paid: bool,
    #[ts(as = "Option<String>")]
    pub corner_paid_at: Option<DateTime<Utc>>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl SettlementLedgerEntry {
    /// Builds a fresh, fully unpaid entry from a validated settlement.
    pub fn from_new(new: &NewSettlement, id: String, created_at: DateTime<Utc>) -> Self {
        let s = &new.split;
        SettlementLedgerEntry {
            id,
            job_id: new.job_id.clone(),
            facility_id: new.facility_id.clone(),
            referrer_id: new.referrer_id.clone(),
            grand_total_cents: s.grand_total.cents(),
            parts_purchase_cost_cents: s.parts_purchase_cost.cents(),
            gross_margin_cents: s.gross_margin.cents(),
            centro_commission_cents: s.centro_commission.cents(),
            corner_commission_cents: s.corner_commission.cents(),
            platform_commission_cents: s.platform_commission.cents(),
            unallocated_cents: s.unallocated.cents(),
            centro_rate_bps: s.rates.centro.bps(),
            corner_rate_bps: s.rates.corner.bps(),
            platform_rate_bps: s.rates.platform.bps(),
            payment_collection_method: new.payment_collection_method,
            platform_paid: false,
            platform_paid_at: None,
            corner_paid: false,
            corner_paid_at: None,
            created_at,
        }
    }

    #[inline]
    pub fn gross_margin(&self) -> Money {
        Money::from_cents(self.gross_margin_cents)
    }

    #[inline]
    pub fn platform_commission(&self) -> Money {
        Money::from_cents(self.platform_commission_cents)
    }

    #[inline]
    pub fn corner_commission(&self) -> Money {
        Money::from_cents(self.corner_commission_cents)
    }

    #[inline]
    pub fn centro_commission(&self) -> Money {
        Money::from_cents(self.centro_commission_cents)
    }

    /// The frozen rate triple.
    pub fn rates(&self) -> SplitRates {
        SplitRates {
            centro: CommissionRate::from_bps(self.centro_rate_bps),
            corner: CommissionRate::from_bps(self.corner_rate_bps),
            platform: CommissionRate::from_bps(self.platform_rate_bps),
        }
    }

    #[inline]
    pub fn is_via_corner(&self) -> bool {
        self.payment_collection_method == PaymentCollectionMethod::ViaCorner
    }

    /// Whether nothing more is owed to the referrer.
    ///
    /// True when explicitly paid, when the referrer withheld its cut
    /// (via_corner), or when there was no corner commission at all.
    pub fn corner_settled(&self) -> bool {
        self.corner_paid || self.is_via_corner() || self.corner_commission_cents == 0
    }

    /// Derived payment state.
    ///
    /// The corner leg counts as paid whenever [`corner_settled`](Self::corner_settled)
    /// holds. A via_corner entry, or one with zero corner commission, therefore
    /// reports `CornerOnlyPaid` before anyone has paid anything, and `FullyPaid`
    /// as soon as the platform leg is marked.
    pub fn state(&self) -> SettlementState {
        match (self.platform_paid, self.corner_settled()) {
            (false, false) => SettlementState::Unpaid,
            (true, false) => SettlementState::PlatformOnlyPaid,
            (false, true) => SettlementState::CornerOnlyPaid,
            (true, true) => SettlementState::FullyPaid,
        }
    }

    /// Platform commission still owed.
    pub fn platform_due(&self) -> Money {
        if self.platform_paid {
            Money::zero()
        } else {
            self.platform_commission()
        }
    }

    /// Corner commission still owed. Always zero for via_corner entries.
    pub fn corner_due(&self) -> Money {
        if self.corner_settled() {
            Money::zero()
        } else {
            self.corner_commission()
        }
    }

    /// Whether the given leg is already flagged paid.
    pub fn is_paid(&self, counterparty: Counterparty) -> bool {
        match counterparty {
            Counterparty::Platform => self.platform_paid,
            Counterparty::Corner => self.corner_paid,
        }
    }

    /// Checks whether a leg may be marked paid.
    ///
    /// ## Returns
    /// - `Ok(true)`  - the flag should be set now
    /// - `Ok(false)` - already paid, nothing to do
    /// - `Err(CornerSettledByReferrer)` - corner leg on a via_corner entry
    pub fn check_markable(&self, counterparty: Counterparty) -> CoreResult<bool> {
        if counterparty == Counterparty::Corner && self.is_via_corner() {
            return Err(CoreError::CornerSettledByReferrer {
                entry_id: self.id.clone(),
            });
        }
        Ok(!self.is_paid(counterparty))
    }

    /// Checks a change of collection method.
    ///
    /// The method is the one descriptive field that may be corrected after
    /// creation. Moving to via_corner needs a referrer and an unpaid corner
    /// leg. Returns `Ok(false)` when the method is unchanged.
    pub fn check_method_change(&self, method: PaymentCollectionMethod) -> CoreResult<bool> {
        if self.payment_collection_method == method {
            return Ok(false);
        }
        if method == PaymentCollectionMethod::ViaCorner {
            if self.referrer_id.is_none() {
                return Err(ValidationError::required("referrer_id (payment collected via_corner)").into());
            }
            if self.corner_paid {
                return Err(CoreError::CornerAlreadyPaid {
                    entry_id: self.id.clone(),
                });
            }
        }
        Ok(true)
    }

    /// Sets a paid flag in memory. Monotonic: an already-paid leg keeps its
    /// original timestamp.
    pub fn mark_paid(&mut self, counterparty: Counterparty, at: DateTime<Utc>) -> CoreResult<bool> {
        if !self.check_markable(counterparty)? {
            return Ok(false);
        }
        match counterparty {
            Counterparty::Platform => {
                self.platform_paid = true;
                self.platform_paid_at = Some(at);
            }
            Counterparty::Corner => {
                self.corner_paid = true;
                self.corner_paid_at = Some(at);
            }
        }
        Ok(true)
    }
}

// =============================================================================
// Outstanding Aggregation
// =============================================================================

/// Half-open time range `[from, to)` over entry creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    #[ts(as = "String")]
    pub from: DateTime<Utc>,
    #[ts(as = "String")]
    pub to: DateTime<Utc>,
}

impl DateRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        DateRange { from, to }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.from && at < self.to
    }
}

/// What a facility still owes for a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OutstandingSummary {
    pub platform_due: Money,
    pub corner_due: Money,
    pub total_due: Money,
    /// Entries with at least one leg still due.
    pub open_entries: usize,
}

/// Aggregates unpaid legs of the facility's entries inside `range`.
///
/// Pure: entries from other facilities or outside the range are skipped,
/// so callers may pass a superset.
pub fn summarize_outstanding(
    entries: &[SettlementLedgerEntry],
    facility_id: &str,
    range: &DateRange,
) -> OutstandingSummary {
    let mut summary = OutstandingSummary::default();

    for entry in entries
        .iter()
        .filter(|e| e.facility_id == facility_id && range.contains(e.created_at))
    {
        let platform_due = entry.platform_due();
        let corner_due = entry.corner_due();

        if platform_due.is_positive() || corner_due.is_positive() {
            summary.open_entries += 1;
        }
        summary.platform_due += platform_due;
        summary.corner_due += corner_due;
    }

    summary.total_due = summary.platform_due + summary.corner_due;
    summary
}

// =============================================================================
// Unit Tests
// =============================================================================
