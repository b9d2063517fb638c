//! # Revenue-Split Engine
//!
//! Turns a job's grand total and parts cost basis into a gross margin and
//! three independently rounded commissions.
//!
//! ## Computation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  grand_total ─┐                                                        │
//! │               ├─► gross_margin = grand_total − parts_purchase_cost     │
//! │  parts cost ──┘          │      (floored at 0 + MarginClamped warning) │
//! │                          │                                              │
//! │          ┌───────────────┼────────────────┐                             │
//! │          ▼               ▼                ▼                             │
//! │   × centro rate    × corner rate    × platform rate                    │
//! │   round half-up    round half-up    round half-up                      │
//! │          │               │                │                             │
//! │          └───────────────┼────────────────┘                             │
//! │                          ▼                                              │
//! │       unallocated = gross_margin − Σ commissions                       │
//! │       (reported, never folded into any commission)                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! With rates summing to at most 100%, Σ commissions can exceed the margin
//! by at most one cent (three half-cent roundings).

use crate::error::{CoreResult, ValidationError};
use crate::money::Money;
use crate::quote::{parts_purchase_cost, totals};
use crate::types::{LineItem, RevenueSplit, SplitRates, SplitWarning};
use crate::validation::{validate_amount, validate_quote, validate_split_rates};

/// Splits a job's margin among facility, referrer and platform.
///
/// ## Preconditions (rejected with ValidationError otherwise)
/// - every rate in 0%..=100%, sum ≤ 100%
/// - amounts non-negative
/// - `parts_purchase_cost ≤ billed_parts_total`
///
/// ```rust
/// use ripara_core::money::Money;
/// use ripara_core::split::split;
/// use ripara_core::types::SplitRates;
///
/// let s = split(
///     Money::from_cents(15000),
///     Money::from_cents(6000),
///     Money::from_cents(10000),
///     &SplitRates::from_percents(70, 10, 20),
/// )
/// .unwrap();
/// assert_eq!(s.gross_margin.cents(), 9000);
/// assert_eq!(s.centro_commission.cents(), 6300);
/// assert_eq!(s.corner_commission.cents(), 900);
/// assert_eq!(s.platform_commission.cents(), 1800);
/// assert!(s.unallocated.is_zero());
/// ```
pub fn split(
    grand_total: Money,
    parts_purchase_cost: Money,
    billed_parts_total: Money,
    rates: &SplitRates,
) -> Result<RevenueSplit, ValidationError> {
    validate_split_rates(rates)?;
    validate_amount("grand total", grand_total)?;
    validate_amount("parts purchase cost", parts_purchase_cost)?;
    validate_amount("billed parts total", billed_parts_total)?;

    if parts_purchase_cost > billed_parts_total {
        return Err(ValidationError::ExceedsBound {
            field: "parts purchase cost".to_string(),
            value: parts_purchase_cost.cents(),
            bound: "billed parts total".to_string(),
            limit: billed_parts_total.cents(),
        });
    }

    let mut warnings = Vec::new();

    let (gross_margin, shortfall) = grand_total.saturating_sub_floor(parts_purchase_cost);
    if shortfall.is_positive() {
        warnings.push(SplitWarning::MarginClamped { shortfall });
    }

    let centro_commission = gross_margin.apply_rate(rates.centro);
    let corner_commission = gross_margin.apply_rate(rates.corner);
    let platform_commission = gross_margin.apply_rate(rates.platform);

    let unallocated = gross_margin - (centro_commission + corner_commission + platform_commission);
    if !unallocated.is_zero() {
        warnings.push(SplitWarning::UnallocatedRemainder {
            amount: unallocated,
        });
    }

    Ok(RevenueSplit {
        grand_total,
        parts_purchase_cost,
        gross_margin,
        rates: *rates,
        centro_commission,
        corner_commission,
        platform_commission,
        unallocated,
        warnings,
    })
}

/// Validates a finalized quote and splits it.
///
/// Totals and the parts cost basis are derived from the line items.
pub fn split_quote(items: &[LineItem], rates: &SplitRates) -> CoreResult<RevenueSplit> {
    validate_quote(items)?;

    let quote_totals = totals(items);
    let cost = parts_purchase_cost(items);

    Ok(split(
        quote_totals.grand_total,
        cost,
        quote_totals.parts_total,
        rates,
    )?)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::types::CommissionRate;

    fn rates() -> SplitRates {
        SplitRates::from_percents(70, 10, 20)
    }

    #[test]
    fn test_reference_job_splits_exactly() {
        let items = vec![
            LineItem::part("p1", "Screen", 1, Money::from_cents(10000), Money::from_cents(6000)),
            LineItem::labor("l1", "Swap", 1, Money::from_cents(5000)),
        ];
        let s = split_quote(&items, &rates()).unwrap();

        assert_eq!(s.grand_total.cents(), 15000);
        assert_eq!(s.parts_purchase_cost.cents(), 6000);
        assert_eq!(s.gross_margin.cents(), 9000);
        assert_eq!(s.centro_commission.cents(), 6300);
        assert_eq!(s.corner_commission.cents(), 900);
        assert_eq!(s.platform_commission.cents(), 1800);
        assert!(s.unallocated.is_zero());
        assert!(s.warnings.is_empty());
    }

    #[test]
    fn test_oversized_amounts_rejected_without_overflow() {
        let items = vec![LineItem::part(
            "p1",
            "Logic board",
            3,
            Money::from_cents(i64::MAX / 2),
            Money::from_cents(100),
        )];
        assert!(matches!(
            split_quote(&items, &rates()),
            Err(CoreError::Validation(ValidationError::OutOfRange { .. }))
        ));

        let err = split(Money::from_cents(i64::MAX), Money::zero(), Money::zero(), &rates()).unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { .. }));
    }

    #[test]
    fn test_rounding_remainder_is_surfaced() {
        // Margin €0.05 at 33.33% each: 1.6665 → 2 cents each, 6 total, -1 unallocated
        let thirds = SplitRates {
            centro: CommissionRate::from_bps(3333),
            corner: CommissionRate::from_bps(3333),
            platform: CommissionRate::from_bps(3333),
        };
        let s = split(Money::from_cents(5), Money::zero(), Money::zero(), &thirds).unwrap();
        assert_eq!(s.centro_commission.cents(), 2);
        assert_eq!(s.unallocated.cents(), -1);
        assert!(s
            .warnings
            .contains(&SplitWarning::UnallocatedRemainder { amount: Money::from_cents(-1) }));
    }

    #[test]
    fn test_rates_below_full_leave_remainder() {
        let s = split(
            Money::from_cents(10000),
            Money::zero(),
            Money::zero(),
            &SplitRates::from_percents(60, 0, 20),
        )
        .unwrap();
        assert_eq!(s.total_commissions().cents(), 8000);
        assert_eq!(s.unallocated.cents(), 2000);
    }

    #[test]
    fn test_purchase_cost_above_parts_total_rejected() {
        let err = split(
            Money::from_cents(15000),
            Money::from_cents(11000),
            Money::from_cents(10000),
            &rates(),
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::ExceedsBound { .. }));
    }

    #[test]
    fn test_out_of_range_rate_rejected() {
        let bad = SplitRates {
            platform: CommissionRate::from_bps(10001),
            ..SplitRates::default()
        };
        assert!(split(Money::from_cents(100), Money::zero(), Money::zero(), &bad).is_err());
    }

    #[test]
    fn test_negative_margin_is_clamped_with_warning() {
        // Parts billed at 100 with cost 80, but the grand total (e.g. after
        // a manual override upstream) is only 50.
        let s = split(
            Money::from_cents(5000),
            Money::from_cents(8000),
            Money::from_cents(10000),
            &rates(),
        )
        .unwrap();
        assert!(s.gross_margin.is_zero());
        assert!(s.total_commissions().is_zero());
        assert!(s.margin_clamped());
        assert!(s
            .warnings
            .contains(&SplitWarning::MarginClamped { shortfall: Money::from_cents(3000) }));
    }

    #[test]
    fn test_split_quote_rejects_invalid_line() {
        let items = vec![LineItem::part("p1", "Screen", 1, Money::from_cents(5000), Money::from_cents(6000))];
        assert!(matches!(
            split_quote(&items, &rates()),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_commissions_within_one_cent_of_exact() {
        let rate_sets = [
            SplitRates::from_percents(70, 10, 20),
            SplitRates::from_percents(33, 33, 34),
            SplitRates {
                centro: CommissionRate::from_bps(6667),
                corner: CommissionRate::from_bps(1111),
                platform: CommissionRate::from_bps(2222),
            },
            SplitRates::from_percents(0, 0, 0),
        ];

        for margin_cents in (0..5000).step_by(7) {
            for r in &rate_sets {
                let s = split(Money::from_cents(margin_cents), Money::zero(), Money::zero(), r).unwrap();
                assert_eq!(s.gross_margin.cents(), margin_cents);

                for (commission, rate) in [
                    (s.centro_commission, r.centro),
                    (s.corner_commission, r.corner),
                    (s.platform_commission, r.platform),
                ] {
                    // |commission × 10000 − margin × bps| ≤ 5000 (half a cent)
                    let exact_scaled = margin_cents as i128 * rate.bps() as i128;
                    let diff = (commission.cents() as i128 * 10000 - exact_scaled).abs();
                    assert!(diff <= 5000, "margin {} rate {}", margin_cents, rate.bps());
                }

                // Over-allocation never exceeds the one cent epsilon
                assert!(s.unallocated.cents() >= -1);
                assert_eq!(s.unallocated, s.gross_margin - s.total_commissions());
            }
        }
    }
}
