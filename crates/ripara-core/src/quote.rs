//! # Quote Totals Calculator
//!
//! Turns priced line items into kind-filtered subtotals and a grand total.
//!
//! ## User Workflow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Operator edits quote ──► totals(items) ──► intake_update to display   │
//! │        ▲                                            │                   │
//! │        └──────────── every keystroke ◄──────────────┘                   │
//! │                                                                         │
//! │  Integer cents only: recomputing a thousand times yields the same      │
//! │  figure as computing once.                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::money::Money;
use crate::types::{LineItem, LineItemKind, Totals};

/// Computes quote totals.
///
/// Pure and deterministic. Empty input yields all zeros.
///
/// ```rust
/// use ripara_core::money::Money;
/// use ripara_core::quote::totals;
/// use ripara_core::types::LineItem;
///
/// let items = vec![
///     LineItem::part("p1", "Screen", 1, Money::from_cents(10000), Money::from_cents(6000)),
///     LineItem::labor("l1", "Replacement", 1, Money::from_cents(5000)),
/// ];
/// let t = totals(&items);
/// assert_eq!(t.parts_total.cents(), 10000);
/// assert_eq!(t.labor_total.cents(), 5000);
/// assert_eq!(t.grand_total.cents(), 15000);
/// ```
pub fn totals(items: &[LineItem]) -> Totals {
    let sum_of = |kind: LineItemKind| -> Money {
        items
            .iter()
            .filter(|item| item.kind == kind)
            .map(LineItem::line_total)
            .sum()
    };

    let parts_total = sum_of(LineItemKind::Part);
    let labor_total = sum_of(LineItemKind::Labor);
    let service_total = sum_of(LineItemKind::Service);

    Totals {
        parts_total,
        labor_total,
        service_total,
        grand_total: parts_total + labor_total + service_total,
    }
}

/// Sum of `quantity × purchase_cost` over part lines.
pub fn parts_purchase_cost(items: &[LineItem]) -> Money {
    items.iter().map(LineItem::line_purchase_cost).sum()
}
