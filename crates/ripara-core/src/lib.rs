//! # ripara-core: Pure Business Logic for Ripara
//!
//! Quote arithmetic, the revenue split, ledger entry rules and the intake
//! session aggregate. No I/O of any kind.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Ripara Architecture                              │
//! │                                                                         │
//! │  ┌───────────────────────────┐        ┌──────────────────────────────┐ │
//! │  │  Staff terminal           │        │  Customer display / phone    │ │
//! │  │  (coordinator)            │◄──────►│  (display client, signer)    │ │
//! │  └─────────────┬─────────────┘ ripara │└──────────────────────────────┘ │
//! │                │                -sync                                   │
//! │  ┌─────────────▼───────────────────────────────────────────────────┐   │
//! │  │               ★ ripara-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐  ┌─────────┐  ┌─────────┐  ┌────────┐  ┌────────┐ │   │
//! │  │   │  money  │  │  quote  │  │  split  │  │ ledger │  │ intake │ │   │
//! │  │   │  Money  │  │ totals  │  │ margin  │  │ entry  │  │session │ │   │
//! │  │   │  cents  │  │         │  │ 3 cuts  │  │ dues   │  │ modes  │ │   │
//! │  │   └─────────┘  └─────────┘  └─────────┘  └────────┘  └────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    ripara-db (Database Layer)                   │   │
//! │  │         settlement ledger, rate configuration, migrations       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Money type with integer arithmetic (cents, never floats)
//! - [`types`] - Line items, totals, commission rates, revenue split
//! - [`quote`] - Quote totals calculator
//! - [`split`] - Revenue-split engine
//! - [`ledger`] - Settlement ledger entries and outstanding aggregation
//! - [`intake`] - Intake session aggregate and mode state machine
//! - [`validation`] - Input rules
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use ripara_core::money::Money;
//! use ripara_core::split::split_quote;
//! use ripara_core::types::{LineItem, SplitRates};
//!
//! let items = vec![
//!     LineItem::part("p1", "Display", 1, Money::from_cents(10000), Money::from_cents(6000)),
//!     LineItem::labor("l1", "Display swap", 1, Money::from_cents(5000)),
//! ];
//!
//! let split = split_quote(&items, &SplitRates::from_percents(70, 10, 20)).unwrap();
//! assert_eq!(split.gross_margin.cents(), 9000);
//! assert_eq!(split.platform_commission.cents(), 1800);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod intake;
pub mod ledger;
pub mod money;
pub mod quote;
pub mod split;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use intake::{Customer, DeviceInfo, IntakeSession, IntakeUpdate, Pricing, SessionId, SessionMode};
pub use ledger::{
    Counterparty, DateRange, NewSettlement, OutstandingSummary, PaymentCollectionMethod,
    SettlementLedgerEntry, SettlementState,
};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines on a single repair quote.
pub const MAX_QUOTE_ITEMS: usize = 100;

/// Maximum quantity on a single quote line.
///
/// Catches typos such as 100 instead of 1 before they reach a split.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Largest single amount (in cents) accepted anywhere in a quote or split.
///
/// With `MAX_QUOTE_ITEMS` lines of `MAX_ITEM_QUANTITY` each, the summed
/// totals stay far inside `i64`.
pub const MAX_AMOUNT_CENTS: i64 = 100_000_000_000;
