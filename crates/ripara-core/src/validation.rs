//! # Validation Module
//!
//! Input validation for quotes, rates and intake data.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Quote entry                                                  │
//! │  ├── validate_line_item: purchase cost ≤ billed unit price             │
//! │  └── Rejected at entry, never coerced                                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Split engine                                                 │
//! │  ├── validate_split_rates: each 0..=100%, sum ≤ 100%                   │
//! │  └── parts purchase cost ≤ billed parts total                          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── UNIQUE(job_id) on settlement_entries                              │
//! │  └── CHECK constraints on cents and bps                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{CommissionRate, LineItem, LineItemKind, SplitRates, FULL_RATE_BPS};
use crate::{MAX_AMOUNT_CENTS, MAX_ITEM_QUANTITY, MAX_QUOTE_ITEMS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates that a field is present and not blank.
///
/// ```rust
/// use ripara_core::validation::validate_required;
///
/// assert!(validate_required("name", "Mario Rossi").is_ok());
/// assert!(validate_required("name", "   ").is_err());
/// ```
pub fn validate_required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::required(field));
    }
    Ok(())
}

/// Validates that a field does not exceed `max` characters.
pub fn validate_max_len(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(())
}

/// Validates a UUID string format.
///
/// ```rust
/// use ripara_core::validation::validate_uuid;
///
/// assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("not-a-uuid").is_err());
/// ```
pub fn validate_uuid(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::required("id"));
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: "id".to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity: 1..=MAX_ITEM_QUANTITY.
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates that an amount is in `0..=MAX_AMOUNT_CENTS`. Zero is allowed.
pub fn validate_amount(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() || amount.cents() > MAX_AMOUNT_CENTS {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_AMOUNT_CENTS,
        });
    }
    Ok(())
}

/// Validates a single rate: 0%..=100%.
pub fn validate_rate(field: &str, rate: CommissionRate) -> ValidationResult<()> {
    if !rate.is_in_range() {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: FULL_RATE_BPS as i64,
        });
    }
    Ok(())
}

/// Validates a rate triple.
///
/// ## Rules
/// - Each rate within 0%..=100%
/// - Sum of the three at most 100%, otherwise commissions would exceed the
///   margin they are cut from
///
/// ```rust
/// use ripara_core::types::SplitRates;
/// use ripara_core::validation::validate_split_rates;
///
/// assert!(validate_split_rates(&SplitRates::from_percents(70, 10, 20)).is_ok());
/// assert!(validate_split_rates(&SplitRates::from_percents(70, 20, 20)).is_err());
/// ```
pub fn validate_split_rates(rates: &SplitRates) -> ValidationResult<()> {
    validate_rate("centro rate", rates.centro)?;
    validate_rate("corner rate", rates.corner)?;
    validate_rate("platform rate", rates.platform)?;

    if rates.total_bps() > FULL_RATE_BPS {
        return Err(ValidationError::ExceedsBound {
            field: "sum of rates (bps)".to_string(),
            value: rates.total_bps() as i64,
            bound: "100%".to_string(),
            limit: FULL_RATE_BPS as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Quote Validators
// =============================================================================

/// Validates one quote line.
///
/// ## Rules
/// - id and description present
/// - quantity 1..=999
/// - unit price and purchase cost non-negative
/// - for parts: unit purchase cost ≤ unit price
pub fn validate_line_item(item: &LineItem) -> ValidationResult<()> {
    validate_required("line item id", &item.id)?;
    validate_required("line item description", &item.description)?;
    validate_max_len("line item description", &item.description, 500)?;
    validate_quantity(item.quantity)?;
    validate_amount("unit price", item.unit_price)?;
    validate_amount("purchase cost", item.purchase_cost)?;

    if item.kind == LineItemKind::Part && item.purchase_cost > item.unit_price {
        return Err(ValidationError::ExceedsBound {
            field: format!("purchase cost of line {}", item.id),
            value: item.purchase_cost.cents(),
            bound: "unit price".to_string(),
            limit: item.unit_price.cents(),
        });
    }

    Ok(())
}

/// Validates a whole quote.
pub fn validate_quote(items: &[LineItem]) -> CoreResult<()> {
    if items.len() > MAX_QUOTE_ITEMS {
        return Err(CoreError::QuoteTooLarge {
            max: MAX_QUOTE_ITEMS,
        });
    }

    for item in items {
        validate_line_item(item)?;
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
