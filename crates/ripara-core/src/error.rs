//! # Error Types
//!
//! Domain-specific error types for ripara-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  ripara-core errors (this file)                                        │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input rejected at the offending call           │
//! │                                                                         │
//! │  ripara-db errors                                                      │
//! │  └── DbError          - Storage failures, wraps the two above          │
//! │                                                                         │
//! │  ripara-sync errors                                                    │
//! │  └── SyncError        - Config, protocol, local session misuse         │
//! │                                                                         │
//! │  Calculation errors go back to the caller that asked, never to the     │
//! │  remote party of an intake session.                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::intake::SessionMode;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The corner leg of an entry collected via the referrer cannot be paid.
    ///
    /// ## When This Occurs
    /// ```text
    /// Customer pays at the collection point (via_corner)
    ///      │
    ///      ▼
    /// Referrer withholds its commission before remitting
    ///      │
    ///      ▼
    /// mark_counterparty_paid(entry, corner) → CornerSettledByReferrer
    /// ```
    #[error("Corner commission on entry {entry_id} is withheld by the referrer and cannot be marked paid")]
    CornerSettledByReferrer { entry_id: String },

    /// The corner leg was already paid directly, so the referrer cannot be
    /// recorded as having withheld it.
    #[error("Corner commission on entry {entry_id} was already paid directly")]
    CornerAlreadyPaid { entry_id: String },

    /// An intake session was asked to move along an edge that does not exist.
    #[error("Session cannot move from {from} to {to}")]
    InvalidTransition { from: SessionMode, to: SessionMode },

    /// Quote has more lines than a single job may carry.
    #[error("Quote cannot have more than {max} line items")]
    QuoteTooLarge { max: usize },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Rejected synchronously at the call that received the bad input; values
/// are never coerced into range.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// One amount exceeds the amount that bounds it.
    ///
    /// ## When This Occurs
    /// - A part's purchase cost above its billed unit price
    /// - The quote's parts purchase cost above the billed parts total
    #[error("{field} ({value}) exceeds {bound} ({limit})")]
    ExceedsBound {
        field: String,
        value: i64,
        bound: String,
        limit: i64,
    },

    /// Invalid format (e.g., invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value (e.g., a second settlement for the same job).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

impl ValidationError {
    /// Shorthand for `Required`.
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }

    /// Shorthand for `Duplicate`.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        ValidationError::Duplicate {
            field: field.into(),
            value: value.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
