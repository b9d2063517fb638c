//! # Intake Session Types
//!
//! The aggregate both sides of an intake hold: the coordinator owns the
//! authoritative copy, the customer display a reconstructed mirror.
//!
//! ## Mode State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   standby ──start──► confirm_data ──request_password──► enter_password │
//! │      ▲                    │                                  │          │
//! │      │                    │ request_signature                │ password │
//! │      │                    ▼                                  │ submitted│
//! │      │               signature ◄─────────────────────────────┘ /skipped│
//! │      │                    │                                             │
//! │      │                    │ signature_submitted                         │
//! │      │                    ▼                                             │
//! │      │               completed (terminal for this session id)          │
//! │      │                                                                  │
//! │      └──────── cancel / grace period reset (from any mode) ────────────│
//! │                                                                         │
//! │  Re-entering the current mode is a no-op (duplicate delivery).          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::quote::totals;
use crate::types::LineItem;
use crate::validation::{validate_amount, validate_max_len, validate_required};

// =============================================================================
// Session Id
// =============================================================================

/// Opaque session token. Freshly minted per intake and per remote signer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Mints a new random id.
    pub fn generate() -> Self {
        SessionId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        SessionId(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        SessionId(s.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Session Mode
// =============================================================================

/// Which step of the intake the display is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Standby,
    ConfirmData,
    EnterPassword,
    Signature,
    Completed,
}

impl SessionMode {
    /// Whether `self → next` is an edge of the state machine.
    ///
    /// Same-mode moves are not edges; callers treat them as duplicates.
    pub fn can_transition_to(self, next: SessionMode) -> bool {
        use SessionMode::*;
        match (self, next) {
            (_, Standby) => self != Standby,
            (Standby, ConfirmData) => true,
            (ConfirmData, EnterPassword) => true,
            (ConfirmData, Signature) => true,
            (EnterPassword, Signature) => true,
            (Signature, Completed) => true,
            _ => false,
        }
    }

    /// True for the modes where a session is in flight.
    pub fn is_active(self) -> bool {
        !matches!(self, SessionMode::Standby | SessionMode::Completed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionMode::Standby => "standby",
            SessionMode::ConfirmData => "confirm_data",
            SessionMode::EnterPassword => "enter_password",
            SessionMode::Signature => "signature",
            SessionMode::Completed => "completed",
        }
    }
}

impl Default for SessionMode {
    fn default() -> Self {
        SessionMode::Standby
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Customer & Device
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub name: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// The device handed over for repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub brand: String,
    pub model: String,
    /// Free text from the device catalogue ("smartphone", "tablet", ...).
    pub device_type: String,
    pub reported_issue: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imei: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
}

// =============================================================================
// Pricing
// =============================================================================

/// What the customer is shown and asked to pay now.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Pricing {
    pub estimated_cost: Money,
    pub diagnostic_fee: Money,
    pub amount_due_now: Money,
    pub remaining_balance: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labor_cost: Option<Money>,
    #[serde(default)]
    pub quote_items: Vec<LineItem>,
}

impl Pricing {
    /// Derives pricing from quote lines.
    ///
    /// The estimate is the quote's grand total and the remaining balance is
    /// whatever the up-front payment does not cover (never negative).
    pub fn from_quote(items: Vec<LineItem>, diagnostic_fee: Money, amount_due_now: Money) -> Self {
        let quote_totals = totals(&items);
        let (remaining_balance, _) = quote_totals.grand_total.saturating_sub_floor(amount_due_now);

        Pricing {
            estimated_cost: quote_totals.grand_total,
            diagnostic_fee,
            amount_due_now,
            remaining_balance,
            labor_cost: if quote_totals.labor_total.is_zero() {
                None
            } else {
                Some(quote_totals.labor_total)
            },
            quote_items: items,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_amount("estimated cost", self.estimated_cost)?;
        validate_amount("diagnostic fee", self.diagnostic_fee)?;
        validate_amount("amount due now", self.amount_due_now)?;
        validate_amount("remaining balance", self.remaining_balance)?;
        if let Some(labor) = self.labor_cost {
            validate_amount("labor cost", labor)?;
        }
        Ok(())
    }
}

/// Partial update with field-level last-write-wins merge.
///
/// Only the fields present are overwritten; absent fields keep their value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct IntakeUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<Customer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic_fee: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_due_now: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_balance: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labor_cost: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_items: Option<Vec<LineItem>>,
}

impl IntakeUpdate {
    pub fn is_empty(&self) -> bool {
        *self == IntakeUpdate::default()
    }

    /// Checks the amounts carried by the update.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let amounts = [
            ("estimated cost", self.estimated_cost),
            ("diagnostic fee", self.diagnostic_fee),
            ("amount due now", self.amount_due_now),
            ("remaining balance", self.remaining_balance),
            ("labor cost", self.labor_cost),
        ];
        for (field, amount) in amounts {
            if let Some(amount) = amount {
                validate_amount(field, amount)?;
            }
        }
        Ok(())
    }

    /// Merges the present fields into `session`.
    pub fn apply_to(&self, session: &mut IntakeSession) {
        if let Some(customer) = &self.customer {
            session.customer = customer.clone();
        }
        if let Some(device) = &self.device {
            session.device = device.clone();
        }

        let pricing = &mut session.pricing;
        if let Some(v) = self.estimated_cost {
            pricing.estimated_cost = v;
        }
        if let Some(v) = self.diagnostic_fee {
            pricing.diagnostic_fee = v;
        }
        if let Some(v) = self.amount_due_now {
            pricing.amount_due_now = v;
        }
        if let Some(v) = self.remaining_balance {
            pricing.remaining_balance = v;
        }
        if let Some(v) = self.labor_cost {
            pricing.labor_cost = Some(v);
        }
        if let Some(items) = &self.quote_items {
            pricing.quote_items = items.clone();
        }
    }
}

// =============================================================================
// Intake Session
// =============================================================================

/// One end-to-end intake interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct IntakeSession {
    pub session_id: SessionId,
    pub facility_id: String,
    pub mode: SessionMode,
    pub customer: Customer,
    pub device: DeviceInfo,
    pub pricing: Pricing,
    /// Set once the customer confirms the data shown on the display.
    #[serde(default)]
    pub data_confirmed: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl IntakeSession {
    /// Opens a session in `confirm_data`.
    pub fn open(
        session_id: SessionId,
        facility_id: impl Into<String>,
        customer: Customer,
        device: DeviceInfo,
        pricing: Pricing,
        created_at: DateTime<Utc>,
    ) -> Self {
        IntakeSession {
            session_id,
            facility_id: facility_id.into(),
            mode: SessionMode::ConfirmData,
            customer,
            device,
            pricing,
            data_confirmed: false,
            created_at,
        }
    }

    /// Minimal data a display needs to render the confirmation step.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_required("facility id", &self.facility_id)?;
        validate_required("customer name", &self.customer.name)?;
        validate_max_len("customer name", &self.customer.name, 200)?;
        validate_required("customer phone", &self.customer.phone)?;
        validate_required("device brand", &self.device.brand)?;
        validate_required("device model", &self.device.model)?;
        self.pricing.validate()
    }

    pub fn is_session(&self, id: &SessionId) -> bool {
        &self.session_id == id
    }

    /// Moves to `next`.
    ///
    /// ## Returns
    /// - `Ok(true)`  - mode changed
    /// - `Ok(false)` - already in `next` (duplicate, nothing to do)
    /// - `Err(InvalidTransition)` - not an edge of the state machine
    pub fn advance(&mut self, next: SessionMode) -> CoreResult<bool> {
        if self.mode == next {
            return Ok(false);
        }
        if !self.mode.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.mode,
                to: next,
            });
        }
        self.mode = next;
        Ok(true)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
