//! # Intake Protocol Messages
//!
//! Envelope and event types exchanged between the staff terminal, the
//! customer display and a remote signing device.
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Intake Protocol Messages                           │
//! │                                                                         │
//! │  COORDINATOR → DISPLAY   (facility topic, one-to-many)                 │
//! │  ─────────────────────────────────────────────                         │
//! │  intake_started { customer, device, estimatedCost, diagnosticFee,      │
//! │                   amountDueNow, quoteItems?, laborCost? }              │
//! │  intake_update  { <any subset of the above> }                          │
//! │  request_password {}   request_signature {}                            │
//! │  intake_cancelled {}   intake_completed {}                             │
//! │                                                                         │
//! │  DISPLAY → COORDINATOR   (session topic, addressed)                    │
//! │  ─────────────────────────────────────────────                         │
//! │  customer_confirmed_data { confirmed }                                 │
//! │  password_submitted { password }   password_skipped {}                 │
//! │  signature_submitted { signatureData }                                 │
//! │                                                                         │
//! │  DISPLAY → COORDINATOR   (facility control topic)                      │
//! │  ─────────────────────────────────────────────                         │
//! │  snapshot_requested {}   → coordinator re-publishes the current state  │
//! │                                                                         │
//! │  REMOTE SIGNER → CONTROLLER   (signer topic, single event)             │
//! │  ─────────────────────────────────────────────                         │
//! │  signature_completed { signatureData }                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//! ```json
//! { "type": "intake_update", "sessionId": "…", "payload": { "amountDueNow": 2000 } }
//! ```
//! Amounts are integer cents. A field-less event may omit `payload`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use ripara_core::{Customer, DeviceInfo, IntakeSession, IntakeUpdate, LineItem, Money, Pricing, SessionId};

use crate::error::SyncError;

// =============================================================================
// Events (Closed Tagged Union)
// =============================================================================

/// Every event of the intake protocol.
///
/// Serialized adjacently tagged: `{ "type": "request_password", "payload": {} }`.
/// Field-less events are empty struct variants so their payload is `{}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum IntakeEvent {
    // =========================================================================
    // Coordinator → Display
    // =========================================================================
    /// A new session replaces whatever the display shows.
    IntakeStarted(IntakeStartedPayload),

    /// Field-level last-write-wins patch of the current session.
    IntakeUpdate(IntakeUpdate),

    RequestPassword {},

    RequestSignature {},

    IntakeCancelled {},

    IntakeCompleted {},

    // =========================================================================
    // Display → Coordinator
    // =========================================================================
    CustomerConfirmedData(ConfirmedDataPayload),

    PasswordSubmitted(PasswordPayload),

    PasswordSkipped {},

    SignatureSubmitted(SignaturePayload),

    /// Display (re)connected and asks for the current state.
    SnapshotRequested {},

    // =========================================================================
    // Remote Signer → Controller
    // =========================================================================
    SignatureCompleted(SignaturePayload),
}

/// Which way an event travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Coordinator to display, on the facility topic.
    Downstream,
    /// Display to coordinator, on the session topic.
    Upstream,
    /// Display to coordinator, on the facility control topic.
    Control,
    /// Remote signer to controller, on the signer topic.
    Signer,
}

impl IntakeEvent {
    /// Wire name of the event (for logging).
    pub fn type_name(&self) -> &'static str {
        match self {
            IntakeEvent::IntakeStarted(_) => "intake_started",
            IntakeEvent::IntakeUpdate(_) => "intake_update",
            IntakeEvent::RequestPassword {} => "request_password",
            IntakeEvent::RequestSignature {} => "request_signature",
            IntakeEvent::IntakeCancelled {} => "intake_cancelled",
            IntakeEvent::IntakeCompleted {} => "intake_completed",
            IntakeEvent::CustomerConfirmedData(_) => "customer_confirmed_data",
            IntakeEvent::PasswordSubmitted(_) => "password_submitted",
            IntakeEvent::PasswordSkipped {} => "password_skipped",
            IntakeEvent::SignatureSubmitted(_) => "signature_submitted",
            IntakeEvent::SnapshotRequested {} => "snapshot_requested",
            IntakeEvent::SignatureCompleted(_) => "signature_completed",
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            IntakeEvent::IntakeStarted(_)
            | IntakeEvent::IntakeUpdate(_)
            | IntakeEvent::RequestPassword {}
            | IntakeEvent::RequestSignature {}
            | IntakeEvent::IntakeCancelled {}
            | IntakeEvent::IntakeCompleted {} => Direction::Downstream,
            IntakeEvent::CustomerConfirmedData(_)
            | IntakeEvent::PasswordSubmitted(_)
            | IntakeEvent::PasswordSkipped {}
            | IntakeEvent::SignatureSubmitted(_) => Direction::Upstream,
            IntakeEvent::SnapshotRequested {} => Direction::Control,
            IntakeEvent::SignatureCompleted(_) => Direction::Signer,
        }
    }
}

// =============================================================================
// Payloads
// =============================================================================

/// Everything a display needs to render a fresh session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeStartedPayload {
    pub customer: Customer,
    pub device: DeviceInfo,
    pub estimated_cost: Money,
    pub diagnostic_fee: Money,
    pub amount_due_now: Money,
    #[serde(default)]
    pub remaining_balance: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_items: Option<Vec<LineItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labor_cost: Option<Money>,
}

impl IntakeStartedPayload {
    /// Full snapshot of a session.
    pub fn from_session(session: &IntakeSession) -> Self {
        let pricing = &session.pricing;
        IntakeStartedPayload {
            customer: session.customer.clone(),
            device: session.device.clone(),
            estimated_cost: pricing.estimated_cost,
            diagnostic_fee: pricing.diagnostic_fee,
            amount_due_now: pricing.amount_due_now,
            remaining_balance: pricing.remaining_balance,
            quote_items: if pricing.quote_items.is_empty() {
                None
            } else {
                Some(pricing.quote_items.clone())
            },
            labor_cost: pricing.labor_cost,
        }
    }

    /// Rebuilds a session in `confirm_data` from the payload.
    pub fn into_session(
        self,
        session_id: SessionId,
        facility_id: impl Into<String>,
        received_at: DateTime<Utc>,
    ) -> IntakeSession {
        let pricing = Pricing {
            estimated_cost: self.estimated_cost,
            diagnostic_fee: self.diagnostic_fee,
            amount_due_now: self.amount_due_now,
            remaining_balance: self.remaining_balance,
            labor_cost: self.labor_cost,
            quote_items: self.quote_items.unwrap_or_default(),
        };
        IntakeSession::open(session_id, facility_id, self.customer, self.device, pricing, received_at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedDataPayload {
    pub confirmed: bool,
}

/// Device unlock code typed by the customer.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordPayload {
    pub password: String,
}

// Keep the code out of logs.
impl fmt::Debug for PasswordPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordPayload")
            .field("password", &"***")
            .finish()
    }
}

/// Opaque encoded signature artifact (e.g. a PNG data URL).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignaturePayload {
    pub signature_data: String,
}

// =============================================================================
// Envelope
// =============================================================================

/// `{type, sessionId, payload}` as sent over a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawEnvelope")]
pub struct Envelope {
    pub session_id: SessionId,
    #[serde(flatten)]
    pub event: IntakeEvent,
}

/// Loose wire shape, validated into an [`Envelope`].
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    session_id: String,
    #[serde(default)]
    payload: Value,
}

impl TryFrom<RawEnvelope> for Envelope {
    type Error = SyncError;

    fn try_from(raw: RawEnvelope) -> Result<Self, Self::Error> {
        if raw.session_id.trim().is_empty() {
            return Err(SyncError::InvalidMessage("missing sessionId".to_string()));
        }

        // Field-less events may arrive without a payload
        let payload = match raw.payload {
            Value::Null => Value::Object(serde_json::Map::new()),
            other => other,
        };

        let event: IntakeEvent = serde_json::from_value(serde_json::json!({
            "type": raw.event_type,
            "payload": payload,
        }))
        .map_err(|e| SyncError::InvalidMessage(format!("{}: {}", raw.event_type, e)))?;

        Ok(Envelope {
            session_id: SessionId::from(raw.session_id),
            event,
        })
    }
}

impl Envelope {
    pub fn new(session_id: SessionId, event: IntakeEvent) -> Self {
        Envelope { session_id, event }
    }

    pub fn type_name(&self) -> &'static str {
        self.event.type_name()
    }

    // -------------------------------------------------------------------------
    // Constructors
    // -------------------------------------------------------------------------

    pub fn intake_started(session: &IntakeSession) -> Self {
        Envelope::new(
            session.session_id.clone(),
            IntakeEvent::IntakeStarted(IntakeStartedPayload::from_session(session)),
        )
    }

    pub fn intake_update(session_id: SessionId, update: IntakeUpdate) -> Self {
        Envelope::new(session_id, IntakeEvent::IntakeUpdate(update))
    }

    pub fn request_password(session_id: SessionId) -> Self {
        Envelope::new(session_id, IntakeEvent::RequestPassword {})
    }

    pub fn request_signature(session_id: SessionId) -> Self {
        Envelope::new(session_id, IntakeEvent::RequestSignature {})
    }

    pub fn intake_cancelled(session_id: SessionId) -> Self {
        Envelope::new(session_id, IntakeEvent::IntakeCancelled {})
    }

    pub fn intake_completed(session_id: SessionId) -> Self {
        Envelope::new(session_id, IntakeEvent::IntakeCompleted {})
    }

    pub fn customer_confirmed_data(session_id: SessionId) -> Self {
        Envelope::new(
            session_id,
            IntakeEvent::CustomerConfirmedData(ConfirmedDataPayload { confirmed: true }),
        )
    }

    pub fn password_submitted(session_id: SessionId, password: impl Into<String>) -> Self {
        Envelope::new(
            session_id,
            IntakeEvent::PasswordSubmitted(PasswordPayload {
                password: password.into(),
            }),
        )
    }

    pub fn password_skipped(session_id: SessionId) -> Self {
        Envelope::new(session_id, IntakeEvent::PasswordSkipped {})
    }

    pub fn signature_submitted(session_id: SessionId, signature_data: impl Into<String>) -> Self {
        Envelope::new(
            session_id,
            IntakeEvent::SignatureSubmitted(SignaturePayload {
                signature_data: signature_data.into(),
            }),
        )
    }

    pub fn snapshot_requested(session_id: SessionId) -> Self {
        Envelope::new(session_id, IntakeEvent::SnapshotRequested {})
    }

    pub fn signature_completed(session_id: SessionId, signature_data: impl Into<String>) -> Self {
        Envelope::new(
            session_id,
            IntakeEvent::SignatureCompleted(SignaturePayload {
                signature_data: signature_data.into(),
            }),
        )
    }

    // -------------------------------------------------------------------------
    // JSON
    // -------------------------------------------------------------------------

    /// Serializes to JSON string.
    pub fn to_json(&self) -> Result<String, SyncError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserializes from JSON string.
    pub fn from_json(json: &str) -> Result<Self, SyncError> {
        serde_json::from_str(json).map_err(|e| SyncError::DeserializationFailed(e.to_string()))
    }
}

/// Session id used by a display that has no session yet.
///
/// Envelopes always carry an id; a snapshot request from an empty display
/// has nothing better to send.
pub const NO_SESSION: &str = "none";

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sid() -> SessionId {
        SessionId::from("s-1")
    }

    #[test]
    fn test_envelope_wire_shape() {
        let json = serde_json::to_value(Envelope::request_password(sid())).unwrap();
        assert_eq!(
            json,
            json!({ "sessionId": "s-1", "type": "request_password", "payload": {} })
        );

        let json = serde_json::to_value(Envelope::signature_submitted(sid(), "data:image/png;base64,AAA")).unwrap();
        assert_eq!(json["type"], "signature_submitted");
        assert_eq!(json["payload"]["signatureData"], "data:image/png;base64,AAA");
    }

    #[test]
    fn test_parse_without_payload() {
        let env = Envelope::from_json(r#"{"type":"password_skipped","sessionId":"s-1"}"#).unwrap();
        assert_eq!(env.event, IntakeEvent::PasswordSkipped {});
        assert_eq!(env.session_id, sid());
    }

    #[test]
    fn test_parse_update_subset() {
        let env = Envelope::from_json(
            r#"{"type":"intake_update","sessionId":"s-1","payload":{"amountDueNow":2500}}"#,
        )
        .unwrap();
        match env.event {
            IntakeEvent::IntakeUpdate(update) => {
                assert_eq!(update.amount_due_now, Some(Money::from_cents(2500)));
                assert!(update.estimated_cost.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = Envelope::from_json(r#"{"type":"reboot","sessionId":"s-1","payload":{}}"#).unwrap_err();
        assert!(err.is_protocol_error());
    }

    #[test]
    fn test_missing_session_id_rejected() {
        assert!(Envelope::from_json(r#"{"type":"intake_cancelled","sessionId":""}"#).is_err());
        assert!(Envelope::from_json(r#"{"type":"intake_cancelled"}"#).is_err());
    }

    #[test]
    fn test_intake_started_round_trip_keeps_optional_fields_off_wire() {
        let env = Envelope::from_json(
            r#"{
                "type": "intake_started",
                "sessionId": "s-1",
                "payload": {
                    "customer": { "name": "Luca", "phone": "333" },
                    "device": { "brand": "Samsung", "model": "S22", "deviceType": "smartphone", "reportedIssue": "Battery" },
                    "estimatedCost": 4500,
                    "diagnosticFee": 1500,
                    "amountDueNow": 1500
                }
            }"#,
        )
        .unwrap();

        let payload = match &env.event {
            IntakeEvent::IntakeStarted(p) => p.clone(),
            other => panic!("unexpected {:?}", other),
        };
        assert!(payload.quote_items.is_none());

        let json = serde_json::to_value(&env).unwrap();
        assert!(json["payload"].get("quoteItems").is_none());
        assert!(json["payload"].get("laborCost").is_none());

        let session = payload.into_session(sid(), "fac-1", Utc::now());
        assert_eq!(session.pricing.estimated_cost.cents(), 4500);
        assert!(session.pricing.quote_items.is_empty());
    }

    #[test]
    fn test_password_not_in_debug_output() {
        let env = Envelope::password_submitted(sid(), "1234");
        assert!(!format!("{:?}", env).contains("1234"));
    }

    #[test]
    fn test_directions() {
        assert_eq!(Envelope::intake_cancelled(sid()).event.direction(), Direction::Downstream);
        assert_eq!(Envelope::password_skipped(sid()).event.direction(), Direction::Upstream);
        assert_eq!(Envelope::snapshot_requested(sid()).event.direction(), Direction::Control);
        assert_eq!(Envelope::signature_completed(sid(), "x").event.direction(), Direction::Signer);
    }
}
