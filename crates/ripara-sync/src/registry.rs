//! # Session Registry
//!
//! Coordinator side of the intake flow. Owns the authoritative
//! [`IntakeSession`] of a facility and turns every state change into an
//! outbound protocol message.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   standby ──start_session──► confirm_data                               │
//! │                                   │                                     │
//! │               request_password ───┤─── request_signature                │
//! │               (operator override) │    (skip password step)             │
//! │                                   ▼                 │                   │
//! │                             enter_password          │                   │
//! │                                   │                 │                   │
//! │         password_submitted /      │                 │                   │
//! │         password_skipped ─────────┘                 ▼                   │
//! │                                   ──────────►  signature                │
//! │                                                     │                   │
//! │          signature_submitted / remote signature ───┘                   │
//! │                                                     ▼                   │
//! │                                          completed (slot emptied)       │
//! │                                                                         │
//! │   cancel: any state ──► standby (slot emptied)                          │
//! │   start_session while busy: old aggregate abandoned, fresh id minted    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Single-Slot Arena
//! At most one session is current. Every inbound event is checked against
//! the slot's session id before it can touch state; events from a
//! superseded or cancelled session are dropped as [`IgnoreReason::StaleSession`]
//! or [`IgnoreReason::NoSession`]. These are ordinary consequences of a
//! best-effort channel, so they are logged at debug and never returned as
//! errors.
//!
//! A completed session leaves the slot together with its upstream
//! subscription. The [`CompletedIntake`] handed back is the only record of
//! it, and a display asking for a snapshot afterwards gets nothing to show.

use chrono::Utc;
use tracing::{debug, info, warn};

use ripara_core::{Customer, DeviceInfo, IntakeSession, IntakeUpdate, Pricing, SessionId, SessionMode};

use crate::channel::{MessageChannel, Subscription, Topic};
use crate::error::{SyncError, SyncResult};
use crate::protocol::{Envelope, IntakeEvent};

// =============================================================================
// Outcomes
// =============================================================================

/// What happened to an inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundOutcome {
    /// State updated; the session is now in this mode.
    Applied(SessionMode),
    /// The signature arrived and the session is finished.
    Completed(CompletedIntake),
    /// Nothing changed.
    Ignored(IgnoreReason),
}

impl InboundOutcome {
    pub fn is_ignored(&self) -> bool {
        matches!(self, InboundOutcome::Ignored(_))
    }
}

/// Why an inbound event was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Addressed to a session that is no longer current.
    StaleSession,
    /// Current session is not in a mode that accepts it (duplicate or reordered).
    OutOfOrder,
    /// No session is current.
    NoSession,
    /// Not an event the coordinator consumes.
    UnexpectedEvent,
}

/// Everything captured during a finished intake.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedIntake {
    pub session: IntakeSession,
    /// `None` when the customer skipped the password step.
    pub password: Option<String>,
    pub signature_data: String,
}

// =============================================================================
// Registry
// =============================================================================

struct ActiveSession {
    session: IntakeSession,
    upstream: Subscription,
    generation: u64,
    password: Option<String>,
}

/// Coordinator for the intake sessions of one facility.
pub struct SessionRegistry<C: MessageChannel> {
    channel: C,
    facility_id: String,
    display_topic: Topic,
    control: Subscription,
    active: Option<ActiveSession>,
    generation: u64,
}

impl<C: MessageChannel> SessionRegistry<C> {
    /// Creates a registry and starts listening for display control messages.
    pub fn new(channel: C, facility_id: impl Into<String>) -> Self {
        let facility_id = facility_id.into();
        let control = channel.subscribe(&Topic::facility_control(&facility_id));

        SessionRegistry {
            display_topic: Topic::facility_display(&facility_id),
            channel,
            facility_id,
            control,
            active: None,
            generation: 0,
        }
    }

    pub fn facility_id(&self) -> &str {
        &self.facility_id
    }

    /// The current session, if any.
    pub fn current(&self) -> Option<&IntakeSession> {
        self.active.as_ref().map(|a| &a.session)
    }

    pub fn current_session_id(&self) -> Option<&SessionId> {
        self.current().map(|s| &s.session_id)
    }

    /// Standby when no session is current.
    pub fn mode(&self) -> SessionMode {
        self.current().map(|s| s.mode).unwrap_or_default()
    }

    /// Number of sessions started so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    // =========================================================================
    // Coordinator Operations
    // =========================================================================

    /// Starts a new intake, superseding any unfinished one.
    ///
    /// Publishes `intake_started` on the facility display topic.
    pub fn start_session(
        &mut self,
        customer: Customer,
        device: DeviceInfo,
        pricing: Pricing,
    ) -> SyncResult<SessionId> {
        let session = IntakeSession::open(
            SessionId::generate(),
            self.facility_id.clone(),
            customer,
            device,
            pricing,
            Utc::now(),
        );
        session.validate()?;

        if let Some(previous) = self.active.take() {
            info!(
                facility_id = %self.facility_id,
                session_id = %previous.session.session_id,
                mode = %previous.session.mode,
                "Superseding unfinished intake session"
            );
        }

        self.generation += 1;
        let session_id = session.session_id.clone();
        let upstream = self.channel.subscribe(&Topic::session(&session_id));
        let envelope = Envelope::intake_started(&session);

        self.active = Some(ActiveSession {
            session,
            upstream,
            generation: self.generation,
            password: None,
        });

        let receivers = self.channel.publish(&self.display_topic, envelope);
        info!(
            facility_id = %self.facility_id,
            session_id = %session_id,
            generation = self.generation,
            receivers,
            "Intake session started"
        );

        Ok(session_id)
    }

    /// Merges a partial update into the current session and forwards it.
    ///
    /// `Ok(false)` when `session_id` is not current or the update is empty.
    pub fn update_pricing(&mut self, session_id: &SessionId, update: IntakeUpdate) -> SyncResult<bool> {
        let Some(active) = self.current_mut(session_id) else {
            return Ok(false);
        };
        if update.is_empty() {
            return Ok(false);
        }
        update.validate()?;

        // Merge into a copy so a rejected update leaves the session untouched
        let mut merged = active.session.clone();
        update.apply_to(&mut merged);
        merged.validate()?;
        active.session = merged;

        self.channel
            .publish(&self.display_topic, Envelope::intake_update(session_id.clone(), update));
        debug!(session_id = %session_id, "Intake update published");
        Ok(true)
    }

    /// Asks the display for the device unlock code.
    ///
    /// Allowed from `confirm_data` without waiting for the customer's
    /// confirmation.
    pub fn request_password(&mut self, session_id: &SessionId) -> SyncResult<bool> {
        self.transition(session_id, SessionMode::EnterPassword)
    }

    /// Asks the display for the signature.
    pub fn request_signature(&mut self, session_id: &SessionId) -> SyncResult<bool> {
        self.transition(session_id, SessionMode::Signature)
    }

    /// Abandons the current session and returns the display to standby.
    pub fn cancel(&mut self) -> Option<SessionId> {
        let active = self.active.take()?;
        let session_id = active.session.session_id;

        self.channel
            .publish(&self.display_topic, Envelope::intake_cancelled(session_id.clone()));
        info!(
            facility_id = %self.facility_id,
            session_id = %session_id,
            from = %active.session.mode,
            "Intake session cancelled"
        );

        Some(session_id)
    }

    /// Applies a signature captured on another device through a
    /// [`RemoteSignerLink`](crate::remote_signer::RemoteSignerLink).
    ///
    /// Completes the session exactly like a `signature_submitted` from the
    /// display: `intake_completed` goes out and the slot is emptied.
    ///
    /// ## Returns
    /// - `Ok(Some(_))` - session completed
    /// - `Ok(None)` - `session_id` is not current (superseded, cancelled or already completed)
    /// - `Err(InvalidTransition)` - current session is not waiting for a signature
    pub fn apply_remote_signature(
        &mut self,
        session_id: &SessionId,
        signature_data: impl Into<String>,
    ) -> SyncResult<Option<CompletedIntake>> {
        let Some(active) = self.current_mut(session_id) else {
            return Ok(None);
        };
        let mode = active.session.mode;
        if mode != SessionMode::Signature {
            return Err(SyncError::InvalidTransition {
                from: mode,
                to: SessionMode::Completed,
            });
        }

        Ok(self.complete(signature_data.into(), "remote"))
    }

    /// Re-publishes the full current state for a display that (re)connected.
    ///
    /// Sends `intake_started` followed by the event of the current mode.
    /// Returns false when there is nothing to show.
    pub fn republish_snapshot(&self) -> bool {
        let Some(active) = self.active.as_ref() else {
            return false;
        };
        let session = &active.session;
        let id = session.session_id.clone();

        self.channel
            .publish(&self.display_topic, Envelope::intake_started(session));

        let follow_up = match session.mode {
            SessionMode::EnterPassword => Some(Envelope::request_password(id)),
            SessionMode::Signature => Some(Envelope::request_signature(id)),
            SessionMode::Standby | SessionMode::ConfirmData | SessionMode::Completed => None,
        };
        if let Some(envelope) = follow_up {
            self.channel.publish(&self.display_topic, envelope);
        }

        info!(
            session_id = %session.session_id,
            mode = %session.mode,
            "Snapshot re-published"
        );
        true
    }

    fn current_mut(&mut self, session_id: &SessionId) -> Option<&mut ActiveSession> {
        match self.active.as_mut() {
            Some(active) if active.session.is_session(session_id) => Some(active),
            Some(active) => {
                debug!(
                    session_id = %session_id,
                    current = %active.session.session_id,
                    "Dropping operation for superseded session"
                );
                None
            }
            None => {
                debug!(session_id = %session_id, "Dropping operation, no current session");
                None
            }
        }
    }

    /// Signature → Completed for the current session.
    ///
    /// Publishes `intake_completed` and empties the slot. `None` if the
    /// slot is empty or the session cannot complete.
    fn complete(&mut self, signature_data: String, source: &'static str) -> Option<CompletedIntake> {
        let mut active = self.active.take()?;
        if let Err(e) = active.session.advance(SessionMode::Completed) {
            warn!(session_id = %active.session.session_id, error = %e, "Cannot complete intake session");
            self.active = Some(active);
            return None;
        }

        let session_id = active.session.session_id.clone();
        self.channel
            .publish(&self.display_topic, Envelope::intake_completed(session_id.clone()));
        info!(
            facility_id = %self.facility_id,
            session_id = %session_id,
            generation = active.generation,
            password_captured = active.password.is_some(),
            source,
            "Intake session completed"
        );

        Some(CompletedIntake {
            session: active.session,
            password: active.password,
            signature_data,
        })
    }

    fn transition(&mut self, session_id: &SessionId, next: SessionMode) -> SyncResult<bool> {
        let Some(active) = self.current_mut(session_id) else {
            return Ok(false);
        };
        if !active.session.advance(next)? {
            return Ok(false);
        }

        let envelope = match next {
            SessionMode::EnterPassword => Envelope::request_password(session_id.clone()),
            _ => Envelope::request_signature(session_id.clone()),
        };
        self.channel.publish(&self.display_topic, envelope);
        info!(session_id = %session_id, mode = %next, "Intake session advanced");
        Ok(true)
    }

    // =========================================================================
    // Inbound Events
    // =========================================================================

    /// Applies one event received from a display.
    ///
    /// Idempotent: duplicates and reordered events come back as
    /// [`IgnoreReason::OutOfOrder`] without touching state.
    pub fn on_inbound_event(&mut self, envelope: Envelope) -> InboundOutcome {
        let Envelope { session_id, event } = envelope;

        if let IntakeEvent::SnapshotRequested {} = event {
            return if self.republish_snapshot() {
                InboundOutcome::Applied(self.mode())
            } else {
                InboundOutcome::Ignored(IgnoreReason::NoSession)
            };
        }

        let event_type = event.type_name();
        let Some(active) = self.active.as_mut() else {
            debug!(session_id = %session_id, event = event_type, "Ignoring event, no current session");
            return InboundOutcome::Ignored(IgnoreReason::NoSession);
        };
        if !active.session.is_session(&session_id) {
            debug!(
                session_id = %session_id,
                current = %active.session.session_id,
                event = event_type,
                "Ignoring event for stale session"
            );
            return InboundOutcome::Ignored(IgnoreReason::StaleSession);
        }

        let mode = active.session.mode;
        let outcome = match event {
            IntakeEvent::CustomerConfirmedData(payload) => match mode {
                SessionMode::ConfirmData | SessionMode::EnterPassword | SessionMode::Signature => {
                    active.session.data_confirmed = payload.confirmed;
                    InboundOutcome::Applied(mode)
                }
                _ => InboundOutcome::Ignored(IgnoreReason::OutOfOrder),
            },

            IntakeEvent::PasswordSubmitted(_) | IntakeEvent::PasswordSkipped {}
                if mode != SessionMode::EnterPassword =>
            {
                InboundOutcome::Ignored(IgnoreReason::OutOfOrder)
            }
            IntakeEvent::PasswordSubmitted(payload) => {
                active.password = Some(payload.password);
                Self::enter_signature(&self.channel, &self.display_topic, active)
            }
            IntakeEvent::PasswordSkipped {} => {
                active.password = None;
                Self::enter_signature(&self.channel, &self.display_topic, active)
            }

            IntakeEvent::SignatureSubmitted(payload) if mode == SessionMode::Signature => {
                match self.complete(payload.signature_data, "display") {
                    Some(done) => InboundOutcome::Completed(done),
                    None => InboundOutcome::Ignored(IgnoreReason::OutOfOrder),
                }
            }
            IntakeEvent::SignatureSubmitted(_) => InboundOutcome::Ignored(IgnoreReason::OutOfOrder),

            other => {
                warn!(event = other.type_name(), "Unexpected event on coordinator topic");
                InboundOutcome::Ignored(IgnoreReason::UnexpectedEvent)
            }
        };

        if outcome == InboundOutcome::Ignored(IgnoreReason::OutOfOrder) {
            debug!(session_id = %session_id, event = event_type, mode = %mode, "Ignoring out-of-order event");
        }
        outcome
    }

    fn enter_signature(channel: &C, display_topic: &Topic, active: &mut ActiveSession) -> InboundOutcome {
        let id = active.session.session_id.clone();
        if let Err(e) = active.session.advance(SessionMode::Signature) {
            warn!(session_id = %id, error = %e, "Cannot enter signature step");
            return InboundOutcome::Ignored(IgnoreReason::OutOfOrder);
        }
        channel.publish(display_topic, Envelope::request_signature(id));
        InboundOutcome::Applied(SessionMode::Signature)
    }

    /// Applies every event already delivered, without waiting.
    pub fn drain_inbound(&mut self) -> Vec<InboundOutcome> {
        let mut pending = Vec::new();
        while let Some(envelope) = self.control.try_recv() {
            pending.push(envelope);
        }
        if let Some(active) = self.active.as_mut() {
            while let Some(envelope) = active.upstream.try_recv() {
                pending.push(envelope);
            }
        }

        pending
            .into_iter()
            .map(|envelope| self.on_inbound_event(envelope))
            .collect()
    }

    /// Waits for the next inbound event and applies it.
    pub async fn next_inbound(&mut self) -> Option<InboundOutcome> {
        let envelope = match self.active.as_mut() {
            Some(active) => tokio::select! {
                envelope = active.upstream.recv() => envelope,
                envelope = self.control.recv() => envelope,
            },
            None => self.control.recv().await,
        }?;

        Some(self.on_inbound_event(envelope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::InMemoryChannel;
    use ripara_core::{LineItem, Money};

    fn customer() -> Customer {
        Customer {
            name: "Marco Rossi".to_string(),
            phone: "+39 347 123 4567".to_string(),
            email: None,
            address: None,
        }
    }

    fn device() -> DeviceInfo {
        DeviceInfo {
            brand: "Apple".to_string(),
            model: "iPhone 13".to_string(),
            device_type: "smartphone".to_string(),
            reported_issue: "Cracked display".to_string(),
            imei: None,
            serial_number: None,
        }
    }

    fn pricing() -> Pricing {
        Pricing::from_quote(
            vec![LineItem::part("p1", "Display", 1, Money::from_cents(12000), Money::from_cents(7000))],
            Money::from_cents(2000),
            Money::from_cents(2000),
        )
    }

    fn setup() -> (InMemoryChannel, SessionRegistry<InMemoryChannel>, Subscription) {
        let channel = InMemoryChannel::new();
        let display = channel.subscribe(&Topic::facility_display("fac-1"));
        let registry = SessionRegistry::new(channel.clone(), "fac-1");
        (channel, registry, display)
    }

    fn drain_types(sub: &mut Subscription) -> Vec<&'static str> {
        let mut types = Vec::new();
        while let Some(env) = sub.try_recv() {
            types.push(env.type_name());
        }
        types
    }

    #[test]
    fn test_start_session_publishes_intake_started() {
        let (_, mut registry, mut display) = setup();
        let id = registry.start_session(customer(), device(), pricing()).unwrap();

        let env = display.try_recv().unwrap();
        assert_eq!(env.session_id, id);
        assert_eq!(env.type_name(), "intake_started");
        assert_eq!(registry.mode(), SessionMode::ConfirmData);
        assert_eq!(registry.generation(), 1);
    }

    #[test]
    fn test_invalid_session_rejected_before_publish() {
        let (_, mut registry, mut display) = setup();
        let mut c = customer();
        c.name.clear();

        let err = registry.start_session(c, device(), pricing()).unwrap_err();
        assert!(matches!(err, SyncError::InvalidSession(_)));
        assert!(display.try_recv().is_none());
        assert!(registry.current().is_none());
    }

    #[test]
    fn test_full_flow_with_password() {
        let (channel, mut registry, mut display) = setup();
        let id = registry.start_session(customer(), device(), pricing()).unwrap();
        let upstream = Topic::session(&id);

        channel.publish(&upstream, Envelope::customer_confirmed_data(id.clone()));
        assert_eq!(registry.drain_inbound(), vec![InboundOutcome::Applied(SessionMode::ConfirmData)]);
        assert!(registry.current().unwrap().data_confirmed);

        assert!(registry.request_password(&id).unwrap());
        channel.publish(&upstream, Envelope::password_submitted(id.clone(), "0000"));
        assert_eq!(registry.drain_inbound(), vec![InboundOutcome::Applied(SessionMode::Signature)]);

        channel.publish(&upstream, Envelope::signature_submitted(id.clone(), "sig-data"));
        let outcomes = registry.drain_inbound();
        match &outcomes[..] {
            [InboundOutcome::Completed(done)] => {
                assert_eq!(done.password.as_deref(), Some("0000"));
                assert_eq!(done.signature_data, "sig-data");
                assert_eq!(done.session.mode, SessionMode::Completed);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(registry.current().is_none());
        assert_eq!(registry.mode(), SessionMode::Standby);

        assert_eq!(
            drain_types(&mut display),
            vec!["intake_started", "request_password", "request_signature", "intake_completed"]
        );
    }

    #[test]
    fn test_password_request_without_confirmation_is_allowed() {
        let (_, mut registry, _display) = setup();
        let id = registry.start_session(customer(), device(), pricing()).unwrap();

        assert!(registry.request_password(&id).unwrap());
        assert!(!registry.current().unwrap().data_confirmed);
        // Duplicate request is a no-op
        assert!(!registry.request_password(&id).unwrap());
    }

    #[test]
    fn test_request_signature_skips_password_step() {
        let (_, mut registry, _display) = setup();
        let id = registry.start_session(customer(), device(), pricing()).unwrap();

        assert!(registry.request_signature(&id).unwrap());
        assert_eq!(registry.mode(), SessionMode::Signature);

        let err = registry.request_password(&id).unwrap_err();
        assert!(matches!(
            err,
            SyncError::InvalidTransition {
                from: SessionMode::Signature,
                to: SessionMode::EnterPassword
            }
        ));
    }

    #[test]
    fn test_superseded_session_events_dropped() {
        let (channel, mut registry, _display) = setup();
        let a = registry.start_session(customer(), device(), pricing()).unwrap();
        registry.request_password(&a).unwrap();

        let b = registry.start_session(customer(), device(), pricing()).unwrap();
        assert_ne!(a, b);

        // Late event for A, delivered straight and through its old topic
        assert_eq!(
            registry.on_inbound_event(Envelope::password_submitted(a.clone(), "1111")),
            InboundOutcome::Ignored(IgnoreReason::StaleSession)
        );
        channel.publish(&Topic::session(&a), Envelope::password_submitted(a.clone(), "1111"));
        assert!(registry.drain_inbound().is_empty());

        assert_eq!(registry.current_session_id(), Some(&b));
        assert_eq!(registry.mode(), SessionMode::ConfirmData);
        assert!(!registry.request_signature(&a).unwrap());
    }

    #[test]
    fn test_cancel_during_password_then_late_signature_ignored() {
        let (_, mut registry, mut display) = setup();
        let id = registry.start_session(customer(), device(), pricing()).unwrap();
        registry.request_password(&id).unwrap();

        assert_eq!(registry.cancel(), Some(id.clone()));
        assert_eq!(registry.mode(), SessionMode::Standby);
        assert_eq!(registry.cancel(), None);

        assert_eq!(
            registry.on_inbound_event(Envelope::signature_submitted(id.clone(), "late")),
            InboundOutcome::Ignored(IgnoreReason::NoSession)
        );
        assert_eq!(
            drain_types(&mut display),
            vec!["intake_started", "request_password", "intake_cancelled"]
        );
    }

    #[test]
    fn test_duplicate_and_reordered_events_are_idempotent() {
        let (_, mut registry, _display) = setup();
        let id = registry.start_session(customer(), device(), pricing()).unwrap();

        // Signature before it was requested
        assert_eq!(
            registry.on_inbound_event(Envelope::signature_submitted(id.clone(), "early")),
            InboundOutcome::Ignored(IgnoreReason::OutOfOrder)
        );

        registry.request_password(&id).unwrap();
        assert_eq!(
            registry.on_inbound_event(Envelope::password_skipped(id.clone())),
            InboundOutcome::Applied(SessionMode::Signature)
        );
        assert_eq!(
            registry.on_inbound_event(Envelope::password_skipped(id.clone())),
            InboundOutcome::Ignored(IgnoreReason::OutOfOrder)
        );

        assert!(matches!(
            registry.on_inbound_event(Envelope::signature_submitted(id.clone(), "sig")),
            InboundOutcome::Completed(CompletedIntake { password: None, .. })
        ));
        // Completed sessions leave the slot, so a duplicate finds nothing
        assert_eq!(
            registry.on_inbound_event(Envelope::signature_submitted(id.clone(), "sig")),
            InboundOutcome::Ignored(IgnoreReason::NoSession)
        );
    }

    #[test]
    fn test_snapshot_after_completion_publishes_nothing() {
        let (channel, mut registry, mut display) = setup();
        let id = registry.start_session(customer(), device(), pricing()).unwrap();
        registry.request_signature(&id).unwrap();
        assert!(matches!(
            registry.on_inbound_event(Envelope::signature_submitted(id.clone(), "sig")),
            InboundOutcome::Completed(_)
        ));
        drain_types(&mut display);

        assert!(!registry.republish_snapshot());
        channel.publish(
            &Topic::facility_control("fac-1"),
            Envelope::snapshot_requested(SessionId::from(crate::protocol::NO_SESSION)),
        );
        assert_eq!(
            registry.drain_inbound(),
            vec![InboundOutcome::Ignored(IgnoreReason::NoSession)]
        );
        assert!(display.try_recv().is_none());
    }

    #[test]
    fn test_completion_releases_session_topic() {
        let (channel, mut registry, _display) = setup();
        let id = registry.start_session(customer(), device(), pricing()).unwrap();
        // display topic, control topic and the session topic
        assert_eq!(channel.topic_count(), 3);

        registry.request_signature(&id).unwrap();
        registry.on_inbound_event(Envelope::signature_submitted(id, "sig"));
        assert_eq!(channel.topic_count(), 2);
    }

    #[test]
    fn test_remote_signature_completes_session() {
        let (_, mut registry, mut display) = setup();
        let id = registry.start_session(customer(), device(), pricing()).unwrap();

        // Not waiting for a signature yet
        assert!(matches!(
            registry.apply_remote_signature(&id, "early"),
            Err(SyncError::InvalidTransition {
                from: SessionMode::ConfirmData,
                to: SessionMode::Completed
            })
        ));
        assert_eq!(registry.mode(), SessionMode::ConfirmData);

        registry.request_signature(&id).unwrap();
        assert!(registry
            .apply_remote_signature(&SessionId::from("other"), "sig")
            .unwrap()
            .is_none());

        let done = registry.apply_remote_signature(&id, "remote-sig").unwrap().unwrap();
        assert_eq!(done.signature_data, "remote-sig");
        assert_eq!(done.session.mode, SessionMode::Completed);
        assert_eq!(registry.mode(), SessionMode::Standby);

        // Applying twice does nothing
        assert!(registry.apply_remote_signature(&id, "remote-sig").unwrap().is_none());
        assert_eq!(
            drain_types(&mut display),
            vec!["intake_started", "request_signature", "intake_completed"]
        );
    }

    #[tokio::test]
    async fn test_remote_signer_flow_reaches_display() {
        use crate::config::RemoteSignerSettings;
        use crate::display::{DisplaySessionClient, DEFAULT_COMPLETED_GRACE};
        use crate::remote_signer::{RemoteSigner, RemoteSignerLink};

        let (channel, mut registry, _display) = setup();
        let mut client = DisplaySessionClient::new(channel.clone(), "fac-1", DEFAULT_COMPLETED_GRACE);
        let id = registry.start_session(customer(), device(), pricing()).unwrap();
        registry.request_signature(&id).unwrap();
        client.pump(tokio::time::Instant::now());
        assert_eq!(client.mode(), SessionMode::Signature);

        let session = registry.current().unwrap();
        let settings = RemoteSignerSettings {
            base_url: "https://sign.example.com/s".to_string(),
            token_ttl_secs: 900,
        };
        let mut link = RemoteSignerLink::mint(
            channel.clone(),
            session.pricing.amount_due_now,
            session.pricing.estimated_cost,
            &settings,
        )
        .unwrap();
        assert_ne!(link.session_id(), &id);

        let url = link.share_url().to_string();
        let phone_channel = channel.clone();
        tokio::spawn(async move {
            let mut phone = RemoteSigner::from_share_url(&url, phone_channel).unwrap();
            phone.submit("sig-from-phone").unwrap();
        });

        let signature = link.wait().await.unwrap();
        let done = registry.apply_remote_signature(&id, signature).unwrap().unwrap();
        assert_eq!(done.signature_data, "sig-from-phone");

        client.pump(tokio::time::Instant::now());
        assert_eq!(client.mode(), SessionMode::Completed);
        assert_eq!(client.session().unwrap().session_id, id);
    }

    #[test]
    fn test_update_pricing_merges_and_guards_session() {
        let (_, mut registry, mut display) = setup();
        let id = registry.start_session(customer(), device(), pricing()).unwrap();
        display.try_recv();

        let update = IntakeUpdate {
            amount_due_now: Some(Money::from_cents(3000)),
            ..Default::default()
        };
        assert!(registry.update_pricing(&id, update.clone()).unwrap());
        assert_eq!(registry.current().unwrap().pricing.amount_due_now.cents(), 3000);
        assert_eq!(registry.current().unwrap().pricing.estimated_cost.cents(), 12000);
        assert_eq!(display.try_recv().unwrap().type_name(), "intake_update");

        assert!(!registry.update_pricing(&SessionId::from("other"), update).unwrap());
        assert!(!registry.update_pricing(&id, IntakeUpdate::default()).unwrap());
        assert!(display.try_recv().is_none());
    }

    #[test]
    fn test_rejected_update_leaves_session_unchanged() {
        let (_, mut registry, mut display) = setup();
        let id = registry.start_session(customer(), device(), pricing()).unwrap();
        display.try_recv();
        let before = registry.current().unwrap().clone();

        let mut nameless = customer();
        nameless.name.clear();
        let update = IntakeUpdate {
            customer: Some(nameless),
            amount_due_now: Some(Money::from_cents(5000)),
            ..Default::default()
        };

        let err = registry.update_pricing(&id, update).unwrap_err();
        assert!(matches!(err, SyncError::InvalidSession(_)));
        assert_eq!(registry.current(), Some(&before));
        assert!(display.try_recv().is_none());
    }

    #[test]
    fn test_snapshot_request_republishes_state() {
        let (channel, mut registry, mut display) = setup();
        let id = registry.start_session(customer(), device(), pricing()).unwrap();
        registry.request_password(&id).unwrap();
        drain_types(&mut display);

        channel.publish(
            &Topic::facility_control("fac-1"),
            Envelope::snapshot_requested(SessionId::from(crate::protocol::NO_SESSION)),
        );
        assert_eq!(
            registry.drain_inbound(),
            vec![InboundOutcome::Applied(SessionMode::EnterPassword)]
        );
        assert_eq!(drain_types(&mut display), vec!["intake_started", "request_password"]);
    }

    #[test]
    fn test_snapshot_without_session() {
        let (_, mut registry, mut display) = setup();
        assert_eq!(
            registry.on_inbound_event(Envelope::snapshot_requested(SessionId::from("none"))),
            InboundOutcome::Ignored(IgnoreReason::NoSession)
        );
        assert!(display.try_recv().is_none());
    }

    #[test]
    fn test_downstream_event_on_upstream_is_unexpected() {
        let (_, mut registry, _display) = setup();
        let id = registry.start_session(customer(), device(), pricing()).unwrap();
        assert_eq!(
            registry.on_inbound_event(Envelope::request_password(id)),
            InboundOutcome::Ignored(IgnoreReason::UnexpectedEvent)
        );
    }

    #[tokio::test]
    async fn test_next_inbound_waits_for_upstream() {
        let (channel, mut registry, _display) = setup();
        let id = registry.start_session(customer(), device(), pricing()).unwrap();

        let publisher = channel.clone();
        let sid = id.clone();
        tokio::spawn(async move {
            publisher.publish(&Topic::session(&sid), Envelope::customer_confirmed_data(sid.clone()));
        });

        assert_eq!(
            registry.next_inbound().await,
            Some(InboundOutcome::Applied(SessionMode::ConfirmData))
        );
    }
}
