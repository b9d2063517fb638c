//! # Display Session Client
//!
//! Customer-facing side of the intake flow. Holds a mirror of the
//! coordinator's session, rebuilt purely from inbound events, and publishes
//! the customer's actions back.
//!
//! ## Channel Asymmetry
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Coordinator A ─┐                                                      │
//! │                  ├──► intake/<facility>/display ──► Display (listens)   │
//! │   Coordinator B ─┘         one-to-many                  │               │
//! │                                                          │               │
//! │   Coordinator A ◄── intake/session/<A> ◄─────────────────┤               │
//! │   Coordinator B ◄── intake/session/<B> ◄─────────────────┘               │
//! │                       addressed per session                             │
//! │                                                                         │
//! │  Answers go to the topic of the session they belong to, so terminals   │
//! │  sharing a facility never see each other's customer input.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Repeated `intake_started`
//! Snapshots are broadcast to every display of the facility, so a display
//! sees `intake_started` again whenever another one reconnects. For the
//! session already mirrored it only refreshes customer, device and pricing;
//! mode, confirmation and the reset deadline stay where they are. A
//! different session id replaces the mirror outright.
//!
//! ## Completed Grace Period
//! After `intake_completed` the display stays on the completed view for a
//! grace period (10 s by default) and then falls back to standby by itself.
//! The deadline is checked by [`DisplaySessionClient::tick`]; the async
//! [`DisplaySessionClient::run`] loop drives both inbound events and the
//! deadline.

use std::time::Duration;

use chrono::Utc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use ripara_core::{IntakeSession, SessionId, SessionMode};

use crate::channel::{MessageChannel, Subscription, Topic};
use crate::config::IntakeConfig;
use crate::error::{SyncError, SyncResult};
use crate::protocol::{Envelope, IntakeEvent, NO_SESSION};

/// Default time the completed view stays up.
pub const DEFAULT_COMPLETED_GRACE: Duration = Duration::from_secs(10);

/// The display's copy of the current session.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplaySession {
    pub intake: IntakeSession,
    /// Set once the session completed.
    pub reset_at: Option<Instant>,
}

/// Display-side state machine for one facility.
pub struct DisplaySessionClient<C: MessageChannel> {
    channel: C,
    facility_id: String,
    inbound: Subscription,
    mirror: Option<DisplaySession>,
    grace: Duration,
}

impl<C: MessageChannel> DisplaySessionClient<C> {
    /// Subscribes to the facility display topic.
    pub fn new(channel: C, facility_id: impl Into<String>, grace: Duration) -> Self {
        let facility_id = facility_id.into();
        let inbound = channel.subscribe(&Topic::facility_display(&facility_id));

        DisplaySessionClient {
            channel,
            facility_id,
            inbound,
            mirror: None,
            grace,
        }
    }

    pub fn from_config(channel: C, config: &IntakeConfig) -> Self {
        Self::new(channel, config.facility.id.clone(), config.display.completed_grace())
    }

    pub fn session(&self) -> Option<&IntakeSession> {
        self.mirror.as_ref().map(|m| &m.intake)
    }

    /// Standby when nothing is mirrored.
    pub fn mode(&self) -> SessionMode {
        self.session().map(|s| s.mode).unwrap_or_default()
    }

    pub fn reset_deadline(&self) -> Option<Instant> {
        self.mirror.as_ref().and_then(|m| m.reset_at)
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    /// Applies one event from the coordinator. Returns true if the mirror changed.
    pub fn on_event(&mut self, envelope: Envelope, now: Instant) -> bool {
        let Envelope { session_id, event } = envelope;

        if let IntakeEvent::IntakeStarted(payload) = event {
            let intake = payload.into_session(session_id.clone(), self.facility_id.clone(), Utc::now());

            match self.mirror.as_mut() {
                Some(mirror) if mirror.intake.is_session(&session_id) => {
                    return Self::refresh(mirror, intake);
                }
                Some(previous) => {
                    debug!(
                        previous = %previous.intake.session_id,
                        session_id = %session_id,
                        "Replacing mirrored session"
                    );
                }
                None => {}
            }

            self.mirror = Some(DisplaySession {
                intake,
                reset_at: None,
            });
            info!(facility_id = %self.facility_id, session_id = %session_id, "Intake shown on display");
            return true;
        }

        let event_type = event.type_name();
        let grace = self.grace;
        let Some(mirror) = self.mirror.as_mut() else {
            debug!(session_id = %session_id, event = event_type, "Ignoring event, display in standby");
            return false;
        };
        if !mirror.intake.is_session(&session_id) {
            debug!(
                session_id = %session_id,
                current = %mirror.intake.session_id,
                event = event_type,
                "Ignoring event for another session"
            );
            return false;
        }

        match event {
            IntakeEvent::IntakeUpdate(update) => {
                if mirror.intake.mode == SessionMode::Completed {
                    return false;
                }
                update.apply_to(&mut mirror.intake);
                true
            }
            IntakeEvent::RequestPassword {} => Self::advance(mirror, SessionMode::EnterPassword),
            IntakeEvent::RequestSignature {} => Self::advance(mirror, SessionMode::Signature),
            IntakeEvent::IntakeCompleted {} => {
                if mirror.reset_at.is_some() {
                    return false;
                }
                // Coordinator is authoritative, even if request_signature was missed
                mirror.intake.mode = SessionMode::Completed;
                mirror.reset_at = Some(now + grace);
                info!(session_id = %session_id, grace_secs = grace.as_secs(), "Intake completed on display");
                true
            }
            IntakeEvent::IntakeCancelled {} => {
                self.mirror = None;
                info!(session_id = %session_id, "Intake cancelled, display back to standby");
                true
            }
            other => {
                debug!(event = other.type_name(), "Ignoring non-display event");
                false
            }
        }
    }

    /// Re-delivered `intake_started` for the mirrored session.
    fn refresh(mirror: &mut DisplaySession, snapshot: IntakeSession) -> bool {
        if mirror.intake.mode == SessionMode::Completed {
            return false;
        }

        let current = &mut mirror.intake;
        let changed = current.customer != snapshot.customer
            || current.device != snapshot.device
            || current.pricing != snapshot.pricing;
        if changed {
            current.customer = snapshot.customer;
            current.device = snapshot.device;
            current.pricing = snapshot.pricing;
            debug!(session_id = %current.session_id, "Mirrored session refreshed from snapshot");
        }
        changed
    }

    fn advance(mirror: &mut DisplaySession, next: SessionMode) -> bool {
        match mirror.intake.advance(next) {
            Ok(changed) => changed,
            Err(e) => {
                debug!(session_id = %mirror.intake.session_id, error = %e, "Ignoring mode change");
                false
            }
        }
    }

    /// Applies every event already delivered. Returns how many changed the mirror.
    pub fn pump(&mut self, now: Instant) -> usize {
        let mut changed = 0;
        while let Some(envelope) = self.inbound.try_recv() {
            if self.on_event(envelope, now) {
                changed += 1;
            }
        }
        changed
    }

    /// Resets to standby once the completed grace period is over.
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.reset_deadline() {
            Some(deadline) if now >= deadline => {
                if let Some(mirror) = self.mirror.take() {
                    info!(session_id = %mirror.intake.session_id, "Grace period over, display back to standby");
                }
                true
            }
            _ => false,
        }
    }

    /// Drives inbound events and the grace deadline until the topic closes.
    pub async fn run(&mut self) {
        loop {
            let deadline = self.reset_deadline();
            tokio::select! {
                envelope = self.inbound.recv() => match envelope {
                    Some(envelope) => {
                        self.on_event(envelope, Instant::now());
                    }
                    None => break,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.tick(Instant::now());
                }
            }
        }
    }

    // =========================================================================
    // Customer Actions
    // =========================================================================

    /// Customer confirmed the data shown.
    pub fn confirm_data(&mut self) -> SyncResult<()> {
        let mirror = self.active_in(SessionMode::ConfirmData, SessionMode::ConfirmData)?;
        mirror.intake.data_confirmed = true;
        let envelope = Envelope::customer_confirmed_data(mirror.intake.session_id.clone());
        self.send(envelope);
        Ok(())
    }

    /// Customer typed the device unlock code.
    pub fn submit_password(&mut self, password: impl Into<String>) -> SyncResult<()> {
        let mirror = self.active_in(SessionMode::EnterPassword, SessionMode::Signature)?;
        mirror.intake.advance(SessionMode::Signature)?;
        let envelope = Envelope::password_submitted(mirror.intake.session_id.clone(), password);
        self.send(envelope);
        Ok(())
    }

    /// Customer chose not to share the unlock code.
    pub fn skip_password(&mut self) -> SyncResult<()> {
        let mirror = self.active_in(SessionMode::EnterPassword, SessionMode::Signature)?;
        mirror.intake.advance(SessionMode::Signature)?;
        let envelope = Envelope::password_skipped(mirror.intake.session_id.clone());
        self.send(envelope);
        Ok(())
    }

    /// Customer signed. The view stays on the signature step until the
    /// coordinator confirms completion.
    pub fn submit_signature(&mut self, signature_data: impl Into<String>) -> SyncResult<()> {
        let mirror = self.active_in(SessionMode::Signature, SessionMode::Completed)?;
        let envelope = Envelope::signature_submitted(mirror.intake.session_id.clone(), signature_data);
        self.send(envelope);
        Ok(())
    }

    /// Asks the coordinator to re-publish its current state.
    ///
    /// Called on connect so a display that missed `intake_started` catches up.
    pub fn request_snapshot(&self) {
        let session_id = self
            .session()
            .map(|s| s.session_id.clone())
            .unwrap_or_else(|| SessionId::from(NO_SESSION));
        self.channel.publish(
            &Topic::facility_control(&self.facility_id),
            Envelope::snapshot_requested(session_id),
        );
    }

    fn active_in(&mut self, required: SessionMode, to: SessionMode) -> SyncResult<&mut DisplaySession> {
        let mirror = self.mirror.as_mut().ok_or(SyncError::NoActiveSession)?;
        if mirror.intake.mode != required {
            return Err(SyncError::InvalidTransition {
                from: mirror.intake.mode,
                to,
            });
        }
        Ok(mirror)
    }

    fn send(&self, envelope: Envelope) {
        let topic = Topic::session(&envelope.session_id);
        let event_type = envelope.type_name();
        let receivers = self.channel.publish(&topic, envelope);
        debug!(topic = %topic, event = event_type, receivers, "Customer action sent");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::InMemoryChannel;
    use crate::registry::{InboundOutcome, SessionRegistry};
    use ripara_core::{Customer, DeviceInfo, IntakeUpdate, Money, Pricing};

    fn started(id: &str, name: &str) -> Envelope {
        let session = IntakeSession::open(
            SessionId::from(id),
            "fac-1",
            Customer {
                name: name.to_string(),
                phone: "333".to_string(),
                email: None,
                address: None,
            },
            DeviceInfo {
                brand: "Google".to_string(),
                model: "Pixel 7".to_string(),
                device_type: "smartphone".to_string(),
                reported_issue: "No charge".to_string(),
                imei: None,
                serial_number: None,
            },
            Pricing {
                estimated_cost: Money::from_cents(4000),
                diagnostic_fee: Money::from_cents(1000),
                amount_due_now: Money::from_cents(1000),
                remaining_balance: Money::from_cents(3000),
                labor_cost: None,
                quote_items: Vec::new(),
            },
            Utc::now(),
        );
        Envelope::intake_started(&session)
    }

    fn client() -> (InMemoryChannel, DisplaySessionClient<InMemoryChannel>) {
        let channel = InMemoryChannel::new();
        let client = DisplaySessionClient::new(channel.clone(), "fac-1", DEFAULT_COMPLETED_GRACE);
        (channel, client)
    }

    fn sid(s: &str) -> SessionId {
        SessionId::from(s)
    }

    #[test]
    fn test_intake_started_replaces_mirror() {
        let (_, mut client) = client();
        let now = Instant::now();

        assert!(client.on_event(started("a", "Anna"), now));
        assert!(client.on_event(Envelope::request_password(sid("a")), now));
        assert_eq!(client.mode(), SessionMode::EnterPassword);

        assert!(client.on_event(started("b", "Bruno"), now));
        let session = client.session().unwrap();
        assert_eq!(session.session_id, sid("b"));
        assert_eq!(session.customer.name, "Bruno");
        assert_eq!(session.mode, SessionMode::ConfirmData);

        // Late events for A do nothing
        assert!(!client.on_event(Envelope::request_signature(sid("a")), now));
        assert!(!client.on_event(Envelope::intake_cancelled(sid("a")), now));
        assert_eq!(client.mode(), SessionMode::ConfirmData);
    }

    #[test]
    fn test_repeated_intake_started_keeps_progress() {
        let (_, mut client) = client();
        let now = Instant::now();

        assert!(client.on_event(started("a", "Anna"), now));
        client.confirm_data().unwrap();
        assert!(client.on_event(Envelope::request_password(sid("a")), now));

        // Same snapshot again: nothing to change
        assert!(!client.on_event(started("a", "Anna"), now));
        assert_eq!(client.mode(), SessionMode::EnterPassword);
        assert!(client.session().unwrap().data_confirmed);

        // Newer customer data is merged without rewinding the mode
        assert!(client.on_event(started("a", "Anna Bianchi"), now));
        assert_eq!(client.session().unwrap().customer.name, "Anna Bianchi");
        assert_eq!(client.mode(), SessionMode::EnterPassword);
        assert!(client.submit_password("1234").is_ok());
    }

    #[test]
    fn test_repeated_intake_started_after_completion_keeps_deadline() {
        let (_, mut client) = client();
        let now = Instant::now();
        client.on_event(started("a", "Anna"), now);
        client.on_event(Envelope::request_signature(sid("a")), now);
        client.on_event(Envelope::intake_completed(sid("a")), now);
        let deadline = client.reset_deadline();

        assert!(!client.on_event(started("a", "Anna Bianchi"), now));
        assert_eq!(client.mode(), SessionMode::Completed);
        assert_eq!(client.reset_deadline(), deadline);
        assert_eq!(client.session().unwrap().customer.name, "Anna");
    }

    #[test]
    fn test_update_merges_only_into_matching_session() {
        let (_, mut client) = client();
        let now = Instant::now();
        client.on_event(started("a", "Anna"), now);

        let update = IntakeUpdate {
            amount_due_now: Some(Money::from_cents(2500)),
            ..Default::default()
        };
        assert!(!client.on_event(Envelope::intake_update(sid("x"), update.clone()), now));
        assert!(client.on_event(Envelope::intake_update(sid("a"), update), now));

        let pricing = &client.session().unwrap().pricing;
        assert_eq!(pricing.amount_due_now.cents(), 2500);
        assert_eq!(pricing.estimated_cost.cents(), 4000);
    }

    #[test]
    fn test_duplicate_events_are_idempotent() {
        let (_, mut client) = client();
        let now = Instant::now();
        client.on_event(started("a", "Anna"), now);

        assert!(client.on_event(Envelope::request_signature(sid("a")), now));
        assert!(!client.on_event(Envelope::request_signature(sid("a")), now));
        // Reordered password request after signature is ignored
        assert!(!client.on_event(Envelope::request_password(sid("a")), now));
        assert_eq!(client.mode(), SessionMode::Signature);

        assert!(client.on_event(Envelope::intake_completed(sid("a")), now));
        let deadline = client.reset_deadline();
        assert!(!client.on_event(Envelope::intake_completed(sid("a")), now + Duration::from_secs(5)));
        assert_eq!(client.reset_deadline(), deadline);
    }

    #[test]
    fn test_actions_require_matching_mode() {
        let (_, mut client) = client();
        assert!(matches!(client.confirm_data(), Err(SyncError::NoActiveSession)));

        client.on_event(started("a", "Anna"), Instant::now());
        assert!(matches!(
            client.submit_signature("sig"),
            Err(SyncError::InvalidTransition {
                from: SessionMode::ConfirmData,
                ..
            })
        ));
        assert!(matches!(client.skip_password(), Err(SyncError::InvalidTransition { .. })));
        assert!(client.confirm_data().is_ok());
        assert!(client.session().unwrap().data_confirmed);
    }

    #[test]
    fn test_actions_publish_on_session_topic() {
        let (channel, mut client) = client();
        let mut upstream = channel.subscribe(&Topic::session(&sid("a")));
        let mut broadcast = channel.subscribe(&Topic::facility_display("fac-1"));

        client.on_event(started("a", "Anna"), Instant::now());
        client.on_event(Envelope::request_password(sid("a")), Instant::now());
        client.submit_password("2468").unwrap();
        assert_eq!(client.mode(), SessionMode::Signature);

        let env = upstream.try_recv().unwrap();
        assert_eq!(env.type_name(), "password_submitted");
        assert_eq!(env.session_id, sid("a"));
        assert!(broadcast.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_period_resets_to_standby() {
        let (_, mut client) = client();
        client.on_event(started("a", "Anna"), Instant::now());
        client.on_event(Envelope::request_signature(sid("a")), Instant::now());
        client.on_event(Envelope::intake_completed(sid("a")), Instant::now());
        assert_eq!(client.mode(), SessionMode::Completed);

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(!client.tick(Instant::now()));
        assert_eq!(client.mode(), SessionMode::Completed);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(client.tick(Instant::now()));
        assert_eq!(client.mode(), SessionMode::Standby);
        assert!(client.session().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_drives_grace_deadline() {
        let (channel, mut client) = client();
        let topic = Topic::facility_display("fac-1");
        channel.publish(&topic, started("a", "Anna"));
        channel.publish(&topic, Envelope::intake_completed(sid("a")));

        let started_at = Instant::now();
        let handle = tokio::spawn(async move {
            let _ = tokio::time::timeout(Duration::from_secs(30), client.run()).await;
            client
        });
        let client = handle.await.unwrap();

        assert_eq!(client.mode(), SessionMode::Standby);
        assert!(Instant::now() >= started_at + Duration::from_secs(30));
    }

    #[test]
    fn test_cancel_during_password_then_late_signature_ignored() {
        let channel = InMemoryChannel::new();
        let mut registry = SessionRegistry::new(channel.clone(), "fac-1");
        let mut client = DisplaySessionClient::new(channel.clone(), "fac-1", DEFAULT_COMPLETED_GRACE);
        let now = Instant::now();

        let started = match started("seed", "Carla").event {
            IntakeEvent::IntakeStarted(p) => p,
            _ => unreachable!(),
        };
        let id = registry
            .start_session(started.customer, started.device, Pricing::default())
            .unwrap();
        registry.request_password(&id).unwrap();
        client.pump(now);
        assert_eq!(client.mode(), SessionMode::EnterPassword);

        registry.cancel();
        client.pump(now);
        assert_eq!(client.mode(), SessionMode::Standby);

        // A signature for the cancelled session reaches the coordinator anyway
        channel.publish(&Topic::session(&id), Envelope::signature_submitted(id.clone(), "late"));
        assert!(registry.drain_inbound().iter().all(InboundOutcome::is_ignored));
        assert_eq!(registry.mode(), SessionMode::Standby);
    }

    #[test]
    fn test_snapshot_on_reconnect() {
        let channel = InMemoryChannel::new();
        let mut registry = SessionRegistry::new(channel.clone(), "fac-1");

        let started = match started("seed", "Dario").event {
            IntakeEvent::IntakeStarted(p) => p,
            _ => unreachable!(),
        };
        let id = registry
            .start_session(started.customer, started.device, Pricing::default())
            .unwrap();
        registry.request_signature(&id).unwrap();

        // Display connects after the session began and missed everything
        let mut client = DisplaySessionClient::new(channel.clone(), "fac-1", DEFAULT_COMPLETED_GRACE);
        assert_eq!(client.pump(Instant::now()), 0);

        client.request_snapshot();
        registry.drain_inbound();
        client.pump(Instant::now());

        assert_eq!(client.session().unwrap().session_id, id);
        assert_eq!(client.mode(), SessionMode::Signature);

        client.submit_signature("sig").unwrap();
        let outcomes = registry.drain_inbound();
        assert!(matches!(outcomes.as_slice(), [InboundOutcome::Completed(_)]));

        client.pump(Instant::now());
        assert_eq!(client.mode(), SessionMode::Completed);
    }

    fn start_at_registry(registry: &mut SessionRegistry<InMemoryChannel>, name: &str) -> SessionId {
        let started = match started("seed", name).event {
            IntakeEvent::IntakeStarted(p) => p,
            _ => unreachable!(),
        };
        registry
            .start_session(started.customer, started.device, Pricing::default())
            .unwrap()
    }

    #[test]
    fn test_second_display_snapshot_does_not_reset_first() {
        let channel = InMemoryChannel::new();
        let mut registry = SessionRegistry::new(channel.clone(), "fac-1");
        let mut counter = DisplaySessionClient::new(channel.clone(), "fac-1", DEFAULT_COMPLETED_GRACE);
        let now = Instant::now();

        let id = start_at_registry(&mut registry, "Elena");
        counter.pump(now);
        counter.confirm_data().unwrap();
        registry.drain_inbound();
        registry.request_password(&id).unwrap();
        counter.pump(now);
        assert_eq!(counter.mode(), SessionMode::EnterPassword);

        // A second display joins mid-session and asks for a snapshot
        let mut tablet = DisplaySessionClient::new(channel.clone(), "fac-1", DEFAULT_COMPLETED_GRACE);
        tablet.request_snapshot();
        registry.drain_inbound();
        tablet.pump(now);
        counter.pump(now);

        assert_eq!(tablet.session().unwrap().session_id, id);
        assert_eq!(tablet.mode(), SessionMode::EnterPassword);
        assert_eq!(counter.mode(), SessionMode::EnterPassword);
        assert!(counter.session().unwrap().data_confirmed);

        counter.skip_password().unwrap();
        assert_eq!(
            registry.drain_inbound(),
            vec![InboundOutcome::Applied(SessionMode::Signature)]
        );
        tablet.pump(now);
        counter.pump(now);
        assert_eq!(tablet.mode(), SessionMode::Signature);
        assert_eq!(counter.mode(), SessionMode::Signature);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_after_completion_leaves_displays_in_standby() {
        let channel = InMemoryChannel::new();
        let mut registry = SessionRegistry::new(channel.clone(), "fac-1");
        let mut counter = DisplaySessionClient::new(channel.clone(), "fac-1", DEFAULT_COMPLETED_GRACE);

        let id = start_at_registry(&mut registry, "Dario");
        registry.request_signature(&id).unwrap();
        counter.pump(Instant::now());
        counter.submit_signature("sig").unwrap();
        assert!(matches!(
            registry.drain_inbound().as_slice(),
            [InboundOutcome::Completed(_)]
        ));
        counter.pump(Instant::now());
        assert_eq!(counter.mode(), SessionMode::Completed);

        tokio::time::advance(DEFAULT_COMPLETED_GRACE).await;
        assert!(counter.tick(Instant::now()));

        // A display powering on now must not bring the previous customer back
        let mut tablet = DisplaySessionClient::new(channel.clone(), "fac-1", DEFAULT_COMPLETED_GRACE);
        tablet.request_snapshot();
        registry.drain_inbound();
        assert_eq!(tablet.pump(Instant::now()), 0);
        assert_eq!(counter.pump(Instant::now()), 0);

        assert!(tablet.session().is_none());
        assert!(counter.session().is_none());
        assert_eq!(tablet.mode(), SessionMode::Standby);
        assert_eq!(counter.mode(), SessionMode::Standby);
    }
}
