//! # Message Channel
//!
//! Named pub/sub topics carrying [`Envelope`]s between the coordinator, the
//! customer display and remote signers.
//!
//! ## Topic Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  intake/<facility>/display     coordinator ──► every display            │
//! │  intake/<facility>/control     display ──► coordinator (snapshots)      │
//! │  intake/session/<session_id>   display ──► coordinator (one session)    │
//! │  signer/<session_id>           remote signer ──► controller             │
//! │                                                                         │
//! │  Delivery is best-effort: no acknowledgement, no replay, no ordering   │
//! │  across topics. A subscriber that falls behind drops the oldest        │
//! │  messages and keeps going.                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`InMemoryChannel`] backs each topic with a `tokio::sync::broadcast`
//! sender created by the first subscriber and removed once the last
//! subscriber is gone. Anything implementing [`MessageChannel`]
//! (a websocket relay, a hosted realtime service) can replace it.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::broadcast;
use tracing::{debug, warn};

use ripara_core::SessionId;

use crate::protocol::Envelope;

/// Default per-topic buffer.
pub const DEFAULT_CAPACITY: usize = 64;

type TopicMap = Mutex<HashMap<Topic, broadcast::Sender<Envelope>>>;

// =============================================================================
// Topic
// =============================================================================

/// Name of a pub/sub topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic(String);

impl Topic {
    /// Coordinator → display broadcast for a facility.
    pub fn facility_display(facility_id: &str) -> Self {
        Topic(format!("intake/{}/display", facility_id))
    }

    /// Display → coordinator control messages for a facility.
    pub fn facility_control(facility_id: &str) -> Self {
        Topic(format!("intake/{}/control", facility_id))
    }

    /// Display → coordinator responses for one session.
    pub fn session(session_id: &SessionId) -> Self {
        Topic(format!("intake/session/{}", session_id))
    }

    /// Remote signer → controller.
    pub fn signer(session_id: &SessionId) -> Self {
        Topic(format!("signer/{}", session_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Channel Trait
// =============================================================================

/// Best-effort publish/subscribe transport.
pub trait MessageChannel: Send + Sync {
    /// Publishes to every current subscriber of `topic`.
    ///
    /// Returns how many subscribers received it. Zero is not an error.
    fn publish(&self, topic: &Topic, envelope: Envelope) -> usize;

    /// Subscribes to `topic`. Only messages published afterwards are seen.
    fn subscribe(&self, topic: &Topic) -> Subscription;
}

/// Receiving end of a topic subscription.
pub struct Subscription {
    topic: Topic,
    receiver: broadcast::Receiver<Envelope>,
    /// Topic table to prune when this is the last subscriber.
    owner: Option<Weak<TopicMap>>,
}

impl Subscription {
    pub fn new(topic: Topic, receiver: broadcast::Receiver<Envelope>) -> Self {
        Subscription {
            topic,
            receiver,
            owner: None,
        }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Waits for the next message.
    ///
    /// Returns `None` once the topic is gone. Lagging skips the lost
    /// messages.
    pub async fn recv(&mut self) -> Option<Envelope> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) => return Some(envelope),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = %self.topic, skipped = n, "Subscriber lagged, messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next already-delivered message, without waiting.
    pub fn try_recv(&mut self) -> Option<Envelope> {
        loop {
            match self.receiver.try_recv() {
                Ok(envelope) => return Some(envelope),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(topic = %self.topic, skipped = n, "Subscriber lagged, messages dropped");
                }
                Err(_) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(topics) = self.owner.take().and_then(|owner| owner.upgrade()) else {
            return;
        };
        let mut topics = topics.lock().unwrap_or_else(|e| e.into_inner());

        // Our own receiver is still alive here, so 1 means "only us".
        let last = topics
            .get(&self.topic)
            .is_some_and(|sender| sender.receiver_count() <= 1);
        if last {
            topics.remove(&self.topic);
            debug!(topic = %self.topic, "Last subscriber left, topic removed");
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .finish()
    }
}

// =============================================================================
// In-Memory Channel
// =============================================================================

/// Process-local channel. Clones share the same topics.
///
/// Only topics with at least one live subscriber are kept.
#[derive(Clone)]
pub struct InMemoryChannel {
    capacity: usize,
    topics: Arc<TopicMap>,
}

impl InMemoryChannel {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        InMemoryChannel {
            capacity: capacity.max(1),
            topics: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of topics that currently have subscribers.
    pub fn topic_count(&self) -> usize {
        self.topics.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for InMemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageChannel for InMemoryChannel {
    fn publish(&self, topic: &Topic, envelope: Envelope) -> usize {
        let event_type = envelope.type_name();
        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());

        let sent = topics.get(topic).map(|sender| sender.send(envelope));
        match sent {
            Some(Ok(n)) => {
                debug!(topic = %topic, event = event_type, receivers = n, "Published");
                n
            }
            Some(Err(_)) => {
                topics.remove(topic);
                debug!(topic = %topic, event = event_type, "Published with no subscribers");
                0
            }
            None => {
                debug!(topic = %topic, event = event_type, "Published with no subscribers");
                0
            }
        }
    }

    fn subscribe(&self, topic: &Topic) -> Subscription {
        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        let receiver = topics
            .entry(topic.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        Subscription {
            topic: topic.clone(),
            receiver,
            owner: Some(Arc::downgrade(&self.topics)),
        }
    }
}

impl<C: MessageChannel + ?Sized> MessageChannel for Arc<C> {
    fn publish(&self, topic: &Topic, envelope: Envelope) -> usize {
        (**self).publish(topic, envelope)
    }

    fn subscribe(&self, topic: &Topic) -> Subscription {
        (**self).subscribe(topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid() -> SessionId {
        SessionId::from("s-1")
    }

    #[test]
    fn test_topic_names() {
        assert_eq!(Topic::facility_display("fac-1").as_str(), "intake/fac-1/display");
        assert_eq!(Topic::facility_control("fac-1").as_str(), "intake/fac-1/control");
        assert_eq!(Topic::session(&sid()).as_str(), "intake/session/s-1");
        assert_eq!(Topic::signer(&sid()).as_str(), "signer/s-1");
    }

    #[test]
    fn test_publish_without_subscribers_is_dropped() {
        let channel = InMemoryChannel::new();
        let topic = Topic::facility_display("fac-1");
        assert_eq!(channel.publish(&topic, Envelope::request_password(sid())), 0);

        // Late subscriber sees nothing
        let mut sub = channel.subscribe(&topic);
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_publish_does_not_create_topics() {
        let channel = InMemoryChannel::new();
        channel.publish(&Topic::signer(&sid()), Envelope::signature_completed(sid(), "x"));
        assert_eq!(channel.topic_count(), 0);
    }

    #[test]
    fn test_finished_sessions_do_not_accumulate_topics() {
        let channel = InMemoryChannel::new();
        let display = channel.subscribe(&Topic::facility_display("fac-1"));

        for i in 0..1000 {
            let id = SessionId::from(format!("s-{}", i));
            let mut sub = channel.subscribe(&Topic::session(&id));
            channel.publish(&Topic::session(&id), Envelope::password_skipped(id.clone()));
            assert!(sub.try_recv().is_some());
        }

        assert_eq!(channel.topic_count(), 1);
        drop(display);
        assert_eq!(channel.topic_count(), 0);
    }

    #[test]
    fn test_topic_kept_while_any_subscriber_remains() {
        let channel = InMemoryChannel::new();
        let topic = Topic::facility_display("fac-1");
        let first = channel.subscribe(&topic);
        let mut second = channel.subscribe(&topic);

        drop(first);
        assert_eq!(channel.topic_count(), 1);
        assert_eq!(channel.publish(&topic, Envelope::intake_cancelled(sid())), 1);
        assert!(second.try_recv().is_some());
    }

    #[tokio::test]
    async fn test_fan_out_to_all_subscribers() {
        let channel = InMemoryChannel::new();
        let topic = Topic::facility_display("fac-1");
        let mut a = channel.subscribe(&topic);
        let mut b = channel.subscribe(&topic);

        assert_eq!(channel.publish(&topic, Envelope::request_signature(sid())), 2);

        assert_eq!(a.recv().await.unwrap().type_name(), "request_signature");
        assert_eq!(b.recv().await.unwrap().type_name(), "request_signature");
    }

    #[test]
    fn test_topics_are_isolated() {
        let channel = InMemoryChannel::new();
        let mut display = channel.subscribe(&Topic::facility_display("fac-1"));
        let mut other = channel.subscribe(&Topic::facility_display("fac-2"));

        channel.publish(&Topic::facility_display("fac-1"), Envelope::intake_cancelled(sid()));

        assert!(display.try_recv().is_some());
        assert!(other.try_recv().is_none());
    }

    #[test]
    fn test_lagging_subscriber_keeps_newest() {
        let channel = InMemoryChannel::with_capacity(2);
        let topic = Topic::session(&sid());
        let mut sub = channel.subscribe(&topic);

        channel.publish(&topic, Envelope::password_skipped(sid()));
        channel.publish(&topic, Envelope::customer_confirmed_data(sid()));
        channel.publish(&topic, Envelope::signature_submitted(sid(), "sig"));

        assert_eq!(sub.try_recv().unwrap().type_name(), "customer_confirmed_data");
        assert_eq!(sub.try_recv().unwrap().type_name(), "signature_submitted");
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_clones_share_topics() {
        let channel = InMemoryChannel::new();
        let clone = channel.clone();
        let mut sub = channel.subscribe(&Topic::signer(&sid()));

        assert_eq!(clone.publish(&Topic::signer(&sid()), Envelope::signature_completed(sid(), "x")), 1);
        assert!(sub.try_recv().is_some());
    }
}
