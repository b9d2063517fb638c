//! # Remote Signer Link
//!
//! Hands signature capture to any other device (a customer's phone, a
//! tablet) through a share link.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Controller                               Remote device                 │
//! │  ──────────                               ─────────────                 │
//! │  RemoteSignerLink::mint                                                 │
//! │    ├── fresh SessionId (unrelated to the intake session)                │
//! │    ├── subscribe signer/<id>                                            │
//! │    └── share_url ─────── link / QR code ──► RemoteSigner::from_share_url│
//! │                                               shows amount and total    │
//! │  poll() ◄──── signer/<id> ◄── signature_completed ── submit()           │
//! │    └── artifact returned once, subscription dropped                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Share URL: `<base_url>?session=<id>&amount=<cents>&total=<cents>&expires=<unix>`.
//! Links expire after the configured TTL and can be cancelled.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::{debug, info};
use url::Url;

use ripara_core::{Money, SessionId};

use crate::channel::{MessageChannel, Subscription, Topic};
use crate::config::RemoteSignerSettings;
use crate::error::{SyncError, SyncResult};
use crate::protocol::{Envelope, IntakeEvent};

/// Upper bound on a link's lifetime, whatever the configuration says.
pub const MAX_TTL_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerStatus {
    Pending,
    Completed,
    Expired,
    Cancelled,
}

/// Controller-side record of a link waiting for its signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRemoteSignature {
    pub session_id: SessionId,
    /// Amount the customer is asked to pay now.
    pub amount: Money,
    pub total: Money,
    pub status: SignerStatus,
    pub expires_at: DateTime<Utc>,
}

// =============================================================================
// Controller Side
// =============================================================================

/// A minted share link and the subscription waiting for its signature.
pub struct RemoteSignerLink<C: MessageChannel> {
    channel: C,
    pending: PendingRemoteSignature,
    share_url: Url,
    subscription: Option<Subscription>,
}

impl<C: MessageChannel> RemoteSignerLink<C> {
    /// Mints a link valid from now for the configured TTL.
    pub fn mint(channel: C, amount: Money, total: Money, settings: &RemoteSignerSettings) -> SyncResult<Self> {
        Self::mint_at(channel, amount, total, settings, Utc::now())
    }

    pub fn mint_at(
        channel: C,
        amount: Money,
        total: Money,
        settings: &RemoteSignerSettings,
        now: DateTime<Utc>,
    ) -> SyncResult<Self> {
        let session_id = SessionId::generate();
        let ttl_secs = settings.token_ttl_secs.min(MAX_TTL_SECS) as i64;
        let expires_at = now + ChronoDuration::seconds(ttl_secs);

        let mut share_url = settings.base_url()?;
        share_url
            .query_pairs_mut()
            .append_pair("session", session_id.as_str())
            .append_pair("amount", &amount.cents().to_string())
            .append_pair("total", &total.cents().to_string())
            .append_pair("expires", &expires_at.timestamp().to_string());

        let subscription = channel.subscribe(&Topic::signer(&session_id));

        info!(
            session_id = %session_id,
            amount = %amount,
            expires_at = %expires_at,
            "Remote signer link minted"
        );

        Ok(RemoteSignerLink {
            channel,
            pending: PendingRemoteSignature {
                session_id,
                amount,
                total,
                status: SignerStatus::Pending,
                expires_at,
            },
            share_url,
            subscription: Some(subscription),
        })
    }

    pub fn session_id(&self) -> &SessionId {
        &self.pending.session_id
    }

    pub fn share_url(&self) -> &Url {
        &self.share_url
    }

    pub fn pending(&self) -> &PendingRemoteSignature {
        &self.pending
    }

    pub fn status(&self) -> SignerStatus {
        self.pending.status
    }

    /// Checks for the signature.
    ///
    /// Returns the artifact exactly once, on the call that observes it.
    /// Expires the link when `now` is past its lifetime.
    pub fn poll(&mut self, now: DateTime<Utc>) -> Option<String> {
        if self.pending.status != SignerStatus::Pending {
            return None;
        }
        if now >= self.pending.expires_at {
            self.finish(SignerStatus::Expired);
            return None;
        }

        while let Some(envelope) = self.subscription.as_mut()?.try_recv() {
            if let Some(signature) = self.accept(envelope) {
                return Some(signature);
            }
        }
        None
    }

    /// Waits for the signature until the link expires.
    pub async fn wait(&mut self) -> SyncResult<String> {
        loop {
            if let Some(signature) = self.poll(Utc::now()) {
                return Ok(signature);
            }
            if self.pending.status != SignerStatus::Pending {
                return Err(self.not_pending());
            }

            let remaining = (self.pending.expires_at - Utc::now())
                .to_std()
                .unwrap_or_default();
            let Some(subscription) = self.subscription.as_mut() else {
                return Err(self.not_pending());
            };

            match tokio::time::timeout(remaining, subscription.recv()).await {
                Ok(Some(envelope)) => {
                    if let Some(signature) = self.accept(envelope) {
                        return Ok(signature);
                    }
                }
                Ok(None) => {
                    self.finish(SignerStatus::Cancelled);
                    return Err(self.not_pending());
                }
                Err(_) => {
                    self.finish(SignerStatus::Expired);
                    return Err(self.not_pending());
                }
            }
        }
    }

    /// Withdraws the link. Later signatures are ignored.
    pub fn cancel(&mut self) -> SyncResult<()> {
        if self.pending.status != SignerStatus::Pending {
            return Err(self.not_pending());
        }
        self.finish(SignerStatus::Cancelled);
        Ok(())
    }

    fn accept(&mut self, envelope: Envelope) -> Option<String> {
        if envelope.session_id != self.pending.session_id {
            debug!(session_id = %envelope.session_id, "Ignoring signer event for another link");
            return None;
        }
        match envelope.event {
            IntakeEvent::SignatureCompleted(payload) => {
                self.finish(SignerStatus::Completed);
                Some(payload.signature_data)
            }
            other => {
                debug!(event = other.type_name(), "Ignoring non-signature event on signer topic");
                None
            }
        }
    }

    fn finish(&mut self, status: SignerStatus) {
        self.pending.status = status;
        self.subscription = None;
        info!(session_id = %self.pending.session_id, status = ?status, "Remote signer link closed");
    }

    fn not_pending(&self) -> SyncError {
        SyncError::SignerNotPending {
            session_id: self.pending.session_id.to_string(),
        }
    }

    /// The channel the link listens on.
    pub fn channel(&self) -> &C {
        &self.channel
    }
}

// =============================================================================
// Remote Device Side
// =============================================================================

/// What the remote device learns from a share link.
pub struct RemoteSigner<C: MessageChannel> {
    channel: C,
    session_id: SessionId,
    amount: Money,
    total: Money,
    expires_at: DateTime<Utc>,
    submitted: bool,
}

impl<C: MessageChannel> RemoteSigner<C> {
    /// Parses a share link.
    pub fn from_share_url(share_url: &str, channel: C) -> SyncResult<Self> {
        let url = Url::parse(share_url)?;

        let mut session = None;
        let mut amount = None;
        let mut total = None;
        let mut expires = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "session" => session = Some(value.into_owned()),
                "amount" => amount = value.parse::<i64>().ok(),
                "total" => total = value.parse::<i64>().ok(),
                "expires" => expires = value.parse::<i64>().ok(),
                _ => {}
            }
        }

        let missing = |field: &str| SyncError::InvalidUrl(format!("share link has no valid '{}'", field));
        let session = session.filter(|s| !s.is_empty()).ok_or_else(|| missing("session"))?;
        let amount = amount.ok_or_else(|| missing("amount"))?;
        let total = total.ok_or_else(|| missing("total"))?;
        let expires_at = expires
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .ok_or_else(|| missing("expires"))?;

        Ok(RemoteSigner {
            channel,
            session_id: SessionId::from(session),
            amount: Money::from_cents(amount),
            total: Money::from_cents(total),
            expires_at,
            submitted: false,
        })
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Publishes the single `signature_completed` event.
    pub fn submit(&mut self, signature_data: impl Into<String>) -> SyncResult<()> {
        if self.submitted || self.is_expired(Utc::now()) {
            return Err(SyncError::SignerNotPending {
                session_id: self.session_id.to_string(),
            });
        }

        let receivers = self.channel.publish(
            &Topic::signer(&self.session_id),
            Envelope::signature_completed(self.session_id.clone(), signature_data),
        );
        self.submitted = true;
        info!(session_id = %self.session_id, receivers, "Remote signature submitted");
        Ok(())
    }
}
