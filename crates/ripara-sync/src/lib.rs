//! # ripara-sync: Intake Session Protocol
//!
//! Keeps a staff terminal, the customer display and optional remote signing
//! devices in step during an in-person device intake.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Intake Session Flow                              │
//! │                                                                         │
//! │  ┌──────────────────────┐                   ┌────────────────────────┐ │
//! │  │  SessionRegistry     │   intake_started   │ DisplaySessionClient   │ │
//! │  │  (staff terminal)    │ ─────────────────► │ (customer display)     │ │
//! │  │                      │   request_*        │                        │ │
//! │  │  authoritative       │   intake_*         │ mirror rebuilt from    │ │
//! │  │  IntakeSession       │                    │ events only            │ │
//! │  │                      │ ◄───────────────── │                        │ │
//! │  │                      │   confirmed /      │                        │ │
//! │  │                      │   password /       │                        │ │
//! │  │                      │   signature        │                        │ │
//! │  └──────────┬───────────┘                    └────────────────────────┘ │
//! │             │                                                           │
//! │             │ mint                            ┌────────────────────────┐ │
//! │             ▼                                 │ RemoteSigner           │ │
//! │  ┌──────────────────────┐ signature_completed │ (any phone / tablet)   │ │
//! │  │  RemoteSignerLink    │ ◄────────────────── │                        │ │
//! │  └──────────────────────┘                     └────────────────────────┘ │
//! │                                                                         │
//! │  All traffic goes through a MessageChannel: named topics, best-effort, │
//! │  no replay. Every receiver re-checks the session id before acting.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`protocol`] - Envelope and the closed set of intake events
//! - [`channel`] - Topics, the `MessageChannel` trait and the in-memory broadcast channel
//! - [`registry`] - Coordinator state machine
//! - [`display`] - Customer display state machine and grace-period driver
//! - [`remote_signer`] - Share links for signing on another device
//! - [`config`] - Intake configuration (TOML + environment)
//! - [`error`] - Sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ripara_sync::{DisplaySessionClient, InMemoryChannel, IntakeConfig, SessionRegistry};
//!
//! let config = IntakeConfig::load_or_default(None);
//! let channel = InMemoryChannel::with_capacity(config.channel.capacity);
//!
//! let mut registry = SessionRegistry::new(channel.clone(), config.facility_id());
//! let mut display = DisplaySessionClient::from_config(channel.clone(), &config);
//! display.request_snapshot();
//!
//! let id = registry.start_session(customer, device, pricing)?;
//! registry.request_password(&id)?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod channel;
pub mod config;
pub mod display;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod remote_signer;

// =============================================================================
// Re-exports
// =============================================================================

pub use channel::{InMemoryChannel, MessageChannel, Subscription, Topic};
pub use config::{ChannelSettings, DisplaySettings, FacilityConfig, IntakeConfig, RemoteSignerSettings};
pub use display::{DisplaySession, DisplaySessionClient, DEFAULT_COMPLETED_GRACE};
pub use error::{SyncError, SyncResult};
pub use protocol::{Direction, Envelope, IntakeEvent, IntakeStartedPayload};
pub use registry::{CompletedIntake, IgnoreReason, InboundOutcome, SessionRegistry};
pub use remote_signer::{PendingRemoteSignature, RemoteSigner, RemoteSignerLink, SignerStatus};
