//! # Sync Error Types
//!
//! Error types for the intake session protocol.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Protocol     │  │     Session             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  InvalidMessage │  │  NoActiveSession        │ │
//! │  │  InvalidUrl     │  │  Serialization  │  │  InvalidTransition      │ │
//! │  │  ConfigLoad/Save│  │  Deserialization│  │  InvalidSession         │ │
//! │  └─────────────────┘  └─────────────────┘  │  SignerNotPending       │ │
//! │                                            └─────────────────────────┘ │
//! │                                                                         │
//! │  A session id mismatch on an inbound event is NOT an error: the        │
//! │  channel is best-effort, so late events from superseded sessions are   │
//! │  expected and come back as `InboundOutcome::Ignored`.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use ripara_core::{CoreError, SessionMode, ValidationError};
use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors reported to the local caller of a sync operation.
///
/// Never sent to the remote party of a session.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid intake configuration.
    #[error("Invalid intake configuration: {0}")]
    InvalidConfig(String),

    /// Invalid remote signer URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// Envelope could not be mapped to a known event.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Failed to serialize message.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Failed to deserialize message.
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    // =========================================================================
    // Session Errors
    // =========================================================================
    /// A user action was attempted with no session on screen.
    #[error("No active intake session")]
    NoActiveSession,

    /// The current session cannot take this step from its mode.
    #[error("Cannot move session from {from} to {to}")]
    InvalidTransition { from: SessionMode, to: SessionMode },

    /// Session data rejected before anything was published.
    #[error("Invalid session data: {0}")]
    InvalidSession(#[from] ValidationError),

    /// Remote signer link is no longer waiting for a signature.
    #[error("Remote signer {session_id} is not pending")]
    SignerNotPending { session_id: String },
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<CoreError> for SyncError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidTransition { from, to } => SyncError::InvalidTransition { from, to },
            CoreError::Validation(v) => SyncError::InvalidSession(v),
            other => SyncError::InvalidMessage(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            SyncError::DeserializationFailed(err.to_string())
        } else {
            SyncError::SerializationFailed(err.to_string())
        }
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }

    /// Returns true if this error indicates a malformed message.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidMessage(_)
                | SyncError::SerializationFailed(_)
                | SyncError::DeserializationFailed(_)
        )
    }

    /// Returns true if the local session could not take the requested step.
    pub fn is_session_error(&self) -> bool {
        matches!(
            self,
            SyncError::NoActiveSession
                | SyncError::InvalidTransition { .. }
                | SyncError::InvalidSession(_)
                | SyncError::SignerNotPending { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert!(SyncError::InvalidConfig("bad".into()).is_config_error());
        assert!(SyncError::InvalidUrl("bad".into()).is_config_error());
        assert!(SyncError::DeserializationFailed("x".into()).is_protocol_error());
        assert!(SyncError::NoActiveSession.is_session_error());

        assert!(!SyncError::NoActiveSession.is_protocol_error());
        assert!(!SyncError::InvalidMessage("x".into()).is_config_error());
    }

    #[test]
    fn test_core_transition_maps_to_sync_transition() {
        let err: SyncError = CoreError::InvalidTransition {
            from: SessionMode::Standby,
            to: SessionMode::Signature,
        }
        .into();
        assert!(matches!(
            err,
            SyncError::InvalidTransition {
                from: SessionMode::Standby,
                to: SessionMode::Signature
            }
        ));
        assert_eq!(err.to_string(), "Cannot move session from standby to signature");
    }

    #[test]
    fn test_json_errors_classified() {
        let err: SyncError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, SyncError::DeserializationFailed(_)));
    }
}
