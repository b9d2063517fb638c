//! # Intake Configuration
//!
//! Configuration for the intake coordinator, the customer display and remote
//! signer links.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     RIPARA_FACILITY_ID=fac-milano-centro                               │
//! │     RIPARA_COMPLETED_GRACE_SECS=10                                     │
//! │     RIPARA_SIGNER_BASE_URL=https://sign.ripara.app/s                   │
//! │     RIPARA_SIGNER_TTL_SECS=900                                         │
//! │     RIPARA_CHANNEL_CAPACITY=64                                         │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/ripara/intake.toml (Linux)                               │
//! │     ~/Library/Application Support/app.ripara.ripara/intake.toml (macOS)│
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # intake.toml
//! [facility]
//! id = "fac-milano-centro"
//! name = "Milano Centro"
//!
//! [display]
//! completed_grace_secs = 10
//!
//! [remote_signer]
//! base_url = "https://sign.ripara.app/s"
//! token_ttl_secs = 900
//!
//! [channel]
//! capacity = 64
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::channel::DEFAULT_CAPACITY;
use crate::error::{SyncError, SyncResult};

// =============================================================================
// Facility
// =============================================================================

/// The facility this terminal or display belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilityConfig {
    /// Scopes the display and control topics.
    pub id: String,

    #[serde(default)]
    pub name: String,
}

impl Default for FacilityConfig {
    fn default() -> Self {
        FacilityConfig {
            id: "default-facility".to_string(),
            name: "Default Facility".to_string(),
        }
    }
}

// =============================================================================
// Display
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplaySettings {
    /// How long the completed view stays up before returning to standby.
    #[serde(default = "default_completed_grace")]
    pub completed_grace_secs: u64,
}

fn default_completed_grace() -> u64 {
    10
}

impl Default for DisplaySettings {
    fn default() -> Self {
        DisplaySettings {
            completed_grace_secs: default_completed_grace(),
        }
    }
}

impl DisplaySettings {
    pub fn completed_grace(&self) -> Duration {
        Duration::from_secs(self.completed_grace_secs)
    }
}

// =============================================================================
// Remote Signer
// =============================================================================

/// Share links handed to remote signing devices.
///
/// ## Link Lifetime
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                                                                         │
/// │   mint ──────────────► pending ──signature_completed──► completed       │
/// │                           │                                             │
/// │                           ├── token_ttl_secs elapsed ──► expired        │
/// │                           └── cancel() ────────────────► cancelled      │
/// │                                                                         │
/// │  An abandoned link stops accepting signatures once its TTL is over.    │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSignerSettings {
    /// Page the remote device opens; session and amounts go in the query.
    #[serde(default = "default_signer_base_url")]
    pub base_url: String,

    /// Link lifetime (seconds).
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
}

fn default_signer_base_url() -> String {
    "https://sign.ripara.app/s".to_string()
}

fn default_token_ttl() -> u64 {
    900
}

impl Default for RemoteSignerSettings {
    fn default() -> Self {
        RemoteSignerSettings {
            base_url: default_signer_base_url(),
            token_ttl_secs: default_token_ttl(),
        }
    }
}

impl RemoteSignerSettings {
    /// Parses the base URL. Only http(s) links can be opened by a phone.
    pub fn base_url(&self) -> SyncResult<Url> {
        let url = Url::parse(&self.base_url)?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(SyncError::InvalidUrl(format!(
                "Signer URL must use http or https, got: {}",
                other
            ))),
        }
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }
}

// =============================================================================
// Channel
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// Messages buffered per topic before slow subscribers start skipping.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

impl Default for ChannelSettings {
    fn default() -> Self {
        ChannelSettings {
            capacity: default_capacity(),
        }
    }
}

// =============================================================================
// Main Intake Configuration
// =============================================================================

/// Complete intake configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntakeConfig {
    #[serde(default)]
    pub facility: FacilityConfig,

    #[serde(default)]
    pub display: DisplaySettings,

    #[serde(default)]
    pub remote_signer: RemoteSignerSettings,

    #[serde(default)]
    pub channel: ChannelSettings,
}

impl IntakeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (intake.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading intake config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load intake config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Intake config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.facility.id.trim().is_empty() {
            return Err(SyncError::InvalidConfig("facility id is required".into()));
        }

        if self.display.completed_grace_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "completed_grace_secs must be greater than 0".into(),
            ));
        }

        self.remote_signer.base_url()?;
        if self.remote_signer.token_ttl_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "token_ttl_secs must be greater than 0".into(),
            ));
        }

        if self.channel.capacity == 0 {
            return Err(SyncError::InvalidConfig(
                "channel capacity must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides read through `lookup`.
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup("RIPARA_FACILITY_ID") {
            debug!(facility_id = %id, "Overriding facility id from environment");
            self.facility.id = id;
        }

        if let Some(secs) = lookup("RIPARA_COMPLETED_GRACE_SECS") {
            match secs.parse::<u64>() {
                Ok(s) => self.display.completed_grace_secs = s,
                Err(_) => warn!(value = %secs, "Ignoring invalid RIPARA_COMPLETED_GRACE_SECS"),
            }
        }

        if let Some(url) = lookup("RIPARA_SIGNER_BASE_URL") {
            debug!(url = %url, "Overriding signer URL from environment");
            self.remote_signer.base_url = url;
        }

        if let Some(secs) = lookup("RIPARA_SIGNER_TTL_SECS") {
            match secs.parse::<u64>() {
                Ok(s) => self.remote_signer.token_ttl_secs = s,
                Err(_) => warn!(value = %secs, "Ignoring invalid RIPARA_SIGNER_TTL_SECS"),
            }
        }

        if let Some(capacity) = lookup("RIPARA_CHANNEL_CAPACITY") {
            match capacity.parse::<usize>() {
                Ok(c) => self.channel.capacity = c,
                Err(_) => warn!(value = %capacity, "Ignoring invalid RIPARA_CHANNEL_CAPACITY"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("app", "ripara", "ripara")
            .map(|dirs| dirs.config_dir().join("intake.toml"))
    }

    pub fn facility_id(&self) -> &str {
        &self.facility.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = IntakeConfig::default();
        assert_eq!(config.display.completed_grace(), Duration::from_secs(10));
        assert_eq!(config.remote_signer.token_ttl(), Duration::from_secs(900));
        assert_eq!(config.channel.capacity, DEFAULT_CAPACITY);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: IntakeConfig = toml::from_str(
            r#"
            [facility]
            id = "fac-torino"

            [remote_signer]
            token_ttl_secs = 300
            "#,
        )
        .unwrap();

        assert_eq!(config.facility_id(), "fac-torino");
        assert_eq!(config.remote_signer.token_ttl_secs, 300);
        assert_eq!(config.remote_signer.base_url, default_signer_base_url());
        assert_eq!(config.display.completed_grace_secs, 10);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("RIPARA_FACILITY_ID", "fac-env"),
            ("RIPARA_COMPLETED_GRACE_SECS", "15"),
            ("RIPARA_SIGNER_TTL_SECS", "not-a-number"),
            ("RIPARA_CHANNEL_CAPACITY", "8"),
        ]
        .into_iter()
        .collect();

        let mut config = IntakeConfig::default();
        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.facility.id, "fac-env");
        assert_eq!(config.display.completed_grace_secs, 15);
        assert_eq!(config.remote_signer.token_ttl_secs, 900);
        assert_eq!(config.channel.capacity, 8);
    }

    #[test]
    fn test_config_validation() {
        let mut config = IntakeConfig::default();

        config.facility.id = "  ".to_string();
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(_))));
        config.facility.id = "fac-1".to_string();

        config.remote_signer.base_url = "ftp://example.com/sign".to_string();
        assert!(matches!(config.validate(), Err(SyncError::InvalidUrl(_))));

        config.remote_signer.base_url = "not a url".to_string();
        assert!(config.validate().unwrap_err().is_config_error());

        config.remote_signer.base_url = "http://192.168.1.20:8080/sign".to_string();
        assert!(config.validate().is_ok());

        config.channel.capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let path = std::env::temp_dir().join(format!("ripara-intake-{}.toml", uuid::Uuid::new_v4()));
        let mut config = IntakeConfig::default();
        config.facility.id = "fac-file".to_string();
        config.display.completed_grace_secs = 20;

        config.save(Some(path.clone())).unwrap();
        let loaded = IntakeConfig::load(Some(path.clone())).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.display.completed_grace_secs, 20);
    }

    #[test]
    fn test_toml_serialization() {
        let toml_str = toml::to_string_pretty(&IntakeConfig::default()).unwrap();
        assert!(toml_str.contains("[facility]"));
        assert!(toml_str.contains("[remote_signer]"));
    }
}
