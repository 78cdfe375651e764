//! # Node Configuration
//!
//! File and environment configuration for origins and the relay.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Defaults          #[serde(default = ...)] on every field            │
//! │  2. apotheca.toml     ProjectDirs("com", "apotheca", "pharmacy")        │
//! │  3. Environment       APOTHECA_RELAY_URL, APOTHECA_RELAY_PORT,          │
//! │                       APOTHECA_DB_PATH, APOTHECA_USER_ID,               │
//! │                       APOTHECA_ROLE, APOTHECA_NODE_NAME                 │
//! │                                                                         │
//! │  Later sources override earlier ones; the result is validated.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [node]
//! name = "Front counter"
//!
//! [network]
//! relay_url = "ws://192.168.1.10:8765/ws"
//! initial_backoff_ms = 500
//! max_backoff_secs = 30
//!
//! [relay]
//! port = 8765
//!
//! [storage]
//! database_path = "/var/lib/apotheca/apotheca.db"
//!
//! [alerts]
//! evaluation_interval_secs = 60
//!
//! [session]
//! user_id = "ana"
//! role = "pharmacist"
//! ```
//!
//! Alert thresholds are not here: they are replicated domain data owned by
//! the configuration store.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use apotheca_core::{Role, UserContext};

use crate::error::{SyncError, SyncResult};
use crate::network::NetworkConfig;
use crate::relay::{RelayConfig, DEFAULT_RELAY_PORT};

/// Config file name inside the platform config directory.
const CONFIG_FILE: &str = "apotheca.toml";

/// Database file name inside the platform data directory.
const DATABASE_FILE: &str = "apotheca.db";

// =============================================================================
// Sections
// =============================================================================

/// This origin's identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSection {
    /// Human-readable name used in logs.
    #[serde(default = "default_node_name")]
    pub name: String,
}

fn default_node_name() -> String {
    "Apotheca".to_string()
}

impl Default for NodeSection {
    fn default() -> Self {
        NodeSection {
            name: default_node_name(),
        }
    }
}

/// Relay connection settings for origins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// Relay WebSocket URL. Unset means local broadcast only.
    #[serde(default)]
    pub relay_url: Option<String>,

    /// Connection timeout (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// First reconnection delay (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Reconnection delay cap (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Reconnection attempts before giving up. 0 retries forever.
    #[serde(default)]
    pub max_retries: u32,

    /// Keepalive ping interval (seconds).
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
}

fn default_connect_timeout() -> u64 {
    10
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    30
}
fn default_ping_interval() -> u64 {
    30
}

impl Default for NetworkSettings {
    fn default() -> Self {
        NetworkSettings {
            relay_url: None,
            connect_timeout_secs: default_connect_timeout(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            max_retries: 0,
            ping_interval_secs: default_ping_interval(),
        }
    }
}

impl NetworkSettings {
    /// Network channel configuration, if a relay is configured.
    pub fn channel_config(&self) -> Option<NetworkConfig> {
        self.relay_url.as_ref().map(|url| NetworkConfig {
            url: url.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_secs(self.max_backoff_secs),
            max_retries: self.max_retries,
            ping_interval: Duration::from_secs(self.ping_interval_secs),
        })
    }
}

/// Relay server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelaySettings {
    #[serde(default = "default_relay_port")]
    pub port: u16,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_relay_port() -> u16 {
    DEFAULT_RELAY_PORT
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

impl Default for RelaySettings {
    fn default() -> Self {
        RelaySettings {
            port: default_relay_port(),
            bind_addr: default_bind_addr(),
        }
    }
}

impl RelaySettings {
    pub fn server_config(&self) -> RelayConfig {
        RelayConfig {
            port: self.port,
            bind_addr: self.bind_addr.clone(),
        }
    }
}

/// Where the persistence medium lives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite file. Unset uses the platform data directory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

impl StorageSettings {
    /// Configured path, else the platform data directory, else the
    /// working directory.
    pub fn resolved_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("com", "apotheca", "pharmacy")
                .map(|dirs| dirs.data_dir().join(DATABASE_FILE))
                .unwrap_or_else(|| PathBuf::from(DATABASE_FILE))
        })
    }
}

/// Alert evaluation timer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertTimerSettings {
    /// Periodic re-evaluation interval (seconds).
    #[serde(default = "default_evaluation_interval")]
    pub evaluation_interval_secs: u64,
}

fn default_evaluation_interval() -> u64 {
    60
}

impl Default for AlertTimerSettings {
    fn default() -> Self {
        AlertTimerSettings {
            evaluation_interval_secs: default_evaluation_interval(),
        }
    }
}

impl AlertTimerSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.evaluation_interval_secs)
    }
}

/// The user operating this origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_user_id")]
    pub user_id: String,

    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_user_id() -> String {
    "admin".to_string()
}

fn default_role() -> Role {
    Role::Admin
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            user_id: default_user_id(),
            role: default_role(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete configuration for `apotheca-node` and `apotheca-relay`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub node: NodeSection,

    #[serde(default)]
    pub network: NetworkSettings,

    #[serde(default)]
    pub relay: RelaySettings,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub alerts: AlertTimerSettings,

    #[serde(default)]
    pub session: SessionSettings,
}

impl NodeConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if let Some(ref raw) = self.network.relay_url {
            let url = url::Url::parse(raw)?;
            if url.scheme() != "ws" && url.scheme() != "wss" {
                return Err(SyncError::InvalidUrl(format!(
                    "Relay URL must start with ws:// or wss://, got: {}",
                    raw
                )));
            }
        }

        if self.network.initial_backoff_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "initial_backoff_ms must be greater than 0".into(),
            ));
        }

        if self.network.initial_backoff_ms > self.network.max_backoff_secs.saturating_mul(1000) {
            return Err(SyncError::InvalidConfig(
                "initial_backoff_ms must not exceed max_backoff_secs".into(),
            ));
        }

        if self.network.ping_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "ping_interval_secs must be greater than 0".into(),
            ));
        }

        if self.alerts.evaluation_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "evaluation_interval_secs must be greater than 0".into(),
            ));
        }

        if self.session.user_id.trim().is_empty() {
            return Err(SyncError::InvalidConfig("session.user_id is required".into()));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from any `APOTHECA_*` lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(name) = lookup("APOTHECA_NODE_NAME") {
            self.node.name = name;
        }

        if let Some(url) = lookup("APOTHECA_RELAY_URL") {
            debug!(url = %url, "Overriding relay URL from environment");
            self.network.relay_url = if url.is_empty() { None } else { Some(url) };
        }

        if let Some(port) = lookup("APOTHECA_RELAY_PORT") {
            match port.parse::<u16>() {
                Ok(p) => self.relay.port = p,
                Err(_) => warn!(port = %port, "Ignoring invalid APOTHECA_RELAY_PORT"),
            }
        }

        if let Some(path) = lookup("APOTHECA_DB_PATH") {
            self.storage.database_path = Some(PathBuf::from(path));
        }

        if let Some(user_id) = lookup("APOTHECA_USER_ID") {
            self.session.user_id = user_id;
        }

        if let Some(role) = lookup("APOTHECA_ROLE") {
            match role.parse::<Role>() {
                Ok(r) => self.session.role = r,
                Err(e) => warn!(role = %role, error = %e, "Ignoring invalid APOTHECA_ROLE"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "apotheca", "pharmacy")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// The user this origin evaluates alerts for.
    pub fn user(&self) -> UserContext {
        UserContext::new(self.session.user_id.clone(), self.session.role)
    }

    /// Returns the relay URL if configured.
    pub fn relay_url(&self) -> Option<&str> {
        self.network.relay_url.as_deref()
    }
}
