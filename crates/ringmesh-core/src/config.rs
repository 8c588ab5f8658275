//! Configuration system for ringmesh.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $RINGMESH_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/ringmesh/config.toml
//!   3. ~/.config/ringmesh/config.toml

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RingmeshConfig {
    pub node: NodeConfig,
    pub overlay: OverlayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// UDP address the overlay listens on.
    pub listen_addr: SocketAddr,
    /// Node key as hex. Empty = random key on every start.
    pub key: String,
    /// Address of a member to join through. Empty = start a new ring.
    pub bootstrap: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Leafset members kept on each side of the local key.
    pub leafset_half_size: usize,
    /// Seconds a failed peer must wait before it is accepted again.
    pub grace_period_secs: u64,
    /// Seconds between two leafset/routing-table checks.
    pub check_interval_secs: u64,
    /// Send the leafset to neighbours every N checks.
    pub piggy_every: u32,
    /// Success average below which a peer is dropped.
    pub bad_link: f32,
    /// Host records kept once unreferenced.
    pub host_cache_size: usize,
    /// How long a send waits for its acknowledgement.
    pub ping_timeout_ms: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 4555)),
            key: String::new(),
            bootstrap: String::new(),
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            leafset_half_size: 4,
            grace_period_secs: 30,
            check_interval_secs: 20,
            piggy_every: 3,
            bad_link: crate::host::BAD_LINK,
            host_cache_size: 64,
            ping_timeout_ms: 1000,
        }
    }
}

impl OverlayConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(1))
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("ringmesh")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl RingmeshConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            RingmeshConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("RINGMESH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&RingmeshConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply RINGMESH_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("RINGMESH_NODE__LISTEN_ADDR") {
            if let Ok(a) = v.parse() {
                self.node.listen_addr = a;
            }
        }
        if let Ok(v) = std::env::var("RINGMESH_NODE__KEY") {
            self.node.key = v;
        }
        if let Ok(v) = std::env::var("RINGMESH_NODE__BOOTSTRAP") {
            self.node.bootstrap = v;
        }
        if let Ok(v) = std::env::var("RINGMESH_OVERLAY__GRACE_PERIOD_SECS") {
            if let Ok(s) = v.parse() {
                self.overlay.grace_period_secs = s;
            }
        }
        if let Ok(v) = std::env::var("RINGMESH_OVERLAY__CHECK_INTERVAL_SECS") {
            if let Ok(s) = v.parse() {
                self.overlay.check_interval_secs = s;
            }
        }
    }
}
