//! # Configuration
//!
//! [`BridgeConfig`] holds everything needed to open a session with the
//! ThinkGear Connector.
//!
//! ## Loading Priority
//!
//! 1. Explicit path
//! 2. `THINKGEAR_CONFIG` environment variable
//! 3. `./thinkgear.toml` in the current directory
//! 4. `~/.config/thinkgear/thinkgear.toml`
//! 5. Built-in defaults (`localhost:13854`, raw output on)
//!
//! `THINKGEAR_HOST` and `THINKGEAR_PORT` override whatever was loaded.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};
use crate::protocol::constants::{DEFAULT_HOST, DEFAULT_PORT};

/// Default TCP connect timeout in seconds.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Default handshake deadline in seconds.
const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 10;

/// Default settle delay for [`HandshakeStrategy::SettleDelay`], in milliseconds.
const DEFAULT_SETTLE_DELAY_MS: u64 = 500;

/// Connection and handshake settings.
///
/// ```
/// use thinkgear_bridge::config::BridgeConfig;
///
/// let config = BridgeConfig::default();
/// assert_eq!(config.addr(), "localhost:13854");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Ask the connector to stream raw EEG samples.
    #[serde(default = "default_true")]
    pub enable_raw_output: bool,

    /// Timeout for opening the TCP connection, in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default)]
    pub handshake: HandshakeConfig,
}

/// How a session decides the format switch has taken effect.
///
/// The connector never acknowledges the format request, so completion is
/// inferred from what arrives next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakeStrategy {
    /// Discard lines until one decodes as a valid packet.
    #[default]
    DiscardUntilValid,
    /// Sleep for `settle_delay_ms`, then trust whatever follows.
    SettleDelay,
    /// Wait for the first `{`, then drop the rest of that line as a torn fragment.
    SkipFirstLine,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeConfig {
    #[serde(default)]
    pub strategy: HandshakeStrategy,

    /// Deadline for the handshake, in seconds. 0 waits forever.
    #[serde(default = "default_handshake_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,
}

// ─── Defaults ───────────────────────────────────────────────────────────

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_handshake_timeout() -> u64 {
    DEFAULT_HANDSHAKE_TIMEOUT_SECS
}

fn default_settle_delay() -> u64 {
    DEFAULT_SETTLE_DELAY_MS
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            strategy: HandshakeStrategy::default(),
            timeout_secs: DEFAULT_HANDSHAKE_TIMEOUT_SECS,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
        }
    }
}

impl HandshakeConfig {
    /// The handshake deadline, or `None` when unbounded.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: DEFAULT_PORT,
            enable_raw_output: true,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            handshake: HandshakeConfig::default(),
        }
    }
}

// ─── BridgeConfig impl ─────────────────────────────────────────────────

impl BridgeConfig {
    /// Config for an explicit endpoint, everything else default.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// `host:port` as passed to the socket connect call.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Defaults plus environment overrides.
    ///
    /// # Errors
    /// Returns [`BridgeError::ConfigError`] if `THINKGEAR_PORT` is not a port number.
    pub fn from_env() -> BridgeResult<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load config from a TOML file, with environment variable overrides.
    ///
    /// # Errors
    /// Returns [`BridgeError::ConfigError`] if the file cannot be read or parsed.
    #[cfg(feature = "config-toml")]
    pub fn from_file(path: impl AsRef<Path>) -> BridgeResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| BridgeError::ConfigError {
            reason: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;
        let mut config: Self = toml::from_str(&contents)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Discover and load config from the standard search path (see module docs).
    ///
    /// # Errors
    /// Returns [`BridgeError::ConfigError`] if a discovered file is invalid.
    #[cfg(feature = "config-toml")]
    pub fn discover(explicit_path: Option<&Path>) -> BridgeResult<Self> {
        if let Some(path) = explicit_path {
            return Self::from_file(path);
        }

        if let Ok(path) = std::env::var("THINKGEAR_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        let local_path = PathBuf::from("thinkgear.toml");
        if local_path.exists() {
            return Self::from_file(&local_path);
        }

        if let Some(config_path) = dirs_config_path() {
            if config_path.exists() {
                return Self::from_file(&config_path);
            }
        }

        Self::from_env()
    }

    fn apply_env_overrides(&mut self) -> BridgeResult<()> {
        if let Ok(host) = std::env::var("THINKGEAR_HOST") {
            self.host = host;
        }
        if let Ok(port) = std::env::var("THINKGEAR_PORT") {
            self.port = port.parse().map_err(|_| BridgeError::ConfigError {
                reason: format!("THINKGEAR_PORT is not a valid port: {port}"),
            })?;
        }
        Ok(())
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────

/// Platform-appropriate config file path.
#[cfg_attr(not(feature = "config-toml"), allow(dead_code))]
fn dirs_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA")
            .ok()
            .map(|dir| PathBuf::from(dir).join("thinkgear").join("thinkgear.toml"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME").ok().map(|dir| {
            PathBuf::from(dir)
                .join(".config")
                .join("thinkgear")
                .join("thinkgear.toml")
        })
    }
}
