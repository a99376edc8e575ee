//! Connection and polling configuration.
//!
//! Settings are resolved from, lowest priority first:
//! 1. built-in defaults
//! 2. a TOML file
//! 3. environment variables (see [`env_vars`])
//!
//! ```toml
//! [device]
//! host = "192.168.1.50"
//! port = 502
//! timeout_ms = 10000
//!
//! [polling]
//! refresh_interval_ms = 5000
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Default connection constants.
pub mod defaults {
    /// Standard Modbus TCP port.
    pub const PORT: u16 = 502;
    /// Unit id the ventilation controllers answer to.
    pub const UNIT_ID: u8 = 180;
    /// Socket timeout for connect, write and read.
    pub const TIMEOUT_MS: u64 = 10_000;
    /// Attempts per get/set before giving up.
    pub const RETRY_ATTEMPTS: u32 = 3;
    pub const BACKOFF_MIN_MS: u64 = 100;
    pub const BACKOFF_MAX_MS: u64 = 500;
    /// Pause between drain cycles.
    pub const DRAIN_INTERVAL_MS: u64 = 1_000;
    /// Upper bound for updating a single variable in a drain cycle.
    pub const ITEM_TIMEOUT_MS: u64 = 5_000;
    /// Refresh interval of the default poll set.
    pub const REFRESH_INTERVAL_MS: u64 = 5_000;
}

/// Environment variable names.
pub mod env_vars {
    pub const HOST: &str = "VENTLINK_HOST";
    pub const PORT: &str = "VENTLINK_PORT";
    pub const UNIT_ID: &str = "VENTLINK_UNIT_ID";
    pub const TIMEOUT_MS: &str = "VENTLINK_TIMEOUT_MS";
}

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VentlinkConfig {
    /// Device connection settings.
    #[serde(default)]
    pub device: DeviceConfig,

    /// Coordinator polling settings.
    #[serde(default)]
    pub polling: PollingConfig,
}

/// Device connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Host name or IP address of the controller.
    #[serde(default)]
    pub host: String,

    /// TCP port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Modbus unit id.
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,

    /// Connect/read/write timeout in milliseconds.
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    /// Attempts per get/set.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Lower bound of the random backoff between attempts.
    #[serde(default = "default_backoff_min")]
    pub backoff_min_ms: u64,

    /// Upper bound of the random backoff between attempts.
    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,
}

fn default_port() -> u16 {
    defaults::PORT
}
fn default_unit_id() -> u8 {
    defaults::UNIT_ID
}
fn default_timeout() -> u64 {
    defaults::TIMEOUT_MS
}
fn default_retry_attempts() -> u32 {
    defaults::RETRY_ATTEMPTS
}
fn default_backoff_min() -> u64 {
    defaults::BACKOFF_MIN_MS
}
fn default_backoff_max() -> u64 {
    defaults::BACKOFF_MAX_MS
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            unit_id: default_unit_id(),
            timeout_ms: default_timeout(),
            retry_attempts: default_retry_attempts(),
            backoff_min_ms: default_backoff_min(),
            backoff_max_ms: default_backoff_max(),
        }
    }
}

impl DeviceConfig {
    /// Create a configuration for the given host with default settings.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the socket timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// `host:port` string for connecting.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Socket timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Backoff range between attempts.
    pub fn backoff(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.backoff_min_ms),
            Duration::from_millis(self.backoff_max_ms),
        )
    }
}

/// Coordinator polling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Pause between drain cycles in milliseconds.
    #[serde(default = "default_drain_interval")]
    pub drain_interval_ms: u64,

    /// Per-variable update timeout in milliseconds.
    #[serde(default = "default_item_timeout")]
    pub item_timeout_ms: u64,

    /// Refresh interval of the default poll set in milliseconds.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_ms: u64,
}

fn default_drain_interval() -> u64 {
    defaults::DRAIN_INTERVAL_MS
}
fn default_item_timeout() -> u64 {
    defaults::ITEM_TIMEOUT_MS
}
fn default_refresh_interval() -> u64 {
    defaults::REFRESH_INTERVAL_MS
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            drain_interval_ms: default_drain_interval(),
            item_timeout_ms: default_item_timeout(),
            refresh_interval_ms: default_refresh_interval(),
        }
    }
}

impl PollingConfig {
    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }

    pub fn item_timeout(&self) -> Duration {
        Duration::from_millis(self.item_timeout_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

impl VentlinkConfig {
    /// Parse a TOML document.
    pub fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load configuration from an optional TOML file and the environment.
    ///
    /// The result is not validated; call [`VentlinkConfig::validate`] once
    /// command-line overrides are applied.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let content =
                    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                        path: path.to_path_buf(),
                        source,
                    })?;
                debug!(category = "config", path = %path.display(), "Loading config file");
                Self::from_toml(&content, path)?
            }
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Apply environment overrides using the given lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        if let Some(host) = lookup(env_vars::HOST) {
            self.device.host = host;
        }
        if let Some(port) = lookup(env_vars::PORT) {
            self.device.port = parse_env(env_vars::PORT, port)?;
        }
        if let Some(unit_id) = lookup(env_vars::UNIT_ID) {
            self.device.unit_id = parse_env(env_vars::UNIT_ID, unit_id)?;
        }
        if let Some(timeout) = lookup(env_vars::TIMEOUT_MS) {
            self.device.timeout_ms = parse_env(env_vars::TIMEOUT_MS, timeout)?;
        }
        Ok(())
    }

    /// Reject settings the client cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let device = &self.device;
        if device.host.trim().is_empty() {
            return Err(ConfigError::Invalid("device host is not set".into()));
        }
        if device.retry_attempts == 0 {
            return Err(ConfigError::Invalid("retry_attempts must be at least 1".into()));
        }
        if device.timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeout_ms must not be zero".into()));
        }
        if device.backoff_min_ms > device.backoff_max_ms {
            return Err(ConfigError::Invalid(format!(
                "backoff_min_ms ({}) exceeds backoff_max_ms ({})",
                device.backoff_min_ms, device.backoff_max_ms
            )));
        }
        if self.polling.drain_interval_ms == 0 || self.polling.item_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "drain_interval_ms and item_timeout_ms must not be zero".into(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Env { var, value })
}
