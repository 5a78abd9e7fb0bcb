//! Configuration for the session provider.
//!
//! [`ProviderConfig`] is fixed for the lifetime of a provider and can be
//! built in code or loaded from TOML:
//!
//! ```toml
//! key_prefix = "session:"
//! cookie_name = "SESSIONID"
//! sweep_interval = 60      # seconds
//! notify_capacity = 1024
//! ```
//!
//! [`SessionConfig`] is passed per call and carries the session lifetime.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Default prefix prepended to session ids to form store keys.
pub const DEFAULT_KEY_PREFIX: &str = "session:";

/// Default name of the cookie carrying the session id.
pub const DEFAULT_COOKIE_NAME: &str = "SESSIONID";

/// Default interval between reconciliation sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Default number of lifecycle notifications that may be queued.
pub const DEFAULT_NOTIFY_CAPACITY: usize = 1024;

/// Default session lifetime.
pub const DEFAULT_VALID: Duration = Duration::from_secs(30 * 60);

/// Provider-wide configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Prefix for store keys (`prefix + id`).
    pub key_prefix: String,

    /// Cookie name used by the identification helpers.
    pub cookie_name: String,

    /// Interval between reconciliation sweeps.
    #[serde(with = "seconds")]
    pub sweep_interval: Duration,

    /// Bound of the notification queue.
    pub notify_capacity: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            notify_capacity: DEFAULT_NOTIFY_CAPACITY,
        }
    }
}

impl ProviderConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the store key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the cookie name.
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Set the sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the notification queue bound.
    pub fn with_notify_capacity(mut self, capacity: usize) -> Self {
        self.notify_capacity = capacity;
        self
    }

    /// Parse a configuration from TOML. Missing keys take their defaults.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ReadConfig {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml(&contents)
    }

    /// Reject values the provider cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.key_prefix.is_empty() {
            return Err(Error::InvalidConfig("key_prefix must not be empty".into()));
        }
        if self.sweep_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "sweep_interval must be greater than zero".into(),
            ));
        }
        if self.notify_capacity == 0 {
            return Err(Error::InvalidConfig(
                "notify_capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Per-call session settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long a session stays valid after creation or refresh.
    pub valid: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            valid: DEFAULT_VALID,
        }
    }
}

impl SessionConfig {
    /// Create a session config with the given lifetime.
    pub fn new(valid: Duration) -> Self {
        Self { valid }
    }
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
