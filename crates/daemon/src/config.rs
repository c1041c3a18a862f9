// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration.
//!
//! Configuration is read from `<state-dir>/config.toml` (or `--config`).
//! Every section and key is optional; missing values take the defaults
//! below.
//!
//! ```toml
//! [remote]
//! base_url = "https://system-gps-ccn-default-rtdb.firebaseio.com"
//! collection = "ubicaciones"
//!
//! [queue]
//! path = "queue.jsonl"
//! max_len = 100000
//! overflow = "drop-oldest"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use possync_core::DEFAULT_COLLECTION;
use serde::{Deserialize, Serialize};

use crate::env;
use crate::error::{Error, Result};
use crate::store::{OverflowPolicy, QueueLimits};

/// Config filename within the state directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Remote store used when nothing else is configured.
pub const DEFAULT_BASE_URL: &str = "https://system-gps-ccn-default-rtdb.firebaseio.com";

/// Top-level daemon configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub remote: RemoteConfig,
    pub queue: QueueConfig,
    pub flush: FlushConfig,
    pub backoff: BackoffConfig,
    pub triggers: TriggerConfig,
}

/// Where records are delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Scheme and host of the key-value store, without a trailing path.
    pub base_url: String,
    /// Top-level node records are written under.
    pub collection: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            timeout_secs: 30,
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Queue storage and capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// JSONL file for a durable queue (relative to the state dir).
    /// Without it the queue lives in memory only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Maximum queued records.
    pub max_len: usize,
    pub overflow: OverflowPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            path: None,
            max_len: 100_000,
            overflow: OverflowPolicy::DropOldest,
        }
    }
}

impl QueueConfig {
    pub fn limits(&self) -> QueueLimits {
        QueueLimits {
            max_len: Some(self.max_len),
            overflow: self.overflow,
        }
    }

    /// Resolves the durable queue path against the state directory.
    pub fn resolved_path(&self, state_dir: &Path) -> Option<PathBuf> {
        self.path.as_ref().map(|p| {
            if p.is_absolute() {
                p.clone()
            } else {
                state_dir.join(p)
            }
        })
    }
}

/// Flush pass tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlushConfig {
    /// Deliveries allowed in flight within one pass.
    pub max_in_flight: usize,
}

impl Default for FlushConfig {
    fn default() -> Self {
        FlushConfig { max_in_flight: 16 }
    }
}

/// Retry backoff between failed passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Multiplier applied per consecutive failed pass.
    pub factor: f64,
    /// Random spread as a fraction of the delay (0.2 = ±20%).
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig {
            initial_delay_ms: 1_000,
            max_delay_ms: 300_000,
            factor: 2.0,
            jitter: 0.2,
        }
    }
}

/// Built-in trigger sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Seconds between periodic passes (0 = disabled).
    pub periodic_interval_secs: u64,
    /// Seconds between connectivity probes (0 = disabled).
    pub probe_interval_secs: u64,
    pub probe_timeout_ms: u64,
    /// How long shutdown waits for a running pass.
    pub shutdown_grace_ms: u64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        TriggerConfig {
            periodic_interval_secs: 300,
            probe_interval_secs: 30,
            probe_timeout_ms: 3_000,
            shutdown_grace_ms: 5_000,
        }
    }
}

impl TriggerConfig {
    pub fn periodic_interval(&self) -> Option<Duration> {
        non_zero_secs(self.periodic_interval_secs)
    }

    pub fn probe_interval(&self) -> Option<Duration> {
        non_zero_secs(self.probe_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::parse(&content, path)
    }

    /// Loads configuration, treating a missing file as all defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        Self::load(path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(|source| Error::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values that would otherwise fail at runtime.
    pub fn validate(&self) -> Result<()> {
        validate_base_url(&self.remote.base_url)?;
        if self.remote.collection.trim_matches('/').is_empty() {
            return Err(Error::Config("remote.collection must not be empty".into()));
        }
        if self.queue.max_len == 0 {
            return Err(Error::Config("queue.max_len must be at least 1".into()));
        }
        if self.flush.max_in_flight == 0 {
            return Err(Error::Config("flush.max_in_flight must be at least 1".into()));
        }
        if self.backoff.factor < 1.0 {
            return Err(Error::Config("backoff.factor must be at least 1.0".into()));
        }
        if !(0.0..=1.0).contains(&self.backoff.jitter) {
            return Err(Error::Config("backoff.jitter must be between 0 and 1".into()));
        }
        if self.backoff.initial_delay_ms > self.backoff.max_delay_ms {
            return Err(Error::Config(
                "backoff.initial_delay_ms must not exceed backoff.max_delay_ms".into(),
            ));
        }
        Ok(())
    }

    /// Replaces the base URL, validating it.
    pub fn set_base_url(&mut self, url: &str) -> Result<()> {
        validate_base_url(url)?;
        self.remote.base_url = url.to_string();
        Ok(())
    }
}

/// Accepts `http`/`https` URLs that name a host.
pub fn validate_base_url(url: &str) -> Result<()> {
    let parsed =
        reqwest::Url::parse(url).map_err(|_| Error::InvalidBaseUrl(url.to_string()))?;
    let scheme_ok = matches!(parsed.scheme(), "http" | "https");
    if !scheme_ok || parsed.host_str().is_none() {
        return Err(Error::InvalidBaseUrl(url.to_string()));
    }
    Ok(())
}

/// Picks the state directory.
///
/// Order: explicit flag, `POSSYNC_STATE_DIR`, `$XDG_STATE_HOME/possync`,
/// `~/.local/state/possync`.
pub fn resolve_state_dir(explicit: Option<PathBuf>) -> Result<PathBuf> {
    state_dir_from(
        explicit,
        env::state_dir(),
        env::xdg_state_home(),
        dirs::home_dir(),
    )
    .ok_or(Error::NoStateDir)
}

fn state_dir_from(
    explicit: Option<PathBuf>,
    from_env: Option<PathBuf>,
    xdg_state_home: Option<PathBuf>,
    home: Option<PathBuf>,
) -> Option<PathBuf> {
    explicit
        .or(from_env)
        .or_else(|| xdg_state_home.map(|d| d.join("possync")))
        .or_else(|| home.map(|h| h.join(".local/state/possync")))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
