// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Project configuration management.
//!
//! Configuration is stored in `.stockbook/config.toml`:
//! - `private`: keep the database inside `.stockbook/` instead of the state dir
//! - `[remote]`: WebSocket URL of the authoritative store and gate tuning
//! - `[sync]`: retry budget and background task timing
//! - `[connectivity]`: probe targets and quality thresholds
//!
//! Every field has a default, so an empty file is a valid config.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::env;
use crate::error::{Error, Result};
use crate::sync::{
    ConnectionConfig, EngineSettings, MonitorConfig, ProbeStrategy, RemotePingProbe, RemoteStore,
    TcpProbe, DEFAULT_MAX_RETRIES,
};

const WORK_DIR_NAME: &str = ".stockbook";
const CONFIG_FILE_NAME: &str = "config.toml";
const DB_FILE_NAME: &str = "stockbook.db";

/// Project configuration stored in `.stockbook/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Store the database in `.stockbook/` rather than the shared state dir.
    #[serde(default, skip_serializing_if = "is_false")]
    pub private: bool,
    /// Authoritative store (optional - without it writes stay local).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteConfig>,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub connectivity: ConnectivityConfig,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Remote store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// WebSocket URL: `ws://...` or `wss://...`.
    pub url: String,
    /// Connection attempts per `execute_with_retry` (default: 3).
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// Reachability check timeouts in seconds, one per attempt (default: 8, 12).
    #[serde(default = "default_probe_timeouts")]
    pub probe_timeouts_secs: Vec<u64>,
    /// Sleep between attempts in seconds (default: 1, 3, 5).
    #[serde(default = "default_backoff")]
    pub backoff_secs: Vec<u64>,
    /// How long a successful check is trusted (default: 30).
    #[serde(default = "default_connected_ttl_secs")]
    pub connected_ttl_secs: u64,
    /// Consecutive failures that start a cooldown (default: 5, 0 = never).
    #[serde(default = "default_cooldown_after_failures")]
    pub cooldown_after_failures: u32,
    /// Cooldown length in seconds (default: 60).
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Timeout for a single remote call in seconds (default: 15).
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

impl RemoteConfig {
    /// Remote config for `url` with every tunable at its default.
    pub fn new(url: impl Into<String>) -> Self {
        RemoteConfig {
            url: url.into(),
            attempts: default_attempts(),
            probe_timeouts_secs: default_probe_timeouts(),
            backoff_secs: default_backoff(),
            connected_ttl_secs: default_connected_ttl_secs(),
            cooldown_after_failures: default_cooldown_after_failures(),
            cooldown_secs: default_cooldown_secs(),
            call_timeout_secs: default_call_timeout_secs(),
        }
    }

    /// Validates that the URL is a WebSocket URL.
    ///
    /// Returns an error message if the URL is invalid.
    pub fn validate_url(&self) -> Option<String> {
        let url = &self.url;
        if url.starts_with("ws://") || url.starts_with("wss://") {
            return None;
        }
        Some(format!(
            "invalid remote URL '{}': must start with ws:// or wss://",
            url
        ))
    }

    fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            attempts: self.attempts,
            probe_timeouts: secs(&self.probe_timeouts_secs),
            backoff: secs(&self.backoff_secs),
            connected_ttl: Duration::from_secs(self.connected_ttl_secs),
            cooldown_after_failures: self.cooldown_after_failures,
            cooldown: Duration::from_secs(self.cooldown_secs),
            call_timeout: Duration::from_secs(self.call_timeout_secs),
        }
    }
}

fn secs(values: &[u64]) -> Vec<Duration> {
    values.iter().copied().map(Duration::from_secs).collect()
}

fn default_attempts() -> u32 {
    3
}

fn default_probe_timeouts() -> Vec<u64> {
    vec![8, 12]
}

fn default_backoff() -> Vec<u64> {
    vec![1, 3, 5]
}

fn default_connected_ttl_secs() -> u64 {
    30
}

fn default_cooldown_after_failures() -> u32 {
    5
}

fn default_cooldown_secs() -> u64 {
    60
}

fn default_call_timeout_secs() -> u64 {
    15
}

/// Reconciliation tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Failed attempts tolerated before an operation is evicted (default: 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Quiet period after coming online before reconciling (default: 1500).
    #[serde(default = "default_reconcile_debounce_ms")]
    pub reconcile_debounce_ms: u64,
    /// How often `watch` looks for commits by other instances (default: 2000).
    #[serde(default = "default_storage_poll_ms")]
    pub storage_poll_ms: u64,
    /// How often `watch` retries pending operations while online; 0 turns
    /// the timer off (default: 30000).
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            max_retries: default_max_retries(),
            reconcile_debounce_ms: default_reconcile_debounce_ms(),
            storage_poll_ms: default_storage_poll_ms(),
            retry_interval_ms: default_retry_interval_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_reconcile_debounce_ms() -> u64 {
    1500
}

fn default_storage_poll_ms() -> u64 {
    2000
}

fn default_retry_interval_ms() -> u64 {
    30_000
}

/// Connectivity monitor tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    /// TCP `host:port` targets probed before pinging the remote itself.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub probe_targets: Vec<String>,
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_online_probe_delay_ms")]
    pub online_probe_delay_ms: u64,
    #[serde(default = "default_stability_window_secs")]
    pub stability_window_secs: u64,
    #[serde(default = "default_good_latency_ms")]
    pub good_latency_ms: u64,
    #[serde(default = "default_degraded_latency_ms")]
    pub degraded_latency_ms: u64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        ConnectivityConfig {
            probe_targets: Vec::new(),
            probe_interval_secs: default_probe_interval_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            online_probe_delay_ms: default_online_probe_delay_ms(),
            stability_window_secs: default_stability_window_secs(),
            good_latency_ms: default_good_latency_ms(),
            degraded_latency_ms: default_degraded_latency_ms(),
        }
    }
}

impl ConnectivityConfig {
    fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            probe_interval: Duration::from_secs(self.probe_interval_secs.max(1)),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
            online_probe_delay: Duration::from_millis(self.online_probe_delay_ms),
            stability_window: Duration::from_secs(self.stability_window_secs),
            good_latency: Duration::from_millis(self.good_latency_ms),
            degraded_latency: Duration::from_millis(self.degraded_latency_ms),
        }
    }
}

fn default_probe_interval_secs() -> u64 {
    60
}

fn default_probe_timeout_secs() -> u64 {
    5
}

fn default_online_probe_delay_ms() -> u64 {
    2000
}

fn default_stability_window_secs() -> u64 {
    10
}

fn default_good_latency_ms() -> u64 {
    1000
}

fn default_degraded_latency_ms() -> u64 {
    3000
}

impl Config {
    /// Loads configuration from the given `.stockbook/` directory.
    pub fn load(work_dir: &Path) -> Result<Self> {
        let config_path = work_dir.join(CONFIG_FILE_NAME);
        let content = fs::read_to_string(&config_path)
            .map_err(|e| Error::Config(format!("failed to read config: {}", e)))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        if let Some(msg) = config.remote.as_ref().and_then(RemoteConfig::validate_url) {
            return Err(Error::Config(msg));
        }
        Ok(config)
    }

    /// Saves configuration to the given `.stockbook/` directory.
    pub fn save(&self, work_dir: &Path) -> Result<()> {
        let config_path = work_dir.join(CONFIG_FILE_NAME);
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("failed to serialize config: {}", e)))?;
        fs::write(&config_path, content)?;
        Ok(())
    }

    /// Returns the remote URL if configured.
    pub fn remote_url(&self) -> Option<&str> {
        self.remote.as_ref().map(|r| r.url.as_str())
    }

    /// Engine tunables derived from this config.
    pub fn to_settings(&self) -> EngineSettings {
        EngineSettings {
            monitor: self.connectivity.monitor_config(),
            connection: self
                .remote
                .as_ref()
                .map(RemoteConfig::connection_config)
                .unwrap_or_default(),
            max_retries: self.sync.max_retries,
            reconcile_debounce: Duration::from_millis(self.sync.reconcile_debounce_ms),
            storage_poll: Duration::from_millis(self.sync.storage_poll_ms.max(1)),
            retry_interval: Duration::from_millis(self.sync.retry_interval_ms),
        }
    }

    /// Probe strategies in the order they are tried: TCP targets, then a
    /// ping of the remote store.
    pub fn probes(&self, remote: &Arc<dyn RemoteStore>) -> Vec<Box<dyn ProbeStrategy>> {
        let mut probes: Vec<Box<dyn ProbeStrategy>> = self
            .connectivity
            .probe_targets
            .iter()
            .map(|target| Box::new(TcpProbe::new(target.clone())) as Box<dyn ProbeStrategy>)
            .collect();
        probes.push(Box::new(RemotePingProbe::new(Arc::clone(remote))));
        probes
    }
}

/// Find the .stockbook directory by walking up from `start`.
pub fn find_work_dir_from(start: &Path) -> Result<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        let work_dir = current.join(WORK_DIR_NAME);
        if work_dir.is_dir() {
            return Ok(work_dir);
        }
        if !current.pop() {
            return Err(Error::NotInitialized);
        }
    }
}

/// Find the .stockbook directory by walking up from the current directory.
pub fn find_work_dir() -> Result<PathBuf> {
    find_work_dir_from(&std::env::current_dir()?)
}

/// Shared state directory for databases of non-private projects.
///
/// `STOCKBOOK_STATE_DIR` wins, then `$XDG_STATE_HOME/stockbook`, then the
/// platform state dir, then `~/.local/state/stockbook`.
pub fn stockbook_state_dir() -> PathBuf {
    if let Some(dir) = env::state_dir() {
        return dir;
    }
    if let Some(xdg) = env::xdg_state_home() {
        return xdg.join("stockbook");
    }
    if let Some(state) = dirs::state_dir() {
        return state.join("stockbook");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".local")
        .join("state")
        .join("stockbook")
}

/// Get the database path from config.
pub fn get_db_path(work_dir: &Path, config: &Config) -> PathBuf {
    if config.private {
        work_dir.join(DB_FILE_NAME)
    } else {
        stockbook_state_dir().join(DB_FILE_NAME)
    }
}

/// Initialize a new .stockbook directory at the given path.
///
/// An existing `.stockbook/` without a config file is reused.
pub fn init_work_dir(path: &Path, config: &Config) -> Result<PathBuf> {
    let work_dir = path.join(WORK_DIR_NAME);

    if work_dir.join(CONFIG_FILE_NAME).exists() {
        return Err(Error::AlreadyInitialized(work_dir.display().to_string()));
    }
    if let Some(msg) = config.remote.as_ref().and_then(RemoteConfig::validate_url) {
        return Err(Error::Config(msg));
    }

    fs::create_dir_all(&work_dir)?;
    config.save(&work_dir)?;

    Ok(work_dir)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
