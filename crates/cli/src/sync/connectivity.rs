// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Connectivity and link-quality monitoring.
//!
//! The monitor combines the host's raw online/offline signal with active
//! reachability probes. Probe failures never surface as errors; they only
//! degrade [`Quality`].

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::events::{ListenerId, Listeners};
use super::remote::RemoteStore;

/// Link quality as seen by the last probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Good,
    Poor,
    Offline,
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Quality::Good => "good",
            Quality::Poor => "poor",
            Quality::Offline => "offline",
        };
        write!(f, "{}", s)
    }
}

/// Snapshot of what the engine knows about the link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionState {
    /// Host-reported online flag.
    pub raw_online: bool,
    /// Whether the last probe or remote call actually got through.
    pub verified_reachable: bool,
    pub quality: Quality,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

impl ConnectionState {
    fn initial(raw_online: bool) -> Self {
        ConnectionState {
            raw_online,
            verified_reachable: false,
            quality: fallback_quality(raw_online),
            last_success_at: None,
            last_failure_at: None,
            consecutive_failures: 0,
        }
    }
}

/// Quality to assume when no probe succeeds.
fn fallback_quality(raw_online: bool) -> Quality {
    if raw_online {
        Quality::Poor
    } else {
        Quality::Offline
    }
}

/// A state transition delivered to monitor listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectivityChange {
    pub previous: ConnectionState,
    pub current: ConnectionState,
}

impl ConnectivityChange {
    /// The link left the Offline state.
    pub fn came_online(&self) -> bool {
        self.previous.quality == Quality::Offline && self.current.quality != Quality::Offline
    }

    /// The link entered the Offline state.
    pub fn went_offline(&self) -> bool {
        self.previous.quality != Quality::Offline && self.current.quality == Quality::Offline
    }

    /// A reachability check or remote call got through after reachability
    /// was lost or never confirmed.
    pub fn became_reachable(&self) -> bool {
        !self.previous.verified_reachable
            && self.current.verified_reachable
            && self.current.quality != Quality::Offline
    }

    /// The host flipped its raw online flag.
    pub fn platform_changed(&self) -> bool {
        self.previous.raw_online != self.current.raw_online
    }
}

/// Boxed future returned by [`ProbeStrategy::probe`].
pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = Result<(), String>> + Send + 'a>>;

/// A side-effect-free reachability check.
pub trait ProbeStrategy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Resolve `Ok` if the target answered.
    fn probe(&self) -> ProbeFuture<'_>;
}

/// Probe that opens (and immediately drops) a TCP connection.
pub struct TcpProbe {
    target: String,
}

impl TcpProbe {
    /// Probe `host:port`.
    pub fn new(target: impl Into<String>) -> Self {
        TcpProbe {
            target: target.into(),
        }
    }
}

impl ProbeStrategy for TcpProbe {
    fn name(&self) -> &str {
        &self.target
    }

    fn probe(&self) -> ProbeFuture<'_> {
        Box::pin(async move {
            TcpStream::connect(self.target.as_str())
                .await
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
    }
}

/// Probe that pings the remote store itself.
pub struct RemotePingProbe {
    remote: Arc<dyn RemoteStore>,
}

impl RemotePingProbe {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        RemotePingProbe { remote }
    }
}

impl ProbeStrategy for RemotePingProbe {
    fn name(&self) -> &str {
        "remote-ping"
    }

    fn probe(&self) -> ProbeFuture<'_> {
        Box::pin(async move { self.remote.ping().await.map_err(|e| e.to_string()) })
    }
}

/// Timing knobs for the monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Interval of the background re-probe.
    pub probe_interval: Duration,
    /// Hard timeout per probe strategy.
    pub probe_timeout: Duration,
    /// Delay between an online signal and the probe it triggers.
    pub online_probe_delay: Duration,
    /// Quiet period required before the link counts as stable.
    pub stability_window: Duration,
    /// Latency below this is Good; anything slower is Poor.
    pub good_latency: Duration,
    /// Latency at or above this is logged as degraded.
    pub degraded_latency: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(5),
            online_probe_delay: Duration::from_secs(2),
            stability_window: Duration::from_secs(10),
            good_latency: Duration::from_secs(1),
            degraded_latency: Duration::from_secs(3),
        }
    }
}

impl MonitorConfig {
    /// Bucket a successful probe's latency.
    pub fn bucket(&self, latency: Duration) -> Quality {
        if latency < self.good_latency {
            Quality::Good
        } else {
            Quality::Poor
        }
    }
}

struct MonitorState {
    status: ConnectionState,
    last_transition: Option<Instant>,
}

/// Tracks connectivity and notifies listeners on transitions.
pub struct ConnectivityMonitor {
    config: MonitorConfig,
    probes: Vec<Box<dyn ProbeStrategy>>,
    state: RwLock<MonitorState>,
    listeners: Listeners<ConnectivityChange>,
    initialized: AtomicBool,
    platform: Mutex<Option<watch::Receiver<bool>>>,
    cancel: CancellationToken,
}

impl ConnectivityMonitor {
    /// Create a monitor fed by the host's online signal.
    ///
    /// Probes run in the given order; with no probes the raw signal alone
    /// decides quality.
    pub fn new(
        config: MonitorConfig,
        probes: Vec<Box<dyn ProbeStrategy>>,
        platform: watch::Receiver<bool>,
    ) -> Self {
        let raw_online = *platform.borrow();
        ConnectivityMonitor {
            config,
            probes,
            state: RwLock::new(MonitorState {
                status: ConnectionState::initial(raw_online),
                last_transition: None,
            }),
            listeners: Listeners::new(),
            initialized: AtomicBool::new(false),
            platform: Mutex::new(Some(platform)),
            cancel: CancellationToken::new(),
        }
    }

    /// Start the platform listener and the periodic probe.
    ///
    /// Calling this more than once has no effect.
    pub fn initialize(self: &Arc<Self>) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return;
        }

        let platform = self
            .platform
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(mut rx) = platform {
            let monitor = Arc::clone(self);
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = monitor.cancel.cancelled() => break,
                        changed = rx.changed() => {
                            if changed.is_err() {
                                tracing::debug!("platform signal closed");
                                break;
                            }
                            let online = *rx.borrow_and_update();
                            monitor.set_platform_online(online);
                        }
                    }
                }
            });
        }

        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(monitor.config.probe_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = monitor.cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        monitor.check_quality_now().await;
                    }
                }
            }
        });
    }

    /// Stop background tasks started by [`initialize`](Self::initialize).
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Current connection state.
    pub fn status(&self) -> ConnectionState {
        self.read().status.clone()
    }

    /// Current link quality.
    pub fn quality(&self) -> Quality {
        self.read().status.quality
    }

    /// Host-reported online flag.
    pub fn is_platform_online(&self) -> bool {
        self.read().status.raw_online
    }

    /// Register a transition callback.
    pub fn add_listener(
        &self,
        callback: impl Fn(&ConnectivityChange) + Send + Sync + 'static,
    ) -> ListenerId {
        self.listeners.add(callback)
    }

    /// Unregister a transition callback.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// True if the link is Good and has not changed within the window.
    pub fn is_connection_stable(&self) -> bool {
        let state = self.read();
        if !state.status.raw_online || state.status.quality != Quality::Good {
            return false;
        }
        match state.last_transition {
            Some(at) => at.elapsed() >= self.config.stability_window,
            None => true,
        }
    }

    /// Apply a host online/offline signal.
    ///
    /// Offline takes effect immediately. Online falls back to Poor and
    /// schedules a probe after `online_probe_delay`.
    pub fn set_platform_online(self: &Arc<Self>, online: bool) {
        let change = self.update(|s| {
            s.raw_online = online;
            if !online {
                s.verified_reachable = false;
            }
            s.quality = fallback_quality(online);
        });
        if let Some(change) = &change {
            tracing::info!(
                "platform reports {}",
                if online { "online" } else { "offline" }
            );
            self.listeners.notify(change);
        }

        if online && change.is_some() {
            let monitor = Arc::clone(self);
            let delay = self.config.online_probe_delay;
            tokio::spawn(async move {
                tokio::select! {
                    _ = monitor.cancel.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {
                        if monitor.is_platform_online() {
                            monitor.check_quality_now().await;
                        }
                    }
                }
            });
        }
    }

    /// Probe now and return the resulting quality.
    pub async fn check_quality_now(&self) -> Quality {
        if !self.is_platform_online() {
            self.apply(|s| s.quality = Quality::Offline);
            return Quality::Offline;
        }
        if self.probes.is_empty() {
            self.apply(|s| s.quality = Quality::Good);
            return Quality::Good;
        }

        for probe in &self.probes {
            let start = Instant::now();
            match tokio::time::timeout(self.config.probe_timeout, probe.probe()).await {
                Ok(Ok(())) => {
                    let latency = start.elapsed();
                    let quality = self.config.bucket(latency);
                    if latency >= self.config.degraded_latency {
                        tracing::debug!("probe {} degraded: {:?}", probe.name(), latency);
                    }
                    self.apply(|s| {
                        s.quality = quality;
                        s.verified_reachable = true;
                        s.last_success_at = Some(Utc::now());
                        s.consecutive_failures = 0;
                    });
                    return quality;
                }
                Ok(Err(e)) => tracing::debug!("probe {} failed: {}", probe.name(), e),
                Err(_) => tracing::debug!("probe {} timed out", probe.name()),
            }
        }

        let quality = fallback_quality(self.is_platform_online());
        self.apply(|s| {
            s.quality = quality;
            s.verified_reachable = false;
            s.last_failure_at = Some(Utc::now());
            s.consecutive_failures = s.consecutive_failures.saturating_add(1);
        });
        quality
    }

    /// Note that a real remote call got through.
    pub fn record_remote_success(&self) {
        self.apply(|s| {
            s.verified_reachable = true;
            s.last_success_at = Some(Utc::now());
            s.consecutive_failures = 0;
        });
    }

    /// Note that a real remote call failed for connectivity reasons.
    pub fn record_remote_failure(&self) {
        self.apply(|s| {
            s.verified_reachable = false;
            s.last_failure_at = Some(Utc::now());
            s.consecutive_failures = s.consecutive_failures.saturating_add(1);
        });
    }

    /// Mutate state and notify listeners if quality, reachability or the raw
    /// flag changed.
    fn apply(&self, f: impl FnOnce(&mut ConnectionState)) {
        if let Some(change) = self.update(f) {
            self.listeners.notify(&change);
        }
    }

    fn update(&self, f: impl FnOnce(&mut ConnectionState)) -> Option<ConnectivityChange> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let previous = state.status.clone();
        f(&mut state.status);
        let current = state.status.clone();
        let transitioned =
            previous.quality != current.quality || previous.raw_online != current.raw_online;
        if !transitioned {
            if previous.verified_reachable == current.verified_reachable {
                return None;
            }
            return Some(ConnectivityChange { previous, current });
        }

        state.last_transition = Some(Instant::now());
        if previous.quality != current.quality {
            match current.quality {
                Quality::Good => {
                    tracing::info!("connection quality {} -> {}", previous.quality, current.quality)
                }
                Quality::Poor | Quality::Offline => {
                    tracing::warn!("connection quality {} -> {}", previous.quality, current.quality)
                }
            }
        }
        Some(ConnectivityChange { previous, current })
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MonitorState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
#[path = "connectivity_tests.rs"]
mod tests;
