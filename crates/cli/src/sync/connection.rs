// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Retrying connection gate in front of the remote store.
//!
//! Every remote call made by the sync engine goes through the
//! [`ConnectionManager`], which verifies reachability with escalating
//! timeouts, caches a successful check for a short TTL, backs off between
//! attempts, and refuses to do any I/O while a cooldown is active.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

use super::connectivity::ConnectivityMonitor;
use super::remote::{ErrorClass, RemoteError, RemoteResult, RemoteStore};

/// Configuration for the connection manager.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Attempts per `ensure_connection` / `execute_with_retry` call.
    pub attempts: u32,
    /// Ping timeout per attempt; the last entry repeats.
    pub probe_timeouts: Vec<Duration>,
    /// Sleep after each failed attempt; the last entry repeats.
    pub backoff: Vec<Duration>,
    /// How long a successful check is trusted.
    pub connected_ttl: Duration,
    /// Consecutive failures that trigger a cooldown (0 disables).
    pub cooldown_after_failures: u32,
    /// Length of the automatic cooldown.
    pub cooldown: Duration,
    /// Timeout for the wrapped operation itself.
    pub call_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            probe_timeouts: vec![Duration::from_secs(8), Duration::from_secs(12)],
            backoff: vec![
                Duration::from_secs(1),
                Duration::from_secs(3),
                Duration::from_secs(5),
            ],
            connected_ttl: Duration::from_secs(30),
            cooldown_after_failures: 5,
            cooldown: Duration::from_secs(60),
            call_timeout: Duration::from_secs(15),
        }
    }
}

impl ConnectionConfig {
    fn probe_timeout(&self, attempt: u32) -> Duration {
        pick(&self.probe_timeouts, attempt).unwrap_or(Duration::from_secs(8))
    }

    fn backoff_after(&self, attempt: u32) -> Duration {
        pick(&self.backoff, attempt).unwrap_or(Duration::from_secs(1))
    }
}

/// Index into an escalation table, clamping to its last entry.
fn pick(table: &[Duration], attempt: u32) -> Option<Duration> {
    let idx = (attempt as usize).min(table.len().saturating_sub(1));
    table.get(idx).copied()
}

/// Failure surfaced by the connection manager.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConnectionError {
    #[error("remote unreachable after {attempts} attempt(s): {last}")]
    Unreachable { attempts: u32, last: RemoteError },

    #[error("remote calls blocked for another {}s", .remaining.as_secs())]
    Blocked { remaining: Duration },

    #[error("device is offline")]
    Offline,

    #[error("{label} failed: {source}")]
    Remote {
        label: String,
        #[source]
        source: RemoteError,
    },
}

impl ConnectionError {
    /// How the sync engine should treat this failure.
    pub fn class(&self) -> ErrorClass {
        match self {
            ConnectionError::Unreachable { .. } | ConnectionError::Offline => {
                ErrorClass::Transient
            }
            ConnectionError::Blocked { .. } => ErrorClass::Blocked,
            ConnectionError::Remote { source, .. } => ErrorClass::of(source.kind),
        }
    }

    /// True if the failure is about the link rather than a specific request.
    pub fn is_connectivity(&self) -> bool {
        !matches!(self, ConnectionError::Remote { .. })
    }
}

/// Why a single attempt failed.
enum Failure {
    /// Blocked or offline; no I/O was attempted.
    Gate(ConnectionError),
    /// The reachability check failed.
    Ping(RemoteError),
    /// The wrapped operation failed.
    Op(RemoteError),
}

#[derive(Default)]
struct GateState {
    connected_until: Option<Instant>,
    blocked_until: Option<Instant>,
    consecutive_failures: u32,
}

/// Gate that verifies reachability before remote calls.
pub struct ConnectionManager {
    config: ConnectionConfig,
    remote: Arc<dyn RemoteStore>,
    monitor: Arc<ConnectivityMonitor>,
    state: Mutex<GateState>,
}

impl ConnectionManager {
    pub fn new(
        config: ConnectionConfig,
        remote: Arc<dyn RemoteStore>,
        monitor: Arc<ConnectivityMonitor>,
    ) -> Self {
        ConnectionManager {
            config,
            remote,
            monitor,
            state: Mutex::new(GateState::default()),
        }
    }

    /// The remote store this manager guards.
    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    /// The monitor consulted for the platform flag.
    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    /// Verify the remote is reachable, retrying with backoff.
    pub async fn ensure_connection(&self) -> Result<(), ConnectionError> {
        self.execute_with_retry("connect", || std::future::ready(Ok(())))
            .await
    }

    /// Run `op` behind a connection check, retrying the pair on transient
    /// failures.
    ///
    /// Non-transient remote errors propagate on the first occurrence.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        label: &str,
        mut op: F,
    ) -> Result<T, ConnectionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RemoteResult<T>>,
    {
        let attempts = self.config.attempts.max(1);
        let mut last = RemoteError::transient("no attempt made");

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.config.backoff_after(attempt - 1);
                tracing::debug!("{}: retrying in {:?} (attempt {})", label, delay, attempt + 1);
                tokio::time::sleep(delay).await;
            }

            match self.attempt(label, attempt, op()).await {
                Ok(value) => return Ok(value),
                Err(Failure::Gate(e)) => return Err(e),
                Err(Failure::Ping(e)) if !e.is_transient() => {
                    return Err(ConnectionError::Remote {
                        label: "ping".to_string(),
                        source: e,
                    })
                }
                Err(Failure::Op(e)) if !e.is_transient() => {
                    return Err(ConnectionError::Remote {
                        label: label.to_string(),
                        source: e,
                    })
                }
                Err(Failure::Ping(e)) | Err(Failure::Op(e)) => {
                    tracing::debug!("{}: attempt {} failed: {}", label, attempt + 1, e);
                    last = e;
                }
            }
        }

        tracing::warn!("{}: giving up after {} attempts: {}", label, attempts, last);
        Err(ConnectionError::Unreachable { attempts, last })
    }

    /// Run `fut` once behind the connection gate.
    ///
    /// A failed reachability check is reported as `Unreachable`; a failure
    /// of `fut` itself as `Remote`.
    pub async fn call<T, Fut>(&self, label: &str, fut: Fut) -> Result<T, ConnectionError>
    where
        Fut: Future<Output = RemoteResult<T>>,
    {
        match self.attempt(label, 0, fut).await {
            Ok(value) => Ok(value),
            Err(Failure::Gate(e)) => Err(e),
            Err(Failure::Ping(e)) if e.is_transient() => {
                Err(ConnectionError::Unreachable { attempts: 1, last: e })
            }
            Err(Failure::Ping(e)) => Err(ConnectionError::Remote {
                label: "ping".to_string(),
                source: e,
            }),
            Err(Failure::Op(e)) => Err(ConnectionError::Remote {
                label: label.to_string(),
                source: e,
            }),
        }
    }

    /// Forget the cached check, the failure counter and any cooldown.
    pub fn reset_connection_state(&self) {
        let mut state = self.lock();
        *state = GateState::default();
        tracing::debug!("connection state reset");
    }

    /// Refuse all remote calls for `duration`.
    pub fn block_for(&self, duration: Duration) {
        let mut state = self.lock();
        state.blocked_until = Some(Instant::now() + duration);
        state.connected_until = None;
        tracing::warn!("remote calls blocked for {:?}", duration);
    }

    /// Lift a cooldown early.
    pub fn clear_block(&self) {
        self.lock().blocked_until = None;
    }

    /// Remaining cooldown, if one is active.
    pub fn blocked_remaining(&self) -> Option<Duration> {
        let until = self.lock().blocked_until?;
        let now = Instant::now();
        (until > now).then(|| until - now)
    }

    /// Returns true while a cooldown is active.
    pub fn is_blocked(&self) -> bool {
        self.blocked_remaining().is_some()
    }

    /// Returns true while a successful check is still trusted.
    pub fn is_connected(&self) -> bool {
        self.lock()
            .connected_until
            .is_some_and(|until| until > Instant::now())
    }

    /// Consecutive connectivity failures since the last success.
    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    async fn attempt<T, Fut>(&self, label: &str, attempt: u32, fut: Fut) -> Result<T, Failure>
    where
        Fut: Future<Output = RemoteResult<T>>,
    {
        if let Some(remaining) = self.blocked_remaining() {
            return Err(Failure::Gate(ConnectionError::Blocked { remaining }));
        }
        if !self.monitor.is_platform_online() {
            return Err(Failure::Gate(ConnectionError::Offline));
        }

        if !self.is_connected() {
            let timeout = self.config.probe_timeout(attempt);
            let ping = match tokio::time::timeout(timeout, self.remote.ping()).await {
                Ok(result) => result,
                Err(_) => Err(RemoteError::transient(format!(
                    "ping timed out after {:?}",
                    timeout
                ))),
            };
            match ping {
                Ok(()) => self.note_success(),
                Err(e) => {
                    if e.is_transient() {
                        self.note_failure();
                    }
                    return Err(Failure::Ping(e));
                }
            }
        }

        let result = match tokio::time::timeout(self.config.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::transient(format!(
                "{} timed out after {:?}",
                label, self.config.call_timeout
            ))),
        };
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                if e.is_transient() {
                    self.note_failure();
                }
                Err(Failure::Op(e))
            }
        }
    }

    fn note_success(&self) {
        {
            let mut state = self.lock();
            state.connected_until = Some(Instant::now() + self.config.connected_ttl);
            state.consecutive_failures = 0;
        }
        self.monitor.record_remote_success();
    }

    fn note_failure(&self) {
        {
            let mut state = self.lock();
            state.connected_until = None;
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            let threshold = self.config.cooldown_after_failures;
            if threshold > 0 && state.consecutive_failures >= threshold {
                state.blocked_until = Some(Instant::now() + self.config.cooldown);
                state.consecutive_failures = 0;
                tracing::warn!(
                    "{} consecutive failures, cooling down for {:?}",
                    threshold,
                    self.config.cooldown
                );
            }
        }
        self.monitor.record_remote_failure();
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
