// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Offline-first synchronization engine.
//!
//! Local writes land in the cache and the durable mutation queue at once;
//! the reconciler drains the queue against the remote store whenever the
//! connection allows.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ DataManager │────►│ Reconciler  │────►│ Connection  │────► RemoteStore
//! │  (facade)   │     │             │     │  Manager    │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!     │     │               │                    ▲
//!     ▼     ▼               ▼                    │
//! ┌───────┐ ┌───────┐  LocalStorage      ┌──────────────┐
//! │ Cache │ │ Queue │                    │ Connectivity │
//! └───────┘ └───────┘                    │   Monitor    │
//!                                        └──────────────┘
//! ```
//!
//! # Features
//!
//! - Optimistic writes persisted synchronously before returning
//! - Connectivity monitor with ordered probe strategies and quality buckets
//! - Connection gate with TTL cache, escalating backoff and cooldown
//! - Single-flight reconciliation with per-entity ordering and bounded retry
//! - Injectable remote store trait for testing

use std::time::Duration;

mod cache;
mod connection;
mod connectivity;
mod engine;
mod events;
mod manager;
mod memory;
mod queue;
mod reconcile;
mod remote;

pub use cache::{CacheEntry, CacheError, LocalCache};
pub use connection::{ConnectionConfig, ConnectionError, ConnectionManager};
pub use connectivity::{
    ConnectionState, ConnectivityChange, ConnectivityMonitor, MonitorConfig, ProbeFuture,
    ProbeStrategy, Quality, RemotePingProbe, TcpProbe,
};
pub use engine::SyncEngine;
pub use events::{DataEvent, ListenerId, Listeners, Subscription};
pub use manager::{DataManager, RefreshOutcome, SyncStatus};
pub use memory::{MemoryRemote, RemoteCall};
pub use queue::{MutationQueue, QueueError, QueueResult};
pub use reconcile::{Reconciler, SyncError, SyncIssue, SyncReport, DEFAULT_MAX_RETRIES};
pub use remote::{ErrorClass, RemoteError, RemoteFuture, RemoteResult, RemoteStore, WebSocketRemote};

/// Tunables for the whole engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub monitor: MonitorConfig,
    pub connection: ConnectionConfig,
    /// Retries before a queued operation is evicted.
    pub max_retries: u32,
    /// Quiet period after coming online before reconciling.
    pub reconcile_debounce: Duration,
    /// How often to look for commits by other instances.
    pub storage_poll: Duration,
    /// How often to retry a non-empty queue while the link is up; zero
    /// disables the timer.
    pub retry_interval: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            monitor: MonitorConfig::default(),
            connection: ConnectionConfig::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            reconcile_debounce: Duration::from_millis(1500),
            storage_poll: Duration::from_secs(2),
            retry_interval: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_helpers;

#[cfg(test)]
mod integration_tests;
