// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Background tasks that keep the data manager in sync.
//!
//! - Connectivity monitor tasks (platform listener, periodic probe)
//! - Debounced reconciliation after the link comes back online or the
//!   remote becomes reachable again
//! - Periodic retry of a non-empty queue while the link is up
//! - Storage watcher that reloads commits made by other instances

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::connectivity::Quality;
use super::events::ListenerId;
use super::manager::DataManager;

/// Handle to the running background tasks.
pub struct SyncEngine {
    manager: Arc<DataManager>,
    cancel: CancellationToken,
    online_listener: ListenerId,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncEngine {
    /// Start every background task for `manager`.
    pub fn start(manager: Arc<DataManager>) -> Self {
        let cancel = CancellationToken::new();
        manager.monitor().initialize();

        let (online_tx, online_rx) = mpsc::channel::<()>(4);
        let online_listener = manager.monitor().add_listener(move |change| {
            // An outage that never reached Offline ends with reachability
            // coming back rather than with a transition out of Offline
            if change.came_online() || change.became_reachable() {
                // A full channel already holds a pending trigger
                let _ = online_tx.try_send(());
            }
        });

        let tasks = vec![
            tokio::spawn(debounced_reconcile(
                Arc::clone(&manager),
                online_rx,
                cancel.clone(),
            )),
            tokio::spawn(retry_pending(Arc::clone(&manager), cancel.clone())),
            tokio::spawn(watch_storage(Arc::clone(&manager), cancel.clone())),
        ];

        SyncEngine {
            manager,
            cancel,
            online_listener,
            tasks,
        }
    }

    /// The manager this engine drives.
    pub fn manager(&self) -> &Arc<DataManager> {
        &self.manager
    }

    /// A token cancelled when the engine shuts down.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop all background tasks and wait for them to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.manager.monitor().shutdown();
        self.manager.monitor().remove_listener(self.online_listener);
        for task in self.tasks {
            let _ = task.await;
        }
        tracing::debug!("sync engine stopped");
    }
}

/// Reconcile once the link has stayed up for the debounce period.
async fn debounced_reconcile(
    manager: Arc<DataManager>,
    mut online_rx: mpsc::Receiver<()>,
    cancel: CancellationToken,
) {
    let debounce = manager.settings().reconcile_debounce;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            trigger = online_rx.recv() => {
                if trigger.is_none() {
                    return;
                }
            }
        }

        // Restart the timer on every further trigger
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(debounce) => break,
                trigger = online_rx.recv() => {
                    if trigger.is_none() {
                        return;
                    }
                }
            }
        }

        if !manager.monitor().is_platform_online() {
            continue;
        }
        tracing::info!("link restored, reconciling");
        match manager.sync_now().await {
            Ok(report) => tracing::debug!("online reconcile: {:?}", report),
            Err(e) => tracing::warn!("online reconcile failed: {}", e),
        }
    }
}

/// Retry a non-empty queue on a timer while the link is up.
async fn retry_pending(manager: Arc<DataManager>, cancel: CancellationToken) {
    let period = manager.settings().retry_interval;
    if period.is_zero() {
        return;
    }

    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        if manager.queue().is_empty() || manager.monitor().quality() == Quality::Offline {
            continue;
        }
        tracing::debug!("retrying {} pending operation(s)", manager.queue().len());
        if let Err(e) = manager.sync_now().await {
            tracing::debug!("periodic reconcile failed: {}", e);
        }
    }
}

/// Reload queue and cache when another instance commits to storage.
async fn watch_storage(manager: Arc<DataManager>, cancel: CancellationToken) {
    let storage = Arc::clone(manager.storage());
    let mut last = match storage.change_token() {
        Ok(token) => token,
        Err(e) => {
            tracing::warn!("storage watcher disabled: {}", e);
            return;
        }
    };

    let mut ticker = tokio::time::interval(manager.settings().storage_poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let token = match storage.change_token() {
            Ok(token) => token,
            Err(e) => {
                tracing::debug!("change token unavailable: {}", e);
                continue;
            }
        };
        if token != last {
            last = token;
            tracing::debug!("storage changed, reloading");
            manager.reload_from_storage();
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
