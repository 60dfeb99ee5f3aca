// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The data manager: the one entry point the rest of the application uses.
//!
//! Reads come from the local cache and never fail. Writes update the cache
//! and enqueue the durable intent under one lock, then return without
//! waiting for the remote store.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::watch;

use sb_core::{EntityType, LocalStorage, OpKind, OpPayload, Record};

use super::cache::LocalCache;
use super::connection::ConnectionManager;
use super::connectivity::{ConnectivityMonitor, ProbeStrategy, Quality};
use super::events::{DataEvent, Listeners, Subscription};
use super::queue::MutationQueue;
use super::reconcile::{Reconciler, SyncError, SyncReport};
use super::remote::RemoteStore;
use super::EngineSettings;
use crate::error::{Error, Result};
use crate::id::generate_record_id;

/// What `sync_status` reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatus {
    pub is_online: bool,
    pub quality: Quality,
    pub last_sync: Option<DateTime<Utc>>,
    pub pending_count: usize,
}

/// Result of [`DataManager::force_refresh`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshOutcome {
    /// Report of the reconciliation pass, if one ran.
    pub report: Option<SyncReport>,
    /// True if the cache was reloaded from the remote store.
    pub reloaded: bool,
    /// Why the refresh fell back to the persisted cache.
    pub error: Option<SyncError>,
}

/// Facade over cache, queue and reconciler.
pub struct DataManager {
    storage: Arc<dyn LocalStorage>,
    monitor: Arc<ConnectivityMonitor>,
    connection: Arc<ConnectionManager>,
    queue: Arc<MutationQueue>,
    cache: Arc<LocalCache>,
    reconciler: Arc<Reconciler>,
    events: Arc<Listeners<DataEvent>>,
    settings: EngineSettings,
    /// Serializes local writes with the reconciler settling applied ops.
    write_lock: Arc<Mutex<()>>,
}

impl DataManager {
    /// Wire up the engine's services.
    ///
    /// Background tasks are not started here; see
    /// [`SyncEngine::start`](super::SyncEngine::start).
    pub fn new(
        storage: Arc<dyn LocalStorage>,
        remote: Arc<dyn RemoteStore>,
        platform: watch::Receiver<bool>,
        probes: Vec<Box<dyn ProbeStrategy>>,
        settings: EngineSettings,
    ) -> Arc<Self> {
        let monitor = Arc::new(ConnectivityMonitor::new(
            settings.monitor.clone(),
            probes,
            platform,
        ));
        let connection = Arc::new(ConnectionManager::new(
            settings.connection.clone(),
            remote,
            Arc::clone(&monitor),
        ));

        // Platform transitions invalidate whatever the gate believed; a
        // successful reachability check lifts any cooldown left from an outage
        let gate = Arc::downgrade(&connection);
        let _ = monitor.add_listener(move |change| {
            let Some(gate) = gate.upgrade() else {
                return;
            };
            if change.platform_changed() {
                gate.reset_connection_state();
            } else if change.became_reachable() {
                gate.clear_block();
            }
        });

        let queue = Arc::new(MutationQueue::open(Arc::clone(&storage)));
        let cache = Arc::new(LocalCache::open(Arc::clone(&storage)));
        let events = Arc::new(Listeners::new());
        let write_lock = Arc::new(Mutex::new(()));
        let reconciler = Arc::new(
            Reconciler::new(
                Arc::clone(&queue),
                Arc::clone(&cache),
                Arc::clone(&connection),
                Arc::clone(&storage),
                Arc::clone(&events),
                settings.max_retries,
            )
            .with_write_lock(Arc::clone(&write_lock)),
        );

        Arc::new(DataManager {
            storage,
            monitor,
            connection,
            queue,
            cache,
            reconciler,
            events,
            settings,
            write_lock,
        })
    }

    /// All cached records of a type.
    pub fn get_all(&self, entity: EntityType) -> Vec<Record> {
        self.cache.get_all(entity)
    }

    /// A cached record by id.
    pub fn get(&self, entity: EntityType, id: &str) -> Option<Record> {
        self.cache.get(entity, id)
    }

    /// Create a record locally and queue it for the remote store.
    pub fn create(&self, entity: EntityType, fields: Map<String, Value>) -> Result<Record> {
        let _guard = self.write_guard();
        let now = Utc::now();
        let seed = Value::Object(fields.clone()).to_string();
        let id = generate_record_id(entity, &seed, &now, |candidate| {
            self.cache.contains(entity, candidate)
                || !self.queue.pending_for(entity, candidate).is_empty()
        });
        let payload = OpPayload::with_fields(id.clone(), fields);

        self.cache.apply_local(entity, OpKind::Insert, &payload)?;
        if let Err(e) = self.queue.enqueue(entity, OpKind::Insert, payload.clone()) {
            self.cache.remove(entity, &id)?;
            return Err(e.into());
        }
        self.events.notify(&DataEvent::Changed { entity });

        Ok(self
            .cache
            .get(entity, &id)
            .unwrap_or_else(|| Record::new(id, payload.fields.unwrap_or_default())))
    }

    /// Patch a cached record and queue the patch.
    pub fn update(&self, entity: EntityType, id: &str, fields: Map<String, Value>) -> Result<Record> {
        let _guard = self.write_guard();
        let previous = self.require(entity, id)?;
        let payload = OpPayload::with_fields(id, fields);

        self.cache.apply_local(entity, OpKind::Update, &payload)?;
        if let Err(e) = self.queue.enqueue(entity, OpKind::Update, payload) {
            self.cache.upsert(entity, previous)?;
            return Err(e.into());
        }
        self.events.notify(&DataEvent::Changed { entity });

        self.require(entity, id)
    }

    /// Remove a cached record and queue the delete.
    pub fn delete(&self, entity: EntityType, id: &str) -> Result<()> {
        let _guard = self.write_guard();
        let previous = self.require(entity, id)?;
        let payload = OpPayload::id_only(id);

        self.cache.apply_local(entity, OpKind::Delete, &payload)?;
        if let Err(e) = self.queue.enqueue(entity, OpKind::Delete, payload) {
            self.cache.upsert(entity, previous)?;
            return Err(e.into());
        }
        self.events.notify(&DataEvent::Changed { entity });
        Ok(())
    }

    /// Connectivity, last sync time and queue depth.
    pub fn sync_status(&self) -> SyncStatus {
        let quality = self.monitor.quality();
        SyncStatus {
            is_online: quality != Quality::Offline,
            quality,
            last_sync: self.reconciler.last_sync(),
            pending_count: self.queue.len(),
        }
    }

    /// Run (or join) a reconciliation pass.
    pub async fn sync_now(&self) -> std::result::Result<SyncReport, SyncError> {
        self.reconciler.reconcile().await
    }

    /// Forget connection backoff state, then reconcile.
    pub async fn retry_now(&self) -> std::result::Result<SyncReport, SyncError> {
        self.connection.reset_connection_state();
        self.sync_now().await
    }

    /// Reconcile, then reload every entity type from the remote store.
    ///
    /// If either step fails the persisted cache keeps serving reads and the
    /// failure is reported in the outcome.
    pub async fn force_refresh(&self) -> RefreshOutcome {
        let report = match self.sync_now().await {
            Ok(report) => report,
            Err(e) => {
                tracing::info!("refresh serving cached data: {}", e);
                return RefreshOutcome {
                    report: None,
                    reloaded: false,
                    error: Some(e),
                };
            }
        };

        match self.reload_from_remote().await {
            Ok(()) => RefreshOutcome {
                report: Some(report),
                reloaded: true,
                error: None,
            },
            Err(e) => {
                tracing::info!("refresh serving cached data: {}", e);
                RefreshOutcome {
                    report: Some(report),
                    reloaded: false,
                    error: Some(e),
                }
            }
        }
    }

    async fn reload_from_remote(&self) -> std::result::Result<(), SyncError> {
        self.connection.ensure_connection().await?;

        let remote = Arc::clone(self.connection.remote());
        let mut fetched = Vec::with_capacity(EntityType::ALL.len());
        for entity in EntityType::ALL {
            let label = format!("list {}", entity);
            let records = self
                .connection
                .execute_with_retry(&label, || remote.list(entity))
                .await?;
            fetched.push((entity, records));
        }

        // Local writes made while listing must not be lost
        let guard = self.write_guard();
        let pending = self.queue.list();
        for (entity, records) in fetched {
            let overlay: Vec<_> = pending
                .iter()
                .filter(|op| op.entity_type == entity)
                .map(|op| (op.kind, op.payload.clone()))
                .collect();
            self.cache.replace_all(entity, records, &overlay)?;
        }
        drop(guard);

        tracing::info!("cache reloaded from remote");
        self.events.notify(&DataEvent::Reloaded);
        Ok(())
    }

    /// Pick up queue and cache commits made by another instance.
    pub fn reload_from_storage(&self) {
        let guard = self.write_guard();
        self.queue.reload();
        self.cache.reload();
        drop(guard);
        self.events.notify(&DataEvent::Reloaded);
    }

    /// Listen for data events until the subscription is cancelled.
    pub fn subscribe(&self, listener: impl Fn(&DataEvent) + Send + Sync + 'static) -> Subscription {
        let id = self.events.add(listener);
        Subscription::new(id, &self.events)
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    pub fn queue(&self) -> &Arc<MutationQueue> {
        &self.queue
    }

    pub fn cache(&self) -> &Arc<LocalCache> {
        &self.cache
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn storage(&self) -> &Arc<dyn LocalStorage> {
        &self.storage
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn require(&self, entity: EntityType, id: &str) -> Result<Record> {
        self.cache.get(entity, id).ok_or_else(|| Error::RecordNotFound {
            entity,
            id: id.to_string(),
        })
    }

    fn write_guard(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
