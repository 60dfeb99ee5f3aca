// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for sync module tests.

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};
use tokio::sync::watch;

use sb_core::{EntityType, MemoryStorage, OpKind, OpPayload};

use super::connectivity::ProbeStrategy;
use super::events::DataEvent;
use super::manager::DataManager;
use super::memory::MemoryRemote;
use super::EngineSettings;

/// Turn a `json!({...})` literal into a field map.
pub fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// A data manager wired to in-memory storage and an in-memory remote.
pub struct TestRig {
    pub manager: Arc<DataManager>,
    pub remote: MemoryRemote,
    pub storage: MemoryStorage,
    pub platform: watch::Sender<bool>,
}

impl TestRig {
    /// Rig with default settings.
    pub fn new(online: bool) -> Self {
        Self::with_settings(online, EngineSettings::default())
    }

    pub fn with_settings(online: bool, settings: EngineSettings) -> Self {
        let storage = MemoryStorage::new();
        Self::on_storage(storage, MemoryRemote::new(), online, settings)
    }

    /// Rig sharing storage and remote with another rig.
    pub fn on_storage(
        storage: MemoryStorage,
        remote: MemoryRemote,
        online: bool,
        settings: EngineSettings,
    ) -> Self {
        Self::build(storage, remote, online, settings, vec![])
    }

    /// Rig whose monitor runs the given reachability checks.
    pub fn with_probes(
        online: bool,
        settings: EngineSettings,
        probes: Vec<Box<dyn ProbeStrategy>>,
    ) -> Self {
        Self::build(MemoryStorage::new(), MemoryRemote::new(), online, settings, probes)
    }

    fn build(
        storage: MemoryStorage,
        remote: MemoryRemote,
        online: bool,
        settings: EngineSettings,
        probes: Vec<Box<dyn ProbeStrategy>>,
    ) -> Self {
        let (platform, rx) = watch::channel(online);
        let manager = DataManager::new(
            Arc::new(storage.clone()),
            Arc::new(remote.clone()),
            rx,
            probes,
            settings,
        );
        TestRig {
            manager,
            remote,
            storage,
            platform,
        }
    }

    /// Flip the platform flag as the host would.
    pub fn set_online(&self, online: bool) {
        self.manager.monitor().set_platform_online(online);
    }

    /// Enqueue an operation directly, bypassing the cache.
    pub fn enqueue(&self, entity: EntityType, kind: OpKind, id: &str, value: Option<Value>) -> String {
        let payload = match value {
            Some(value) => OpPayload::with_fields(id, fields(value)),
            None => OpPayload::id_only(id),
        };
        self.manager.queue().enqueue(entity, kind, payload).unwrap()
    }

    /// Record every data event the manager emits.
    pub fn record_events(&self) -> Arc<Mutex<Vec<DataEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _subscription = self
            .manager
            .subscribe(move |event| sink.lock().unwrap().push(event.clone()));
        seen
    }
}
