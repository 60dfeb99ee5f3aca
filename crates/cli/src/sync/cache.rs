// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Local read cache of records per entity type.
//!
//! The cache is the only thing reads ever touch. It is persisted as one JSON
//! object under the `cache` key; unreadable content loads as empty. Writes
//! re-read the committed object in the same storage transaction, so another
//! instance's records survive our edits.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sb_core::{keys, EntityType, LocalStorage, OpKind, OpPayload, Record};

/// Error type for cache persistence.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("storage error: {0}")]
    Storage(#[from] sb_core::Error),
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cached records of one entity type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub records: BTreeMap<String, Record>,
    pub updated_at: Option<DateTime<Utc>>,
}

type Snapshot = HashMap<EntityType, CacheEntry>;

/// Persisted per-entity record cache.
pub struct LocalCache {
    storage: Arc<dyn LocalStorage>,
    entries: Mutex<Snapshot>,
}

impl LocalCache {
    /// Open the cache, loading whatever the storage holds.
    pub fn open(storage: Arc<dyn LocalStorage>) -> Self {
        let entries = load(storage.as_ref());
        LocalCache {
            storage,
            entries: Mutex::new(entries),
        }
    }

    /// All cached records of a type, ordered by id.
    pub fn get_all(&self, entity: EntityType) -> Vec<Record> {
        self.lock()
            .get(&entity)
            .map(|e| e.records.values().cloned().collect())
            .unwrap_or_default()
    }

    /// A cached record by id.
    pub fn get(&self, entity: EntityType, id: &str) -> Option<Record> {
        self.lock().get(&entity)?.records.get(id).cloned()
    }

    /// Returns true if the record is cached.
    pub fn contains(&self, entity: EntityType, id: &str) -> bool {
        self.get(entity, id).is_some()
    }

    /// When the type was last written.
    pub fn updated_at(&self, entity: EntityType) -> Option<DateTime<Utc>> {
        self.lock().get(&entity)?.updated_at
    }

    /// Insert or replace a record.
    pub fn upsert(&self, entity: EntityType, record: Record) -> CacheResult<()> {
        self.mutate(|snapshot| {
            let entry = snapshot.entry(entity).or_default();
            entry.records.insert(record.id.clone(), record.clone());
            entry.updated_at = Some(Utc::now());
        })
    }

    /// Drop a record. Removing a missing record is not an error.
    pub fn remove(&self, entity: EntityType, id: &str) -> CacheResult<()> {
        self.mutate(|snapshot| {
            let entry = snapshot.entry(entity).or_default();
            entry.records.remove(id);
            entry.updated_at = Some(Utc::now());
        })
    }

    /// Apply a queued mutation optimistically.
    pub fn apply_local(&self, entity: EntityType, kind: OpKind, payload: &OpPayload) -> CacheResult<()> {
        self.mutate(|snapshot| {
            let entry = snapshot.entry(entity).or_default();
            overlay(&mut entry.records, kind, payload);
            entry.updated_at = Some(Utc::now());
        })
    }

    /// Replace every record of a type, then re-apply `pending` on top.
    pub fn replace_all(
        &self,
        entity: EntityType,
        records: Vec<Record>,
        pending: &[(OpKind, OpPayload)],
    ) -> CacheResult<()> {
        self.mutate(|snapshot| {
            let mut fresh: BTreeMap<String, Record> = records
                .iter()
                .map(|record| (record.id.clone(), record.clone()))
                .collect();
            for (kind, payload) in pending {
                overlay(&mut fresh, *kind, payload);
            }
            snapshot.insert(
                entity,
                CacheEntry {
                    records: fresh,
                    updated_at: Some(Utc::now()),
                },
            );
        })
    }

    /// Re-read the cache from storage, discarding the in-memory copy.
    pub fn reload(&self) {
        let loaded = load(self.storage.as_ref());
        *self.lock() = loaded;
    }

    /// Apply `f` to the committed snapshot and persist it atomically.
    ///
    /// The in-memory copy is only replaced once the write has landed.
    fn mutate(&self, mut f: impl FnMut(&mut Snapshot)) -> CacheResult<()> {
        let mut entries = self.lock();
        let mut committed = None;
        self.storage.update(
            keys::CACHE,
            &mut |raw: Option<String>| -> sb_core::Result<Option<String>> {
                let mut fresh = raw.as_deref().map(parse).unwrap_or_default();
                f(&mut fresh);
                let json = serde_json::to_string(&fresh)?;
                committed = Some(fresh);
                Ok(Some(json))
            },
        )?;
        if let Some(fresh) = committed {
            *entries = fresh;
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Apply one mutation to a record map.
pub(crate) fn overlay(records: &mut BTreeMap<String, Record>, kind: OpKind, payload: &OpPayload) {
    let id = payload.entity_id.clone();
    match kind {
        OpKind::Insert => {
            let fields = payload.fields.clone().unwrap_or_default();
            records.insert(id.clone(), Record::new(id, fields));
        }
        OpKind::Update => {
            let patch = payload.fields.clone().unwrap_or_default();
            let next = match records.get(&id) {
                Some(existing) => existing.patched(&patch),
                None => Record::new(id.clone(), patch),
            };
            records.insert(id, next);
        }
        OpKind::Delete => {
            records.remove(&id);
        }
    }
}

fn load(storage: &dyn LocalStorage) -> Snapshot {
    match storage.get(keys::CACHE) {
        Ok(Some(raw)) => parse(&raw),
        Ok(None) => Snapshot::new(),
        Err(e) => {
            tracing::warn!("failed to read cache: {}", e);
            Snapshot::new()
        }
    }
}

fn parse(raw: &str) -> Snapshot {
    match serde_json::from_str(raw) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::warn!("cache is unreadable, starting empty: {}", e);
            Snapshot::new()
        }
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
