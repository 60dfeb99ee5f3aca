// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! In-process remote store.
//!
//! Mirrors the reference server's semantics (validation, conflict on
//! duplicate create, not-found on missing targets, patch merge, server
//! version counter) and adds scripted failure injection so the sync engine
//! can be exercised without sockets.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::{json, Value};

use sb_core::{validate_record, EntityType, Record, RemoteErrorKind};

use super::remote::{RemoteError, RemoteFuture, RemoteResult, RemoteStore};

/// A call observed by [`MemoryRemote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Ping,
    Create(EntityType, String),
    Update(EntityType, String),
    Delete(EntityType, String),
    List(EntityType),
}

impl RemoteCall {
    /// Returns true for create/update/delete.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            RemoteCall::Create(..) | RemoteCall::Update(..) | RemoteCall::Delete(..)
        )
    }

    fn entity_id(&self) -> Option<&str> {
        match self {
            RemoteCall::Create(_, id) | RemoteCall::Update(_, id) | RemoteCall::Delete(_, id) => {
                Some(id)
            }
            RemoteCall::Ping | RemoteCall::List(_) => None,
        }
    }
}

#[derive(Default)]
struct Inner {
    tables: HashMap<EntityType, BTreeMap<String, Record>>,
    calls: Vec<RemoteCall>,
    /// Entity ids whose writes always fail with the given kind.
    poisoned: HashMap<String, RemoteErrorKind>,
    /// One-shot failures consumed by the next calls of any kind.
    scripted: VecDeque<RemoteErrorKind>,
    latency: Duration,
}

/// Remote store double backed by in-memory tables.
///
/// Clones share state, so a test can keep a handle while the engine owns
/// another.
#[derive(Clone, Default)]
pub struct MemoryRemote {
    inner: Arc<Mutex<Inner>>,
    unreachable: Arc<AtomicBool>,
}

impl MemoryRemote {
    /// Create an empty, reachable store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every call fail transiently (or succeed again).
    pub fn set_reachable(&self, reachable: bool) {
        self.unreachable.store(!reachable, Ordering::SeqCst);
    }

    /// Fail every write to `entity_id` with `kind` until cleared.
    pub fn fail_entity(&self, entity_id: impl Into<String>, kind: RemoteErrorKind) {
        self.lock().poisoned.insert(entity_id.into(), kind);
    }

    /// Stop failing writes to `entity_id`.
    pub fn clear_entity_failure(&self, entity_id: &str) {
        self.lock().poisoned.remove(entity_id);
    }

    /// Fail the next `count` calls with `kind`.
    pub fn fail_next(&self, kind: RemoteErrorKind, count: usize) {
        let mut inner = self.lock();
        for _ in 0..count {
            inner.scripted.push_back(kind);
        }
    }

    /// Delay every call by `latency` before it is handled.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Seed a record directly, bypassing validation and call recording.
    pub fn insert(&self, entity: EntityType, record: Record) {
        self.lock()
            .tables
            .entry(entity)
            .or_default()
            .insert(record.id.clone(), record);
    }

    /// All stored records of a type, ordered by id.
    pub fn records(&self, entity: EntityType) -> Vec<Record> {
        self.lock()
            .tables
            .get(&entity)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    /// A stored record by id.
    pub fn record(&self, entity: EntityType, id: &str) -> Option<Record> {
        self.lock().tables.get(&entity)?.get(id).cloned()
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.lock().calls.clone()
    }

    /// Number of write calls received so far.
    pub fn write_count(&self) -> usize {
        self.lock().calls.iter().filter(|c| c.is_write()).count()
    }

    /// Number of write calls that targeted `entity_id`.
    pub fn writes_for(&self, entity_id: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.entity_id() == Some(entity_id))
            .count()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Shared preamble: latency, reachability, call log, injected failures.
    async fn admit(&self, call: RemoteCall) -> RemoteResult<()> {
        let latency = self.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(RemoteError::transient("remote unreachable"));
        }

        let mut inner = self.lock();
        let target = call.entity_id().map(str::to_string);
        inner.calls.push(call);
        if let Some(kind) = inner.scripted.pop_front() {
            return Err(RemoteError::new(kind, "injected failure"));
        }
        if let Some(kind) = target.and_then(|id| inner.poisoned.get(&id).copied()) {
            return Err(RemoteError::new(kind, "injected failure"));
        }
        Ok(())
    }
}

fn next_version(record: &Record) -> Value {
    let current = record
        .fields
        .get("version")
        .and_then(Value::as_i64)
        .unwrap_or(0);
    json!(current + 1)
}

impl RemoteStore for MemoryRemote {
    fn ping(&self) -> RemoteFuture<'_, ()> {
        Box::pin(async move { self.admit(RemoteCall::Ping).await })
    }

    fn create(&self, entity: EntityType, record: Record) -> RemoteFuture<'_, Record> {
        Box::pin(async move {
            self.admit(RemoteCall::Create(entity, record.id.clone()))
                .await?;
            validate_record(entity, &record)
                .map_err(|msg| RemoteError::new(RemoteErrorKind::Validation, msg))?;

            let mut inner = self.lock();
            let table = inner.tables.entry(entity).or_default();
            if table.contains_key(&record.id) {
                return Err(RemoteError::new(
                    RemoteErrorKind::Conflict,
                    format!("{} already exists", record.id),
                ));
            }
            let mut stored = record;
            stored.fields.insert("version".into(), json!(1));
            table.insert(stored.id.clone(), stored.clone());
            Ok(stored)
        })
    }

    fn update(&self, entity: EntityType, record: Record) -> RemoteFuture<'_, Record> {
        Box::pin(async move {
            self.admit(RemoteCall::Update(entity, record.id.clone()))
                .await?;

            let mut inner = self.lock();
            let table = inner.tables.entry(entity).or_default();
            let existing = table.get(&record.id).ok_or_else(|| {
                RemoteError::new(
                    RemoteErrorKind::NotFound,
                    format!("{} not found", record.id),
                )
            })?;
            let mut stored = existing.patched(&record.fields);
            validate_record(entity, &stored)
                .map_err(|msg| RemoteError::new(RemoteErrorKind::Validation, msg))?;
            stored
                .fields
                .insert("version".into(), next_version(existing));
            table.insert(stored.id.clone(), stored.clone());
            Ok(stored)
        })
    }

    fn delete(&self, entity: EntityType, id: String) -> RemoteFuture<'_, ()> {
        Box::pin(async move {
            self.admit(RemoteCall::Delete(entity, id.clone())).await?;

            let mut inner = self.lock();
            match inner.tables.entry(entity).or_default().remove(&id) {
                Some(_) => Ok(()),
                None => Err(RemoteError::new(
                    RemoteErrorKind::NotFound,
                    format!("{} not found", id),
                )),
            }
        })
    }

    fn list(&self, entity: EntityType) -> RemoteFuture<'_, Vec<Record>> {
        Box::pin(async move {
            self.admit(RemoteCall::List(entity)).await?;
            Ok(self.records(entity))
        })
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
