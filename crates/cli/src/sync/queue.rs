// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Durable queue of local mutations awaiting the remote store.
//!
//! The whole queue is stored as one JSON array under the `queue` key and
//! rewritten synchronously on every mutation, so a crash loses at most an
//! in-flight apply, never a committed intent. Every mutation re-reads the
//! committed array inside one storage transaction, so instances sharing a
//! store never overwrite each other's intents. Entries that fail to parse are
//! dropped individually; a blob that is not an array at all counts as empty.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde_json::Value;

use sb_core::storage::keys;
use sb_core::{
    EntityType, LocalStorage, OpFailure, OpId, OpKind, OpPayload, QueuedOperation,
};

use crate::id::generate_id;

/// Error type for queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Local storage failed.
    #[error("storage error: {0}")]
    Storage(#[from] sb_core::Error),
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Ordered, persisted list of pending mutations.
pub struct MutationQueue {
    storage: Arc<dyn LocalStorage>,
    ops: Mutex<Vec<QueuedOperation>>,
    seq: AtomicU64,
}

impl MutationQueue {
    /// Open the queue, loading whatever the storage holds.
    pub fn open(storage: Arc<dyn LocalStorage>) -> Self {
        let ops = load(storage.as_ref());
        if !ops.is_empty() {
            tracing::debug!("loaded {} queued operation(s)", ops.len());
        }
        MutationQueue {
            storage,
            ops: Mutex::new(ops),
            seq: AtomicU64::new(0),
        }
    }

    /// Append an operation and persist before returning its id.
    pub fn enqueue(
        &self,
        entity_type: EntityType,
        kind: OpKind,
        payload: OpPayload,
    ) -> QueueResult<OpId> {
        let now = Utc::now();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let id = generate_id(
            "op",
            &format!("{}:{}:{}:{}", entity_type, kind, payload.entity_id, seq),
            &now,
        );
        let op = QueuedOperation::new(id.clone(), entity_type, kind, payload, now);

        self.mutate(|ops| {
            ops.push(op.clone());
            Some(())
        })?;
        tracing::debug!("queued {} {} ({})", kind, entity_type, id);
        Ok(id)
    }

    /// Snapshot of the queue in insertion order.
    pub fn list(&self) -> Vec<QueuedOperation> {
        self.lock().clone()
    }

    /// A queued operation by id.
    pub fn get(&self, id: &str) -> Option<QueuedOperation> {
        self.lock().iter().find(|op| op.id == id).cloned()
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove an operation. Returns false if it was not queued.
    pub fn remove(&self, id: &str) -> QueueResult<bool> {
        Ok(self.purge(|op| op.id == id)? > 0)
    }

    /// Remove every operation matching `predicate`; returns how many went.
    pub fn purge(&self, predicate: impl Fn(&QueuedOperation) -> bool) -> QueueResult<usize> {
        let removed = self.mutate(|ops| {
            let before = ops.len();
            ops.retain(|op| !predicate(op));
            let removed = before - ops.len();
            (removed > 0).then_some(removed)
        })?;
        Ok(removed.unwrap_or(0))
    }

    /// Bump an operation's retry counter and remember why it failed.
    ///
    /// Returns the new retry count, or `None` if the operation is gone.
    pub fn record_failure(&self, id: &str, failure: OpFailure) -> QueueResult<Option<u32>> {
        self.mutate(|ops| {
            let op = ops.iter_mut().find(|op| op.id == id)?;
            op.retry_count = op.retry_count.saturating_add(1);
            op.last_error = Some(failure.clone());
            Some(op.retry_count)
        })
    }

    /// Groups of operations with identical signatures, oldest first.
    ///
    /// Only groups with more than one member are returned.
    pub fn find_duplicate_groups(&self) -> Vec<Vec<QueuedOperation>> {
        let ops = self.lock();
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<QueuedOperation>> = HashMap::new();
        for op in ops.iter() {
            let sig = signature(op);
            let group = groups.entry(sig.clone()).or_insert_with(|| {
                order.push(sig);
                Vec::new()
            });
            group.push(op.clone());
        }
        order
            .into_iter()
            .filter_map(|sig| groups.remove(&sig))
            .filter(|group| group.len() > 1)
            .collect()
    }

    /// Drop all but the newest member of each duplicate group.
    ///
    /// An older Insert is kept if any other queued operation still targets
    /// the entity it creates. Returns the dropped operations.
    pub fn collapse_duplicates(&self) -> QueueResult<Vec<QueuedOperation>> {
        let groups = self.find_duplicate_groups();
        if groups.is_empty() {
            return Ok(Vec::new());
        }

        let ops = self.list();
        let mut doomed: Vec<QueuedOperation> = Vec::new();
        for group in groups {
            let Some((_newest, older)) = group.split_last() else {
                continue;
            };
            for op in older {
                if op.kind == OpKind::Insert {
                    let referenced = ops.iter().any(|other| {
                        other.id != op.id
                            && other.entity_type == op.entity_type
                            && other.entity_id() == op.entity_id()
                    });
                    if referenced {
                        continue;
                    }
                }
                doomed.push(op.clone());
            }
        }

        if doomed.is_empty() {
            return Ok(doomed);
        }
        self.purge(|op| doomed.iter().any(|d| d.id == op.id))?;
        tracing::info!("collapsed {} duplicate operation(s)", doomed.len());
        Ok(doomed)
    }

    /// Pending operations targeting one entity, in queue order.
    pub fn pending_for(&self, entity_type: EntityType, entity_id: &str) -> Vec<QueuedOperation> {
        self.lock()
            .iter()
            .filter(|op| op.entity_type == entity_type && op.entity_id() == entity_id)
            .cloned()
            .collect()
    }

    /// Re-read the queue from storage, discarding the in-memory copy.
    pub fn reload(&self) {
        let loaded = load(self.storage.as_ref());
        *self.lock() = loaded;
    }

    /// Apply `f` to the committed queue and write the result back atomically.
    ///
    /// `f` returns `None` to skip the write. Either way the in-memory copy
    /// ends up matching storage.
    fn mutate<T>(
        &self,
        mut f: impl FnMut(&mut Vec<QueuedOperation>) -> Option<T>,
    ) -> QueueResult<Option<T>> {
        let mut ops = self.lock();
        let mut outcome = None;
        let mut committed = None;
        self.storage.update(
            keys::QUEUE,
            &mut |raw: Option<String>| -> sb_core::Result<Option<String>> {
                let mut fresh = raw.as_deref().map(parse).unwrap_or_default();
                outcome = f(&mut fresh);
                let write = match outcome {
                    Some(_) => Some(serde_json::to_string(&fresh)?),
                    None => None,
                };
                committed = Some(fresh);
                Ok(write)
            },
        )?;
        if let Some(fresh) = committed {
            *ops = fresh;
        }
        Ok(outcome)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<QueuedOperation>> {
        self.ops.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Deduplication key.
///
/// Inserts mint a fresh entity id per tap, so only their fields count.
fn signature(op: &QueuedOperation) -> String {
    let payload = match op.kind {
        OpKind::Insert => serde_json::to_value(&op.payload.fields),
        OpKind::Update | OpKind::Delete => serde_json::to_value(&op.payload),
    }
    .unwrap_or(Value::Null);
    // serde_json maps are sorted, so equal payloads serialize equally
    format!("{}|{}|{}", op.entity_type, op.kind, payload)
}

fn load(storage: &dyn LocalStorage) -> Vec<QueuedOperation> {
    match storage.get(keys::QUEUE) {
        Ok(Some(raw)) => parse(&raw),
        Ok(None) => Vec::new(),
        Err(e) => {
            tracing::warn!("failed to read queue: {}", e);
            Vec::new()
        }
    }
}

fn parse(raw: &str) -> Vec<QueuedOperation> {
    let entries: Vec<Value> = match serde_json::from_str(raw) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("queue is unreadable, starting empty: {}", e);
            return Vec::new();
        }
    };
    entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value(entry) {
            Ok(op) => Some(op),
            Err(e) => {
                tracing::warn!("skipping unreadable queue entry: {}", e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
