// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Draining the mutation queue against the remote store.
//!
//! A pass walks the queue in insertion order and applies each operation
//! through the [`ConnectionManager`]. One bad entry never blocks the rest:
//! terminal failures are purged, transient ones stay queued with a bumped
//! retry counter until the budget runs out. Only one pass runs at a time;
//! concurrent callers share the in-flight pass and its report.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use serde::Serialize;

use sb_core::{
    keys, EntityType, LocalStorage, OpFailure, OpKind, QueuedOperation, Record, RemoteErrorKind,
};

use super::cache::{CacheError, LocalCache};
use super::connection::{ConnectionError, ConnectionManager};
use super::events::{DataEvent, Listeners};
use super::queue::{MutationQueue, QueueError};
use super::remote::{ErrorClass, RemoteError};

/// Default number of retries before an operation is evicted.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// A queued operation that failed terminally or was evicted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncIssue {
    pub op_id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub kind: OpKind,
    pub error_kind: RemoteErrorKind,
    pub message: String,
    /// True if the operation ran out of retries rather than failing outright.
    pub evicted: bool,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub applied_count: usize,
    pub failed_count: usize,
    pub evicted_count: usize,
    /// Operations left queued for a later pass.
    pub deferred_count: usize,
    pub errors: Vec<SyncIssue>,
}

impl SyncReport {
    /// Returns true if the pass touched nothing.
    pub fn is_empty(&self) -> bool {
        self.applied_count == 0
            && self.failed_count == 0
            && self.evicted_count == 0
            && self.deferred_count == 0
    }
}

/// Why a pass could not run to completion.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("local storage error: {0}")]
    Storage(String),
}

impl From<QueueError> for SyncError {
    fn from(e: QueueError) -> Self {
        SyncError::Storage(e.to_string())
    }
}

impl From<CacheError> for SyncError {
    fn from(e: CacheError) -> Self {
        SyncError::Storage(e.to_string())
    }
}

type PassFuture = Shared<BoxFuture<'static, Result<SyncReport, SyncError>>>;

/// Single-flight reconciler.
pub struct Reconciler {
    queue: Arc<MutationQueue>,
    cache: Arc<LocalCache>,
    connection: Arc<ConnectionManager>,
    storage: Arc<dyn LocalStorage>,
    events: Arc<Listeners<DataEvent>>,
    max_retries: u32,
    inflight: Mutex<Option<PassFuture>>,
    write_lock: Arc<Mutex<()>>,
}

impl Reconciler {
    pub fn new(
        queue: Arc<MutationQueue>,
        cache: Arc<LocalCache>,
        connection: Arc<ConnectionManager>,
        storage: Arc<dyn LocalStorage>,
        events: Arc<Listeners<DataEvent>>,
        max_retries: u32,
    ) -> Self {
        Reconciler {
            queue,
            cache,
            connection,
            storage,
            events,
            max_retries,
            inflight: Mutex::new(None),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Share the lock local writers hold between caching and queueing.
    ///
    /// Settling an applied operation takes the same lock, so it never sees
    /// a write that is cached but not yet queued.
    pub fn with_write_lock(mut self, lock: Arc<Mutex<()>>) -> Self {
        self.write_lock = lock;
        self
    }

    /// Retry budget per operation.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns true while a pass is running.
    pub fn is_running(&self) -> bool {
        self.slot().is_some()
    }

    /// Drain the queue once, or join the pass already in flight.
    pub async fn reconcile(self: &Arc<Self>) -> Result<SyncReport, SyncError> {
        let pass = {
            let mut slot = self.slot();
            match slot.as_ref() {
                Some(pass) => pass.clone(),
                None => {
                    let this = Arc::clone(self);
                    let pass = async move {
                        let result = this.run_pass().await;
                        *this.slot() = None;
                        result
                    }
                    .boxed()
                    .shared();
                    *slot = Some(pass.clone());
                    pass
                }
            }
        };
        pass.await
    }

    /// When the last pass finished, if ever.
    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        let raw = self.storage.get(keys::LAST_SYNC).ok().flatten()?;
        DateTime::parse_from_rfc3339(&raw)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    async fn run_pass(&self) -> Result<SyncReport, SyncError> {
        {
            let _guard = self.write_guard();
            // Intents other instances committed since we last looked
            self.queue.reload();
        }
        if self.queue.is_empty() {
            return Ok(SyncReport::default());
        }

        let result = self.drain().await;
        match &result {
            Ok(report) => {
                if let Err(e) = self.storage.set(keys::LAST_SYNC, &Utc::now().to_rfc3339()) {
                    tracing::warn!("failed to record sync time: {}", e);
                }
                tracing::info!(
                    "sync pass: {} applied, {} failed, {} evicted, {} deferred",
                    report.applied_count,
                    report.failed_count,
                    report.evicted_count,
                    report.deferred_count
                );
                self.events.notify(&DataEvent::Synced(report.clone()));
            }
            Err(e) => {
                tracing::warn!("sync pass aborted: {}", e);
                self.events.notify(&DataEvent::SyncFailed {
                    message: e.to_string(),
                });
            }
        }
        result
    }

    async fn drain(&self) -> Result<SyncReport, SyncError> {
        self.connection.ensure_connection().await?;

        {
            let _guard = self.write_guard();
            for dropped in self.queue.collapse_duplicates()? {
                if dropped.kind == OpKind::Insert {
                    self.cache.remove(dropped.entity_type, dropped.entity_id())?;
                }
            }
        }

        let mut report = SyncReport::default();
        let mut deferred: HashSet<(EntityType, String)> = HashSet::new();
        let mut halted = false;

        for op in self.queue.list() {
            let key = (op.entity_type, op.entity_id().to_string());

            if op.is_poison(self.max_retries) {
                let message = op
                    .last_error
                    .as_ref()
                    .map(|f| f.message.clone())
                    .unwrap_or_else(|| "retry budget exhausted".to_string());
                self.queue.remove(&op.id)?;
                report.evicted_count += 1;
                report.errors.push(issue(
                    &op,
                    previous_kind(&op).unwrap_or(RemoteErrorKind::Unknown),
                    message,
                    true,
                ));
                tracing::warn!("evicted poison operation {}", op.id);
                continue;
            }

            // Later operations on an entity wait behind a deferred earlier one
            if halted || deferred.contains(&key) {
                report.deferred_count += 1;
                deferred.insert(key);
                continue;
            }

            match self.apply(&op).await {
                Ok(stored) => {
                    let _guard = self.write_guard();
                    self.queue.remove(&op.id)?;
                    self.settle(&op, stored)?;
                    report.applied_count += 1;
                }
                Err(ConnectionError::Remote { source, .. }) => {
                    self.handle_failure(&op, source, &mut report, &mut deferred, key)?;
                }
                Err(e) => {
                    // Offline, blocked or unreachable: nothing else will get through
                    tracing::info!("deferring rest of queue: {}", e);
                    halted = true;
                    report.deferred_count += 1;
                    deferred.insert(key);
                }
            }
        }

        Ok(report)
    }

    fn handle_failure(
        &self,
        op: &QueuedOperation,
        error: RemoteError,
        report: &mut SyncReport,
        deferred: &mut HashSet<(EntityType, String)>,
        key: (EntityType, String),
    ) -> Result<(), SyncError> {
        if op.kind == OpKind::Delete && error.kind == RemoteErrorKind::NotFound {
            // Already gone remotely: the intent is satisfied
            let _guard = self.write_guard();
            self.queue.remove(&op.id)?;
            self.settle(op, None)?;
            report.applied_count += 1;
            return Ok(());
        }

        let class = match ErrorClass::of(error.kind) {
            ErrorClass::Unknown if previous_kind(op) == Some(RemoteErrorKind::Unknown) => {
                ErrorClass::Terminal
            }
            ErrorClass::Unknown => ErrorClass::Transient,
            class => class,
        };

        match class {
            ErrorClass::Transient | ErrorClass::Blocked | ErrorClass::Unknown => {
                let failure = OpFailure {
                    kind: error.kind,
                    message: error.message.clone(),
                    at: Utc::now(),
                };
                match self.queue.record_failure(&op.id, failure)? {
                    Some(count) if count > self.max_retries => {
                        self.queue.remove(&op.id)?;
                        report.failed_count += 1;
                        report.evicted_count += 1;
                        tracing::warn!(
                            "evicted {} after {} failed attempts: {}",
                            op.id,
                            count,
                            error
                        );
                        report.errors.push(issue(op, error.kind, error.message, true));
                    }
                    _ => {
                        tracing::debug!("{} will be retried: {}", op.id, error);
                        report.deferred_count += 1;
                        deferred.insert(key);
                    }
                }
            }
            ErrorClass::Terminal => {
                self.queue.remove(&op.id)?;
                report.failed_count += 1;
                tracing::warn!("dropped {} {} {}: {}", op.kind, op.entity_type, op.entity_id(), error);
                report.errors.push(issue(op, error.kind, error.message, false));
            }
        }
        Ok(())
    }

    async fn apply(&self, op: &QueuedOperation) -> Result<Option<Record>, ConnectionError> {
        let label = format!("{} {}", op.kind, op.entity_type);
        let remote = self.connection.remote();
        let id = op.entity_id().to_string();
        match op.kind {
            OpKind::Insert => {
                let record = Record::new(id, op.payload.fields.clone().unwrap_or_default());
                self.connection
                    .call(&label, remote.create(op.entity_type, record))
                    .await
                    .map(Some)
            }
            OpKind::Update => {
                let record = Record::new(id, op.payload.fields.clone().unwrap_or_default());
                self.connection
                    .call(&label, remote.update(op.entity_type, record))
                    .await
                    .map(Some)
            }
            OpKind::Delete => self
                .connection
                .call(&label, remote.delete(op.entity_type, id))
                .await
                .map(|()| None),
        }
    }

    /// Store the authoritative result, keeping later pending intents visible.
    fn settle(&self, op: &QueuedOperation, stored: Option<Record>) -> Result<(), SyncError> {
        match stored {
            Some(record) => self.cache.upsert(op.entity_type, record)?,
            None => self.cache.remove(op.entity_type, op.entity_id())?,
        }
        for pending in self.queue.pending_for(op.entity_type, op.entity_id()) {
            self.cache
                .apply_local(pending.entity_type, pending.kind, &pending.payload)?;
        }
        Ok(())
    }

    fn write_guard(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<PassFuture>> {
        self.inflight.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn previous_kind(op: &QueuedOperation) -> Option<RemoteErrorKind> {
    op.last_error.as_ref().map(|f| f.kind)
}

fn issue(op: &QueuedOperation, kind: RemoteErrorKind, message: String, evicted: bool) -> SyncIssue {
    SyncIssue {
        op_id: op.id.clone(),
        entity_type: op.entity_type,
        entity_id: op.entity_id().to_string(),
        kind: op.kind,
        error_kind: kind,
        message,
        evicted,
    }
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
