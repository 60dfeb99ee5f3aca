// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Server state management.
//!
//! Holds the authoritative tables behind a mutex and mirrors every write to
//! a JSON snapshot in the data directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use sb_core::{validate_record, EntityType, Record, RemoteErrorKind, Result};

/// File the tables are persisted to, inside the data directory.
pub const SNAPSHOT_FILE: &str = "stockbook.json";

type Tables = BTreeMap<EntityType, BTreeMap<String, Record>>;

/// A request the store refused, with the category reported to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl Rejection {
    fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Rejection {
            kind,
            message: message.into(),
        }
    }

    fn not_found(entity: EntityType, id: &str) -> Self {
        Self::new(
            RemoteErrorKind::NotFound,
            format!("{} record not found: {}", entity, id),
        )
    }
}

/// Shared server state containing the authoritative records.
#[derive(Clone)]
pub struct ServerState {
    inner: Arc<ServerStateInner>,
}

struct ServerStateInner {
    tables: Mutex<Tables>,
    /// Where writes are persisted; `None` keeps everything in memory.
    snapshot_path: Option<PathBuf>,
}

impl ServerState {
    /// Opens the state persisted in `data_dir`, starting empty if there is none.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let snapshot_path = data_dir.join(SNAPSHOT_FILE);
        let tables = match std::fs::read_to_string(&snapshot_path) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Tables::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self::with_tables(tables, Some(snapshot_path)))
    }

    /// State that is never written to disk.
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self::with_tables(Tables::new(), None)
    }

    fn with_tables(tables: Tables, snapshot_path: Option<PathBuf>) -> Self {
        ServerState {
            inner: Arc::new(ServerStateInner {
                tables: Mutex::new(tables),
                snapshot_path,
            }),
        }
    }

    /// Stores a new record, assigning version and timestamps.
    pub async fn create(
        &self,
        entity: EntityType,
        record: Record,
    ) -> std::result::Result<Record, Rejection> {
        validate_record(entity, &record)
            .map_err(|msg| Rejection::new(RemoteErrorKind::Validation, msg))?;

        let mut tables = self.inner.tables.lock().await;
        let table = tables.entry(entity).or_default();
        if table.contains_key(&record.id) {
            return Err(Rejection::new(
                RemoteErrorKind::Conflict,
                format!("{} record already exists: {}", entity, record.id),
            ));
        }

        let now = json!(Utc::now().to_rfc3339());
        let mut stored = record;
        stored.fields.insert("version".into(), json!(1));
        stored.fields.insert("created_at".into(), now.clone());
        stored.fields.insert("updated_at".into(), now);
        table.insert(stored.id.clone(), stored.clone());

        self.persist(&tables)?;
        Ok(stored)
    }

    /// Patches an existing record and bumps its version.
    pub async fn update(
        &self,
        entity: EntityType,
        patch: Record,
    ) -> std::result::Result<Record, Rejection> {
        let mut tables = self.inner.tables.lock().await;
        let table = tables.entry(entity).or_default();
        let existing = table
            .get(&patch.id)
            .ok_or_else(|| Rejection::not_found(entity, &patch.id))?;

        // Server-owned fields are not client-writable
        let mut fields = patch.fields;
        for key in ["version", "created_at", "updated_at"] {
            fields.remove(key);
        }
        let mut stored = existing.patched(&fields);
        validate_record(entity, &stored)
            .map_err(|msg| Rejection::new(RemoteErrorKind::Validation, msg))?;

        let version = existing
            .fields
            .get("version")
            .and_then(Value::as_i64)
            .unwrap_or(0)
            + 1;
        stored.fields.insert("version".into(), json!(version));
        stored
            .fields
            .insert("updated_at".into(), json!(Utc::now().to_rfc3339()));
        table.insert(stored.id.clone(), stored.clone());

        self.persist(&tables)?;
        Ok(stored)
    }

    /// Removes a record.
    pub async fn delete(&self, entity: EntityType, id: &str) -> std::result::Result<(), Rejection> {
        let mut tables = self.inner.tables.lock().await;
        let removed = tables.entry(entity).or_default().remove(id);
        if removed.is_none() {
            return Err(Rejection::not_found(entity, id));
        }
        self.persist(&tables)?;
        Ok(())
    }

    /// Every record of a type, ordered by id.
    pub async fn list(&self, entity: EntityType) -> Vec<Record> {
        let tables = self.inner.tables.lock().await;
        tables
            .get(&entity)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Write the snapshot via a temp file so a crash never leaves it torn.
    fn persist(&self, tables: &Tables) -> std::result::Result<(), Rejection> {
        let Some(path) = &self.inner.snapshot_path else {
            return Ok(());
        };
        let write = || -> Result<()> {
            let tmp = path.with_extension("json.tmp");
            std::fs::write(&tmp, serde_json::to_vec_pretty(tables)?)?;
            std::fs::rename(&tmp, path)?;
            Ok(())
        };
        write().map_err(|e| {
            tracing::error!("failed to persist {}: {}", path.display(), e);
            Rejection::new(RemoteErrorKind::Transient, format!("storage failure: {}", e))
        })
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
