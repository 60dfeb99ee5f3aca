// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Local durable key-value storage.
//!
//! The sync engine persists three blobs: the mutation queue, the record
//! cache and the last sync timestamp. Writes are synchronous and unbuffered;
//! a successful `set` is durable. Several instances may share one store, so
//! blobs that are edited in place go through [`LocalStorage::update`].

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::Result;

/// Fixed storage keys.
pub mod keys {
    /// Serialized mutation queue.
    pub const QUEUE: &str = "queue";
    /// Serialized record cache.
    pub const CACHE: &str = "cache";
    /// RFC 3339 timestamp of the last completed reconciliation.
    pub const LAST_SYNC: &str = "last_sync_timestamp";
}

/// Read-modify-write callback for [`LocalStorage::update`].
pub type Updater<'a> = dyn FnMut(Option<String>) -> Result<Option<String>> + 'a;

/// Synchronous key-value blob store.
pub trait LocalStorage: Send + Sync {
    /// Reads a value, `None` if the key was never written.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Writes a value durably.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removes a key. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;

    /// Atomically rewrites a value.
    ///
    /// `f` receives the committed value and returns its replacement, or
    /// `None` to leave the key untouched. No other writer, in this process
    /// or another, commits between the read and the write. An error from `f`
    /// aborts without writing.
    fn update(&self, key: &str, f: &mut Updater<'_>) -> Result<()>;

    /// Opaque token that changes when another writer commits.
    ///
    /// Used to notice commits from other open instances without re-reading
    /// every blob on a timer.
    fn change_token(&self) -> Result<u64>;
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);";

/// SQLite-backed storage shared between processes.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open storage at the given path, creating the file if needed.
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // WAL lets other instances read while we write
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = FULL;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(SCHEMA)?;

        Ok(SqliteStorage {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(SqliteStorage {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl LocalStorage for SqliteStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.conn()
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn update(&self, key: &str, f: &mut Updater<'_>) -> Result<()> {
        let mut conn = self.conn();
        // IMMEDIATE takes the write lock up front, so no other connection
        // can commit between our read and our write
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current: Option<String> = tx
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        if let Some(value) = f(current)? {
            tx.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn change_token(&self) -> Result<u64> {
        // data_version only moves when a *different* connection commits
        let version: i64 = self
            .conn()
            .query_row("PRAGMA data_version", [], |row| row.get(0))?;
        Ok(version.unsigned_abs())
    }
}

/// In-memory storage for tests and ephemeral sessions.
///
/// Clones share the same underlying map, which makes two clones behave like
/// two instances over one shared store.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    values: Mutex<HashMap<String, String>>,
    version: AtomicU64,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.inner.values.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl LocalStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values().insert(key.to_string(), value.to_string());
        self.inner.version.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        if self.values().remove(key).is_some() {
            self.inner.version.fetch_add(1, Ordering::AcqRel);
        }
        Ok(())
    }

    fn update(&self, key: &str, f: &mut Updater<'_>) -> Result<()> {
        let mut values = self.values();
        if let Some(value) = f(values.get(key).cloned())? {
            values.insert(key.to_string(), value);
            self.inner.version.fetch_add(1, Ordering::AcqRel);
        }
        Ok(())
    }

    fn change_token(&self) -> Result<u64> {
        Ok(self.inner.version.load(Ordering::Acquire))
    }
}

#[cfg(test)]
#[path = "storage_tests.rs"]
mod tests;
