// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

use sb_core::EntityType;

use crate::sync::{CacheError, ConnectionError, QueueError, SyncError};

/// All possible errors that can occur in the sbrs library.
///
/// Errors provide user-friendly messages with hints for common issues.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not initialized: run 'stockbook init' first")]
    NotInitialized,

    #[error("already initialized at {0}")]
    AlreadyInitialized(String),

    #[error("{entity} record not found: {id}")]
    RecordNotFound { entity: EntityType, id: String },

    #[error("invalid field '{0}'\n  hint: fields are written as key=value")]
    InvalidField(String),

    #[error("{0}")]
    Core(#[from] sb_core::Error),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("sync failed: {0}")]
    Sync(#[from] SyncError),

    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),
}

/// A specialized Result type for sbrs operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
