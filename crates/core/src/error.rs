// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for sb-core operations.

use thiserror::Error;

/// All possible errors that can occur in sb-core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid entity type: '{0}'\n  hint: valid types are: customers, products, sales")]
    InvalidEntityType(String),

    #[error("invalid operation kind: '{0}'\n  hint: valid kinds are: insert, update, delete")]
    InvalidOpKind(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("unsupported payload schema: {0}")]
    UnsupportedSchema(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for sb-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
