// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! sb-core: Shared library for the stockbook sync engine
//!
//! This crate provides the record model, queued operation types, the wire
//! protocol and local durable storage used by both the `stockbook` client
//! and the `sb-remote` server.

pub mod entity;
pub mod error;
pub mod op;
pub mod protocol;
pub mod storage;

pub use entity::{validate_record, EntityType, Record};
pub use error::{Error, Result};
pub use op::{OpFailure, OpId, OpKind, OpPayload, QueuedOperation, StoredPayload};
pub use protocol::{ClientMessage, RemoteErrorKind, RequestId, ServerMessage};
pub use storage::{keys, LocalStorage, MemoryStorage, SqliteStorage, Updater};
