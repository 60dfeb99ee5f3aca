// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Queued mutations awaiting reconciliation.
//!
//! Every optimistic write produces a [`QueuedOperation`]. Operations are
//! persisted with a schema-tagged payload so older queue files can be
//! migrated by a pure function instead of guessing at field shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::entity::EntityType;
use crate::error::{Error, Result};
use crate::protocol::RemoteErrorKind;

/// Unique identifier for a queued operation.
pub type OpId = String;

/// The mutation a queued operation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Insert,
    Update,
    Delete,
}

impl OpKind {
    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Insert => "insert",
            OpKind::Update => "update",
            OpKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OpKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "insert" | "create" => Ok(OpKind::Insert),
            "update" => Ok(OpKind::Update),
            "delete" => Ok(OpKind::Delete),
            _ => Err(Error::InvalidOpKind(s.to_string())),
        }
    }
}

/// Payload of a queued operation (current schema).
///
/// `fields` is the full record for inserts, the patch for updates and
/// absent for deletes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredPayload", into = "StoredPayload")]
pub struct OpPayload {
    pub entity_id: String,
    pub fields: Option<Map<String, Value>>,
}

impl OpPayload {
    /// Creates a payload carrying fields.
    pub fn with_fields(entity_id: impl Into<String>, fields: Map<String, Value>) -> Self {
        OpPayload {
            entity_id: entity_id.into(),
            fields: Some(fields),
        }
    }

    /// Creates a payload that only names the target entity.
    pub fn id_only(entity_id: impl Into<String>) -> Self {
        OpPayload {
            entity_id: entity_id.into(),
            fields: None,
        }
    }
}

/// On-disk payload representation, tagged by schema version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "schema", rename_all = "snake_case")]
pub enum StoredPayload {
    /// First format: the raw record with its id embedded.
    V1 { data: Map<String, Value> },
    /// Current format.
    V2 {
        entity_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fields: Option<Map<String, Value>>,
    },
}

impl StoredPayload {
    /// Migrates any stored payload to the current schema.
    pub fn migrate(self) -> Result<OpPayload> {
        match self {
            StoredPayload::V1 { mut data } => {
                let entity_id = match data.remove("id") {
                    Some(Value::String(id)) if !id.is_empty() => id,
                    _ => {
                        return Err(Error::UnsupportedSchema(
                            "v1 payload without a string id".to_string(),
                        ))
                    }
                };
                let fields = if data.is_empty() { None } else { Some(data) };
                Ok(OpPayload { entity_id, fields })
            }
            StoredPayload::V2 { entity_id, fields } => Ok(OpPayload { entity_id, fields }),
        }
    }
}

impl TryFrom<StoredPayload> for OpPayload {
    type Error = Error;

    fn try_from(stored: StoredPayload) -> Result<Self> {
        stored.migrate()
    }
}

impl From<OpPayload> for StoredPayload {
    fn from(payload: OpPayload) -> Self {
        StoredPayload::V2 {
            entity_id: payload.entity_id,
            fields: payload.fields,
        }
    }
}

/// The last failure recorded against a queued operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpFailure {
    pub kind: RemoteErrorKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// A pending create/update/delete intent.
///
/// Immutable apart from `retry_count` and `last_error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedOperation {
    pub id: OpId,
    pub entity_type: EntityType,
    pub kind: OpKind,
    pub payload: OpPayload,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<OpFailure>,
}

impl QueuedOperation {
    /// Creates a fresh operation with no recorded failures.
    pub fn new(
        id: OpId,
        entity_type: EntityType,
        kind: OpKind,
        payload: OpPayload,
        enqueued_at: DateTime<Utc>,
    ) -> Self {
        QueuedOperation {
            id,
            entity_type,
            kind,
            payload,
            enqueued_at,
            retry_count: 0,
            last_error: None,
        }
    }

    /// Returns the id of the entity this operation targets.
    pub fn entity_id(&self) -> &str {
        &self.payload.entity_id
    }

    /// Returns true once the retry budget is exhausted.
    pub fn is_poison(&self, max_retries: u32) -> bool {
        self.retry_count > max_retries
    }
}

#[cfg(test)]
#[path = "op_tests.rs"]
mod tests;
