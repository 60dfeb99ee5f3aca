// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket protocol messages for client-server communication.
//!
//! The protocol is request/response:
//! - Client sends CRUD requests tagged with a request id
//! - Server answers each request with exactly one message echoing that id

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::entity::{EntityType, Record};

/// Request correlation id chosen by the client.
pub type RequestId = u64;

/// Failure categories reported by the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// Network or timeout failure; worth retrying.
    Transient,
    /// The record was rejected by server-side validation.
    Validation,
    /// The write conflicts with existing state (e.g. duplicate id).
    Conflict,
    /// The target record does not exist.
    NotFound,
    /// Anything the server could not categorize.
    Unknown,
}

impl RemoteErrorKind {
    /// Returns the string representation used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteErrorKind::Transient => "transient",
            RemoteErrorKind::Validation => "validation",
            RemoteErrorKind::Conflict => "conflict",
            RemoteErrorKind::NotFound => "not_found",
            RemoteErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Lightweight reachability check.
    Ping {
        /// Client-chosen ID echoed in Pong.
        id: u64,
    },

    /// Create a record. Fails with `conflict` if the id exists.
    Create {
        req: RequestId,
        entity: EntityType,
        record: Record,
    },

    /// Patch an existing record's fields.
    Update {
        req: RequestId,
        entity: EntityType,
        record: Record,
    },

    /// Delete a record by id.
    Delete {
        req: RequestId,
        entity: EntityType,
        id: String,
    },

    /// List every record of an entity type.
    List { req: RequestId, entity: EntityType },
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Pong response to client Ping.
    Pong {
        /// Echoed from the Ping message.
        id: u64,
    },

    /// The authoritative record after a create or update.
    Record { req: RequestId, record: Record },

    /// Response to a List request.
    Records {
        req: RequestId,
        records: Vec<Record>,
    },

    /// Acknowledges a Delete request.
    Deleted { req: RequestId },

    /// A request failed.
    Error {
        /// Id of the failed request; absent when the request was unreadable.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        req: Option<RequestId>,
        kind: RemoteErrorKind,
        /// Human-readable error description.
        message: String,
    },
}

impl ClientMessage {
    /// Creates a Ping message.
    pub fn ping(id: u64) -> Self {
        ClientMessage::Ping { id }
    }

    /// Returns the correlation id the server will echo back.
    pub fn request_id(&self) -> RequestId {
        match self {
            ClientMessage::Ping { id } => *id,
            ClientMessage::Create { req, .. }
            | ClientMessage::Update { req, .. }
            | ClientMessage::Delete { req, .. }
            | ClientMessage::List { req, .. } => *req,
        }
    }

    /// Serializes the message to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the message from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Creates a Pong message.
    pub fn pong(id: u64) -> Self {
        ServerMessage::Pong { id }
    }

    /// Creates an Error message.
    pub fn error(req: Option<RequestId>, kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            req,
            kind,
            message: message.into(),
        }
    }

    /// Returns the correlation id this message answers, if any.
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            ServerMessage::Pong { id } => Some(*id),
            ServerMessage::Record { req, .. }
            | ServerMessage::Records { req, .. }
            | ServerMessage::Deleted { req } => Some(*req),
            ServerMessage::Error { req, .. } => *req,
        }
    }

    /// Serializes the message to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the message from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
