// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Remote store abstraction.
//!
//! Provides a trait-based boundary to the authoritative CRUD store that
//! enables:
//! - A WebSocket client for production
//! - An in-process double for tests (see [`MemoryRemote`](super::MemoryRemote))
//!
//! Every failure carries a [`RemoteErrorKind`]; retry and eviction decisions
//! are made on that kind alone.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use sb_core::{ClientMessage, EntityType, Record, RemoteErrorKind, ServerMessage};

/// Error returned by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    /// Creates an error of the given kind.
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        RemoteError {
            kind,
            message: message.into(),
        }
    }

    /// Creates a transient (network/timeout) error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Transient, message)
    }

    /// Returns true if the failure is worth retrying.
    pub fn is_transient(&self) -> bool {
        self.kind == RemoteErrorKind::Transient
    }
}

/// Result type for remote store operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Boxed future returned by [`RemoteStore`] methods.
pub type RemoteFuture<'a, T> = Pin<Box<dyn Future<Output = RemoteResult<T>> + Send + 'a>>;

/// How a failure should be handled by the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network or timeout; retry up to the budget.
    Transient,
    /// Structurally cannot succeed; never retry.
    Terminal,
    /// Backpressure is active; wait without doing I/O.
    Blocked,
    /// Uncategorized; retried once, terminal on recurrence.
    Unknown,
}

impl ErrorClass {
    /// Maps a remote error kind to its handling class.
    pub fn of(kind: RemoteErrorKind) -> Self {
        match kind {
            RemoteErrorKind::Transient => ErrorClass::Transient,
            RemoteErrorKind::Validation
            | RemoteErrorKind::Conflict
            | RemoteErrorKind::NotFound => ErrorClass::Terminal,
            RemoteErrorKind::Unknown => ErrorClass::Unknown,
        }
    }
}

/// Authoritative CRUD store keyed by entity id.
///
/// Implementations return the stored record including any server-assigned
/// fields.
pub trait RemoteStore: Send + Sync {
    /// Lightweight reachability check with no side effects.
    fn ping(&self) -> RemoteFuture<'_, ()>;

    /// Create a record. Fails with `Conflict` if the id is taken.
    fn create(&self, entity: EntityType, record: Record) -> RemoteFuture<'_, Record>;

    /// Patch an existing record with the given fields.
    fn update(&self, entity: EntityType, record: Record) -> RemoteFuture<'_, Record>;

    /// Delete a record by id.
    fn delete(&self, entity: EntityType, id: String) -> RemoteFuture<'_, ()>;

    /// List every record of a type.
    fn list(&self, entity: EntityType) -> RemoteFuture<'_, Vec<Record>>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Internal WebSocket connection wrapper.
struct WebSocketConnection {
    sink: SplitSink<WsStream, Message>,
    stream: SplitStream<WsStream>,
}

/// Remote store reached over the stockbook WebSocket protocol.
///
/// Connects lazily on first use and reconnects after any transport failure.
/// Requests are serialized over the single connection; responses are matched
/// by request id so a reply to an abandoned request is skipped.
pub struct WebSocketRemote {
    url: String,
    conn: Mutex<Option<WebSocketConnection>>,
    next_req: AtomicU64,
}

impl WebSocketRemote {
    /// Create a remote for the given `ws://` or `wss://` URL.
    pub fn new(url: impl Into<String>) -> Self {
        WebSocketRemote {
            url: url.into(),
            conn: Mutex::new(None),
            next_req: AtomicU64::new(1),
        }
    }

    /// The URL this remote connects to.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn next_request_id(&self) -> u64 {
        self.next_req.fetch_add(1, Ordering::Relaxed)
    }

    /// Send a request and wait for the matching response.
    async fn request(&self, msg: ClientMessage) -> RemoteResult<ServerMessage> {
        let req = msg.request_id();
        let json = msg
            .to_json()
            .map_err(|e| RemoteError::new(RemoteErrorKind::Unknown, e.to_string()))?;

        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            let (ws_stream, _) = tokio_tungstenite::connect_async(self.url.as_str())
                .await
                .map_err(|e| RemoteError::transient(format!("connection failed: {}", e)))?;
            let (sink, stream) = ws_stream.split();
            *guard = Some(WebSocketConnection { sink, stream });
            tracing::debug!("connected to {}", self.url);
        }
        let ws = guard
            .as_mut()
            .ok_or_else(|| RemoteError::transient("connection closed"))?;

        if let Err(e) = ws.sink.send(Message::Text(json.into())).await {
            // Connection is broken, clear it
            *guard = None;
            return Err(RemoteError::transient(format!("send failed: {}", e)));
        }

        loop {
            match ws.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    let reply = ServerMessage::from_json(&text).map_err(|e| {
                        RemoteError::new(RemoteErrorKind::Unknown, format!("bad response: {}", e))
                    })?;
                    match reply.request_id() {
                        Some(id) if id == req => return Ok(reply),
                        None => return Ok(reply),
                        Some(stale) => {
                            tracing::debug!("skipping stale response for request {}", stale);
                            continue;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    *guard = None;
                    return Err(RemoteError::transient("connection closed"));
                }
                Some(Ok(_)) => {
                    // Ignore ping/pong and binary frames
                    continue;
                }
                Some(Err(e)) => {
                    *guard = None;
                    return Err(RemoteError::transient(format!("receive failed: {}", e)));
                }
            }
        }
    }
}

/// Turn an error reply, or a reply of the wrong shape, into an error.
fn unexpected(reply: ServerMessage) -> RemoteError {
    match reply {
        ServerMessage::Error { kind, message, .. } => RemoteError::new(kind, message),
        other => RemoteError::new(
            RemoteErrorKind::Unknown,
            format!("unexpected response: {:?}", other),
        ),
    }
}

impl RemoteStore for WebSocketRemote {
    fn ping(&self) -> RemoteFuture<'_, ()> {
        Box::pin(async move {
            let id = self.next_request_id();
            match self.request(ClientMessage::ping(id)).await? {
                ServerMessage::Pong { .. } => Ok(()),
                other => Err(unexpected(other)),
            }
        })
    }

    fn create(&self, entity: EntityType, record: Record) -> RemoteFuture<'_, Record> {
        Box::pin(async move {
            let req = self.next_request_id();
            match self
                .request(ClientMessage::Create {
                    req,
                    entity,
                    record,
                })
                .await?
            {
                ServerMessage::Record { record, .. } => Ok(record),
                other => Err(unexpected(other)),
            }
        })
    }

    fn update(&self, entity: EntityType, record: Record) -> RemoteFuture<'_, Record> {
        Box::pin(async move {
            let req = self.next_request_id();
            match self
                .request(ClientMessage::Update {
                    req,
                    entity,
                    record,
                })
                .await?
            {
                ServerMessage::Record { record, .. } => Ok(record),
                other => Err(unexpected(other)),
            }
        })
    }

    fn delete(&self, entity: EntityType, id: String) -> RemoteFuture<'_, ()> {
        Box::pin(async move {
            let req = self.next_request_id();
            match self
                .request(ClientMessage::Delete { req, entity, id })
                .await?
            {
                ServerMessage::Deleted { .. } => Ok(()),
                other => Err(unexpected(other)),
            }
        })
    }

    fn list(&self, entity: EntityType) -> RemoteFuture<'_, Vec<Record>> {
        Box::pin(async move {
            let req = self.next_request_id();
            match self.request(ClientMessage::List { req, entity }).await? {
                ServerMessage::Records { records, .. } => Ok(records),
                other => Err(unexpected(other)),
            }
        })
    }
}

#[cfg(test)]
#[path = "remote_tests.rs"]
mod tests;
