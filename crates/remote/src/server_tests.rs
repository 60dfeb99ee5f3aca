// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Test server utilities and protocol tests.
//!
//! Provides a TestServer that runs on a random port so tests can talk to the
//! real connection handler over a socket.

#![cfg(test)]
#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::server;
use crate::state::ServerState;

/// A test server that runs on a random port and can be controlled.
pub struct TestServer {
    addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    state: ServerState,
    _temp_dir: tempfile::TempDir,
}

impl TestServer {
    /// Start a new test server on a random available port.
    pub async fn start() -> Self {
        let temp_dir = tempfile::tempdir().unwrap();
        let state = ServerState::open(temp_dir.path()).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let state_clone = state.clone();
        tokio::spawn(async move {
            tokio::select! {
                result = server::serve(listener, state_clone) => {
                    if let Err(e) = result {
                        eprintln!("Test server error: {}", e);
                    }
                }
                _ = shutdown_rx => {}
            }
        });

        TestServer {
            addr,
            shutdown_tx,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Get the WebSocket URL for connecting to this server.
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Get access to the server state for verification.
    pub fn state(&self) -> &ServerState {
        &self.state
    }

    /// Shutdown the test server.
    pub fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
    }
}

mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use serde_json::json;
    use tokio::time::{timeout, Duration};
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message;

    use sb_core::{ClientMessage, EntityType, Record, RemoteErrorKind, ServerMessage};

    use crate::server::handle_client_message;

    fn record(id: &str, fields: serde_json::Value) -> Record {
        match fields {
            serde_json::Value::Object(map) => Record::new(id, map),
            _ => Record::new(id, Default::default()),
        }
    }

    async fn ask(state: &ServerState, msg: ClientMessage) -> ServerMessage {
        handle_client_message(&msg.to_json().unwrap(), state).await
    }

    #[tokio::test]
    async fn ping_pong_over_socket() {
        let server = TestServer::start().await;

        let (ws_stream, _) = connect_async(&server.ws_url()).await.unwrap();
        let (mut sink, mut stream) = ws_stream.split();

        let ping = ClientMessage::ping(42);
        sink.send(Message::Text(ping.to_json().unwrap().into()))
            .await
            .unwrap();

        let result = timeout(Duration::from_secs(5), stream.next()).await;
        match result {
            Ok(Some(Ok(Message::Text(text)))) => {
                let response = ServerMessage::from_json(&text).unwrap();
                assert_eq!(response, ServerMessage::Pong { id: 42 });
            }
            Ok(other) => panic!("Expected pong response, got {:?}", other),
            Err(_) => panic!("Timeout waiting for pong response"),
        }

        server.shutdown();
    }

    #[tokio::test]
    async fn create_over_socket_is_stored() {
        let server = TestServer::start().await;

        let (ws_stream, _) = connect_async(&server.ws_url()).await.unwrap();
        let (mut sink, mut stream) = ws_stream.split();

        let create = ClientMessage::Create {
            req: 7,
            entity: EntityType::Products,
            record: record("prd-1", json!({"name": "Tea", "price": 2})),
        };
        sink.send(Message::Text(create.to_json().unwrap().into()))
            .await
            .unwrap();

        let reply = match timeout(Duration::from_secs(5), stream.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => ServerMessage::from_json(&text).unwrap(),
            other => panic!("Expected record response, got {:?}", other),
        };
        assert_eq!(reply.request_id(), Some(7));

        let stored = server.state().list(EntityType::Products).await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].fields["version"], 1);

        server.shutdown();
    }

    #[tokio::test]
    async fn malformed_request_gets_error_without_id() {
        let state = ServerState::in_memory();
        let reply = handle_client_message("{\"type\":\"bogus\"}", &state).await;

        match reply {
            ServerMessage::Error { req, kind, .. } => {
                assert_eq!(req, None);
                assert_eq!(kind, RemoteErrorKind::Validation);
            }
            other => panic!("Expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn crud_round_trip_echoes_request_ids() {
        let state = ServerState::in_memory();

        let created = ask(
            &state,
            ClientMessage::Create {
                req: 1,
                entity: EntityType::Customers,
                record: record("cus-1", json!({"name": "Ana"})),
            },
        )
        .await;
        assert!(matches!(created, ServerMessage::Record { req: 1, .. }));

        let updated = ask(
            &state,
            ClientMessage::Update {
                req: 2,
                entity: EntityType::Customers,
                record: record("cus-1", json!({"phone": "555"})),
            },
        )
        .await;
        match updated {
            ServerMessage::Record { req, record } => {
                assert_eq!(req, 2);
                assert_eq!(record.fields["name"], "Ana");
                assert_eq!(record.fields["phone"], "555");
                assert_eq!(record.fields["version"], 2);
            }
            other => panic!("Expected record, got {:?}", other),
        }

        let listed = ask(
            &state,
            ClientMessage::List {
                req: 3,
                entity: EntityType::Customers,
            },
        )
        .await;
        assert!(matches!(listed, ServerMessage::Records { req: 3, ref records } if records.len() == 1));

        let deleted = ask(
            &state,
            ClientMessage::Delete {
                req: 4,
                entity: EntityType::Customers,
                id: "cus-1".into(),
            },
        )
        .await;
        assert_eq!(deleted, ServerMessage::Deleted { req: 4 });
    }

    #[tokio::test]
    async fn rejections_carry_kind_and_request_id() {
        let state = ServerState::in_memory();

        let invalid = ask(
            &state,
            ClientMessage::Create {
                req: 10,
                entity: EntityType::Sales,
                record: record("sal-1", json!({"total": "lots"})),
            },
        )
        .await;
        assert!(matches!(
            invalid,
            ServerMessage::Error {
                req: Some(10),
                kind: RemoteErrorKind::Validation,
                ..
            }
        ));

        let missing = ask(
            &state,
            ClientMessage::Delete {
                req: 11,
                entity: EntityType::Sales,
                id: "sal-404".into(),
            },
        )
        .await;
        assert!(matches!(
            missing,
            ServerMessage::Error {
                req: Some(11),
                kind: RemoteErrorKind::NotFound,
                ..
            }
        ));
    }
}
