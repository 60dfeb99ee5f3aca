// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the sb-remote server binary.

#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::process::{Child, Command, Stdio};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Helper to spawn a server process and clean it up on drop.
struct ServerProcess {
    child: Child,
    port: u16,
    _temp_dir: tempfile::TempDir,
}

impl ServerProcess {
    fn spawn(slot: u16) -> Self {
        let temp_dir = tempfile::tempdir().expect("create temp dir");

        // High ephemeral range, one port per test so they can run in parallel
        let port = 49152 + (std::process::id() % 1000) as u16 * 4 + slot;

        let child = Command::new(env!("CARGO_BIN_EXE_sb-remote"))
            .arg("--bind")
            .arg(format!("127.0.0.1:{}", port))
            .arg("--data")
            .arg(temp_dir.path())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn server process");

        ServerProcess {
            child,
            port,
            _temp_dir: temp_dir,
        }
    }

    fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        // Kill the server process
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

async fn connect(server: &ServerProcess) -> WsStream {
    // CI runners can be slow, so we use generous timeouts
    for _ in 0..20 {
        if let Ok(Ok((stream, _))) =
            tokio::time::timeout(Duration::from_millis(500), connect_async(&server.ws_url())).await
        {
            return stream;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    panic!("should connect to server within retries");
}

async fn roundtrip(ws: &mut WsStream, request: serde_json::Value) -> serde_json::Value {
    ws.send(Message::Text(request.to_string().into()))
        .await
        .expect("send request");
    match tokio::time::timeout(Duration::from_secs(5), ws.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => serde_json::from_str(&text).expect("json reply"),
        other => panic!("Expected text reply, got {:?}", other),
    }
}

#[tokio::test]
async fn test_server_lifecycle() {
    let server = ServerProcess::spawn(0);
    let mut ws = connect(&server).await;

    let pong = roundtrip(&mut ws, serde_json::json!({"type": "ping", "id": 12345})).await;
    assert_eq!(pong, serde_json::json!({"type": "pong", "id": 12345}));
}

#[tokio::test]
async fn test_create_then_list() {
    let server = ServerProcess::spawn(1);
    let mut ws = connect(&server).await;

    let created = roundtrip(
        &mut ws,
        serde_json::json!({
            "type": "create",
            "req": 1,
            "entity": "customers",
            "record": {"id": "cus-1", "name": "Ana"}
        }),
    )
    .await;
    assert_eq!(created["type"], "record");
    assert_eq!(created["req"], 1);
    assert_eq!(created["record"]["version"], 1);

    let conflict = roundtrip(
        &mut ws,
        serde_json::json!({
            "type": "create",
            "req": 2,
            "entity": "customers",
            "record": {"id": "cus-1", "name": "Ana"}
        }),
    )
    .await;
    assert_eq!(conflict["type"], "error");
    assert_eq!(conflict["kind"], "conflict");

    let listed = roundtrip(
        &mut ws,
        serde_json::json!({"type": "list", "req": 3, "entity": "customers"}),
    )
    .await;
    assert_eq!(listed["records"].as_array().map(Vec::len), Some(1));
}
