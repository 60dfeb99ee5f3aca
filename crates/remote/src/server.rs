// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket server implementation.
//!
//! Each text frame carries one request; the server answers it with exactly
//! one message echoing the request id.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info};

use sb_core::{ClientMessage, RemoteErrorKind, ServerMessage};

use crate::state::{Rejection, ServerState};

/// Run the WebSocket server on the given address.
pub async fn run(addr: SocketAddr, state: ServerState) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on: {}", listener.local_addr()?);
    serve(listener, state)
        .await
        .map_err(|e| -> Box<dyn std::error::Error> { e })
}

/// Accept connections on an already bound listener.
pub async fn serve(
    listener: TcpListener,
    state: ServerState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let state = state.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer_addr, state).await {
                error!("Connection error from {}: {}", peer_addr, e);
            }
        });
    }
}

/// Handle a single WebSocket connection.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: ServerState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    info!("New WebSocket connection from: {}", peer_addr);

    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    while let Some(msg) = ws_stream.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let response = handle_client_message(&text, &state).await;
                ws_sink.send(Message::Text(response.to_json()?.into())).await?;
            }
            Ok(Message::Ping(data)) => {
                ws_sink.send(Message::Pong(data)).await?;
            }
            Ok(Message::Close(_)) => {
                info!("Client {} disconnected", peer_addr);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!("WebSocket error from {}: {}", peer_addr, e);
                break;
            }
        }
    }

    info!("Connection closed: {}", peer_addr);
    Ok(())
}

/// Process one request and build its reply.
pub(crate) async fn handle_client_message(text: &str, state: &ServerState) -> ServerMessage {
    let msg = match ClientMessage::from_json(text) {
        Ok(msg) => msg,
        Err(e) => {
            debug!("Unreadable request: {}", e);
            return ServerMessage::error(
                None,
                RemoteErrorKind::Validation,
                format!("malformed request: {}", e),
            );
        }
    };
    debug!("Received message: {:?}", msg);

    let req = msg.request_id();
    let result = match msg {
        ClientMessage::Ping { id } => Ok(ServerMessage::pong(id)),
        ClientMessage::Create { entity, record, .. } => state
            .create(entity, record)
            .await
            .map(|record| ServerMessage::Record { req, record }),
        ClientMessage::Update { entity, record, .. } => state
            .update(entity, record)
            .await
            .map(|record| ServerMessage::Record { req, record }),
        ClientMessage::Delete { entity, id, .. } => state
            .delete(entity, &id)
            .await
            .map(|()| ServerMessage::Deleted { req }),
        ClientMessage::List { entity, .. } => Ok(ServerMessage::Records {
            req,
            records: state.list(entity).await,
        }),
    };

    result.unwrap_or_else(|Rejection { kind, message }| {
        debug!("Request {} rejected: {} {}", req, kind, message);
        ServerMessage::error(Some(req), kind, message)
    })
}
