// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! sb-remote: reference remote store for stockbook.
//!
//! Serves create/update/delete/list over WebSocket, validates records,
//! assigns versions and timestamps, and persists its tables as JSON in the
//! data directory.

mod server;
#[cfg(test)]
mod server_tests;
mod state;

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// sb-remote: stockbook remote store
#[derive(Parser, Debug)]
#[command(name = "sb-remote")]
#[command(about = "WebSocket remote store for stockbook clients")]
struct Args {
    /// Address to bind the server to
    #[arg(short, long, default_value = "0.0.0.0:7890")]
    bind: SocketAddr,

    /// Directory holding the persisted tables
    #[arg(short, long, default_value = ".")]
    data: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting sb-remote server");
    info!("  Bind address: {}", args.bind);
    info!("  Data directory: {}", args.data.display());

    let state = state::ServerState::open(&args.data)?;
    server::run(args.bind, state).await?;

    Ok(())
}
