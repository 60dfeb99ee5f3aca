// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! sbrs - an offline-first stockbook of customers, products and sales.
//!
//! This crate provides the functionality behind the `stockbook` CLI:
//! a local SQLite cache and durable mutation queue that stay usable while
//! offline, and a sync engine that reconciles them with a remote store
//! over WebSocket once the link is back.
//!
//! # Main Components
//!
//! - [`sync::DataManager`] - Facade for reads, optimistic writes and sync
//! - [`sync::SyncEngine`] - Background reconciliation on reconnect
//! - [`Config`] - Project configuration (remote, retry and probe tunables)
//! - [`Error`] - Error types for all operations
//!
//! # Initialization
//!
//! ```rust,ignore
//! use sbrs::{init_work_dir, find_work_dir, Config};
//!
//! let work_dir = init_work_dir(Path::new("."), &Config::default())?;
//!
//! // Later, from anywhere below the project
//! let work_dir = find_work_dir()?;
//! let config = Config::load(&work_dir)?;
//! ```

mod cli;
mod commands;
mod env;

pub mod config;
pub mod error;
pub mod id;
pub mod sync;

pub use cli::{Cli, Command, OutputFormat, RecordCommand};
pub use config::{find_work_dir, get_db_path, init_work_dir, Config};
pub use env::log_filter;
pub use error::{Error, Result};

use sb_core::EntityType;

/// Execute a CLI command. This is the main entry point for library users
/// and provides a testable way to run commands without process execution.
pub fn run(command: Command) -> Result<()> {
    match command {
        Command::Init {
            remote,
            private,
            path,
        } => commands::init::run(remote, private, path),
        Command::Customers(cmd) => commands::records::run(EntityType::Customers, cmd),
        Command::Products(cmd) => commands::records::run(EntityType::Products, cmd),
        Command::Sales(cmd) => commands::records::run(EntityType::Sales, cmd),
        Command::Status { output } => commands::sync::status(output),
        Command::Sync { retry } => commands::sync::sync(retry),
        Command::Refresh => commands::sync::refresh(),
        Command::Watch => commands::sync::watch(),
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
