// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use clap::{Parser, Subcommand, ValueEnum};

use sb_core::EntityType;

/// Output format for commands supporting structured output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "stockbook")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Offline-first book of customers, products and sales")]
#[command(
    long_about = "Offline-first book of customers, products and sales.\n\n\
    Writes land locally at once and are queued; `stockbook sync` or \
    `stockbook watch` reconciles them with the remote store when it is reachable."
)]
pub struct Cli {
    /// Run as if stockbook was started in <path>
    #[arg(short = 'C', long = "directory", global = true, value_name = "path")]
    pub directory: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Initialize a stockbook in the current directory
    Init {
        /// WebSocket URL of the remote store (ws:// or wss://)
        #[arg(long, short)]
        remote: Option<String>,

        /// Keep the database inside .stockbook/ instead of the state dir
        #[arg(long)]
        private: bool,

        /// Directory to initialize (default: current directory)
        #[arg(long)]
        path: Option<String>,
    },

    /// Manage customers
    #[command(subcommand)]
    Customers(RecordCommand),

    /// Manage products
    #[command(subcommand)]
    Products(RecordCommand),

    /// Manage sales
    #[command(subcommand)]
    Sales(RecordCommand),

    /// Show connectivity, queue depth and last sync
    Status {
        #[arg(long, short, value_enum, default_value_t)]
        output: OutputFormat,
    },

    /// Push queued changes to the remote store
    Sync {
        /// Forget connection backoff and cooldown first
        #[arg(long)]
        retry: bool,
    },

    /// Push queued changes, then reload everything from the remote store
    Refresh,

    /// Keep syncing in the foreground until interrupted
    Watch,
}

impl Command {
    /// The entity type a record command operates on.
    pub fn entity(&self) -> Option<EntityType> {
        match self {
            Command::Customers(_) => Some(EntityType::Customers),
            Command::Products(_) => Some(EntityType::Products),
            Command::Sales(_) => Some(EntityType::Sales),
            _ => None,
        }
    }
}

/// Operations shared by every entity type.
#[derive(Subcommand, Debug, PartialEq)]
pub enum RecordCommand {
    /// List cached records
    List {
        #[arg(long, short, value_enum, default_value_t)]
        output: OutputFormat,
    },

    /// Show one record
    Show {
        id: String,

        #[arg(long, short, value_enum, default_value_t)]
        output: OutputFormat,
    },

    /// Create a record from key=value fields
    Add {
        /// Fields as key=value (values parse as JSON when they can)
        #[arg(required = true, value_name = "key=value")]
        fields: Vec<String>,

        #[arg(long, short, value_enum, default_value_t)]
        output: OutputFormat,
    },

    /// Patch a record with key=value fields
    Update {
        id: String,

        #[arg(required = true, value_name = "key=value")]
        fields: Vec<String>,
    },

    /// Delete a record
    Delete { id: String },
}

#[cfg(test)]
#[path = "../cli_tests/mod.rs"]
mod tests;
