// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access.
//!
//! All runtime environment variables used by the CLI are defined here
//! with typed accessor functions. The variable name constants are generated
//! by `build.rs` and live in the [`vars`] submodule.

use std::path::PathBuf;

/// Generated environment variable name constants.
pub mod vars {
    include!(concat!(env!("OUT_DIR"), "/env_vars.rs"));
}

/// Returns the value of `STOCKBOOK_STATE_DIR` if set.
pub fn state_dir() -> Option<PathBuf> {
    std::env::var(vars::STOCKBOOK_STATE_DIR).ok().map(PathBuf::from)
}

/// Returns the value of `XDG_STATE_HOME` if set.
pub fn xdg_state_home() -> Option<PathBuf> {
    std::env::var(vars::XDG_STATE_HOME).ok().map(PathBuf::from)
}

/// Returns `true` if `STOCKBOOK_OFFLINE=1`.
///
/// Stands in for the host's network signal: the engine treats the platform
/// as offline and never touches the remote.
pub fn force_offline() -> bool {
    std::env::var(vars::STOCKBOOK_OFFLINE).is_ok_and(|v| v == "1")
}

/// Returns the log filter from `STOCKBOOK_LOG` if set.
pub fn log_filter() -> Option<String> {
    std::env::var(vars::STOCKBOOK_LOG).ok()
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
