// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::io::Write;
use std::path::{Path, PathBuf};

use sb_core::SqliteStorage;

use crate::config::{get_db_path, init_work_dir, Config, RemoteConfig};
use crate::error::Result;

pub fn run(remote: Option<String>, private: bool, path: Option<String>) -> Result<()> {
    let target_path = match path {
        Some(p) => PathBuf::from(p),
        None => std::env::current_dir()?,
    };
    let mut out = std::io::stdout().lock();
    run_impl(&target_path, remote, private, &mut out)?;
    Ok(())
}

/// Create `.stockbook/` under `target_path` and its database.
pub fn run_impl(
    target_path: &Path,
    remote: Option<String>,
    private: bool,
    out: &mut impl Write,
) -> Result<PathBuf> {
    let config = Config {
        private,
        remote: remote.map(RemoteConfig::new),
        ..Config::default()
    };
    let work_dir = init_work_dir(target_path, &config)?;

    let db_path = get_db_path(&work_dir, &config);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    SqliteStorage::open(&db_path)?;

    writeln!(out, "Initialized stockbook at {}", work_dir.display())?;
    writeln!(out, "Database: {}", db_path.display())?;
    match config.remote_url() {
        Some(url) => writeln!(out, "Remote: {}", url)?,
        None => writeln!(out, "Remote: none (writes stay local until one is configured)")?,
    }
    Ok(work_dir)
}

#[cfg(test)]
#[path = "init_tests.rs"]
mod tests;
