// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

// Allow unused items: test helpers are shared across multiple test binaries,
// and not every test file uses every helper.
#![allow(dead_code)]
#![allow(unused_imports)]

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;

pub use predicates::prelude::*;
pub use tempfile::TempDir;

/// The binary, isolated from the user's state dir and network.
pub fn sb(temp: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("stockbook");
    cmd.current_dir(temp.path())
        .env("STOCKBOOK_STATE_DIR", temp.path().join("state"))
        .env_remove("STOCKBOOK_OFFLINE")
        .env_remove("STOCKBOOK_LOG");
    cmd
}

/// An initialized project with no remote.
pub fn init_temp() -> TempDir {
    let temp = TempDir::new().unwrap();
    sb(&temp).arg("init").assert().success();
    temp
}

/// An initialized project with its database under `.stockbook/`.
pub fn init_temp_private() -> TempDir {
    let temp = TempDir::new().unwrap();
    sb(&temp).args(["init", "--private"]).assert().success();
    temp
}

/// Add a record and return its ID.
pub fn add(temp: &TempDir, entity: &str, fields: &[&str]) -> String {
    let output = sb(temp)
        .arg(entity)
        .arg("add")
        .args(fields)
        .output()
        .unwrap();
    assert!(output.status.success(), "{:?}", output);

    String::from_utf8_lossy(&output.stdout)
        .split_whitespace()
        .nth(1)
        .unwrap()
        .to_string()
}
