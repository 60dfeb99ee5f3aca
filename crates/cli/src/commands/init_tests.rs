// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::error::Error;
use tempfile::TempDir;

#[test]
fn test_private_init_creates_database() {
    let temp = TempDir::new().unwrap();
    let mut out = Vec::new();

    let work_dir = run_impl(
        temp.path(),
        Some("ws://localhost:7890".into()),
        true,
        &mut out,
    )
    .unwrap();

    assert!(work_dir.join("config.toml").exists());
    assert!(work_dir.join("stockbook.db").exists());
    let config = Config::load(&work_dir).unwrap();
    assert!(config.private);
    assert_eq!(config.remote_url(), Some("ws://localhost:7890"));

    let printed = String::from_utf8(out).unwrap();
    assert!(printed.contains("Remote: ws://localhost:7890"));
}

#[test]
fn test_init_without_remote() {
    let temp = TempDir::new().unwrap();
    let mut out = Vec::new();

    let work_dir = run_impl(temp.path(), None, true, &mut out).unwrap();

    assert!(Config::load(&work_dir).unwrap().remote.is_none());
    assert!(String::from_utf8(out).unwrap().contains("Remote: none"));
}

#[test]
fn test_init_twice_fails() {
    let temp = TempDir::new().unwrap();
    run_impl(temp.path(), None, true, &mut Vec::new()).unwrap();

    let err = run_impl(temp.path(), None, true, &mut Vec::new()).unwrap_err();
    assert!(matches!(err, Error::AlreadyInitialized(_)));
}

#[test]
fn test_init_rejects_non_websocket_remote() {
    let temp = TempDir::new().unwrap();
    let err = run_impl(temp.path(), Some("git:.".into()), true, &mut Vec::new()).unwrap_err();
    assert!(err.to_string().contains("ws://"));
}
