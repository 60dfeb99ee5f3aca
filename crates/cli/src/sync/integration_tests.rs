// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end tests for the sync engine.
//!
//! These drive the data manager the way the application does:
//! - Offline writes reconciled after the link returns
//! - Poison operations evicted while the rest of the queue drains
//! - Queue and cache surviving a restart on SQLite storage
//! - Concurrent writers never losing an intent

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use serde_json::json;
use tempfile::tempdir;
use tokio::sync::watch;

use sb_core::{EntityType, OpKind, RemoteErrorKind, SqliteStorage};

use super::memory::MemoryRemote;
use super::test_helpers::{fields, TestRig};
use super::{DataManager, EngineSettings};

#[tokio::test(start_paused = true)]
async fn offline_insert_reaches_remote_once_online() {
    let rig = TestRig::new(false);
    rig.manager
        .create(
            EntityType::Customers,
            fields(json!({"name": "Ali", "phone": "555"})),
        )
        .unwrap();
    assert!(rig.manager.sync_now().await.is_err());

    rig.set_online(true);
    let report = rig.manager.sync_now().await.unwrap();

    assert_eq!(report.applied_count, 1);
    let stored = rig.remote.records(EntityType::Customers);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].get_str("name"), Some("Ali"));
    assert_eq!(rig.manager.queue().len(), 0);
}

#[tokio::test(start_paused = true)]
async fn always_failing_op_is_evicted_while_others_apply() {
    let rig = TestRig::new(true);
    let ops = [
        rig.enqueue(EntityType::Customers, OpKind::Insert, "cus-1", Some(json!({"name": "Ali"}))),
        rig.enqueue(EntityType::Products, OpKind::Insert, "prd-1", Some(json!({"name": "Tea"}))),
        rig.enqueue(EntityType::Sales, OpKind::Insert, "sal-1", Some(json!({"total": 5}))),
        rig.enqueue(EntityType::Customers, OpKind::Update, "cus-1", Some(json!({"phone": "555"}))),
    ];
    rig.remote.fail_entity("prd-1", RemoteErrorKind::Transient);

    // Eviction happens on the failure that pushes the retry count past the
    // budget, i.e. the (max_retries + 1)th failing pass. Running only
    // max_retries passes would leave prd-1 queued with retry_count ==
    // max_retries, so the loop needs one pass more than the budget.
    let passes = rig.manager.reconciler().max_retries() + 1;
    let mut applied = 0;
    let mut failed = 0;
    let mut issues = Vec::new();
    for _ in 0..passes {
        let report = rig.manager.sync_now().await.unwrap();
        applied += report.applied_count;
        failed += report.failed_count;
        issues.extend(report.errors);
    }

    assert_eq!(applied, 3);
    assert_eq!(failed, 1);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].op_id, ops[1]);
    assert!(issues[0].evicted);
    assert!(rig.manager.queue().is_empty());

    assert_eq!(
        rig.remote
            .record(EntityType::Customers, "cus-1")
            .unwrap()
            .get_str("phone"),
        Some("555")
    );
    assert!(rig.remote.record(EntityType::Sales, "sal-1").is_some());
    assert!(rig.remote.record(EntityType::Products, "prd-1").is_none());
}

#[tokio::test(start_paused = true)]
async fn queue_and_cache_survive_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stockbook.db");
    let remote = MemoryRemote::new();

    let open = |online: bool| {
        let (tx, rx) = watch::channel(online);
        let manager = DataManager::new(
            Arc::new(SqliteStorage::open(&path).unwrap()),
            Arc::new(remote.clone()),
            rx,
            vec![],
            EngineSettings::default(),
        );
        (manager, tx)
    };

    let record = {
        let (manager, _tx) = open(false);
        manager
            .create(EntityType::Products, fields(json!({"name": "Tea", "price": 2})))
            .unwrap()
    };

    let (manager, _tx) = open(true);
    assert_eq!(manager.get(EntityType::Products, &record.id), Some(record.clone()));
    assert_eq!(manager.sync_status().pending_count, 1);

    let report = manager.sync_now().await.unwrap();
    assert_eq!(report.applied_count, 1);
    assert!(remote.record(EntityType::Products, &record.id).is_some());
    assert!(manager.sync_status().last_sync.is_some());
}

#[tokio::test(start_paused = true)]
async fn two_instances_on_one_store_keep_both_intents() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stockbook.db");
    let remote = MemoryRemote::new();

    let open = || {
        let (tx, rx) = watch::channel(false);
        let manager = DataManager::new(
            Arc::new(SqliteStorage::open(&path).unwrap()),
            Arc::new(remote.clone()),
            rx,
            vec![],
            EngineSettings::default(),
        );
        (manager, tx)
    };

    // Both open before either writes, so each starts from an empty copy
    let (a, _a_tx) = open();
    let (b, _b_tx) = open();
    let ali = a
        .create(EntityType::Customers, fields(json!({"name": "Ali"})))
        .unwrap();
    let bob = b
        .create(EntityType::Customers, fields(json!({"name": "Bob"})))
        .unwrap();

    let (fresh, _tx) = open();
    assert_eq!(fresh.sync_status().pending_count, 2);
    let mut names: Vec<_> = fresh
        .get_all(EntityType::Customers)
        .iter()
        .filter_map(|r| r.get_str("name").map(str::to_string))
        .collect();
    names.sort();
    assert_eq!(names, vec!["Ali", "Bob"]);

    // Each writer also saw the other's commit when it wrote
    assert!(b.get(EntityType::Customers, &ali.id).is_some());
    assert_eq!(b.queue().len(), 2);
    assert!(fresh.get(EntityType::Customers, &bob.id).is_some());
}

#[test]
fn concurrent_writers_lose_nothing() {
    let rig = TestRig::new(false);

    std::thread::scope(|scope| {
        for worker in 0..8 {
            let manager = Arc::clone(&rig.manager);
            scope.spawn(move || {
                for n in 0..5 {
                    let name = format!("customer {}-{}", worker, n);
                    manager
                        .create(EntityType::Customers, fields(json!({"name": name})))
                        .unwrap();
                }
            });
        }
    });

    assert_eq!(rig.manager.get_all(EntityType::Customers).len(), 40);
    assert_eq!(rig.manager.queue().len(), 40);

    // A fresh instance on the same storage sees every committed intent
    let reopened = TestRig::on_storage(
        rig.storage.clone(),
        rig.remote.clone(),
        false,
        EngineSettings::default(),
    );
    assert_eq!(reopened.manager.queue().len(), 40);
    assert_eq!(reopened.manager.get_all(EntityType::Customers).len(), 40);
}

#[tokio::test(start_paused = true)]
async fn cache_converges_with_remote_after_refresh() {
    let rig = TestRig::new(true);
    let tea = rig
        .manager
        .create(EntityType::Products, fields(json!({"name": "Tea"})))
        .unwrap();
    rig.manager
        .create(EntityType::Sales, fields(json!({"total": -1})))
        .unwrap();
    rig.manager
        .update(EntityType::Products, &tea.id, fields(json!({"price": 4})))
        .unwrap();

    let outcome = rig.manager.force_refresh().await;

    let report = outcome.report.unwrap();
    assert_eq!(report.applied_count, 2);
    assert_eq!(report.failed_count, 1);
    assert!(outcome.reloaded);
    for entity in EntityType::ALL {
        assert_eq!(rig.manager.get_all(entity), rig.remote.records(entity));
    }
}
