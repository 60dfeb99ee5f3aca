// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use yare::parameterized;

fn customer(id: &str, name: &str) -> Record {
    Record::from_value(json!({"id": id, "name": name})).unwrap()
}

#[tokio::test]
async fn create_assigns_version_and_stores() {
    let remote = MemoryRemote::new();
    let stored = remote
        .create(EntityType::Customers, customer("cus-1", "Ali"))
        .await
        .unwrap();
    assert_eq!(stored.fields.get("version"), Some(&json!(1)));
    assert_eq!(remote.records(EntityType::Customers), vec![stored]);
    assert_eq!(
        remote.calls(),
        vec![RemoteCall::Create(EntityType::Customers, "cus-1".into())]
    );
}

#[tokio::test]
async fn duplicate_create_conflicts() {
    let remote = MemoryRemote::new();
    remote
        .create(EntityType::Customers, customer("cus-1", "Ali"))
        .await
        .unwrap();
    let err = remote
        .create(EntityType::Customers, customer("cus-1", "Ali"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, RemoteErrorKind::Conflict);
}

#[tokio::test]
async fn update_patches_and_bumps_version() {
    let remote = MemoryRemote::new();
    remote
        .create(EntityType::Customers, customer("cus-1", "Ali"))
        .await
        .unwrap();
    let patch = Record::from_value(json!({"id": "cus-1", "phone": "555"})).unwrap();
    let stored = remote.update(EntityType::Customers, patch).await.unwrap();
    assert_eq!(stored.get_str("name"), Some("Ali"));
    assert_eq!(stored.get_str("phone"), Some("555"));
    assert_eq!(stored.fields.get("version"), Some(&json!(2)));
}

#[tokio::test]
async fn update_rejects_invalid_patch() {
    let remote = MemoryRemote::new();
    remote
        .create(EntityType::Customers, customer("cus-1", "Ali"))
        .await
        .unwrap();
    let patch = Record::from_value(json!({"id": "cus-1", "name": ""})).unwrap();
    let err = remote.update(EntityType::Customers, patch).await.unwrap_err();
    assert_eq!(err.kind, RemoteErrorKind::Validation);
    assert_eq!(
        remote.record(EntityType::Customers, "cus-1").unwrap().get_str("name"),
        Some("Ali")
    );
}

#[parameterized(
    update = { true },
    delete = { false },
)]
fn missing_target_is_not_found(update: bool) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let remote = MemoryRemote::new();
        let err = if update {
            remote
                .update(EntityType::Products, customer("prd-1", "Tea"))
                .await
                .unwrap_err()
        } else {
            remote
                .delete(EntityType::Products, "prd-1".into())
                .await
                .unwrap_err()
        };
        assert_eq!(err.kind, RemoteErrorKind::NotFound);
    });
}

#[tokio::test]
async fn create_validates_sales_total() {
    let remote = MemoryRemote::new();
    let sale = Record::from_value(json!({"id": "sal-1", "total": -5})).unwrap();
    let err = remote.create(EntityType::Sales, sale).await.unwrap_err();
    assert_eq!(err.kind, RemoteErrorKind::Validation);
}

#[tokio::test]
async fn unreachable_fails_transiently_without_recording() {
    let remote = MemoryRemote::new();
    remote.set_reachable(false);
    let err = remote.ping().await.unwrap_err();
    assert!(err.is_transient());
    assert!(remote.calls().is_empty());

    remote.set_reachable(true);
    remote.ping().await.unwrap();
}

#[tokio::test]
async fn scripted_failures_are_consumed_in_order() {
    let remote = MemoryRemote::new();
    remote.fail_next(RemoteErrorKind::Transient, 1);
    remote.fail_next(RemoteErrorKind::Unknown, 1);

    assert_eq!(
        remote.ping().await.unwrap_err().kind,
        RemoteErrorKind::Transient
    );
    assert_eq!(
        remote.ping().await.unwrap_err().kind,
        RemoteErrorKind::Unknown
    );
    remote.ping().await.unwrap();
}

#[tokio::test]
async fn entity_failure_persists_until_cleared() {
    let remote = MemoryRemote::new();
    remote.fail_entity("cus-1", RemoteErrorKind::Transient);

    for _ in 0..3 {
        let err = remote
            .create(EntityType::Customers, customer("cus-1", "Ali"))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
    remote.clear_entity_failure("cus-1");
    remote
        .create(EntityType::Customers, customer("cus-1", "Ali"))
        .await
        .unwrap();
    assert_eq!(remote.writes_for("cus-1"), 4);
}

#[tokio::test(start_paused = true)]
async fn latency_delays_calls() {
    let remote = MemoryRemote::new();
    remote.set_latency(Duration::from_secs(2));
    let start = tokio::time::Instant::now();
    remote.ping().await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(2));
}
