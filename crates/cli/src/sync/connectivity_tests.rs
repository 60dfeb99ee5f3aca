// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use std::collections::VecDeque;
use std::sync::atomic::AtomicUsize;
use yare::parameterized;

/// Probe answering from a script of latencies (`Err` = failure).
///
/// Once the script runs out every probe succeeds instantly.
#[derive(Clone, Default)]
struct ScriptedProbe {
    script: Arc<Mutex<VecDeque<Result<Duration, String>>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedProbe {
    fn push(&self, outcome: Result<Duration, String>) {
        self.script.lock().unwrap().push_back(outcome);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ProbeStrategy for ScriptedProbe {
    fn name(&self) -> &str {
        "scripted"
    }

    fn probe(&self) -> ProbeFuture<'_> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Ok(latency)) => {
                    tokio::time::sleep(latency).await;
                    Ok(())
                }
                Some(Err(e)) => Err(e),
                None => Ok(()),
            }
        })
    }
}

fn monitor_with(
    probes: Vec<Box<dyn ProbeStrategy>>,
    online: bool,
) -> (Arc<ConnectivityMonitor>, watch::Sender<bool>) {
    let (tx, rx) = watch::channel(online);
    let monitor = ConnectivityMonitor::new(MonitorConfig::default(), probes, rx);
    (Arc::new(monitor), tx)
}

fn recorded_changes(monitor: &ConnectivityMonitor) -> Arc<Mutex<Vec<ConnectivityChange>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _ = monitor.add_listener(move |change| sink.lock().unwrap().push(change.clone()));
    seen
}

#[parameterized(
    instant = { 0, Quality::Good },
    just_under_good = { 999, Quality::Good },
    one_second = { 1000, Quality::Poor },
    slow = { 2500, Quality::Poor },
    degraded = { 4000, Quality::Poor },
)]
fn latency_buckets(millis: u64, expected: Quality) {
    let config = MonitorConfig::default();
    assert_eq!(config.bucket(Duration::from_millis(millis)), expected);
}

#[test]
fn initial_state_follows_platform_flag() {
    let (online, _tx) = monitor_with(vec![], true);
    assert_eq!(online.quality(), Quality::Poor);
    assert!(!online.status().verified_reachable);

    let (offline, _tx) = monitor_with(vec![], false);
    assert_eq!(offline.quality(), Quality::Offline);
    assert!(!offline.is_connection_stable());
}

#[tokio::test(start_paused = true)]
async fn poor_streak_then_good_becomes_stable_after_window() {
    let probe = ScriptedProbe::default();
    for _ in 0..3 {
        probe.push(Ok(Duration::from_millis(2000)));
    }
    probe.push(Ok(Duration::from_millis(100)));
    let (monitor, _tx) = monitor_with(vec![Box::new(probe.clone())], true);

    for _ in 0..3 {
        assert_eq!(monitor.check_quality_now().await, Quality::Poor);
        assert!(!monitor.is_connection_stable());
    }

    assert_eq!(monitor.check_quality_now().await, Quality::Good);
    assert!(!monitor.is_connection_stable());

    tokio::time::advance(Duration::from_secs(9)).await;
    assert!(!monitor.is_connection_stable());

    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(monitor.is_connection_stable());
}

#[tokio::test(start_paused = true)]
async fn probe_failure_degrades_without_error() {
    let probe = ScriptedProbe::default();
    probe.push(Err("refused".into()));
    probe.push(Err("refused".into()));
    let (monitor, _tx) = monitor_with(vec![Box::new(probe)], true);

    assert_eq!(monitor.check_quality_now().await, Quality::Poor);
    assert_eq!(monitor.check_quality_now().await, Quality::Poor);

    let status = monitor.status();
    assert!(!status.verified_reachable);
    assert_eq!(status.consecutive_failures, 2);
    assert!(status.last_failure_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn timed_out_probe_falls_through_to_next_strategy() {
    let slow = ScriptedProbe::default();
    slow.push(Ok(Duration::from_secs(30)));
    let fast = ScriptedProbe::default();
    let (monitor, _tx) = monitor_with(
        vec![Box::new(slow.clone()), Box::new(fast.clone())],
        true,
    );

    assert_eq!(monitor.check_quality_now().await, Quality::Good);
    assert_eq!(slow.calls(), 1);
    assert_eq!(fast.calls(), 1);
    assert!(monitor.status().verified_reachable);
}

#[tokio::test(start_paused = true)]
async fn first_successful_strategy_wins() {
    let first = ScriptedProbe::default();
    let second = ScriptedProbe::default();
    let (monitor, _tx) = monitor_with(
        vec![Box::new(first.clone()), Box::new(second.clone())],
        true,
    );

    monitor.check_quality_now().await;
    assert_eq!(first.calls(), 1);
    assert_eq!(second.calls(), 0);
}

#[tokio::test]
async fn no_strategies_trust_the_platform_flag() {
    let (monitor, _tx) = monitor_with(vec![], true);
    assert_eq!(monitor.check_quality_now().await, Quality::Good);
}

#[tokio::test(start_paused = true)]
async fn offline_is_immediate_and_notifies() {
    let probe = ScriptedProbe::default();
    let (monitor, _tx) = monitor_with(vec![Box::new(probe.clone())], true);
    monitor.check_quality_now().await;
    let seen = recorded_changes(&monitor);

    monitor.set_platform_online(false);

    assert_eq!(monitor.quality(), Quality::Offline);
    let changes = seen.lock().unwrap().clone();
    assert_eq!(changes.len(), 1);
    assert!(changes[0].went_offline());
    assert!(changes[0].platform_changed());

    // Probing while offline never touches the network
    assert_eq!(monitor.check_quality_now().await, Quality::Offline);
    assert_eq!(probe.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn online_defers_probe_by_delay() {
    let probe = ScriptedProbe::default();
    let (monitor, _tx) = monitor_with(vec![Box::new(probe.clone())], false);
    let seen = recorded_changes(&monitor);

    monitor.set_platform_online(true);
    assert_eq!(monitor.quality(), Quality::Poor);
    assert!(seen.lock().unwrap()[0].came_online());

    tokio::time::sleep(Duration::from_millis(1900)).await;
    assert_eq!(probe.calls(), 0);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(probe.calls(), 1);
    assert_eq!(monitor.quality(), Quality::Good);
}

#[tokio::test(start_paused = true)]
async fn repeated_platform_signal_is_not_a_transition() {
    let (monitor, _tx) = monitor_with(vec![], false);
    let seen = recorded_changes(&monitor);

    monitor.set_platform_online(false);
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn initialize_is_idempotent() {
    let probe = ScriptedProbe::default();
    let (monitor, _tx) = monitor_with(vec![Box::new(probe.clone())], true);

    monitor.initialize();
    monitor.initialize();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(probe.calls(), 1);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(probe.calls(), 2);
    monitor.shutdown();
}

#[tokio::test(start_paused = true)]
async fn platform_signal_drives_state_after_initialize() {
    let (monitor, tx) = monitor_with(vec![], true);
    monitor.initialize();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(monitor.quality(), Quality::Good);

    tx.send(false).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(monitor.quality(), Quality::Offline);
    assert!(!monitor.is_platform_online());

    tx.send(true).unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(monitor.quality(), Quality::Good);
    monitor.shutdown();
}

#[test]
fn removed_listener_is_not_called() {
    let (monitor, _tx) = monitor_with(vec![], true);
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    let id = monitor.add_listener(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert!(monitor.remove_listener(id));

    monitor.record_remote_failure();
    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert_eq!(monitor.status().consecutive_failures, 1);
}

#[test]
fn remote_outcomes_update_counters_without_transition() {
    let (monitor, _tx) = monitor_with(vec![], true);
    let seen = recorded_changes(&monitor);

    monitor.record_remote_failure();
    monitor.record_remote_failure();
    assert_eq!(monitor.status().consecutive_failures, 2);
    assert!(seen.lock().unwrap().is_empty());

    monitor.record_remote_success();
    let status = monitor.status();
    assert_eq!(status.consecutive_failures, 0);
    assert!(status.verified_reachable);

    // Regaining reachability is reported, but quality did not move
    let changes = seen.lock().unwrap().clone();
    assert_eq!(changes.len(), 1);
    assert!(changes[0].became_reachable());
    assert!(!changes[0].came_online());
    assert_eq!(changes[0].current.quality, Quality::Poor);

    monitor.record_remote_success();
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn recovered_link_reports_reachable_again() {
    let probe = ScriptedProbe::default();
    let (monitor, _tx) = monitor_with(vec![Box::new(probe.clone())], true);
    monitor.check_quality_now().await;
    let seen = recorded_changes(&monitor);

    probe.push(Err("connection refused".into()));
    assert_eq!(monitor.check_quality_now().await, Quality::Poor);
    assert_eq!(monitor.check_quality_now().await, Quality::Good);

    let changes = seen.lock().unwrap().clone();
    assert_eq!(changes.len(), 2);
    assert!(!changes[0].current.verified_reachable);
    assert!(changes[1].became_reachable());
    assert!(!changes[1].came_online());
}

#[tokio::test]
async fn tcp_probe_reaches_listener() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let probe = TcpProbe::new(addr.to_string());
    assert!(probe.probe().await.is_ok());

    drop(listener);
    assert!(probe.probe().await.is_err());
}
