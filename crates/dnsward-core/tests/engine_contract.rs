//! Architectural Contract Test: Engine Lifecycle
//!
//! Drives the full engine with a paused clock and scripted probes:
//! - Records appear only after health is confirmed up, and disappear
//!   after it is confirmed down
//! - A flapping server never causes DNS churn
//! - One zone failing does not block reconciliation of another
//! - Shutdown flushes state exactly once and performs no stray mutations
//!
//! If this test fails, the probe and sync loops are miscoordinated.

mod common;

use common::*;
use dnsward_core::health::{HealthState, Status};
use dnsward_core::record::RecordType;
use dnsward_core::{Engine, Event};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn addr(s: &str) -> IpAddr {
    s.parse().unwrap()
}

async fn sleep_secs(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

/// Collect whatever events the engine has emitted so far
fn drain(rx: &mut tokio::sync::mpsc::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test(start_paused = true)]
async fn health_gates_record_lifecycle() {
    let prober = ScriptedProber::new();
    let provider = MockDnsProvider::new();
    let store = MockStateStore::new();
    prober.set_reachable(addr("1.1.1.1"), true);

    let config = fast_config(vec![target("1.1.1.1", "z1", "app.example.com")]);
    let (engine, mut events) = Engine::new(
        Arc::new(prober.clone()),
        Arc::new(provider.clone()),
        Arc::new(store.clone()),
        config,
    )
    .expect("engine construction succeeds");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { engine.run_with_shutdown(shutdown_rx).await });

    // Probe cycles at t=0s and t=1s confirm the server up (threshold 2);
    // the first sync pass at t=10s creates the record.
    sleep_secs(12).await;
    let records = provider.records("z1");
    assert_eq!(records.len(), 1, "up server should be advertised");
    assert_eq!(records[0].hostname, "app.example.com");
    assert_eq!(records[0].record_type, RecordType::A);

    let seen = drain(&mut events);
    assert!(
        seen.iter().any(|e| matches!(
            e,
            Event::HealthTransition { to: Status::Up, .. }
        )),
        "expected an up transition event"
    );
    assert!(
        seen.iter()
            .any(|e| matches!(e, Event::ReconciliationResult { created, .. } if created.len() == 1)),
        "expected a reconciliation event with one create"
    );

    // The mutating pass persisted the converged record set.
    let snapshot = store
        .zone_snapshot("z1")
        .expect("mutating pass persists a snapshot");
    assert_eq!(snapshot.records.len(), 1);
    assert_eq!(snapshot.records[0].address, addr("1.1.1.1"));

    // Take the server down; two failed cycles confirm it, the next sync
    // pass removes the record.
    prober.set_reachable(addr("1.1.1.1"), false);
    sleep_secs(12).await;
    assert!(
        provider.records("z1").is_empty(),
        "down server should not be advertised"
    );

    let seen = drain(&mut events);
    assert!(seen.iter().any(|e| matches!(
        e,
        Event::HealthTransition {
            to: Status::Down,
            ..
        }
    )));

    // The teardown pass left an empty snapshot behind.
    let snapshot = store.zone_snapshot("z1").unwrap();
    assert!(snapshot.records.is_empty());

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn flapping_server_causes_no_dns_churn() {
    let prober = ScriptedProber::new();
    let provider = MockDnsProvider::new();
    let store = MockStateStore::new();

    let mut config = fast_config(vec![target("1.1.1.1", "z1", "app.example.com")]);
    config.flap.up_threshold = 3;
    config.flap.down_threshold = 3;

    let (engine, mut events) = Engine::new(
        Arc::new(prober.clone()),
        Arc::new(provider.clone()),
        Arc::new(store.clone()),
        config,
    )
    .expect("engine construction succeeds");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { engine.run_with_shutdown(shutdown_rx).await });

    // Alternate the verdict every probe interval. Even with unlucky
    // phase alignment that yields two equal observations in a row, the
    // threshold of three is never reached.
    for cycle in 0..25u64 {
        prober.set_reachable(addr("1.1.1.1"), cycle % 2 == 0);
        sleep_secs(1).await;
    }

    assert!(
        provider.records("z1").is_empty(),
        "flapping server must never be advertised"
    );
    assert_eq!(provider.create_call_count(), 0);
    assert_eq!(provider.delete_call_count(), 0);

    let seen = drain(&mut events);
    assert!(
        !seen
            .iter()
            .any(|e| matches!(e, Event::HealthTransition { .. })),
        "flapping must not produce transitions"
    );

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn zone_failure_does_not_block_other_zones() {
    let prober = ScriptedProber::new();
    let provider = MockDnsProvider::new();
    let store = MockStateStore::new();
    prober.set_reachable(addr("1.1.1.1"), true);

    // z1 is broken at the provider; it also holds a stale record that a
    // partial pass must not delete.
    provider.fail_zone("z1");
    provider.seed_record("z1", "app.example.com", RecordType::A, addr("3.3.3.3"));

    let config = fast_config(vec![
        target("1.1.1.1", "z1", "app.example.com"),
        target("1.1.1.1", "z2", "web.example.net"),
    ]);
    let (engine, _events) = Engine::new(
        Arc::new(prober.clone()),
        Arc::new(provider.clone()),
        Arc::new(store.clone()),
        config,
    )
    .expect("engine construction succeeds");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { engine.run_with_shutdown(shutdown_rx).await });

    sleep_secs(12).await;

    // z2 converged despite z1 failing every pass.
    let z2 = provider.records("z2");
    assert_eq!(z2.len(), 1);
    assert_eq!(z2[0].address, addr("1.1.1.1"));

    // z1 was left exactly as it was.
    let z1 = provider.records("z1");
    assert_eq!(z1.len(), 1);
    assert_eq!(z1[0].address, addr("3.3.3.3"));

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn shutdown_flushes_state_and_mutates_nothing() {
    let prober = ScriptedProber::new();
    let provider = MockDnsProvider::new();
    let store = MockStateStore::new();
    prober.set_reachable(addr("1.1.1.1"), true);

    let config = fast_config(vec![target("1.1.1.1", "z1", "app.example.com")]);
    let (engine, _events) = Engine::new(
        Arc::new(prober.clone()),
        Arc::new(provider.clone()),
        Arc::new(store.clone()),
        config,
    )
    .expect("engine construction succeeds");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { engine.run_with_shutdown(shutdown_rx).await });

    // Stop before the first sync pass would run at t=10s.
    sleep_secs(3).await;
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(store.flush_call_count(), 1, "state is flushed exactly once");
    assert_eq!(provider.create_call_count(), 0);
    assert_eq!(provider.delete_call_count(), 0);

    // The probe cycles before shutdown were persisted: the server is
    // already confirmed up for the next run.
    let health = store.health();
    assert_eq!(health["z1/1.1.1.1"].status, Status::Up);
}

#[tokio::test(start_paused = true)]
async fn restored_health_skips_the_warmup() {
    let prober = ScriptedProber::new();
    let provider = MockDnsProvider::new();
    let store = MockStateStore::new();
    prober.set_reachable(addr("1.1.1.1"), true);

    // Simulate a previous run that had confirmed the server up.
    let mut state = HealthState::new();
    state.status = Status::Up;
    store.set_health(HashMap::from([("z1/1.1.1.1".to_string(), state)]));

    let mut config = fast_config(vec![target("1.1.1.1", "z1", "app.example.com")]);
    // A high threshold that fresh state could not reach before the first
    // sync pass; only restored state can.
    config.flap.up_threshold = 30;

    let (engine, mut events) = Engine::new(
        Arc::new(prober.clone()),
        Arc::new(provider.clone()),
        Arc::new(store.clone()),
        config,
    )
    .expect("engine construction succeeds");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { engine.run_with_shutdown(shutdown_rx).await });

    sleep_secs(12).await;
    assert_eq!(
        provider.records("z1").len(),
        1,
        "restored up state should be advertised at the first pass"
    );

    // No transition happened; the server was already up.
    let seen = drain(&mut events);
    assert!(
        !seen
            .iter()
            .any(|e| matches!(e, Event::HealthTransition { .. }))
    );

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn shared_address_is_probed_once_per_cycle() {
    let prober = ScriptedProber::new();
    let provider = MockDnsProvider::new();
    let store = MockStateStore::new();
    prober.set_reachable(addr("1.1.1.1"), true);

    // One address serving two zones: health is tracked per zone key but
    // the wire probe happens once per cycle.
    let config = fast_config(vec![
        target("1.1.1.1", "z1", "app.example.com"),
        target("1.1.1.1", "z2", "web.example.net"),
    ]);
    let (engine, _events) = Engine::new(
        Arc::new(prober.clone()),
        Arc::new(provider.clone()),
        Arc::new(store.clone()),
        config,
    )
    .expect("engine construction succeeds");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { engine.run_with_shutdown(shutdown_rx).await });

    sleep_secs(3).await;
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    let health = store.health();
    assert_eq!(health["z1/1.1.1.1"].status, Status::Up);
    assert_eq!(health["z2/1.1.1.1"].status, Status::Up);

    // Cycles at t=0,1,2,3 probe the deduplicated address once each.
    assert!(
        prober.probe_call_count() <= 4,
        "expected at most one probe per cycle, got {}",
        prober.probe_call_count()
    );
}

#[tokio::test(start_paused = true)]
async fn unavailable_state_store_degrades_but_never_stops() {
    let prober = ScriptedProber::new();
    let provider = MockDnsProvider::new();
    let store = MockStateStore::new();
    store.fail_storage();
    prober.set_reachable(addr("1.1.1.1"), true);

    let config = fast_config(vec![target("1.1.1.1", "z1", "app.example.com")]);
    let (engine, _events) = Engine::new(
        Arc::new(prober.clone()),
        Arc::new(provider.clone()),
        Arc::new(store.clone()),
        config,
    )
    .expect("engine construction succeeds");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { engine.run_with_shutdown(shutdown_rx).await });

    // Health decisions keep working in memory and the zone still
    // converges, even though every store call fails.
    sleep_secs(12).await;
    assert_eq!(provider.records("z1").len(), 1);

    shutdown_tx.send(true).unwrap();
    handle
        .await
        .unwrap()
        .expect("state store outage is degraded mode, not fatal");
}
