//! Test doubles and common utilities for architecture contract tests
//!
//! The mocks are cheaply cloneable (all state behind Arcs) so a test can
//! keep a handle for assertions while the engine owns its own clone.

use dnsward_core::config::{Config, ServerTarget};
use dnsward_core::error::{Error, Result};
use dnsward_core::health::HealthState;
use dnsward_core::record::{ActualRecord, DesiredRecord, RecordType};
use dnsward_core::traits::state_store::ZoneSnapshot;
use dnsward_core::traits::{DnsProvider, ProbeOutcome, Prober, StateStore, UnreachableReason};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A prober whose verdict per address is controlled by the test
#[derive(Clone, Default)]
pub struct ScriptedProber {
    reachable: Arc<Mutex<HashSet<IpAddr>>>,
    probe_calls: Arc<AtomicUsize>,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an address as answering probes
    pub fn set_reachable(&self, address: IpAddr, reachable: bool) {
        let mut guard = self.reachable.lock().unwrap();
        if reachable {
            guard.insert(address);
        } else {
            guard.remove(&address);
        }
    }

    pub fn probe_call_count(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, address: IpAddr, _timeout: Duration) -> Result<ProbeOutcome> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        if self.reachable.lock().unwrap().contains(&address) {
            Ok(ProbeOutcome::Reachable)
        } else {
            Ok(ProbeOutcome::Unreachable(UnreachableReason::Timeout))
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// A DnsProvider backed by in-memory zones
///
/// Listing, creating and deleting behave like a real provider over the
/// stored records, so reconciliation semantics can be asserted end to end.
#[derive(Clone, Default)]
pub struct MockDnsProvider {
    zones: Arc<Mutex<HashMap<String, Vec<ActualRecord>>>>,
    failing_zones: Arc<Mutex<HashSet<String>>>,
    create_errors: Arc<Mutex<Vec<Error>>>,
    next_id: Arc<AtomicUsize>,
    list_calls: Arc<AtomicUsize>,
    create_calls: Arc<AtomicUsize>,
    delete_calls: Arc<AtomicUsize>,
}

impl MockDnsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plant a record as if it already existed in the zone
    pub fn seed_record(
        &self,
        zone_id: &str,
        hostname: &str,
        record_type: RecordType,
        address: IpAddr,
    ) -> String {
        let id = format!("seed-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let record = ActualRecord {
            id: id.clone(),
            zone_id: zone_id.to_string(),
            hostname: hostname.to_string(),
            record_type,
            address,
            proxied: false,
            ttl: 60,
        };
        self.zones
            .lock()
            .unwrap()
            .entry(zone_id.to_string())
            .or_default()
            .push(record);
        id
    }

    /// Current records of a zone, in insertion order
    pub fn records(&self, zone_id: &str) -> Vec<ActualRecord> {
        self.zones
            .lock()
            .unwrap()
            .get(zone_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Make every list call for a zone fail with a permanent error
    pub fn fail_zone(&self, zone_id: &str) {
        self.failing_zones
            .lock()
            .unwrap()
            .insert(zone_id.to_string());
    }

    /// Queue errors returned by the next create calls, in order
    pub fn push_create_error(&self, error: Error) {
        self.create_errors.lock().unwrap().push(error);
    }

    pub fn list_call_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn create_call_count(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn delete_call_count(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DnsProvider for MockDnsProvider {
    async fn list_records(
        &self,
        zone_id: &str,
        hostname: &str,
        record_type: RecordType,
    ) -> Result<Vec<ActualRecord>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_zones.lock().unwrap().contains(zone_id) {
            return Err(Error::auth("zone access revoked"));
        }
        Ok(self
            .zones
            .lock()
            .unwrap()
            .get(zone_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.hostname == hostname && r.record_type == record_type)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_record(
        &self,
        record: &DesiredRecord,
        ttl: u32,
        proxied: bool,
    ) -> Result<String> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut errors = self.create_errors.lock().unwrap();
            if !errors.is_empty() {
                return Err(errors.remove(0));
            }
        }
        let id = format!("mock-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let actual = ActualRecord {
            id: id.clone(),
            zone_id: record.zone_id.clone(),
            hostname: record.hostname.clone(),
            record_type: record.record_type,
            address: record.address,
            proxied,
            ttl,
        };
        self.zones
            .lock()
            .unwrap()
            .entry(record.zone_id.clone())
            .or_default()
            .push(actual);
        Ok(id)
    }

    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let mut zones = self.zones.lock().unwrap();
        let records = zones
            .get_mut(zone_id)
            .ok_or_else(|| Error::not_found(format!("zone {}", zone_id)))?;
        let before = records.len();
        records.retain(|r| r.id != record_id);
        if records.len() == before {
            return Err(Error::not_found(format!("record {}", record_id)));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// A StateStore that tracks flush calls and can simulate an outage
#[derive(Clone, Default)]
pub struct MockStateStore {
    health: Arc<Mutex<HashMap<String, HealthState>>>,
    zones: Arc<Mutex<HashMap<String, ZoneSnapshot>>>,
    flush_calls: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl MockStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flush_call_count(&self) -> usize {
        self.flush_calls.load(Ordering::SeqCst)
    }

    /// Direct view of the persisted health map
    pub fn health(&self) -> HashMap<String, HealthState> {
        self.health.lock().unwrap().clone()
    }

    /// Pre-populate health state, simulating an earlier run
    pub fn set_health(&self, states: HashMap<String, HealthState>) {
        *self.health.lock().unwrap() = states;
    }

    /// Last persisted snapshot for a zone
    pub fn zone_snapshot(&self, zone_id: &str) -> Option<ZoneSnapshot> {
        self.zones.lock().unwrap().get(zone_id).cloned()
    }

    /// Make every store operation fail from now on
    pub fn fail_storage(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::state_store("storage offline"));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl StateStore for MockStateStore {
    async fn load_health(&self) -> Result<HashMap<String, HealthState>> {
        self.check_available()?;
        Ok(self.health.lock().unwrap().clone())
    }

    async fn save_health(&self, states: &HashMap<String, HealthState>) -> Result<()> {
        self.check_available()?;
        *self.health.lock().unwrap() = states.clone();
        Ok(())
    }

    async fn load_zone_snapshot(&self, zone_id: &str) -> Result<Option<ZoneSnapshot>> {
        self.check_available()?;
        Ok(self.zones.lock().unwrap().get(zone_id).cloned())
    }

    async fn save_zone_snapshot(&self, snapshot: &ZoneSnapshot) -> Result<()> {
        self.check_available()?;
        self.zones
            .lock()
            .unwrap()
            .insert(snapshot.zone_id.clone(), snapshot.clone());
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.flush_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(())
    }
}

/// One A-record target for `hostname` in `zone`
pub fn target(address: &str, zone: &str, hostname: &str) -> ServerTarget {
    ServerTarget {
        address: address.parse().unwrap(),
        zone_id: zone.to_string(),
        hostnames: BTreeSet::from([hostname.to_string()]),
        record_types: BTreeSet::from([RecordType::A]),
    }
}

/// Engine configuration tuned for paused-clock tests
///
/// Probe every second, confirm transitions after two consecutive results,
/// reconcile every ten seconds, retry with millisecond backoff.
pub fn fast_config(targets: Vec<ServerTarget>) -> Config {
    let mut config = Config::new(targets);
    config.probe.interval_secs = 1;
    config.probe.timeout_secs = 0;
    config.flap.up_threshold = 2;
    config.flap.down_threshold = 2;
    config.sync.interval_secs = 10;
    config.retry.max_attempts = 3;
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 2;
    config
}
