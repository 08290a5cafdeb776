//! Configuration types for the dnsward system
//!
//! Configuration is parsed and validated once at startup and treated as
//! immutable for the lifetime of a run. Validation happens before any loop
//! starts so malformed entries fail fast instead of mid-run.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use crate::error::{Error, Result};
use crate::record::{ActualRecord, RecordType};

/// One monitored backend server
///
/// While the server is confirmed up, one record per (hostname, record type)
/// pair is advertised in its zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerTarget {
    /// Address probed for liveness and used as record content
    pub address: IpAddr,

    /// Provider zone the records live in
    pub zone_id: String,

    /// DNS names this server appears under when healthy
    pub hostnames: BTreeSet<String>,

    /// Record types to manage for this server
    pub record_types: BTreeSet<RecordType>,
}

impl ServerTarget {
    /// Stable identifier used by the health map and state store
    pub fn key(&self) -> String {
        format!("{}/{}", self.zone_id, self.address)
    }

    fn validate(&self) -> Result<()> {
        if self.zone_id.is_empty() {
            return Err(Error::config(format!(
                "Target {} has an empty zone id",
                self.address
            )));
        }
        if self.hostnames.is_empty() {
            return Err(Error::config(format!(
                "Target {} has no hostnames configured",
                self.address
            )));
        }
        if self.record_types.is_empty() {
            return Err(Error::config(format!(
                "Target {} has no record types configured",
                self.address
            )));
        }
        for record_type in &self.record_types {
            if !record_type.matches(&self.address) {
                return Err(Error::config(format!(
                    "Record type {} does not match the address family of {}",
                    record_type, self.address
                )));
            }
        }
        Ok(())
    }
}

/// Probe loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Seconds between probe cycles
    #[serde(default = "default_probe_interval_secs")]
    pub interval_secs: u64,

    /// Per-probe timeout in seconds; must be strictly below the interval
    #[serde(default = "default_probe_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum number of concurrent probes within one cycle
    #[serde(default = "default_probe_concurrency")]
    pub concurrency: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_probe_interval_secs(),
            timeout_secs: default_probe_timeout_secs(),
            concurrency: default_probe_concurrency(),
        }
    }
}

/// Reconciliation loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Seconds between reconciliation passes
    #[serde(default = "default_sync_interval_secs")]
    pub interval_secs: u64,

    /// TTL applied to created records
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Whether created records are proxied through the provider
    #[serde(default)]
    pub proxied: bool,

    /// When false, health is tracked and reported but DNS is never modified
    #[serde(default = "default_manage_dns")]
    pub manage_dns: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sync_interval_secs(),
            ttl: default_ttl(),
            proxied: false,
            manage_dns: default_manage_dns(),
        }
    }
}

/// Hysteresis thresholds
///
/// The down threshold should generally be at least the up threshold so that
/// recovery is faster than removal; that ratio is deployment policy and is
/// not enforced here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlapConfig {
    /// Consecutive successes required to confirm a server up
    #[serde(default = "default_up_threshold")]
    pub up_threshold: u32,

    /// Consecutive failures required to confirm a server down
    #[serde(default = "default_down_threshold")]
    pub down_threshold: u32,
}

impl Default for FlapConfig {
    fn default() -> Self {
        Self {
            up_threshold: default_up_threshold(),
            down_threshold: default_down_threshold(),
        }
    }
}

/// Backoff settings for provider API calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per operation, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Delay before the first retry, in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on any single backoff delay, in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Main dnsward configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Monitored servers
    pub targets: Vec<ServerTarget>,

    /// Probe loop settings
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Reconciliation loop settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Hysteresis thresholds
    #[serde(default)]
    pub flap: FlapConfig,

    /// Provider call backoff settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Capacity of the engine event channel; events are dropped with a
    /// warning when full
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Config {
    /// Create a configuration with default settings and no targets
    pub fn new(targets: Vec<ServerTarget>) -> Self {
        Self {
            targets,
            probe: ProbeConfig::default(),
            sync: SyncConfig::default(),
            flap: FlapConfig::default(),
            retry: RetryConfig::default(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            return Err(Error::config("No targets configured"));
        }
        for target in &self.targets {
            target.validate()?;
        }

        if self.probe.interval_secs == 0 {
            return Err(Error::config("Probe interval must be > 0"));
        }
        if self.probe.timeout_secs >= self.probe.interval_secs {
            return Err(Error::config(format!(
                "Probe timeout ({}s) must be strictly below the probe interval ({}s)",
                self.probe.timeout_secs, self.probe.interval_secs
            )));
        }
        if self.probe.concurrency == 0 {
            return Err(Error::config("Probe concurrency must be > 0"));
        }

        if self.sync.interval_secs == 0 {
            return Err(Error::config("Sync interval must be > 0"));
        }

        if self.flap.up_threshold == 0 || self.flap.down_threshold == 0 {
            return Err(Error::config("Flap thresholds must be >= 1"));
        }

        if self.retry.max_attempts == 0 {
            return Err(Error::config("Retry max_attempts must be >= 1"));
        }

        Ok(())
    }

    /// Group targets into per-zone reconciliation policies
    ///
    /// All hostnames assigned to a zone are aggregated into one policy so
    /// the reconciler handles a zone in a single pass. Zones come out in
    /// deterministic order.
    pub fn zone_policies(&self) -> Vec<ZonePolicy> {
        let mut zones: BTreeMap<&str, ZonePolicy> = BTreeMap::new();
        for target in &self.targets {
            let policy = zones
                .entry(target.zone_id.as_str())
                .or_insert_with(|| ZonePolicy {
                    zone_id: target.zone_id.clone(),
                    hostnames: BTreeSet::new(),
                    record_types: BTreeSet::new(),
                    ttl: self.sync.ttl,
                    proxied: self.sync.proxied,
                });
            policy.hostnames.extend(target.hostnames.iter().cloned());
            policy.record_types.extend(target.record_types.iter());
        }
        zones.into_values().collect()
    }
}

/// Per-zone reconciliation policy
///
/// Defines the set of records the reconciler owns inside a zone. Records
/// outside `hostnames` x `record_types` are never touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZonePolicy {
    /// Provider zone identifier
    pub zone_id: String,
    /// All hostnames managed in this zone
    pub hostnames: BTreeSet<String>,
    /// All record types managed in this zone
    pub record_types: BTreeSet<RecordType>,
    /// TTL for created records
    pub ttl: u32,
    /// Proxied flag for created records
    pub proxied: bool,
}

impl ZonePolicy {
    /// Whether a provider record falls under this policy's ownership
    pub fn owns(&self, record: &ActualRecord) -> bool {
        self.hostnames.contains(&record.hostname)
            && self.record_types.contains(&record.record_type)
    }
}

fn default_probe_interval_secs() -> u64 {
    10
}

fn default_probe_timeout_secs() -> u64 {
    2
}

fn default_probe_concurrency() -> usize {
    8
}

fn default_sync_interval_secs() -> u64 {
    180
}

fn default_ttl() -> u32 {
    60
}

fn default_manage_dns() -> bool {
    true
}

fn default_up_threshold() -> u32 {
    2
}

fn default_down_threshold() -> u32 {
    3
}

fn default_max_attempts() -> usize {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    5_000
}

fn default_event_channel_capacity() -> usize {
    1_000
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(address: &str, zone: &str, hostname: &str) -> ServerTarget {
        ServerTarget {
            address: address.parse().unwrap(),
            zone_id: zone.to_string(),
            hostnames: BTreeSet::from([hostname.to_string()]),
            record_types: BTreeSet::from([RecordType::A]),
        }
    }

    #[test]
    fn empty_targets_rejected() {
        let config = Config::new(Vec::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn valid_config_accepted() {
        let config = Config::new(vec![target("1.2.3.4", "z1", "app.example.com")]);
        config.validate().unwrap();
    }

    #[test]
    fn record_type_family_mismatch_rejected() {
        let mut t = target("1.2.3.4", "z1", "app.example.com");
        t.record_types = BTreeSet::from([RecordType::Aaaa]);
        let config = Config::new(vec![t]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn probe_timeout_must_be_below_interval() {
        let mut config = Config::new(vec![target("1.2.3.4", "z1", "app.example.com")]);
        config.probe.interval_secs = 2;
        config.probe.timeout_secs = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_threshold_rejected() {
        let mut config = Config::new(vec![target("1.2.3.4", "z1", "app.example.com")]);
        config.flap.up_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zone_policies_aggregate_hostnames_per_zone() {
        let config = Config::new(vec![
            target("1.2.3.4", "z1", "app.example.com"),
            target("5.6.7.8", "z1", "web.example.com"),
            target("9.9.9.9", "z2", "other.example.net"),
        ]);

        let policies = config.zone_policies();
        assert_eq!(policies.len(), 2);

        let z1 = policies.iter().find(|p| p.zone_id == "z1").unwrap();
        assert_eq!(z1.hostnames.len(), 2);
        assert!(z1.hostnames.contains("app.example.com"));
        assert!(z1.hostnames.contains("web.example.com"));

        let z2 = policies.iter().find(|p| p.zone_id == "z2").unwrap();
        assert_eq!(z2.hostnames.len(), 1);
    }

    #[test]
    fn zone_policy_ownership() {
        let config = Config::new(vec![target("1.2.3.4", "z1", "app.example.com")]);
        let policy = config.zone_policies().remove(0);

        let owned = ActualRecord {
            id: "rec1".to_string(),
            zone_id: "z1".to_string(),
            hostname: "app.example.com".to_string(),
            record_type: RecordType::A,
            address: "1.2.3.4".parse().unwrap(),
            proxied: false,
            ttl: 60,
        };
        assert!(policy.owns(&owned));

        let mut foreign_name = owned.clone();
        foreign_name.hostname = "mail.example.com".to_string();
        assert!(!policy.owns(&foreign_name));

        let mut foreign_type = owned.clone();
        foreign_type.record_type = RecordType::Aaaa;
        assert!(!policy.owns(&foreign_type));
    }
}
