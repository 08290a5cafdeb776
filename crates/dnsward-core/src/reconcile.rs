//! DNS reconciliation
//!
//! Each pass over a zone lists the provider's actual records for every
//! managed (hostname, record type) pair, diffs them against the desired
//! set and applies the minimal create/delete operations. Records outside
//! the zone policy are invisible to the pass and therefore never touched.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{RetryConfig, ZonePolicy};
use crate::error::Result;
use crate::record::{ActualRecord, DesiredRecord};
use crate::retry::with_backoff;
use crate::traits::DnsProvider;

/// The minimal set of operations that converges a zone
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationPlan {
    /// Desired records with no matching actual record
    pub to_create: Vec<DesiredRecord>,
    /// Actual records with no matching desired record, plus duplicates
    pub to_delete: Vec<ActualRecord>,
    /// Actual records that already satisfy a desired record
    pub to_keep: Vec<ActualRecord>,
}

impl ReconciliationPlan {
    /// Whether the zone is already converged
    pub fn is_noop(&self) -> bool {
        self.to_create.is_empty() && self.to_delete.is_empty()
    }
}

/// Diff desired records against the provider's actual records
///
/// Matching is by (hostname, type, address); provider ids and record
/// attributes like TTL do not participate. When the provider holds several
/// copies of the same record, the first keeps satisfying the desired entry
/// and the extras are scheduled for deletion.
pub fn plan(desired: &BTreeSet<DesiredRecord>, actual: &[ActualRecord]) -> ReconciliationPlan {
    let desired_keys: HashSet<_> = desired.iter().map(DesiredRecord::key).collect();

    let mut result = ReconciliationPlan::default();
    let mut satisfied = HashSet::new();
    for record in actual {
        let key = record.key();
        if desired_keys.contains(&key) && satisfied.insert(key) {
            result.to_keep.push(record.clone());
        } else {
            result.to_delete.push(record.clone());
        }
    }

    for record in desired {
        if !satisfied.contains(&record.key()) {
            result.to_create.push(record.clone());
        }
    }

    result
}

/// Result of one reconciliation pass over a zone
#[derive(Debug, Clone, Default)]
pub struct ZoneOutcome {
    /// Zone that was reconciled
    pub zone_id: String,
    /// Display form of each record created
    pub created: Vec<String>,
    /// Display form of each record deleted
    pub deleted: Vec<String>,
    /// Number of records left untouched
    pub kept: usize,
    /// Managed records present once the pass finished
    pub records: Vec<ActualRecord>,
    /// Operations that failed after retries were exhausted
    pub errors: Vec<String>,
}

/// Applies reconciliation plans through a DNS provider
pub struct Reconciler {
    provider: Arc<dyn DnsProvider>,
    retry: RetryConfig,
    manage_dns: bool,
}

impl Reconciler {
    /// Create a reconciler over the given provider
    pub fn new(provider: Arc<dyn DnsProvider>, retry: RetryConfig, manage_dns: bool) -> Self {
        Self {
            provider,
            retry,
            manage_dns,
        }
    }

    /// Run one pass over a zone
    ///
    /// Listing failures abort the whole pass with no changes applied, so a
    /// partial view of the zone can never cause deletions. Individual
    /// create/delete failures are recorded in the outcome; a permanent
    /// failure additionally stops issuing further operations to the zone
    /// for this pass.
    pub async fn reconcile_zone(
        &self,
        policy: &ZonePolicy,
        desired: BTreeSet<DesiredRecord>,
    ) -> Result<ZoneOutcome> {
        let mut actual = Vec::new();
        for hostname in &policy.hostnames {
            for record_type in &policy.record_types {
                let records = with_backoff(&self.retry, "list_records", || {
                    self.provider
                        .list_records(&policy.zone_id, hostname, *record_type)
                })
                .await?;
                // Providers are queried per managed pair, but a sloppy
                // implementation could still return extra rows. Anything
                // outside the policy must stay invisible to the diff.
                actual.extend(records.into_iter().filter(|r| policy.owns(r)));
            }
        }

        let plan = plan(&desired, &actual);
        let mut outcome = ZoneOutcome {
            zone_id: policy.zone_id.clone(),
            kept: plan.to_keep.len(),
            records: plan.to_keep.clone(),
            ..ZoneOutcome::default()
        };

        if plan.is_noop() {
            debug!(zone = %policy.zone_id, kept = outcome.kept, "Zone already converged");
            return Ok(outcome);
        }

        if !self.manage_dns {
            info!(
                zone = %policy.zone_id,
                would_create = plan.to_create.len(),
                would_delete = plan.to_delete.len(),
                "DNS management disabled, not applying plan"
            );
            return Ok(outcome);
        }

        // Deletes first so a full zone never briefly holds both the stale
        // and the fresh set of records.
        for record in &plan.to_delete {
            let result = with_backoff(&self.retry, "delete_record", || {
                self.provider.delete_record(&record.zone_id, &record.id)
            })
            .await;
            match result {
                Ok(()) => {
                    info!(zone = %policy.zone_id, record = %record, "Deleted record");
                    outcome.deleted.push(record.to_string());
                }
                Err(err) => {
                    warn!(zone = %policy.zone_id, record = %record, error = %err, "Delete failed");
                    outcome.errors.push(format!("delete {}: {}", record, err));
                    if !err.is_transient() {
                        return Ok(outcome);
                    }
                }
            }
        }

        for record in &plan.to_create {
            let result = with_backoff(&self.retry, "create_record", || {
                self.provider.create_record(record, policy.ttl, policy.proxied)
            })
            .await;
            match result {
                Ok(id) => {
                    info!(zone = %policy.zone_id, record = %record, %id, "Created record");
                    outcome.created.push(record.to_string());
                    outcome.records.push(ActualRecord {
                        id,
                        zone_id: record.zone_id.clone(),
                        hostname: record.hostname.clone(),
                        record_type: record.record_type,
                        address: record.address,
                        proxied: policy.proxied,
                        ttl: policy.ttl,
                    });
                }
                Err(err) => {
                    warn!(zone = %policy.zone_id, record = %record, error = %err, "Create failed");
                    outcome.errors.push(format!("create {}: {}", record, err));
                    if !err.is_transient() {
                        return Ok(outcome);
                    }
                }
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordType;

    fn desired(hostname: &str, address: &str) -> DesiredRecord {
        DesiredRecord {
            zone_id: "z1".to_string(),
            hostname: hostname.to_string(),
            record_type: RecordType::A,
            address: address.parse().unwrap(),
        }
    }

    fn actual(id: &str, hostname: &str, address: &str) -> ActualRecord {
        ActualRecord {
            id: id.to_string(),
            zone_id: "z1".to_string(),
            hostname: hostname.to_string(),
            record_type: RecordType::A,
            address: address.parse().unwrap(),
            proxied: false,
            ttl: 60,
        }
    }

    #[test]
    fn converged_zone_is_a_noop() {
        let desired_set = BTreeSet::from([desired("app.example.com", "1.1.1.1")]);
        let actual_set = vec![actual("r1", "app.example.com", "1.1.1.1")];

        let plan = plan(&desired_set, &actual_set);
        assert!(plan.is_noop());
        assert_eq!(plan.to_keep.len(), 1);
    }

    #[test]
    fn diff_produces_minimal_operations() {
        // Desired: 1.1.1.1 and 2.2.2.2. Actual: 2.2.2.2 and stale 3.3.3.3.
        let desired_set = BTreeSet::from([
            desired("app.example.com", "1.1.1.1"),
            desired("app.example.com", "2.2.2.2"),
        ]);
        let actual_set = vec![
            actual("r2", "app.example.com", "2.2.2.2"),
            actual("r3", "app.example.com", "3.3.3.3"),
        ];

        let plan = plan(&desired_set, &actual_set);
        assert_eq!(plan.to_create.len(), 1);
        assert_eq!(plan.to_create[0].address, "1.1.1.1".parse::<std::net::IpAddr>().unwrap());
        assert_eq!(plan.to_delete.len(), 1);
        assert_eq!(plan.to_delete[0].id, "r3");
        assert_eq!(plan.to_keep.len(), 1);
        assert_eq!(plan.to_keep[0].id, "r2");
    }

    #[test]
    fn duplicate_actual_records_are_trimmed_to_one() {
        let desired_set = BTreeSet::from([desired("app.example.com", "1.1.1.1")]);
        let actual_set = vec![
            actual("r1", "app.example.com", "1.1.1.1"),
            actual("r2", "app.example.com", "1.1.1.1"),
        ];

        let plan = plan(&desired_set, &actual_set);
        assert!(plan.to_create.is_empty());
        assert_eq!(plan.to_keep.len(), 1);
        assert_eq!(plan.to_keep[0].id, "r1");
        assert_eq!(plan.to_delete.len(), 1);
        assert_eq!(plan.to_delete[0].id, "r2");
    }

    #[test]
    fn empty_desired_deletes_everything_listed() {
        let actual_set = vec![
            actual("r1", "app.example.com", "1.1.1.1"),
            actual("r2", "app.example.com", "2.2.2.2"),
        ];

        let plan = plan(&BTreeSet::new(), &actual_set);
        assert_eq!(plan.to_delete.len(), 2);
        assert!(plan.to_create.is_empty());
        assert!(plan.to_keep.is_empty());
    }

    #[test]
    fn empty_zone_creates_everything_desired() {
        let desired_set = BTreeSet::from([
            desired("app.example.com", "1.1.1.1"),
            desired("web.example.com", "1.1.1.1"),
        ]);

        let plan = plan(&desired_set, &[]);
        assert_eq!(plan.to_create.len(), 2);
        assert!(plan.to_delete.is_empty());
    }
}
