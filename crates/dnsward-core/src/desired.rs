//! Desired-state view
//!
//! Pure functions that turn a health snapshot into the set of records that
//! should exist. No I/O happens here, which is what makes reconciliation
//! testable without a provider.

use std::collections::{BTreeSet, HashMap};

use crate::config::ServerTarget;
use crate::health::{HealthState, Status};
use crate::record::DesiredRecord;

/// Compute the records that should exist for one zone
///
/// A target contributes one record per (hostname, record type) pair while
/// its health key is confirmed up. Targets without an entry in the snapshot
/// are treated as down, so a fresh start advertises nothing until probes
/// confirm health.
pub fn desired_records_for_zone(
    zone_id: &str,
    targets: &[ServerTarget],
    health: &HashMap<String, HealthState>,
) -> BTreeSet<DesiredRecord> {
    let mut desired = BTreeSet::new();
    for target in targets.iter().filter(|t| t.zone_id == zone_id) {
        let up = health
            .get(&target.key())
            .map(|state| state.status == Status::Up)
            .unwrap_or(false);
        if !up {
            continue;
        }
        for hostname in &target.hostnames {
            for record_type in &target.record_types {
                desired.insert(DesiredRecord {
                    zone_id: target.zone_id.clone(),
                    hostname: hostname.clone(),
                    record_type: *record_type,
                    address: target.address,
                });
            }
        }
    }
    desired
}
