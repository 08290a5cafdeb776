//! StateStore trait for persisting health and reconciliation state

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;
use crate::health::HealthState;
use crate::record::ActualRecord;

/// The managed record set a zone held after its last mutating pass
///
/// A cheap baseline for the next pass's diff. The reconciler still treats
/// each pass's live fetch as authoritative, so a stale or lost snapshot
/// only costs the baseline, never correctness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneSnapshot {
    /// Zone identifier
    pub zone_id: String,
    /// When the pass completed
    pub completed_at: DateTime<Utc>,
    /// Managed records present once the pass finished
    pub records: Vec<ActualRecord>,
}

/// Trait for persisting engine state across restarts
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load all persisted health state, keyed by "{zone_id}/{address}"
    async fn load_health(&self) -> Result<HashMap<String, HealthState>>;

    /// Persist the full health state map
    async fn save_health(&self, states: &HashMap<String, HealthState>) -> Result<()>;

    /// Load the last reconciliation snapshot for a zone, if any
    async fn load_zone_snapshot(&self, zone_id: &str) -> Result<Option<ZoneSnapshot>>;

    /// Persist the reconciliation snapshot for a zone
    async fn save_zone_snapshot(&self, snapshot: &ZoneSnapshot) -> Result<()>;

    /// Flush any buffered state to durable storage
    async fn flush(&self) -> Result<()>;
}
