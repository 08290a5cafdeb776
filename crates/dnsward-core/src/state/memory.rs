// # Memory State Store
//
// In-memory implementation of StateStore.
//
// All state is lost on restart, so the first probe cycles after a crash
// re-confirm every server from the initial down state before any record is
// advertised. Useful for testing and container deployments where that
// warm-up is acceptable.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::health::HealthState;
use crate::traits::state_store::{StateStore, ZoneSnapshot};

/// In-memory state store implementation
///
/// Health state and zone snapshots live in RwLock-protected maps with no
/// persistence across restarts.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    health: Arc<RwLock<HashMap<String, HealthState>>>,
    zones: Arc<RwLock<HashMap<String, ZoneSnapshot>>>,
}

impl MemoryStateStore {
    /// Create a new empty memory state store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of tracked health entries
    pub async fn len(&self) -> usize {
        self.health.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.health.read().await.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load_health(&self) -> Result<HashMap<String, HealthState>, Error> {
        Ok(self.health.read().await.clone())
    }

    async fn save_health(&self, states: &HashMap<String, HealthState>) -> Result<(), Error> {
        let mut guard = self.health.write().await;
        *guard = states.clone();
        Ok(())
    }

    async fn load_zone_snapshot(&self, zone_id: &str) -> Result<Option<ZoneSnapshot>, Error> {
        Ok(self.zones.read().await.get(zone_id).cloned())
    }

    async fn save_zone_snapshot(&self, snapshot: &ZoneSnapshot) -> Result<(), Error> {
        let mut guard = self.zones.write().await;
        guard.insert(snapshot.zone_id.clone(), snapshot.clone());
        Ok(())
    }

    async fn flush(&self) -> Result<(), Error> {
        // No-op for memory store (everything is already "persisted")
        Ok(())
    }
}
