//! Events emitted by the engine
//!
//! Consumers (the daemon's log forwarder, notifiers) receive these over a
//! bounded channel; they describe confirmed facts, not raw probe results.

use chrono::{DateTime, Utc};
use std::net::IpAddr;

use crate::health::Status;

/// Events emitted by the engine during operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A server's confirmed health status changed
    HealthTransition {
        /// Health key of the server ("{zone_id}/{address}")
        key: String,
        /// Probed address
        address: IpAddr,
        /// Zone the server belongs to
        zone_id: String,
        /// Status before the change
        from: Status,
        /// Status after the change
        to: Status,
        /// When the change was confirmed
        at: DateTime<Utc>,
    },
    /// A reconciliation pass over one zone finished
    ReconciliationResult {
        /// Zone that was reconciled
        zone_id: String,
        /// Records created in this pass
        created: Vec<String>,
        /// Records deleted in this pass
        deleted: Vec<String>,
        /// Operations that failed after retries were exhausted
        errors: Vec<String>,
    },
}

impl Event {
    /// Whether the event represents a no-op reconciliation pass
    pub fn is_noop_reconciliation(&self) -> bool {
        match self {
            Event::ReconciliationResult {
                created,
                deleted,
                errors,
                ..
            } => created.is_empty() && deleted.is_empty() && errors.is_empty(),
            Event::HealthTransition { .. } => false,
        }
    }
}
