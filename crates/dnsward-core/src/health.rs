//! Flap-resistant health state machine
//!
//! Each server starts `Down` and is only advertised after enough
//! consecutive successful probes; removal likewise requires consecutive
//! failures. A single opposite probe result resets the counter building
//! toward a transition, which is what suppresses flapping.
//!
//! Ownership: the probe loop is the single writer; the reconciliation loop
//! only takes cloned snapshots. That discipline makes the shared map safe
//! without holding a lock across a whole reconciliation pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::traits::prober::ProbeOutcome;

/// Confirmed health status of a server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Confirmed reachable; advertised in DNS
    Up,
    /// Confirmed (or not yet proven) unreachable; not advertised
    Down,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Up => f.write_str("up"),
            Status::Down => f.write_str("down"),
        }
    }
}

/// Per-server hysteresis state
///
/// Exactly one of the two counters is being driven at any time: a success
/// resets `consecutive_failures` and increments `consecutive_successes`,
/// a failure does the reverse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthState {
    /// Current confirmed status
    pub status: Status,
    /// Successes accumulated toward an up transition
    pub consecutive_successes: u32,
    /// Failures accumulated toward a down transition
    pub consecutive_failures: u32,
    /// When the server was last probed
    pub last_probe_at: Option<DateTime<Utc>>,
    /// When the status last changed
    pub last_transition_at: Option<DateTime<Utc>>,
}

impl HealthState {
    /// Initial state: unconfirmed down, no history
    ///
    /// Fail-safe: a server is not advertised until proven healthy.
    pub fn new() -> Self {
        Self {
            status: Status::Down,
            consecutive_successes: 0,
            consecutive_failures: 0,
            last_probe_at: None,
            last_transition_at: None,
        }
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

/// A confirmed status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Status before the change
    pub from: Status,
    /// Status after the change
    pub to: Status,
    /// When the change was confirmed
    pub at: DateTime<Utc>,
}

/// Health state machine over all monitored servers
///
/// Cheap to clone; clones share the underlying state map.
#[derive(Debug, Clone)]
pub struct HealthTracker {
    states: Arc<RwLock<HashMap<String, HealthState>>>,
    up_threshold: u32,
    down_threshold: u32,
}

impl HealthTracker {
    /// Create a tracker with the given hysteresis thresholds
    pub fn new(up_threshold: u32, down_threshold: u32) -> Self {
        Self {
            states: Arc::new(RwLock::new(HashMap::new())),
            up_threshold,
            down_threshold,
        }
    }

    /// Seed the tracker with persisted state, e.g. after a restart
    ///
    /// Keys absent from `states` keep their implicit initial down state.
    pub async fn restore(&self, states: HashMap<String, HealthState>) {
        let mut guard = self.states.write().await;
        *guard = states;
    }

    /// Apply one probe outcome to one server
    ///
    /// Returns the updated state and, when a threshold was crossed, the
    /// transition that confirmed it. Counters for different servers are
    /// fully independent.
    pub async fn observe(
        &self,
        key: &str,
        outcome: &ProbeOutcome,
        now: DateTime<Utc>,
    ) -> (HealthState, Option<Transition>) {
        let mut guard = self.states.write().await;
        let state = guard.entry(key.to_string()).or_default();

        let mut transition = None;
        match outcome {
            ProbeOutcome::Reachable => {
                state.consecutive_successes += 1;
                state.consecutive_failures = 0;
                if state.status == Status::Down
                    && state.consecutive_successes >= self.up_threshold
                {
                    state.status = Status::Up;
                    state.consecutive_successes = 0;
                    state.consecutive_failures = 0;
                    state.last_transition_at = Some(now);
                    transition = Some(Transition {
                        from: Status::Down,
                        to: Status::Up,
                        at: now,
                    });
                }
            }
            ProbeOutcome::Unreachable(_) => {
                state.consecutive_failures += 1;
                state.consecutive_successes = 0;
                if state.status == Status::Up
                    && state.consecutive_failures >= self.down_threshold
                {
                    state.status = Status::Down;
                    state.consecutive_successes = 0;
                    state.consecutive_failures = 0;
                    state.last_transition_at = Some(now);
                    transition = Some(Transition {
                        from: Status::Up,
                        to: Status::Down,
                        at: now,
                    });
                }
            }
        }
        state.last_probe_at = Some(now);

        (state.clone(), transition)
    }

    /// Take an immutable snapshot of all tracked state
    pub async fn snapshot(&self) -> HashMap<String, HealthState> {
        self.states.read().await.clone()
    }
}
