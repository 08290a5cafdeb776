// # dnsward-core
//
// Core library for the health-gated DNS reconciliation system.
//
// ## Architecture Overview
//
// - **Prober**: trait for checking whether a backend server is reachable
// - **HealthTracker**: flap-resistant up/down state machine with hysteresis
// - **DnsProvider**: trait for listing, creating and deleting DNS records
// - **Reconciler**: diffs desired records against the provider and applies
//   the minimal set of create/delete operations per zone
// - **StateStore**: trait for persisting health state across restarts
// - **Notifier**: trait for pushing confirmed events to humans
// - **Engine**: drives the probe and reconciliation loops concurrently
//
// ## Design Principles
//
// 1. **Health gates DNS**: records exist only for servers confirmed up
// 2. **Two loops, one writer**: probing writes health, reconciliation
//    reads snapshots
// 3. **Pure planning**: the desired view and the diff are pure functions,
//    all I/O sits at the trait seams
// 4. **Zone isolation**: one zone's failure never blocks another zone

pub mod config;
pub mod desired;
pub mod engine;
pub mod error;
pub mod event;
pub mod health;
pub mod reconcile;
pub mod record;
pub mod retry;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{Config, FlapConfig, ProbeConfig, RetryConfig, ServerTarget, SyncConfig, ZonePolicy};
pub use engine::Engine;
pub use error::{Error, Result};
pub use event::Event;
pub use health::{HealthState, HealthTracker, Status, Transition};
pub use reconcile::{ReconciliationPlan, Reconciler, ZoneOutcome, plan};
pub use record::{ActualRecord, DesiredRecord, RecordType};
pub use state::{FileStateStore, MemoryStateStore};
pub use traits::{DnsProvider, LogNotifier, Notifier, ProbeOutcome, Prober, StateStore, UnreachableReason};
