//! Core dnsward engine
//!
//! Two independent periodic loops share one health tracker:
//!
//! ```text
//! ┌────────────┐   probe cycle    ┌───────────────┐
//! │   Prober   │─────────────────▶│ HealthTracker │
//! └────────────┘                  └───────┬───────┘
//!                                 snapshot│
//!                                         ▼
//! ┌────────────┐   zone passes   ┌───────────────┐
//! │ DnsProvider│◀────────────────│  Reconciler   │
//! └────────────┘                 └───────────────┘
//! ```
//!
//! The probe loop is the only writer of health state; the sync loop reads
//! snapshots. A slow or failing provider therefore never delays probing,
//! and probe storms never interleave with a reconciliation pass.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::desired::desired_records_for_zone;
use crate::error::Result;
use crate::event::Event;
use crate::health::HealthTracker;
use crate::reconcile::Reconciler;
use crate::traits::prober::UnreachableReason;
use crate::traits::state_store::ZoneSnapshot;
use crate::traits::{DnsProvider, ProbeOutcome, Prober, StateStore};

/// Core dnsward engine
///
/// Created once at startup, then driven by [`Engine::run_with_shutdown`]
/// until the caller's watch channel signals shutdown.
pub struct Engine {
    prober: Arc<dyn Prober>,
    state_store: Arc<dyn StateStore>,
    reconciler: Reconciler,
    tracker: HealthTracker,
    config: Config,
    event_tx: mpsc::Sender<Event>,
}

impl Engine {
    /// Create a new engine
    ///
    /// Returns the engine and the receiver for engine events. Events are
    /// delivered over a bounded channel and dropped with a warning when
    /// the consumer falls behind.
    pub fn new(
        prober: Arc<dyn Prober>,
        provider: Arc<dyn DnsProvider>,
        state_store: Arc<dyn StateStore>,
        config: Config,
    ) -> Result<(Self, mpsc::Receiver<Event>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);
        let tracker = HealthTracker::new(config.flap.up_threshold, config.flap.down_threshold);
        let reconciler = Reconciler::new(provider, config.retry.clone(), config.sync.manage_dns);

        let engine = Self {
            prober,
            state_store,
            reconciler,
            tracker,
            config,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Run the engine until the shutdown channel reads true
    ///
    /// Restores persisted health state, then drives the probe and sync
    /// loops concurrently. On shutdown both loops finish their current
    /// cycle, then state is flushed once before returning. A state store
    /// that cannot load or persist degrades the engine (health lives in
    /// memory only) but never stops it.
    pub async fn run_with_shutdown(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        match self.state_store.load_health().await {
            Ok(restored) if !restored.is_empty() => {
                info!(entries = restored.len(), "Restored health state");
                self.tracker.restore(restored).await;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(error = %err, "Failed to load health state, starting from scratch")
            }
        }

        info!(
            targets = self.config.targets.len(),
            zones = self.config.zone_policies().len(),
            "Engine started"
        );

        tokio::join!(
            self.probe_loop(shutdown.clone()),
            self.sync_loop(shutdown.clone()),
        );

        if let Err(err) = self
            .state_store
            .save_health(&self.tracker.snapshot().await)
            .await
        {
            warn!(error = %err, "Failed to persist health state at shutdown");
        }
        if let Err(err) = self.state_store.flush().await {
            warn!(error = %err, "Failed to flush state at shutdown");
        }
        info!("Engine stopped");

        Ok(())
    }

    async fn probe_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticks =
            tokio::time::interval(Duration::from_secs(self.config.probe.interval_secs));
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticks.tick() => self.probe_cycle().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Probe loop stopping");
                        break;
                    }
                }
            }
        }
    }

    /// Run one probe cycle over every distinct target address
    ///
    /// Addresses shared by several targets are probed once per cycle and
    /// the single outcome is applied to each sharing target. Probes run
    /// with bounded parallelism so a large fleet cannot stampede.
    async fn probe_cycle(&self) {
        let timeout = Duration::from_secs(self.config.probe.timeout_secs);
        let semaphore = Arc::new(Semaphore::new(self.config.probe.concurrency));

        let mut addresses: Vec<IpAddr> =
            self.config.targets.iter().map(|t| t.address).collect();
        addresses.sort_unstable();
        addresses.dedup();

        let mut probes = JoinSet::new();
        for address in addresses {
            let prober = Arc::clone(&self.prober);
            let semaphore = Arc::clone(&semaphore);
            probes.spawn(async move {
                // Acquire cannot fail: the semaphore is never closed.
                let _permit = semaphore.acquire_owned().await.ok();
                let outcome = match prober.probe(address, timeout).await {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        warn!(%address, error = %err, "Probe machinery failed");
                        ProbeOutcome::Unreachable(UnreachableReason::Other(err.to_string()))
                    }
                };
                (address, outcome)
            });
        }

        let mut outcomes: HashMap<IpAddr, ProbeOutcome> = HashMap::new();
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok((address, outcome)) => {
                    outcomes.insert(address, outcome);
                }
                Err(err) => warn!(error = %err, "Probe task panicked"),
            }
        }

        let now = chrono::Utc::now();
        for target in &self.config.targets {
            let Some(outcome) = outcomes.get(&target.address) else {
                continue;
            };
            let key = target.key();
            let (_, transition) = self.tracker.observe(&key, outcome, now).await;
            if let Some(transition) = transition {
                info!(
                    server = %key,
                    from = %transition.from,
                    to = %transition.to,
                    "Health transition confirmed"
                );
                self.emit_event(Event::HealthTransition {
                    key,
                    address: target.address,
                    zone_id: target.zone_id.clone(),
                    from: transition.from,
                    to: transition.to,
                    at: transition.at,
                });
            }
        }

        if let Err(err) = self
            .state_store
            .save_health(&self.tracker.snapshot().await)
            .await
        {
            warn!(error = %err, "Failed to persist health state");
        }
    }

    async fn sync_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let period = Duration::from_secs(self.config.sync.interval_secs);
        // The first pass is delayed one full interval so probes have
        // confirmed health before any records are touched. Reconciling
        // immediately would see every server in its initial down state
        // and delete all managed records.
        let mut ticks = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticks.tick() => self.sync_cycle().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Sync loop stopping");
                        break;
                    }
                }
            }
        }
    }

    /// Run one reconciliation pass over every configured zone
    ///
    /// Zones are reconciled independently; a failing zone is logged and
    /// skipped without affecting the others.
    async fn sync_cycle(&self) {
        let health = self.tracker.snapshot().await;

        for policy in self.config.zone_policies() {
            let desired =
                desired_records_for_zone(&policy.zone_id, &self.config.targets, &health);

            match self.reconciler.reconcile_zone(&policy, desired).await {
                Ok(outcome) => {
                    debug!(
                        zone = %policy.zone_id,
                        created = outcome.created.len(),
                        deleted = outcome.deleted.len(),
                        kept = outcome.kept,
                        errors = outcome.errors.len(),
                        "Zone reconciled"
                    );

                    let changed =
                        !outcome.created.is_empty() || !outcome.deleted.is_empty();
                    if changed {
                        match self.state_store.load_zone_snapshot(&policy.zone_id).await {
                            Ok(Some(previous)) => debug!(
                                zone = %policy.zone_id,
                                previous_pass = %previous.completed_at,
                                previous_records = previous.records.len(),
                                records = outcome.records.len(),
                                "Zone drifted since the last mutating pass"
                            ),
                            Ok(None) => {
                                debug!(zone = %policy.zone_id, "First mutating pass for zone")
                            }
                            Err(err) => warn!(
                                zone = %policy.zone_id,
                                error = %err,
                                "Failed to load zone snapshot"
                            ),
                        }

                        let snapshot = ZoneSnapshot {
                            zone_id: outcome.zone_id.clone(),
                            completed_at: chrono::Utc::now(),
                            records: outcome.records.clone(),
                        };
                        if let Err(err) = self.state_store.save_zone_snapshot(&snapshot).await {
                            warn!(
                                zone = %policy.zone_id,
                                error = %err,
                                "Failed to persist zone snapshot"
                            );
                        }
                    }

                    self.emit_event(Event::ReconciliationResult {
                        zone_id: outcome.zone_id,
                        created: outcome.created,
                        deleted: outcome.deleted,
                        errors: outcome.errors,
                    });
                }
                Err(err) => {
                    error!(
                        zone = %policy.zone_id,
                        error = %err,
                        "Reconciliation pass failed, zone left untouched"
                    );
                }
            }
        }
    }

    fn emit_event(&self, event: Event) {
        // Dropping under backpressure keeps the loops from blocking on a
        // slow event consumer.
        if self.event_tx.try_send(event).is_err() {
            warn!(
                "Event channel full, dropping event. \
                Consider increasing event_channel_capacity."
            );
        }
    }
}
