//! Notifier trait for delivering events to humans

use async_trait::async_trait;
use tracing::info;

use crate::error::Result;
use crate::event::Event;

/// Trait for pushing engine events to an external channel
///
/// Delivery is best effort. The engine never blocks on a notifier and a
/// failed notification must not affect probing or reconciliation.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one event
    async fn notify(&self, event: &Event) -> Result<()>;

    /// Get the name of this notifier (for logging)
    fn name(&self) -> &str;
}

/// Notifier that writes events to the log
///
/// The default when no external channel is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &Event) -> Result<()> {
        match event {
            Event::HealthTransition {
                key, from, to, at, ..
            } => {
                info!(server = %key, %from, %to, %at, "Health transition");
            }
            Event::ReconciliationResult {
                zone_id,
                created,
                deleted,
                errors,
            } => {
                info!(
                    zone = %zone_id,
                    created = created.len(),
                    deleted = deleted.len(),
                    errors = errors.len(),
                    "Reconciliation pass complete"
                );
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}
