use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::store::JobStore;
use crate::logging::log_error;

/// Periodically remove terminal jobs past `retention` until `shutdown` flips
/// to true
pub fn spawn_cleanup_sweeper(
    store: Arc<JobStore>,
    interval: Duration,
    retention: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        info!(
            interval_ms = interval.as_millis() as u64,
            retention_secs = retention.as_secs(),
            "🧹 Job cleanup sweeper started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match store.cleanup_older_than(retention).await {
                        Ok(removed) => debug!(removed = removed, "Job cleanup sweep finished"),
                        Err(error) => log_error("job_sweeper", "cleanup", &error.to_string(), None),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("🛑 Job cleanup sweeper stopped");
    })
}
