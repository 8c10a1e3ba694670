use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::hub::NotificationHub;

/// Periodically unregister idle connections until `shutdown` flips to true
pub fn spawn_idle_reaper(
    hub: Arc<NotificationHub>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        info!(interval_ms = interval.as_millis() as u64, "🧹 Idle connection reaper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let reaped = hub.reap_idle().await;
                    debug!(reaped = reaped.len(), "Idle connection sweep finished");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("🛑 Idle connection reaper stopped");
    })
}
