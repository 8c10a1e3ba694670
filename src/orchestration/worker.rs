//! Broker consumer loop.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::broker::JobReceiver;
use super::executor::OrchestrationExecutor;
use crate::logging::log_error;

/// Pulls job messages off the broker and runs them until shutdown
pub struct JobWorker {
    id: usize,
    executor: Arc<OrchestrationExecutor>,
    receiver: JobReceiver,
    shutdown: watch::Receiver<bool>,
}

impl JobWorker {
    pub fn new(
        id: usize,
        executor: Arc<OrchestrationExecutor>,
        receiver: JobReceiver,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            id,
            executor,
            receiver,
            shutdown,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let Self {
            id,
            executor,
            receiver,
            mut shutdown,
        } = self;
        info!(worker_id = id, "👷 Job worker started");

        loop {
            // The receiver lock is held only while waiting for the next message
            let message = tokio::select! {
                message = async { receiver.lock().await.recv().await } => message,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            };

            let Some(message) = message else {
                warn!(worker_id = id, "Broker channel closed");
                break;
            };

            debug!(
                worker_id = id,
                job_id = %message.job_id,
                attempt = message.attempt,
                "Job received"
            );
            if let Err(error) = executor.run(message.job_id).await {
                log_error(
                    "job_worker",
                    "run",
                    &error.to_string(),
                    Some(&format!("job {}", message.job_id)),
                );
            }
        }

        info!(worker_id = id, "🛑 Job worker stopped");
    }
}
