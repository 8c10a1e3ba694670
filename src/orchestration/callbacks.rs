//! Job completion callbacks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::CallbacksConfig;
use crate::logging::log_error;
use crate::models::Job;
use crate::state_machine::JobStatus;

/// Body delivered to a job's callback URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackPayload {
    pub job_id: Uuid,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retry_count: u32,
    pub completed_at: Option<DateTime<Utc>>,
    pub processing_time_ms: Option<u64>,
}

impl CallbackPayload {
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            result: job.result.clone(),
            error: job.error.clone(),
            retry_count: job.retry_count,
            completed_at: job.completed_at,
            processing_time_ms: job.processing_time_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackError {
    #[error("Callback endpoint rejected the payload with status {status}")]
    Rejected { status: u16 },

    #[error("Callback delivery failed: {0}")]
    Delivery(String),
}

/// Outbound delivery of callback payloads (HTTP in production deployments)
#[async_trait]
pub trait CallbackNotifier: Send + Sync + 'static {
    async fn notify(&self, url: &str, payload: &CallbackPayload) -> Result<(), CallbackError>;
}

/// Records callbacks in the log; the default when no outbound client is wired
#[derive(Debug, Default)]
pub struct LoggingCallbackNotifier;

#[async_trait]
impl CallbackNotifier for LoggingCallbackNotifier {
    async fn notify(&self, url: &str, payload: &CallbackPayload) -> Result<(), CallbackError> {
        info!(
            url = url,
            job_id = %payload.job_id,
            status = %payload.status,
            "📬 Job callback"
        );
        Ok(())
    }
}

/// Delivers callbacks with a bounded number of attempts
pub struct CallbackDispatcher {
    notifier: Arc<dyn CallbackNotifier>,
    config: CallbacksConfig,
}

impl CallbackDispatcher {
    pub fn new(notifier: Arc<dyn CallbackNotifier>, config: CallbacksConfig) -> Self {
        Self { notifier, config }
    }

    /// Notify the job's callback URL; returns whether delivery succeeded.
    /// Jobs without a callback URL are a successful no-op.
    pub async fn dispatch(&self, job: &Job) -> bool {
        let Some(url) = job.callback_url.as_deref() else {
            return true;
        };

        let payload = CallbackPayload::from_job(job);
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match self.notifier.notify(url, &payload).await {
                Ok(()) => return true,
                Err(error) => {
                    warn!(
                        job_id = %job.id,
                        url = url,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        error = %error,
                        "Callback delivery attempt failed"
                    );
                    if attempt < max_attempts {
                        tokio::time::sleep(self.config.retry_delay()).await;
                    }
                }
            }
        }

        let context = format!("job {} url {}", job.id, url);
        log_error(
            "callbacks",
            "dispatch",
            &format!("gave up after {max_attempts} attempts"),
            Some(&context),
        );
        false
    }
}
