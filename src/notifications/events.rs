use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Job lifecycle and progress events pushed to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    JobQueued,
    StepStarted,
    StepCompleted,
    StepFailed,
    StepSkipped,
    JobCompleted,
    JobCancelled,
    JobRetried,
    Error,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JobQueued => "job_queued",
            Self::StepStarted => "step_started",
            Self::StepCompleted => "step_completed",
            Self::StepFailed => "step_failed",
            Self::StepSkipped => "step_skipped",
            Self::JobCompleted => "job_completed",
            Self::JobCancelled => "job_cancelled",
            Self::JobRetried => "job_retried",
            Self::Error => "error",
        }
    }

    /// Events after which the job produces nothing further until retried
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::JobCompleted | Self::JobCancelled | Self::Error)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One event as delivered over the realtime transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub event_id: Uuid,
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn new(event_type: EventType, job_id: Option<Uuid>, payload: Value) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            job_id,
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn for_job(job_id: Uuid, event_type: EventType, payload: Value) -> Self {
        Self::new(event_type, Some(job_id), payload)
    }

    /// Percentage carried by progress-bearing events
    pub fn percentage(&self) -> Option<u8> {
        self.payload
            .get("percentage")
            .and_then(Value::as_u64)
            .and_then(|p| u8::try_from(p).ok())
    }
}
