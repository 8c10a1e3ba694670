use serde::{Deserialize, Serialize};

use super::states::JobStatus;

/// Events that drive job state transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum JobEvent {
    /// A worker picked the job up
    Start,
    /// Every required step succeeded
    Complete,
    /// A required step failed, with the error message
    Fail(String),
    /// A caller cancelled the job
    Cancel,
    /// Re-queue a failed job
    Retry,
}

impl JobEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Fail(_) => "fail",
            Self::Cancel => "cancel",
            Self::Retry => "retry",
        }
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }

    /// The status this event asks for, independent of the current state
    pub fn requested_status(&self) -> JobStatus {
        match self {
            Self::Start => JobStatus::Processing,
            Self::Complete => JobStatus::Completed,
            Self::Fail(_) => JobStatus::Failed,
            Self::Cancel => JobStatus::Cancelled,
            Self::Retry => JobStatus::Queued,
        }
    }

    /// Create a failure event with the given error message
    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }
}
