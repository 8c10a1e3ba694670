//! # Jobs
//!
//! A job is one execution of a workflow against a specific request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use super::context::LayerResults;
use super::request::ContentRequest;
use crate::constants::DEFAULT_MAX_RETRIES;
use crate::state_machine::{JobStateMachine, JobStatus};

/// Scheduling priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl fmt::Display for JobPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Execution progress of a job
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobProgress {
    pub current_step: Option<String>,
    /// Successfully executed steps, in execution order
    pub completed_steps: Vec<String>,
    /// Optional steps that failed and were recorded as null
    #[serde(default)]
    pub failed_steps: Vec<String>,
    /// Steps whose condition was not met
    #[serde(default)]
    pub skipped_steps: Vec<String>,
    pub total_steps: usize,
    pub percentage: u8,
}

impl JobProgress {
    pub fn new(total_steps: usize) -> Self {
        Self {
            total_steps,
            ..Default::default()
        }
    }

    /// Steps that will not run again: completed, failed optional, or skipped
    pub fn processed_count(&self) -> usize {
        self.completed_steps.len() + self.failed_steps.len() + self.skipped_steps.len()
    }

    pub fn is_processed(&self, step: &str) -> bool {
        self.completed_steps.iter().any(|s| s == step)
            || self.failed_steps.iter().any(|s| s == step)
            || self.skipped_steps.iter().any(|s| s == step)
    }

    /// Percentage of processed steps, floored; an empty plan counts as done
    pub fn computed_percentage(&self) -> u8 {
        if self.total_steps == 0 {
            return 100;
        }
        let processed = self.processed_count().min(self.total_steps);
        ((processed * 100) / self.total_steps) as u8
    }
}

/// One execution instance of a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub workflow_id: String,
    pub status: JobStatus,
    pub priority: JobPriority,
    pub request: ContentRequest,
    pub progress: JobProgress,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub user_id: Option<String>,
    pub project_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub processing_time_ms: Option<u64>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub callback_url: Option<String>,
    /// Layer results persisted after each processed step, used to resume retries
    #[serde(default)]
    pub checkpoint: LayerResults,
}

impl Job {
    pub fn from_new(new_job: NewJob) -> Self {
        let now = Utc::now();
        let started_at = (new_job.initial_status == JobStatus::Processing).then_some(now);

        Self {
            id: Uuid::new_v4(),
            job_type: new_job.job_type,
            workflow_id: new_job.workflow_id,
            status: new_job.initial_status,
            priority: new_job.priority,
            user_id: new_job.request.user_id.clone(),
            project_id: new_job.request.project_id.clone(),
            callback_url: new_job.request.callback_url.clone(),
            request: new_job.request,
            progress: JobProgress::new(new_job.total_steps),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            started_at,
            completed_at: None,
            processing_time_ms: None,
            retry_count: 0,
            max_retries: new_job.max_retries,
            checkpoint: LayerResults::default(),
        }
    }

    /// Completed, cancelled, or failed with the retry budget spent
    pub fn is_terminal(&self) -> bool {
        self.status.is_final()
            || (self.status == JobStatus::Failed && self.retry_count >= self.max_retries)
    }

    pub fn can_retry(&self) -> bool {
        self.status == JobStatus::Failed && self.retry_count < self.max_retries
    }

    pub fn state_machine(&self) -> JobStateMachine<'_> {
        JobStateMachine::for_job(self)
    }

    /// Milliseconds between start and now (or completion)
    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> Option<u64> {
        self.started_at.map(|started| {
            let end = self.completed_at.unwrap_or(now);
            (end - started).num_milliseconds().max(0) as u64
        })
    }
}

/// Input to `JobStore::create_job`
#[derive(Debug, Clone)]
pub struct NewJob {
    pub job_type: String,
    pub workflow_id: String,
    pub request: ContentRequest,
    pub priority: JobPriority,
    pub max_retries: u32,
    pub total_steps: usize,
    /// `Queued` for brokered submissions, `Processing` for inline execution
    pub initial_status: JobStatus,
}

impl NewJob {
    pub fn for_request(
        request: ContentRequest,
        workflow_id: impl Into<String>,
        total_steps: usize,
    ) -> Self {
        Self {
            job_type: request.workflow_type.clone(),
            workflow_id: workflow_id.into(),
            priority: request.priority,
            request,
            max_retries: DEFAULT_MAX_RETRIES,
            total_steps,
            initial_status: JobStatus::Queued,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_status(mut self, status: JobStatus) -> Self {
        self.initial_status = status;
        self
    }
}
