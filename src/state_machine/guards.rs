use super::errors::{GuardResult, StateMachineError};
use super::states::JobStatus;
use crate::models::{Job, JobProgress};

/// Trait for implementing state transition guards
pub trait StateGuard<T> {
    /// Check if a transition is allowed
    fn check(&self, entity: &T) -> GuardResult;

    /// Get a description of this guard for logging
    fn description(&self) -> &'static str;
}

/// A failed job may only be re-queued while its retry budget lasts
pub struct RetryBudgetGuard;

impl StateGuard<Job> for RetryBudgetGuard {
    fn check(&self, job: &Job) -> GuardResult {
        if job.status != JobStatus::Failed {
            return Err(StateMachineError::InvalidTransition {
                from: job.status,
                to: JobStatus::Queued,
            });
        }

        if job.retry_count >= job.max_retries {
            return Err(StateMachineError::RetriesExhausted {
                retry_count: job.retry_count,
                max_retries: job.max_retries,
            });
        }

        Ok(())
    }

    fn description(&self) -> &'static str {
        "Failed job must have retries remaining"
    }
}

/// Progress updates never move a job backwards
pub struct ProgressGuard<'a> {
    pub next: &'a JobProgress,
}

impl StateGuard<Job> for ProgressGuard<'_> {
    fn check(&self, job: &Job) -> GuardResult {
        if job.status != JobStatus::Processing {
            return Err(StateMachineError::GuardFailed {
                reason: format!("progress can only change while processing, job is {}", job.status),
            });
        }

        let current = &job.progress;
        if self.next.percentage < current.percentage {
            return Err(StateMachineError::GuardFailed {
                reason: format!(
                    "progress cannot decrease ({}% -> {}%)",
                    current.percentage, self.next.percentage
                ),
            });
        }

        if !self.next.completed_steps.starts_with(&current.completed_steps) {
            return Err(StateMachineError::GuardFailed {
                reason: "completed steps must extend the recorded sequence".to_string(),
            });
        }

        Ok(())
    }

    fn description(&self) -> &'static str {
        "Progress must be monotonic while processing"
    }
}
