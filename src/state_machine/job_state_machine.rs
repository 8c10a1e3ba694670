use tracing::debug;

use super::errors::{StateMachineError, StateMachineResult};
use super::events::JobEvent;
use super::guards::{RetryBudgetGuard, StateGuard};
use super::states::JobStatus;
use crate::models::Job;

/// Evaluates job transitions against the lifecycle table and its guards.
///
/// The machine is a read-only view: it computes the target state and the
/// job store applies it while holding the job's lock.
pub struct JobStateMachine<'a> {
    job: &'a Job,
}

impl<'a> JobStateMachine<'a> {
    pub fn for_job(job: &'a Job) -> Self {
        Self { job }
    }

    pub fn current_state(&self) -> JobStatus {
        self.job.status
    }

    /// Validate `event` against the table and guards, returning the new state
    pub fn transition(&self, event: &JobEvent) -> StateMachineResult<JobStatus> {
        let target = Self::determine_target_state(self.job.status, event)?;

        if matches!(event, JobEvent::Retry) {
            RetryBudgetGuard.check(self.job)?;
        }

        debug!(
            job_id = %self.job.id,
            from = %self.job.status,
            to = %target,
            event = event.event_type(),
            "Job transition accepted"
        );

        Ok(target)
    }

    /// Pure transition table
    pub fn determine_target_state(
        current: JobStatus,
        event: &JobEvent,
    ) -> StateMachineResult<JobStatus> {
        use JobStatus::*;

        let target = match (current, event) {
            (Queued, JobEvent::Start) => Processing,
            (Processing, JobEvent::Complete) => Completed,
            (Processing, JobEvent::Fail(_)) => Failed,
            (Queued | Processing, JobEvent::Cancel) => Cancelled,
            (Failed, JobEvent::Retry) => Queued,
            (from, event) => {
                return Err(StateMachineError::InvalidTransition {
                    from,
                    to: event.requested_status(),
                })
            }
        };

        Ok(target)
    }

    /// Terminal once completed, cancelled, or failed without retries left
    pub fn is_terminal(&self) -> bool {
        self.job.is_terminal()
    }
}
