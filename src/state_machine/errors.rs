use thiserror::Error;

use super::states::JobStatus;

pub type StateMachineResult<T> = Result<T, StateMachineError>;
pub type GuardResult = Result<(), StateMachineError>;

/// Job-agnostic state machine failures; the store attaches the job id
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateMachineError {
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Retry budget exhausted ({retry_count}/{max_retries})")]
    RetriesExhausted { retry_count: u32, max_retries: u32 },

    #[error("Guard condition failed: {reason}")]
    GuardFailed { reason: String },
}
