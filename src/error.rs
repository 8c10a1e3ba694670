//! # Orchestration Errors
//!
//! Error taxonomy shared by the workflow registry, the job store, the
//! notification hub and the executor.
//!
//! Validation failures (`Validation`, `CyclicDependency`) are raised before a
//! job exists. Step failures (`StepTimeout`, `StepExecution`) are recorded on
//! the job and surfaced through notifications. Store guards raise
//! `StateTransition` and `MaxRetriesExceeded`.

use crate::state_machine::{JobStatus, StateMachineError};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub type OrchestrationResult<T> = std::result::Result<T, OrchestrationError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrchestrationError {
    /// Malformed workflow, step or request definition
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown workflow, job or connection
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The step dependency graph contains at least one cycle
    #[error("Cyclic dependency detected among steps: {}", steps.join(", "))]
    CyclicDependency { steps: Vec<String> },

    /// A step collaborator did not answer within its timeout
    #[error("Step '{step}' exceeded its timeout of {}ms", timeout.as_millis())]
    StepTimeout { step: String, timeout: Duration },

    /// A step collaborator returned an error
    #[error("Step '{step}' failed: {reason}")]
    StepExecution { step: String, reason: String },

    #[error("Job {job_id} has exhausted its retries ({retry_count}/{max_retries})")]
    MaxRetriesExceeded {
        job_id: Uuid,
        retry_count: u32,
        max_retries: u32,
    },

    #[error("Illegal state transition for job {job_id}: {from} -> {to}")]
    StateTransition {
        job_id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl OrchestrationError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    pub fn job_not_found(job_id: Uuid) -> Self {
        Self::NotFound {
            entity: "job",
            id: job_id.to_string(),
        }
    }

    pub fn workflow_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "workflow",
            id: id.into(),
        }
    }

    pub fn connection_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "connection",
            id: id.into(),
        }
    }

    /// Stable machine-readable code carried in `error` notification events
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::CyclicDependency { .. } => "CYCLIC_DEPENDENCY",
            Self::StepTimeout { .. } => "STEP_TIMEOUT",
            Self::StepExecution { .. } => "STEP_EXECUTION_ERROR",
            Self::MaxRetriesExceeded { .. } => "MAX_RETRIES_EXCEEDED",
            Self::StateTransition { .. } => "STATE_TRANSITION_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Broker(_) => "BROKER_ERROR",
            Self::Persistence(_) => "PERSISTENCE_ERROR",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Step failures are recorded on the job; everything else is a system fault
    pub fn is_step_failure(&self) -> bool {
        matches!(self, Self::StepTimeout { .. } | Self::StepExecution { .. })
    }

    /// Attach a job id to a job-agnostic state machine error
    pub fn from_state_machine(job_id: Uuid, error: StateMachineError) -> Self {
        match error {
            StateMachineError::InvalidTransition { from, to } => {
                Self::StateTransition { job_id, from, to }
            }
            StateMachineError::RetriesExhausted {
                retry_count,
                max_retries,
            } => Self::MaxRetriesExceeded {
                job_id,
                retry_count,
                max_retries,
            },
            StateMachineError::GuardFailed { reason } => Self::Validation(reason),
        }
    }
}

impl From<serde_json::Error> for OrchestrationError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(format!("JSON serialization error: {error}"))
    }
}

impl From<serde_yaml::Error> for OrchestrationError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::Validation(format!("Invalid workflow template: {error}"))
    }
}

impl From<crate::config::ConfigurationError> for OrchestrationError {
    fn from(error: crate::config::ConfigurationError) -> Self {
        Self::Configuration(error.to_string())
    }
}

impl From<crate::orchestration::broker::BrokerError> for OrchestrationError {
    fn from(error: crate::orchestration::broker::BrokerError) -> Self {
        Self::Broker(error.to_string())
    }
}

impl From<crate::notifications::TransportError> for OrchestrationError {
    fn from(error: crate::notifications::TransportError) -> Self {
        Self::Transport(error.to_string())
    }
}
