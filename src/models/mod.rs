//! # Data Model
//!
//! Workflow templates, jobs, submission requests and the per-run
//! orchestration context.

pub mod context;
pub mod job;
pub mod request;
pub mod workflow;

pub use context::{ContextMetadata, LayerResults, OrchestrationContext, StepEnvelope};
pub use job::{Job, JobPriority, JobProgress, NewJob};
pub use request::{ContentRequest, SubmissionResponse};
pub use workflow::{Layer, StepCondition, Workflow, WorkflowFilter, WorkflowPatch, WorkflowStep};
