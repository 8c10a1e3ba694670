//! # Orchestration Context
//!
//! Per-execution state owned by the task driving a job. Step results are
//! kept as typed envelopes keyed by layer and service binding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::job::{Job, JobPriority};
use super::request::ContentRequest;
use super::workflow::{Layer, WorkflowStep};

/// Result of one step: the step identity plus an opaque body.
/// `body == None` marks a failed optional step or a skipped step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepEnvelope {
    pub step: String,
    pub service: String,
    pub body: Option<Value>,
}

impl StepEnvelope {
    pub fn is_null(&self) -> bool {
        self.body.is_none()
    }
}

/// `layer -> service_ref -> envelope`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LayerResults(BTreeMap<Layer, BTreeMap<String, StepEnvelope>>);

impl LayerResults {
    pub fn record(&mut self, step: &WorkflowStep, body: Option<Value>) {
        self.0.entry(step.layer).or_default().insert(
            step.service_ref.clone(),
            StepEnvelope {
                step: step.name.clone(),
                service: step.service_ref.clone(),
                body,
            },
        );
    }

    pub fn get(&self, layer: Layer, service: &str) -> Option<&StepEnvelope> {
        self.0.get(&layer).and_then(|services| services.get(service))
    }

    pub fn layer(&self, layer: Layer) -> Option<&BTreeMap<String, StepEnvelope>> {
        self.0.get(&layer)
    }

    /// Find a step's envelope by step name
    pub fn for_step(&self, step: &str) -> Option<&StepEnvelope> {
        self.0
            .values()
            .flat_map(|services| services.values())
            .find(|envelope| envelope.step == step)
    }

    pub fn contains_step(&self, step: &str) -> bool {
        self.for_step(step).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Layer, &BTreeMap<String, StepEnvelope>)> {
        self.0.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextMetadata {
    pub start_time: DateTime<Utc>,
    pub user_id: Option<String>,
    pub project_id: Option<String>,
    pub priority: JobPriority,
    pub workflow_id: String,
    pub attempt: u32,
}

/// Ephemeral execution state for one run of one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationContext {
    pub job_id: Uuid,
    pub request: ContentRequest,
    pub current_step: Option<String>,
    pub completed_steps: Vec<String>,
    pub layer_results: LayerResults,
    pub metadata: ContextMetadata,
}

impl OrchestrationContext {
    /// Build the context for a run, resuming from the job's checkpoint
    pub fn for_job(job: &Job) -> Self {
        Self {
            job_id: job.id,
            request: job.request.clone(),
            current_step: None,
            completed_steps: job.progress.completed_steps.clone(),
            layer_results: job.checkpoint.clone(),
            metadata: ContextMetadata {
                start_time: Utc::now(),
                user_id: job.user_id.clone(),
                project_id: job.project_id.clone(),
                priority: job.priority,
                workflow_id: job.workflow_id.clone(),
                attempt: job.retry_count + 1,
            },
        }
    }

    /// Result body of a dependency, `None` when absent or null
    pub fn dependency_result(&self, step: &str) -> Option<&Value> {
        self.layer_results
            .for_step(step)
            .and_then(|envelope| envelope.body.as_ref())
    }

    pub fn record_success(&mut self, step: &WorkflowStep, body: Value) {
        self.layer_results.record(step, Some(body));
        self.completed_steps.push(step.name.clone());
    }

    pub fn record_null(&mut self, step: &WorkflowStep) {
        self.layer_results.record(step, None);
    }
}
