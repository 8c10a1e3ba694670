//! Final result compilation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::models::{Layer, OrchestrationContext, StepEnvelope};

/// Merged output of a finished job, one map per layer keyed by service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledResult {
    pub job_id: Uuid,
    pub workflow_id: String,
    pub topic: String,
    pub content_type: String,
    pub bottom: BTreeMap<String, Value>,
    pub middle: BTreeMap<String, Value>,
    pub top: BTreeMap<String, Value>,
    /// Successfully executed steps in execution order
    pub completed_steps: Vec<String>,
    /// Steps that left a null result (failed optional or skipped)
    pub null_steps: Vec<String>,
    pub attempt: u32,
}

impl CompiledResult {
    pub fn layer(&self, layer: Layer) -> &BTreeMap<String, Value> {
        match layer {
            Layer::Bottom => &self.bottom,
            Layer::Middle => &self.middle,
            Layer::Top => &self.top,
        }
    }
}

/// Merge the layer results of a finished run. Pure: the same context always
/// compiles to the same result.
pub fn compile_results(context: &OrchestrationContext) -> CompiledResult {
    let mut compiled = CompiledResult {
        job_id: context.job_id,
        workflow_id: context.metadata.workflow_id.clone(),
        topic: context.request.topic.clone(),
        content_type: context.request.content_type.clone(),
        bottom: BTreeMap::new(),
        middle: BTreeMap::new(),
        top: BTreeMap::new(),
        completed_steps: context.completed_steps.clone(),
        null_steps: Vec::new(),
        attempt: context.metadata.attempt,
    };

    for (layer, services) in context.layer_results.iter() {
        let target = match layer {
            Layer::Bottom => &mut compiled.bottom,
            Layer::Middle => &mut compiled.middle,
            Layer::Top => &mut compiled.top,
        };
        for (service, StepEnvelope { step, body, .. }) in services {
            if body.is_none() {
                compiled.null_steps.push(step.clone());
            }
            target.insert(service.clone(), body.clone().unwrap_or(Value::Null));
        }
    }

    compiled.null_steps.sort();
    compiled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentRequest, Job, NewJob, WorkflowStep};
    use serde_json::json;

    #[test]
    fn test_layers_are_merged_with_nulls() {
        let job = Job::from_new(NewJob::for_request(
            ContentRequest::new("Edge caching"),
            "standard-v1",
            3,
        ));
        let mut context = OrchestrationContext::for_job(&job);

        context.record_success(
            &WorkflowStep::new("intent_analysis", Layer::Bottom, "intent-analyzer"),
            json!({"intent": "informational"}),
        );
        context.record_null(&WorkflowStep::new(
            "citation_verification",
            Layer::Middle,
            "citation-verifier",
        ));
        context.record_success(
            &WorkflowStep::new("content_generation", Layer::Top, "content-generator"),
            json!("body"),
        );

        let compiled = compile_results(&context);
        assert_eq!(compiled.bottom["intent-analyzer"], json!({"intent": "informational"}));
        assert_eq!(compiled.middle["citation-verifier"], Value::Null);
        assert_eq!(compiled.layer(Layer::Top)["content-generator"], json!("body"));
        assert_eq!(compiled.null_steps, vec!["citation_verification".to_string()]);
        assert_eq!(
            compiled.completed_steps,
            vec!["intent_analysis".to_string(), "content_generation".to_string()]
        );
        assert_eq!(compiled.topic, "Edge caching");
        assert_eq!(compile_results(&context), compiled);
    }
}
