//! Structural validation run before any workflow is committed.

use std::collections::HashSet;

use super::dependency_graph::DependencyGraph;
use crate::error::{OrchestrationError, OrchestrationResult};
use crate::models::{Layer, Workflow};

/// Validate a workflow definition.
///
/// Structural problems are collected and reported together as one
/// `Validation` error; a well-formed graph that contains a cycle, including a
/// step depending on itself, is reported as `CyclicDependency`.
pub fn validate_workflow(workflow: &Workflow) -> OrchestrationResult<()> {
    let mut errors = Vec::new();

    if workflow.id.trim().is_empty() {
        errors.push("workflow id cannot be empty".to_string());
    }
    if workflow.name.trim().is_empty() {
        errors.push("workflow name cannot be empty".to_string());
    }
    if workflow.workflow_type.trim().is_empty() {
        errors.push("workflow type cannot be empty".to_string());
    }
    if workflow.steps.is_empty() {
        errors.push("workflow must define at least one step".to_string());
    }

    let mut names = HashSet::new();
    let mut bindings: HashSet<(Layer, &str)> = HashSet::new();

    for step in &workflow.steps {
        if step.name.trim().is_empty() {
            errors.push("step name cannot be empty".to_string());
        }
        if step.service_ref.trim().is_empty() {
            errors.push(format!("step '{}' has no service binding", step.name));
        }
        if !names.insert(step.name.as_str()) {
            errors.push(format!("duplicate step name '{}'", step.name));
        }
        if !bindings.insert((step.layer, step.service_ref.as_str())) {
            errors.push(format!(
                "service '{}' is bound more than once in the {} layer",
                step.service_ref, step.layer
            ));
        }
        if step.timeout_ms == Some(0) {
            errors.push(format!("step '{}' has a zero timeout", step.name));
        }
    }

    for step in &workflow.steps {
        for dependency in &step.depends_on {
            if !names.contains(dependency.as_str()) {
                errors.push(format!(
                    "step '{}' depends on unknown step '{}'",
                    step.name, dependency
                ));
            }
        }
    }

    if !errors.is_empty() {
        return Err(OrchestrationError::Validation(errors.join("; ")));
    }

    DependencyGraph::build(&workflow.steps)?.topological_order()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorkflowStep;

    fn workflow(steps: Vec<WorkflowStep>) -> Workflow {
        Workflow::new("wf", "Workflow", "standard", steps)
    }

    fn validation_message(result: OrchestrationResult<()>) -> String {
        match result {
            Err(OrchestrationError::Validation(message)) => message,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_workflow_passes() {
        let wf = workflow(vec![
            WorkflowStep::new("a", Layer::Bottom, "svc-a"),
            WorkflowStep::new("b", Layer::Middle, "svc-b").depends_on(["a"]),
        ]);
        assert!(validate_workflow(&wf).is_ok());
    }

    #[test]
    fn test_empty_workflow_is_rejected() {
        let message = validation_message(validate_workflow(&workflow(vec![])));
        assert!(message.contains("at least one step"));
    }

    #[test]
    fn test_problems_are_reported_together() {
        let wf = workflow(vec![
            WorkflowStep::new("a", Layer::Bottom, "svc-a"),
            WorkflowStep::new("a", Layer::Middle, "svc-b"),
            WorkflowStep::new("c", Layer::Top, "svc-c").depends_on(["ghost"]),
        ]);
        let message = validation_message(validate_workflow(&wf));
        assert!(message.contains("duplicate step name 'a'"));
        assert!(message.contains("unknown step 'ghost'"));
    }

    #[test]
    fn test_duplicate_service_binding_within_layer() {
        let wf = workflow(vec![
            WorkflowStep::new("a", Layer::Bottom, "shared"),
            WorkflowStep::new("b", Layer::Bottom, "shared"),
        ]);
        let message = validation_message(validate_workflow(&wf));
        assert!(message.contains("bound more than once"));

        let across_layers = workflow(vec![
            WorkflowStep::new("a", Layer::Bottom, "shared"),
            WorkflowStep::new("b", Layer::Top, "shared"),
        ]);
        assert!(validate_workflow(&across_layers).is_ok());
    }

    #[test]
    fn test_cycle_is_reported_as_cycle() {
        let wf = workflow(vec![
            WorkflowStep::new("a", Layer::Bottom, "svc-a").depends_on(["b"]),
            WorkflowStep::new("b", Layer::Middle, "svc-b").depends_on(["a"]),
        ]);
        assert!(matches!(
            validate_workflow(&wf),
            Err(OrchestrationError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let wf = workflow(vec![
            WorkflowStep::new("a", Layer::Bottom, "svc-a").depends_on(["a"]),
            WorkflowStep::new("b", Layer::Middle, "svc-b").depends_on(["a"]),
        ]);
        match validate_workflow(&wf) {
            Err(OrchestrationError::CyclicDependency { steps }) => {
                assert!(steps.contains(&"a".to_string()));
            }
            other => panic!("expected cyclic dependency, got {other:?}"),
        }
    }
}
