//! Storage seam for workflow templates.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::error::{OrchestrationError, OrchestrationResult};
use crate::models::{Workflow, WorkflowFilter};

/// Persistence backend for workflow templates
#[async_trait]
pub trait WorkflowRepository: Send + Sync + 'static {
    /// Insert a new workflow; an existing id is a validation error
    async fn insert(&self, workflow: Workflow) -> OrchestrationResult<()>;

    /// Replace an existing workflow; an unknown id is `NotFound`
    async fn replace(&self, workflow: Workflow) -> OrchestrationResult<()>;

    async fn remove(&self, id: &str) -> OrchestrationResult<Option<Workflow>>;

    async fn get(&self, id: &str) -> OrchestrationResult<Option<Workflow>>;

    /// Matching workflows ordered by id
    async fn list(&self, filter: &WorkflowFilter) -> OrchestrationResult<Vec<Workflow>>;
}

#[derive(Debug, Default)]
pub struct InMemoryWorkflowRepository {
    workflows: RwLock<HashMap<String, Workflow>>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn insert(&self, workflow: Workflow) -> OrchestrationResult<()> {
        let mut workflows = self.workflows.write();
        if workflows.contains_key(&workflow.id) {
            return Err(OrchestrationError::validation(format!(
                "workflow '{}' is already registered",
                workflow.id
            )));
        }
        workflows.insert(workflow.id.clone(), workflow);
        Ok(())
    }

    async fn replace(&self, workflow: Workflow) -> OrchestrationResult<()> {
        let mut workflows = self.workflows.write();
        match workflows.get_mut(&workflow.id) {
            Some(existing) => {
                *existing = workflow;
                Ok(())
            }
            None => Err(OrchestrationError::workflow_not_found(workflow.id)),
        }
    }

    async fn remove(&self, id: &str) -> OrchestrationResult<Option<Workflow>> {
        Ok(self.workflows.write().remove(id))
    }

    async fn get(&self, id: &str) -> OrchestrationResult<Option<Workflow>> {
        Ok(self.workflows.read().get(id).cloned())
    }

    async fn list(&self, filter: &WorkflowFilter) -> OrchestrationResult<Vec<Workflow>> {
        let mut matching: Vec<Workflow> = self
            .workflows
            .read()
            .values()
            .filter(|workflow| filter.matches(workflow))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matching)
    }
}
