//! # Workflow Registry
//!
//! Owns workflow templates. Every mutation re-validates the complete
//! structure before it is committed, so the repository only ever holds
//! workflows with unique step names, resolvable dependencies and an acyclic
//! graph.
//!
//! ## Usage
//!
//! ```rust
//! use content_architect::registry::WorkflowRegistry;
//!
//! # tokio_test::block_on(async {
//! let registry = WorkflowRegistry::in_memory();
//! registry.load_builtin_templates().await.unwrap();
//!
//! let workflow = registry.get_by_type("standard").await.unwrap();
//! let order = registry.execution_order(&workflow).unwrap();
//! assert_eq!(order.first().unwrap().name, "intent_analysis");
//! # });
//! ```

use chrono::Utc;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::dependency_graph::{execution_batches, DependencyGraph};
use super::repository::{InMemoryWorkflowRepository, WorkflowRepository};
use super::templates;
use super::validation::validate_workflow;
use crate::error::{OrchestrationError, OrchestrationResult};
use crate::logging::log_registry_operation;
use crate::models::{Workflow, WorkflowFilter, WorkflowPatch, WorkflowStep};

/// Registry statistics
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RegistryStats {
    pub total_workflows: usize,
    pub active_workflows: usize,
    /// Active workflow count per type
    pub workflow_types: BTreeMap<String, usize>,
}

pub struct WorkflowRegistry {
    repository: Arc<dyn WorkflowRepository>,
}

impl WorkflowRegistry {
    pub fn new(repository: Arc<dyn WorkflowRepository>) -> Self {
        Self { repository }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryWorkflowRepository::new()))
    }

    /// Validate and store a new workflow
    #[instrument(skip(self, workflow), fields(workflow_id = %workflow.id))]
    pub async fn register(&self, mut workflow: Workflow) -> OrchestrationResult<Workflow> {
        validate_workflow(&workflow)?;

        let now = Utc::now();
        workflow.created_at = now;
        workflow.updated_at = now;

        self.repository.insert(workflow.clone()).await?;

        log_registry_operation(
            "register",
            Some(&workflow.id),
            Some(&workflow.workflow_type),
            Some(&workflow.version),
            "success",
            None,
        );
        Ok(workflow)
    }

    /// Apply a partial update; the stored workflow is replaced only if the
    /// patched structure validates
    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: &str, patch: WorkflowPatch) -> OrchestrationResult<Workflow> {
        let current = self.get(id).await?;
        let patched = patch.apply_to(&current);
        validate_workflow(&patched)?;

        self.repository.replace(patched.clone()).await?;

        log_registry_operation(
            "update",
            Some(id),
            Some(&patched.workflow_type),
            Some(&patched.version),
            "success",
            None,
        );
        Ok(patched)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> OrchestrationResult<Workflow> {
        let removed = self
            .repository
            .remove(id)
            .await?
            .ok_or_else(|| OrchestrationError::workflow_not_found(id))?;

        log_registry_operation(
            "delete",
            Some(id),
            Some(&removed.workflow_type),
            Some(&removed.version),
            "success",
            None,
        );
        Ok(removed)
    }

    pub async fn get(&self, id: &str) -> OrchestrationResult<Workflow> {
        self.repository
            .get(id)
            .await?
            .ok_or_else(|| OrchestrationError::workflow_not_found(id))
    }

    /// The active workflow for a type; the most recently updated one wins
    pub async fn get_by_type(&self, workflow_type: &str) -> OrchestrationResult<Workflow> {
        let filter = WorkflowFilter {
            active_only: true,
            workflow_type: Some(workflow_type.to_string()),
            tag: None,
        };

        let candidates = self.repository.list(&filter).await?;
        if candidates.len() > 1 {
            warn!(
                workflow_type = workflow_type,
                candidates = candidates.len(),
                "Several active workflows share a type, using the most recently updated"
            );
        }

        candidates
            .into_iter()
            .max_by_key(|workflow| workflow.updated_at)
            .ok_or_else(|| OrchestrationError::NotFound {
                entity: "workflow type",
                id: workflow_type.to_string(),
            })
    }

    pub async fn list(&self, filter: &WorkflowFilter) -> OrchestrationResult<Vec<Workflow>> {
        self.repository.list(filter).await
    }

    /// Dependency-respecting order of the workflow's steps
    pub fn execution_order(&self, workflow: &Workflow) -> OrchestrationResult<Vec<WorkflowStep>> {
        let graph = DependencyGraph::build(&workflow.steps)?;
        Ok(graph.execution_order()?.into_iter().cloned().collect())
    }

    /// Execution order split into groups that may run concurrently
    pub fn execution_batches(
        &self,
        workflow: &Workflow,
        max_width: usize,
    ) -> OrchestrationResult<Vec<Vec<WorkflowStep>>> {
        let order = self.execution_order(workflow)?;
        Ok(execution_batches(&order, max_width)
            .into_iter()
            .map(|range| order[range].to_vec())
            .collect())
    }

    /// Register or replace a workflow, keeping the original creation time
    pub async fn upsert(&self, mut workflow: Workflow) -> OrchestrationResult<Workflow> {
        validate_workflow(&workflow)?;

        match self.repository.get(&workflow.id).await? {
            Some(existing) => {
                workflow.created_at = existing.created_at;
                workflow.updated_at = Utc::now();
                self.repository.replace(workflow.clone()).await?;
                info!(workflow_id = %workflow.id, "Replaced existing workflow");
                Ok(workflow)
            }
            None => self.register(workflow).await,
        }
    }

    /// Register the built-in content workflows
    pub async fn load_builtin_templates(&self) -> OrchestrationResult<usize> {
        let workflows = templates::builtin_workflows();
        let count = workflows.len();
        for workflow in workflows {
            self.upsert(workflow).await?;
        }
        info!(count = count, "📚 Loaded built-in workflow templates");
        Ok(count)
    }

    /// Register every YAML template in a directory; templates with an
    /// existing id replace the stored workflow
    pub async fn load_templates_from_dir(&self, dir: &Path) -> OrchestrationResult<usize> {
        let workflows = templates::load_templates_from_dir(dir)?;
        let count = workflows.len();
        for workflow in workflows {
            self.upsert(workflow).await?;
        }
        info!(
            count = count,
            directory = %dir.display(),
            "📚 Loaded workflow templates from directory"
        );
        Ok(count)
    }

    pub async fn stats(&self) -> OrchestrationResult<RegistryStats> {
        let all = self.repository.list(&WorkflowFilter::default()).await?;
        let mut stats = RegistryStats {
            total_workflows: all.len(),
            ..Default::default()
        };
        for workflow in all.iter().filter(|w| w.is_active) {
            stats.active_workflows += 1;
            *stats
                .workflow_types
                .entry(workflow.workflow_type.clone())
                .or_default() += 1;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Layer;
    use std::time::Duration;

    fn chain(id: &str, workflow_type: &str) -> Workflow {
        Workflow::new(
            id,
            format!("Workflow {id}"),
            workflow_type,
            vec![
                WorkflowStep::new("a", Layer::Bottom, "svc-a"),
                WorkflowStep::new("b", Layer::Middle, "svc-b").depends_on(["a"]),
                WorkflowStep::new("c", Layer::Top, "svc-c").depends_on(["b"]),
            ],
        )
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let registry = WorkflowRegistry::in_memory();
        registry.register(chain("wf-1", "standard")).await.unwrap();

        let workflow = registry.get("wf-1").await.unwrap();
        assert_eq!(workflow.steps.len(), 3);

        let duplicate = registry.register(chain("wf-1", "standard")).await;
        assert!(matches!(duplicate, Err(OrchestrationError::Validation(_))));
    }

    #[tokio::test]
    async fn test_cyclic_workflow_is_never_stored() {
        let registry = WorkflowRegistry::in_memory();
        let cyclic = Workflow::new(
            "cyclic",
            "Cyclic",
            "standard",
            vec![
                WorkflowStep::new("a", Layer::Bottom, "svc-a").depends_on(["b"]),
                WorkflowStep::new("b", Layer::Middle, "svc-b").depends_on(["a"]),
            ],
        );

        assert!(matches!(
            registry.register(cyclic).await,
            Err(OrchestrationError::CyclicDependency { .. })
        ));
        assert!(registry.get("cyclic").await.is_err());
    }

    #[tokio::test]
    async fn test_self_dependent_step_is_rejected_as_cycle() {
        let registry = WorkflowRegistry::in_memory();
        let looped = Workflow::new(
            "looped",
            "Looped",
            "standard",
            vec![WorkflowStep::new("a", Layer::Bottom, "svc-a").depends_on(["a"])],
        );

        match registry.register(looped).await {
            Err(OrchestrationError::CyclicDependency { steps }) => assert_eq!(steps, vec!["a"]),
            other => panic!("expected cyclic dependency, got {other:?}"),
        }
        assert!(registry.get("looped").await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_update_keeps_previous_version() {
        let registry = WorkflowRegistry::in_memory();
        registry.register(chain("wf-1", "standard")).await.unwrap();

        let patch = WorkflowPatch {
            steps: Some(vec![
                WorkflowStep::new("a", Layer::Bottom, "svc-a").depends_on(["missing"]),
            ]),
            ..Default::default()
        };
        assert!(registry.update("wf-1", patch).await.is_err());
        assert_eq!(registry.get("wf-1").await.unwrap().steps.len(), 3);

        let rename = WorkflowPatch {
            name: Some("Renamed".to_string()),
            ..Default::default()
        };
        assert_eq!(registry.update("wf-1", rename).await.unwrap().name, "Renamed");
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_found() {
        let registry = WorkflowRegistry::in_memory();
        assert!(matches!(
            registry.update("ghost", WorkflowPatch::default()).await,
            Err(OrchestrationError::NotFound { .. })
        ));
        assert!(matches!(
            registry.delete("ghost").await,
            Err(OrchestrationError::NotFound { .. })
        ));
        assert!(matches!(
            registry.get_by_type("ghost").await,
            Err(OrchestrationError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_get_by_type_prefers_latest_active() {
        let registry = WorkflowRegistry::in_memory();
        registry.register(chain("old", "standard")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        registry.register(chain("new", "standard")).await.unwrap();
        registry
            .register(chain("disabled", "standard").inactive())
            .await
            .unwrap();

        assert_eq!(registry.get_by_type("standard").await.unwrap().id, "new");

        registry.delete("new").await.unwrap();
        assert_eq!(registry.get_by_type("standard").await.unwrap().id, "old");
    }

    #[tokio::test]
    async fn test_builtin_templates_and_stats() {
        let registry = WorkflowRegistry::in_memory();
        assert_eq!(registry.load_builtin_templates().await.unwrap(), 3);
        // Loading again replaces instead of failing
        assert_eq!(registry.load_builtin_templates().await.unwrap(), 3);

        let stats = registry.stats().await.unwrap();
        assert_eq!(stats.total_workflows, 3);
        assert_eq!(stats.active_workflows, 3);
        assert_eq!(stats.workflow_types.get("research"), Some(&1));
    }

    #[tokio::test]
    async fn test_execution_batches_group_independent_steps() {
        let registry = WorkflowRegistry::in_memory();
        let workflow = registry
            .register(templates::refresh_workflow())
            .await
            .unwrap();

        let batches = registry.execution_batches(&workflow, 4).unwrap();
        let names: Vec<Vec<&str>> = batches
            .iter()
            .map(|batch| batch.iter().map(|s| s.name.as_str()).collect())
            .collect();
        assert_eq!(
            names,
            vec![
                vec!["content_audit"],
                vec!["freshness_scoring", "citation_verification"],
                vec!["content_update"],
                vec!["schema_generation"],
            ]
        );
    }
}
