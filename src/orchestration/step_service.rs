//! # Step Services
//!
//! The uniform contract every content-processing collaborator implements.
//! The executor never inspects a step's internals: it hands over the
//! execution context and the request and receives an opaque JSON body or an
//! error.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::models::{ContentRequest, OrchestrationContext, Workflow};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepServiceError {
    /// The service ran and reported a failure
    #[error("{0}")]
    Failed(String),

    /// The input can never succeed; in-run retries are skipped
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The service could not be reached
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl StepServiceError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidInput(_))
    }
}

/// External collaborator bound to a step through its `service_ref`
#[async_trait]
pub trait StepService: Send + Sync + 'static {
    async fn execute(
        &self,
        context: &OrchestrationContext,
        request: &ContentRequest,
    ) -> Result<Value, StepServiceError>;
}

/// `service_ref -> StepService` bindings
#[derive(Default)]
pub struct StepServiceRegistry {
    services: RwLock<HashMap<String, Arc<dyn StepService>>>,
}

impl StepServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration
    pub fn with(self, service_ref: impl Into<String>, service: Arc<dyn StepService>) -> Self {
        self.register(service_ref, service);
        self
    }

    /// Bind a service, replacing any previous binding for the same reference
    pub fn register(&self, service_ref: impl Into<String>, service: Arc<dyn StepService>) {
        self.services.write().insert(service_ref.into(), service);
    }

    pub fn unregister(&self, service_ref: &str) -> bool {
        self.services.write().remove(service_ref).is_some()
    }

    pub fn get(&self, service_ref: &str) -> Option<Arc<dyn StepService>> {
        self.services.read().get(service_ref).cloned()
    }

    pub fn contains(&self, service_ref: &str) -> bool {
        self.services.read().contains_key(service_ref)
    }

    pub fn service_refs(&self) -> Vec<String> {
        let mut refs: Vec<String> = self.services.read().keys().cloned().collect();
        refs.sort();
        refs
    }

    /// Service references of `workflow` with no bound service
    pub fn missing_bindings(&self, workflow: &Workflow) -> Vec<String> {
        let services = self.services.read();
        let mut missing: Vec<String> = workflow
            .steps
            .iter()
            .filter(|step| !services.contains_key(&step.service_ref))
            .map(|step| step.service_ref.clone())
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Layer, WorkflowStep};

    struct Echo;

    #[async_trait]
    impl StepService for Echo {
        async fn execute(
            &self,
            _context: &OrchestrationContext,
            request: &ContentRequest,
        ) -> Result<Value, StepServiceError> {
            Ok(Value::String(request.topic.clone()))
        }
    }

    #[test]
    fn test_bindings() {
        let registry = StepServiceRegistry::new().with("echo", Arc::new(Echo));
        assert!(registry.contains("echo"));
        assert_eq!(registry.service_refs(), vec!["echo".to_string()]);

        let workflow = Workflow::new(
            "wf",
            "Workflow",
            "standard",
            vec![
                WorkflowStep::new("a", Layer::Bottom, "echo"),
                WorkflowStep::new("b", Layer::Middle, "missing"),
                WorkflowStep::new("c", Layer::Top, "missing"),
            ],
        );
        assert_eq!(registry.missing_bindings(&workflow), vec!["missing".to_string()]);

        assert!(registry.unregister("echo"));
        assert!(registry.get("echo").is_none());
    }

    #[test]
    fn test_retryability() {
        assert!(StepServiceError::Failed("x".into()).is_retryable());
        assert!(StepServiceError::Unavailable("x".into()).is_retryable());
        assert!(!StepServiceError::InvalidInput("x".into()).is_retryable());
    }
}
