//! # Workflow Registry
//!
//! Workflow template storage, structural validation and execution planning.

pub mod dependency_graph;
pub mod repository;
pub mod templates;
pub mod validation;
pub mod workflow_registry;

pub use dependency_graph::{execution_batches, DependencyGraph};
pub use repository::{InMemoryWorkflowRepository, WorkflowRepository};
pub use validation::validate_workflow;
pub use workflow_registry::{RegistryStats, WorkflowRegistry};
