#![allow(clippy::doc_markdown)] // Allow technical terms in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Content Architect Core
//!
//! Workflow orchestration and job management for a layered content
//! processing pipeline.
//!
//! ## Overview
//!
//! Content services (intent analysis, freshness scoring, citation
//! verification, schema generation, ...) are organized into three ordered
//! layers: bottom, middle and top. This crate turns declarative workflow
//! templates into dependency-respecting execution plans, drives each job
//! through them with partial-failure and retry semantics, and fans progress
//! events out to subscribed clients. It never computes a step's result
//! itself: steps are bound to external `StepService` collaborators.
//!
//! ## Module Organization
//!
//! - [`registry`] - Workflow templates, validation and execution ordering
//! - [`jobs`] - Job records, guarded lifecycle, listing and cleanup
//! - [`notifications`] - Connections, subscriptions and event fan-out
//! - [`orchestration`] - The executor, broker workers and system bootstrap
//! - [`state_machine`] - Job lifecycle transitions and guards
//! - [`models`] - Workflows, jobs, requests and the execution context
//! - [`config`] - Layered YAML and environment configuration
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured tracing setup and operation records
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use content_architect::config::ConfigManager;
//! use content_architect::models::ContentRequest;
//! use content_architect::orchestration::{OrchestrationSystem, StepServiceRegistry};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! content_architect::logging::init_structured_logging();
//!
//! let config = ConfigManager::load()?;
//! let services = StepServiceRegistry::new(); // bind step services here
//! let system = OrchestrationSystem::bootstrap(config, services).await?;
//!
//! let response = system
//!     .executor()
//!     .submit(ContentRequest::new("Edge caching strategies").asynchronous())
//!     .await?;
//! println!("queued job {}", response.job_id);
//!
//! system.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit, integration and property tests
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod models;
pub mod notifications;
pub mod orchestration;
pub mod registry;
pub mod state_machine;

pub use config::{ConfigManager, OrchestrationConfig};
pub use error::{OrchestrationError, OrchestrationResult};
pub use jobs::{JobFilter, JobPage, JobSort, JobStore, Pagination};
pub use models::{ContentRequest, Job, JobPriority, Layer, SubmissionResponse, Workflow, WorkflowStep};
pub use notifications::{EventType, NotificationEvent, NotificationHub};
pub use orchestration::{
    CompiledResult, OrchestrationExecutor, OrchestrationSystem, StepService, StepServiceError,
    StepServiceRegistry,
};
pub use registry::WorkflowRegistry;
pub use state_machine::JobStatus;
