//! # Orchestration Engine
//!
//! Turns submissions into driven jobs.
//!
//! ## Core Components
//!
//! - **OrchestrationExecutor**: submission, inline and brokered execution,
//!   cancel and retry
//! - **StepServiceRegistry**: `service_ref -> StepService` bindings
//! - **ProgressReporter**: the single point step outcomes flow through
//! - **JobBroker** / **JobWorker**: queued delivery and its consumer loop
//! - **CallbackDispatcher**: bounded-retry completion callbacks
//! - **OrchestrationSystem**: bootstrap and background loop lifecycle

pub mod broker;
pub mod callbacks;
pub mod executor;
pub mod progress;
pub mod results;
pub mod step_service;
pub mod system;
pub mod worker;

pub use broker::{BrokerError, InMemoryJobBroker, JobBroker, JobMessage, JobReceiver};
pub use callbacks::{
    CallbackDispatcher, CallbackError, CallbackNotifier, CallbackPayload, LoggingCallbackNotifier,
};
pub use executor::OrchestrationExecutor;
pub use progress::ProgressReporter;
pub use results::{compile_results, CompiledResult};
pub use step_service::{StepService, StepServiceError, StepServiceRegistry};
pub use system::{OrchestrationSystem, SystemComponents};
pub use worker::JobWorker;
