//! Shared helpers for the integration suites: mock step services, a wired
//! set of components and polling utilities.

#![allow(dead_code)]

pub mod strategies;

use async_trait::async_trait;
use content_architect::config::{ExecutorConfig, JobsConfig, NotificationsConfig, StepRetryConfig};
use content_architect::models::{ContentRequest, Job, OrchestrationContext, Workflow};
use content_architect::notifications::{ChannelTransport, NotificationEvent, NotificationHub};
use content_architect::orchestration::{
    OrchestrationExecutor, StepService, StepServiceError, StepServiceRegistry,
};
use content_architect::{JobStatus, JobStore, WorkflowRegistry};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// How a mock step service answers
#[derive(Debug, Clone)]
pub enum MockBehavior {
    Succeed(Value),
    Fail(String),
    /// Non-retryable failure
    Reject(String),
    /// Answer after a delay
    Delay(Duration, Value),
    /// Fail the first `failures` calls, then succeed
    FailTimes { failures: u32, value: Value },
}

/// Step service double that records every invocation
pub struct MockStepService {
    behavior: MockBehavior,
    calls: AtomicU32,
    jobs: Mutex<Vec<Uuid>>,
}

impl MockStepService {
    pub fn new(behavior: MockBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicU32::new(0),
            jobs: Mutex::new(Vec::new()),
        })
    }

    pub fn succeeding(value: Value) -> Arc<Self> {
        Self::new(MockBehavior::Succeed(value))
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Self::new(MockBehavior::Fail(message.to_string()))
    }

    pub fn rejecting(message: &str) -> Arc<Self> {
        Self::new(MockBehavior::Reject(message.to_string()))
    }

    pub fn slow(delay: Duration, value: Value) -> Arc<Self> {
        Self::new(MockBehavior::Delay(delay, value))
    }

    pub fn flaky(failures: u32, value: Value) -> Arc<Self> {
        Self::new(MockBehavior::FailTimes { failures, value })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn jobs(&self) -> Vec<Uuid> {
        self.jobs.lock().clone()
    }
}

#[async_trait]
impl StepService for MockStepService {
    async fn execute(
        &self,
        context: &OrchestrationContext,
        _request: &ContentRequest,
    ) -> Result<Value, StepServiceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.jobs.lock().push(context.job_id);

        match &self.behavior {
            MockBehavior::Succeed(value) => Ok(value.clone()),
            MockBehavior::Fail(message) => Err(StepServiceError::Failed(message.clone())),
            MockBehavior::Reject(message) => Err(StepServiceError::InvalidInput(message.clone())),
            MockBehavior::Delay(delay, value) => {
                tokio::time::sleep(*delay).await;
                Ok(value.clone())
            }
            MockBehavior::FailTimes { failures, value } => {
                if call < *failures {
                    Err(StepServiceError::Unavailable(format!("attempt {}", call + 1)))
                } else {
                    Ok(value.clone())
                }
            }
        }
    }
}

/// Executor settings with millisecond backoff
pub fn fast_executor_config() -> ExecutorConfig {
    ExecutorConfig {
        default_step_timeout_ms: 2_000,
        max_step_timeout_ms: 10_000,
        max_parallel_steps: 1,
        step_retry: StepRetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 10,
            backoff_multiplier: 2.0,
        },
    }
}

/// Registry, store and hub wired together around one workflow
pub struct Harness {
    pub registry: Arc<WorkflowRegistry>,
    pub store: Arc<JobStore>,
    pub hub: Arc<NotificationHub>,
    pub transport: Arc<ChannelTransport>,
    pub services: Arc<StepServiceRegistry>,
}

impl Harness {
    pub async fn with_workflow(workflow: Workflow, services: StepServiceRegistry) -> Self {
        let registry = Arc::new(WorkflowRegistry::in_memory());
        registry
            .register(workflow)
            .await
            .expect("workflow should register");

        let transport = Arc::new(ChannelTransport::new(64));
        Self {
            registry,
            store: Arc::new(JobStore::in_memory(JobsConfig::default())),
            hub: Arc::new(NotificationHub::new(
                transport.clone(),
                NotificationsConfig::default(),
            )),
            transport,
            services: Arc::new(services),
        }
    }

    pub fn executor(&self) -> OrchestrationExecutor {
        self.executor_with(fast_executor_config())
    }

    pub fn executor_with(&self, config: ExecutorConfig) -> OrchestrationExecutor {
        OrchestrationExecutor::new(
            self.registry.clone(),
            self.store.clone(),
            self.hub.clone(),
            self.services.clone(),
            config,
        )
    }

    /// Register a connection, attach its channel and subscribe it to a job
    pub fn subscribe(&self, connection_id: &str, job_id: Uuid) -> mpsc::Receiver<NotificationEvent> {
        let receiver = self.transport.attach(connection_id);
        self.hub.register_connection(connection_id, None, None);
        self.hub
            .subscribe(connection_id, job_id)
            .expect("connection is registered");
        receiver
    }
}

/// Everything already buffered on a receiver
pub fn drain(receiver: &mut mpsc::Receiver<NotificationEvent>) -> Vec<NotificationEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

/// Poll the store until the job reaches `status`
pub async fn wait_for_status(
    store: &JobStore,
    job_id: Uuid,
    status: JobStatus,
    timeout: Duration,
) -> Job {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let job = store.get_job(job_id).await.expect("job exists");
        if job.status == status {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {job_id} stuck in {} waiting for {status}",
            job.status
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Poll until `condition` holds
pub async fn wait_until<F>(timeout: Duration, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
