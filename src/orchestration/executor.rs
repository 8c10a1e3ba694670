//! # Orchestration Executor
//!
//! Front door of the orchestration core. `submit` validates a request,
//! resolves the workflow and creates the job; the job is then either handed
//! to the broker or driven inline. Driving a job walks the execution order in
//! batches, invokes the bound step services under their timeouts and routes
//! every outcome through a single `ProgressReporter`.
//!
//! Cancellation is cooperative: the driver checks the stored status before
//! each batch and in-flight step calls are allowed to finish.

use chrono::Utc;
use futures::future::join_all;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::broker::{BrokerError, JobBroker, JobMessage};
use super::callbacks::CallbackDispatcher;
use super::progress::ProgressReporter;
use super::results::compile_results;
use super::step_service::StepServiceRegistry;
use crate::config::ExecutorConfig;
use crate::constants::DEFAULT_MAX_RETRIES;
use crate::error::{OrchestrationError, OrchestrationResult};
use crate::jobs::JobStore;
use crate::logging::{log_job_operation, log_step_operation};
use crate::models::{
    ContentRequest, Job, NewJob, OrchestrationContext, StepCondition, SubmissionResponse, Workflow,
    WorkflowStep,
};
use crate::notifications::{EventType, NotificationEvent, NotificationHub};
use crate::registry::{execution_batches, WorkflowRegistry};
use crate::state_machine::JobStatus;

/// Outcome of one step invocation, before it is applied to the job
#[derive(Debug)]
enum StepOutcome {
    Succeeded {
        body: Value,
        attempts: u32,
        duration: Duration,
    },
    Skipped {
        reason: String,
    },
    Failed {
        error: OrchestrationError,
        attempts: u32,
    },
}

pub struct OrchestrationExecutor {
    registry: Arc<WorkflowRegistry>,
    store: Arc<JobStore>,
    hub: Arc<NotificationHub>,
    services: Arc<StepServiceRegistry>,
    broker: Option<Arc<dyn JobBroker>>,
    callbacks: Option<Arc<CallbackDispatcher>>,
    config: ExecutorConfig,
    default_max_retries: u32,
}

impl OrchestrationExecutor {
    pub fn new(
        registry: Arc<WorkflowRegistry>,
        store: Arc<JobStore>,
        hub: Arc<NotificationHub>,
        services: Arc<StepServiceRegistry>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            registry,
            store,
            hub,
            services,
            broker: None,
            callbacks: None,
            config,
            default_max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_broker(mut self, broker: Arc<dyn JobBroker>) -> Self {
        self.broker = Some(broker);
        self
    }

    pub fn with_callbacks(mut self, callbacks: Arc<CallbackDispatcher>) -> Self {
        self.callbacks = Some(callbacks);
        self
    }

    pub fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    pub fn registry(&self) -> &Arc<WorkflowRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn hub(&self) -> &Arc<NotificationHub> {
        &self.hub
    }

    /// Validate and accept a request. Nothing is created when validation
    /// fails. Asynchronous requests return once the job is queued;
    /// synchronous ones return after the job finished, with its result or
    /// error in the response.
    #[instrument(skip(self, request), fields(workflow_type = %request.workflow_type))]
    pub async fn submit(&self, request: ContentRequest) -> OrchestrationResult<SubmissionResponse> {
        request.validate()?;
        let workflow = self.registry.get_by_type(&request.workflow_type).await?;
        let order = self.registry.execution_order(&workflow)?;

        let estimated_completion_time = Utc::now()
            + chrono::Duration::from_std(workflow.estimated_duration())
                .unwrap_or_else(|_| chrono::Duration::zero());
        let run_async = request.run_async;
        let new_job = NewJob::for_request(request, workflow.id.clone(), order.len())
            .with_max_retries(self.default_max_retries);

        if run_async {
            let job = self.store.create_job(new_job).await?;
            self.announce_queued(&job).await;

            return match self.dispatch(&job).await {
                Ok(()) => Ok(Self::response_for(&job, estimated_completion_time)),
                Err(error) => {
                    warn!(
                        job_id = %job.id,
                        error = %error,
                        "Broker unavailable, executing job inline"
                    );
                    let job = self.run(job.id).await?;
                    Ok(Self::response_for(&job, estimated_completion_time))
                }
            };
        }

        let job = self
            .store
            .create_job(new_job.with_initial_status(JobStatus::Processing))
            .await?;
        let job = self.drive(job, Arc::new(workflow)).await?;
        Ok(Self::response_for(&job, estimated_completion_time))
    }

    /// Execute a queued job. Jobs in any other state are returned untouched,
    /// which makes duplicate broker deliveries harmless.
    #[instrument(skip(self))]
    pub async fn run(&self, job_id: Uuid) -> OrchestrationResult<Job> {
        let job = self.store.get_job(job_id).await?;
        if job.status != JobStatus::Queued {
            debug!(job_id = %job_id, status = %job.status, "Job is not queued, nothing to run");
            return Ok(job);
        }

        let job = match self
            .store
            .update_status(job_id, JobStatus::Processing, None, None)
            .await
        {
            Ok(job) => job,
            // Another consumer or a cancel request got there first
            Err(OrchestrationError::StateTransition { .. }) => {
                return self.store.get_job(job_id).await
            }
            Err(error) => return Err(error),
        };

        // Snapshot: registry updates do not reach a running job
        let workflow = match self.registry.get(&job.workflow_id).await {
            Ok(workflow) => Arc::new(workflow),
            Err(error @ OrchestrationError::NotFound { .. }) => {
                return self.fail_job(job_id, &error).await
            }
            Err(error) => return Err(error),
        };

        self.drive(job, workflow).await
    }

    /// Cancel a queued or processing job
    #[instrument(skip(self))]
    pub async fn cancel(&self, job_id: Uuid) -> OrchestrationResult<Job> {
        let job = self.store.cancel_job(job_id).await?;
        self.hub
            .publish(
                job_id,
                EventType::JobCancelled,
                json!({
                    "status": job.status,
                    "percentage": job.progress.percentage,
                    "completed_steps": job.progress.completed_steps,
                }),
            )
            .await;
        self.spawn_callback(&job);
        Ok(job)
    }

    /// Re-queue a failed job and dispatch it again. Execution resumes after
    /// the last processed step.
    #[instrument(skip(self))]
    pub async fn retry(&self, job_id: Uuid) -> OrchestrationResult<Job> {
        let job = self.store.retry_job(job_id).await?;
        self.hub
            .publish(
                job_id,
                EventType::JobRetried,
                json!({
                    "retry_count": job.retry_count,
                    "max_retries": job.max_retries,
                    "percentage": job.progress.percentage,
                }),
            )
            .await;

        match self.dispatch(&job).await {
            Ok(()) => Ok(job),
            Err(error) => {
                debug!(job_id = %job_id, error = %error, "Running retried job inline");
                self.run(job_id).await
            }
        }
    }

    async fn dispatch(&self, job: &Job) -> Result<(), BrokerError> {
        let broker = self.broker.as_ref().ok_or(BrokerError::Unavailable)?;
        if !broker.is_available() {
            return Err(BrokerError::Unavailable);
        }
        broker.enqueue(JobMessage::for_job(job)).await
    }

    async fn announce_queued(&self, job: &Job) {
        let Some(user_id) = job.user_id.as_deref() else {
            return;
        };
        let event = NotificationEvent::for_job(
            job.id,
            EventType::JobQueued,
            json!({
                "workflow_id": job.workflow_id,
                "job_type": job.job_type,
                "priority": job.priority,
                "percentage": 0,
            }),
        );
        self.hub.publish_to_user(user_id, event).await;
    }

    /// Run a processing job to a terminal state. A job that stops being
    /// processing underneath the driver (cancelled) is returned as found.
    async fn drive(&self, job: Job, workflow: Arc<Workflow>) -> OrchestrationResult<Job> {
        let job_id = job.id;
        match self.drive_steps(job, &workflow).await {
            Ok(job) => Ok(job),
            Err(error) => self.settle_interrupted(job_id, error).await,
        }
    }

    async fn drive_steps(&self, job: Job, workflow: &Workflow) -> OrchestrationResult<Job> {
        let job_id = job.id;
        let order = match self.registry.execution_order(workflow) {
            Ok(order) => order,
            Err(error) => return self.fail_job(job_id, &error).await,
        };
        let total_steps = order.len();

        // Resume after whatever an earlier attempt already processed
        let pending: Vec<WorkflowStep> = order
            .into_iter()
            .filter(|step| !job.progress.is_processed(&step.name))
            .collect();
        let batches = execution_batches(&pending, self.config.max_parallel_steps);

        log_job_operation(
            "run",
            Some(job_id),
            Some(&job.job_type),
            "processing",
            Some(&format!(
                "{} of {} steps pending, attempt {}",
                pending.len(),
                total_steps,
                job.retry_count + 1
            )),
        );

        let mut context = OrchestrationContext::for_job(&job);
        let mut reporter =
            ProgressReporter::new(self.store.clone(), self.hub.clone(), &job, total_steps);

        for range in batches {
            let current = self.store.get_job(job_id).await?;
            if current.status != JobStatus::Processing {
                info!(job_id = %job_id, status = %current.status, "⏹️ Job stopped before next batch");
                return Ok(current);
            }

            let batch = &pending[range];
            for step in batch {
                reporter.step_started(step).await?;
            }

            let outcomes = join_all(batch.iter().map(|step| self.execute_step(step, &context))).await;

            for (step, outcome) in batch.iter().zip(outcomes) {
                match outcome {
                    StepOutcome::Succeeded {
                        body,
                        attempts,
                        duration,
                    } => {
                        context.record_success(step, body);
                        reporter
                            .step_completed(step, &context.layer_results, duration, attempts)
                            .await?;
                    }
                    StepOutcome::Skipped { reason } => {
                        context.record_null(step);
                        reporter
                            .step_skipped(step, &context.layer_results, &reason)
                            .await?;
                    }
                    StepOutcome::Failed { error, .. } if step.required => {
                        return self.fail_job(job_id, &error).await;
                    }
                    StepOutcome::Failed { error, attempts } => {
                        warn!(
                            job_id = %job_id,
                            step = %step.name,
                            attempts = attempts,
                            error = %error,
                            "Optional step failed, continuing with a null result"
                        );
                        context.record_null(step);
                        reporter
                            .step_failed(step, &context.layer_results, &error.to_string())
                            .await?;
                    }
                }
            }
        }

        self.complete_job(&context).await
    }

    async fn complete_job(&self, context: &OrchestrationContext) -> OrchestrationResult<Job> {
        let compiled = compile_results(context);
        let result = serde_json::to_value(&compiled)?;
        let job = self
            .store
            .update_status(context.job_id, JobStatus::Completed, None, Some(result))
            .await?;

        log_job_operation(
            "complete",
            Some(job.id),
            Some(&job.job_type),
            "completed",
            job.processing_time_ms
                .map(|ms| format!("{ms}ms"))
                .as_deref(),
        );
        self.hub
            .publish(
                job.id,
                EventType::JobCompleted,
                json!({
                    "status": job.status,
                    "percentage": job.progress.percentage,
                    "completed_steps": job.progress.completed_steps,
                    "processing_time_ms": job.processing_time_ms,
                }),
            )
            .await;
        self.spawn_callback(&job);
        Ok(job)
    }

    /// Record `error` on the job, fail it and tell subscribers
    async fn fail_job(&self, job_id: Uuid, error: &OrchestrationError) -> OrchestrationResult<Job> {
        let job = self.store.set_error(job_id, error.to_string()).await?;

        log_job_operation(
            "fail",
            Some(job_id),
            Some(&job.job_type),
            "failed",
            Some(&error.to_string()),
        );
        self.hub
            .publish(
                job_id,
                EventType::Error,
                json!({
                    "error": error.to_string(),
                    "error_code": error.error_code(),
                    "percentage": job.progress.percentage,
                    "retry_count": job.retry_count,
                    "can_retry": job.can_retry(),
                }),
            )
            .await;
        self.spawn_callback(&job);
        Ok(job)
    }

    /// Decide what an error raised mid-run means. A job that left
    /// `processing` was cancelled (or finished) concurrently and is returned
    /// as stored; otherwise the error is recorded on the job and propagated.
    async fn settle_interrupted(
        &self,
        job_id: Uuid,
        error: OrchestrationError,
    ) -> OrchestrationResult<Job> {
        let job = self.store.get_job(job_id).await?;
        if job.status != JobStatus::Processing {
            debug!(job_id = %job_id, status = %job.status, error = %error, "Run interrupted");
            return Ok(job);
        }

        self.fail_job(job_id, &error).await?;
        Err(error)
    }

    async fn execute_step(&self, step: &WorkflowStep, context: &OrchestrationContext) -> StepOutcome {
        if let Some(reason) = Self::skip_reason(step, context) {
            log_step_operation(
                "skip",
                Some(context.job_id),
                Some(&step.name),
                Some(&step.service_ref),
                "skipped",
                Some(&reason),
            );
            return StepOutcome::Skipped { reason };
        }

        let Some(service) = self.services.get(&step.service_ref) else {
            return StepOutcome::Failed {
                error: OrchestrationError::StepExecution {
                    step: step.name.clone(),
                    reason: format!("no step service bound to '{}'", step.service_ref),
                },
                attempts: 0,
            };
        };

        let timeout = self.config.step_timeout(step.timeout());
        let max_attempts = if step.retryable {
            self.config.step_retry.max_attempts.max(1)
        } else {
            1
        };
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let (error, retryable) =
                match tokio::time::timeout(timeout, service.execute(context, &context.request))
                    .await
                {
                    Ok(Ok(body)) => {
                        log_step_operation(
                            "execute",
                            Some(context.job_id),
                            Some(&step.name),
                            Some(&step.service_ref),
                            "completed",
                            Some(&format!("attempt {attempt}")),
                        );
                        return StepOutcome::Succeeded {
                            body,
                            attempts: attempt,
                            duration: started.elapsed(),
                        };
                    }
                    Ok(Err(error)) => {
                        let retryable = error.is_retryable();
                        (
                            OrchestrationError::StepExecution {
                                step: step.name.clone(),
                                reason: error.to_string(),
                            },
                            retryable,
                        )
                    }
                    Err(_) => (
                        OrchestrationError::StepTimeout {
                            step: step.name.clone(),
                            timeout,
                        },
                        true,
                    ),
                };

            if attempt >= max_attempts || !retryable {
                log_step_operation(
                    "execute",
                    Some(context.job_id),
                    Some(&step.name),
                    Some(&step.service_ref),
                    "failed",
                    Some(&error.to_string()),
                );
                return StepOutcome::Failed {
                    error,
                    attempts: attempt,
                };
            }

            let delay = self.config.step_retry.backoff_delay(attempt);
            warn!(
                job_id = %context.job_id,
                step = %step.name,
                attempt = attempt,
                max_attempts = max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Step attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn skip_reason(step: &WorkflowStep, context: &OrchestrationContext) -> Option<String> {
        match &step.condition {
            StepCondition::Always => None,
            StepCondition::DependenciesSucceeded => step
                .depends_on
                .iter()
                .find(|dependency| context.dependency_result(dependency).is_none())
                .map(|dependency| format!("dependency '{dependency}' produced no result")),
            StepCondition::RequestField { field, equals } => {
                (context.request.metadata.get(field) != Some(equals))
                    .then(|| format!("request field '{field}' does not equal {equals}"))
            }
        }
    }

    fn spawn_callback(&self, job: &Job) {
        let Some(dispatcher) = self.callbacks.clone() else {
            return;
        };
        if job.callback_url.is_none() {
            return;
        }

        let job = job.clone();
        tokio::spawn(async move {
            dispatcher.dispatch(&job).await;
        });
    }

    fn response_for(job: &Job, estimated_completion_time: chrono::DateTime<Utc>) -> SubmissionResponse {
        SubmissionResponse {
            job_id: job.id,
            status: job.status,
            estimated_completion_time,
            result: job.result.clone(),
            error: job.error.clone(),
        }
    }
}
