//! # Job Store
//!
//! Owns job records and their lifecycle. Every mutation of a job runs under
//! that job's async mutex and is validated by the job state machine before
//! it is written back, so concurrent callers (the executor, a cancel request,
//! the cleanup sweep) observe linearized transitions. Listings and
//! statistics read the repository without taking job locks.

use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::query::{JobFilter, JobPage, JobSort, JobStatistics, Pagination};
use super::repository::{InMemoryJobRepository, JobRepository};
use crate::config::JobsConfig;
use crate::error::{OrchestrationError, OrchestrationResult};
use crate::logging::log_job_operation;
use crate::models::{Job, JobProgress, LayerResults, NewJob};
use crate::state_machine::{JobEvent, JobStatus, ProgressGuard, StateGuard};

pub struct JobStore {
    repository: Arc<dyn JobRepository>,
    /// Per-job mutexes linearizing mutations
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
    config: JobsConfig,
}

impl JobStore {
    pub fn new(repository: Arc<dyn JobRepository>, config: JobsConfig) -> Self {
        Self {
            repository,
            locks: DashMap::new(),
            config,
        }
    }

    pub fn in_memory(config: JobsConfig) -> Self {
        Self::new(Arc::new(InMemoryJobRepository::new()), config)
    }

    pub fn config(&self) -> &JobsConfig {
        &self.config
    }

    #[instrument(skip(self, new_job), fields(job_type = %new_job.job_type))]
    pub async fn create_job(&self, new_job: NewJob) -> OrchestrationResult<Job> {
        let job = Job::from_new(new_job);
        self.repository.insert(job.clone()).await?;

        log_job_operation(
            "create",
            Some(job.id),
            Some(&job.job_type),
            job.status.as_str(),
            None,
        );
        Ok(job)
    }

    pub async fn get_job(&self, id: Uuid) -> OrchestrationResult<Job> {
        self.repository
            .get(id)
            .await?
            .ok_or_else(|| OrchestrationError::job_not_found(id))
    }

    /// Guarded status change. `message` is the failure reason for `Failed`,
    /// `result` the compiled output for `Completed`.
    #[instrument(skip(self, message, result))]
    pub async fn update_status(
        &self,
        id: Uuid,
        status: JobStatus,
        message: Option<String>,
        result: Option<Value>,
    ) -> OrchestrationResult<Job> {
        let event = match status {
            JobStatus::Queued => JobEvent::Retry,
            JobStatus::Processing => JobEvent::Start,
            JobStatus::Completed => JobEvent::Complete,
            JobStatus::Failed => {
                JobEvent::fail_with_error(message.unwrap_or_else(|| "job failed".to_string()))
            }
            JobStatus::Cancelled => JobEvent::Cancel,
        };

        self.mutate(id, |job| {
            Self::apply_event(job, &event)?;
            if let Some(result) = result {
                job.result = Some(result);
            }
            Ok(())
        })
        .await
    }

    /// Record step progress and the layer results reached so far.
    /// Rejected unless the job is processing and the update moves forward.
    pub async fn update_progress(
        &self,
        id: Uuid,
        progress: JobProgress,
        checkpoint: Option<LayerResults>,
    ) -> OrchestrationResult<Job> {
        self.mutate(id, |job| {
            ProgressGuard { next: &progress }
                .check(job)
                .map_err(|e| OrchestrationError::from_state_machine(job.id, e))?;

            debug!(
                job_id = %job.id,
                percentage = progress.percentage,
                current_step = ?progress.current_step,
                "Progress updated"
            );
            job.progress = progress;
            if let Some(checkpoint) = checkpoint {
                job.checkpoint = checkpoint;
            }
            job.updated_at = Utc::now();
            Ok(())
        })
        .await
    }

    /// Fail a processing job with `error`; on an already failed job only the
    /// message is replaced
    pub async fn set_error(&self, id: Uuid, error: impl Into<String>) -> OrchestrationResult<Job> {
        let error = error.into();
        self.mutate(id, |job| {
            if job.status == JobStatus::Failed {
                job.error = Some(error);
                job.updated_at = Utc::now();
                return Ok(());
            }
            Self::apply_event(job, &JobEvent::Fail(error))
        })
        .await
    }

    pub async fn list_jobs(
        &self,
        filter: &JobFilter,
        pagination: &Pagination,
        sort: JobSort,
    ) -> OrchestrationResult<JobPage> {
        let pagination =
            pagination.bounded(self.config.default_page_size, self.config.max_page_size);
        let (jobs, total_count) = self.repository.find(filter, sort, &pagination).await?;
        Ok(JobPage::new(jobs, total_count, &pagination))
    }

    /// Cancel a queued or processing job
    #[instrument(skip(self))]
    pub async fn cancel_job(&self, id: Uuid) -> OrchestrationResult<Job> {
        let job = self
            .mutate(id, |job| Self::apply_event(job, &JobEvent::Cancel))
            .await?;
        log_job_operation("cancel", Some(id), Some(&job.job_type), "cancelled", None);
        Ok(job)
    }

    /// Re-queue a failed job while its retry budget lasts. Progress and the
    /// checkpoint are kept so execution resumes after the last processed step.
    #[instrument(skip(self))]
    pub async fn retry_job(&self, id: Uuid) -> OrchestrationResult<Job> {
        let job = self
            .mutate(id, |job| Self::apply_event(job, &JobEvent::Retry))
            .await?;

        let details = format!("attempt {} of {}", job.retry_count, job.max_retries);
        log_job_operation(
            "retry",
            Some(id),
            Some(&job.job_type),
            "queued",
            Some(&details),
        );
        Ok(job)
    }

    pub async fn statistics(&self, user_id: Option<&str>) -> OrchestrationResult<JobStatistics> {
        let mut filter = JobFilter::new();
        filter.user_id = user_id.map(str::to_string);

        let (jobs, _) = self
            .repository
            .find(&filter, JobSort::default(), &Pagination::all())
            .await?;
        Ok(JobStatistics::from_jobs(&jobs))
    }

    /// Remove terminal jobs whose last change is older than `age`
    #[instrument(skip(self))]
    pub async fn cleanup_older_than(&self, age: Duration) -> OrchestrationResult<usize> {
        let age = ChronoDuration::from_std(age)
            .map_err(|e| OrchestrationError::validation(format!("invalid retention: {e}")))?;
        let cutoff = Utc::now() - age;

        let (candidates, _) = self
            .repository
            .find(&JobFilter::new(), JobSort::default(), &Pagination::all())
            .await?;

        let mut removed = 0;
        for candidate in candidates {
            let lock = self.lock_for(candidate.id);
            let _guard = lock.lock().await;

            // Re-read under the lock; the job may have been retried meanwhile
            let Some(job) = self.repository.get(candidate.id).await? else {
                continue;
            };
            let last_change = job.completed_at.unwrap_or(job.updated_at);
            if job.is_terminal() && last_change < cutoff && self.repository.delete(job.id).await? {
                self.locks.remove(&job.id);
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed = removed, "🧹 Removed expired jobs");
        }
        Ok(removed)
    }

    fn lock_for(&self, id: Uuid) -> Arc<Mutex<()>> {
        self.locks.entry(id).or_default().clone()
    }

    /// Read-modify-write of one job under its lock
    async fn mutate<F>(&self, id: Uuid, apply: F) -> OrchestrationResult<Job>
    where
        F: FnOnce(&mut Job) -> OrchestrationResult<()>,
    {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut job = match self.repository.get(id).await? {
            Some(job) => job,
            None => {
                self.locks.remove(&id);
                return Err(OrchestrationError::job_not_found(id));
            }
        };

        apply(&mut job)?;
        self.repository.save(job.clone()).await?;
        Ok(job)
    }

    /// Validate `event` and apply its side effects to `job`
    fn apply_event(job: &mut Job, event: &JobEvent) -> OrchestrationResult<()> {
        let target = job
            .state_machine()
            .transition(event)
            .map_err(|e| OrchestrationError::from_state_machine(job.id, e))?;

        let now = Utc::now();
        match event {
            JobEvent::Start => {
                job.started_at.get_or_insert(now);
            }
            JobEvent::Complete => {
                job.progress.current_step = None;
                job.progress.percentage = 100;
                job.completed_at = Some(now);
                job.processing_time_ms = job.elapsed_ms(now);
            }
            JobEvent::Fail(message) => {
                job.error = Some(message.clone());
                job.completed_at = Some(now);
                job.processing_time_ms = job.elapsed_ms(now);
            }
            JobEvent::Cancel => {
                job.completed_at = Some(now);
                job.processing_time_ms = job.elapsed_ms(now);
            }
            JobEvent::Retry => {
                job.retry_count += 1;
                job.error = None;
                job.started_at = None;
                job.completed_at = None;
                job.processing_time_ms = None;
            }
        }

        job.status = target;
        job.updated_at = now;
        Ok(())
    }
}
