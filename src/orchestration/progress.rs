//! # Progress Reporting
//!
//! Single point through which every step outcome of a job flows. The reporter
//! owns the job's progress record, persists it together with the checkpoint
//! and publishes the matching event, so percentages reach subscribers in
//! non-decreasing order even when steps of a batch ran concurrently.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::OrchestrationResult;
use crate::jobs::JobStore;
use crate::models::{Job, JobProgress, LayerResults, WorkflowStep};
use crate::notifications::{EventType, NotificationHub};

pub struct ProgressReporter {
    store: Arc<JobStore>,
    hub: Arc<NotificationHub>,
    job_id: Uuid,
    progress: JobProgress,
}

impl ProgressReporter {
    /// Start from the job's recorded progress; `total_steps` comes from the
    /// execution plan of this run
    pub fn new(
        store: Arc<JobStore>,
        hub: Arc<NotificationHub>,
        job: &Job,
        total_steps: usize,
    ) -> Self {
        let mut progress = job.progress.clone();
        progress.total_steps = total_steps;
        Self {
            store,
            hub,
            job_id: job.id,
            progress,
        }
    }

    pub fn progress(&self) -> &JobProgress {
        &self.progress
    }

    pub async fn step_started(&mut self, step: &WorkflowStep) -> OrchestrationResult<()> {
        self.progress.current_step = Some(step.name.clone());
        self.store
            .update_progress(self.job_id, self.progress.clone(), None)
            .await?;

        self.publish(
            EventType::StepStarted,
            json!({
                "step": step.name,
                "layer": step.layer,
                "service": step.service_ref,
            }),
        )
        .await;
        Ok(())
    }

    pub async fn step_completed(
        &mut self,
        step: &WorkflowStep,
        checkpoint: &LayerResults,
        duration: Duration,
        attempts: u32,
    ) -> OrchestrationResult<()> {
        self.progress.completed_steps.push(step.name.clone());
        self.persist(checkpoint).await?;

        self.publish(
            EventType::StepCompleted,
            json!({
                "step": step.name,
                "layer": step.layer,
                "service": step.service_ref,
                "duration_ms": duration.as_millis() as u64,
                "attempts": attempts,
                "completed_steps": self.progress.completed_steps,
            }),
        )
        .await;
        Ok(())
    }

    /// An optional step failed and left a null result
    pub async fn step_failed(
        &mut self,
        step: &WorkflowStep,
        checkpoint: &LayerResults,
        error: &str,
    ) -> OrchestrationResult<()> {
        self.progress.failed_steps.push(step.name.clone());
        self.persist(checkpoint).await?;

        self.publish(
            EventType::StepFailed,
            json!({
                "step": step.name,
                "layer": step.layer,
                "service": step.service_ref,
                "error": error,
                "required": false,
            }),
        )
        .await;
        Ok(())
    }

    pub async fn step_skipped(
        &mut self,
        step: &WorkflowStep,
        checkpoint: &LayerResults,
        reason: &str,
    ) -> OrchestrationResult<()> {
        self.progress.skipped_steps.push(step.name.clone());
        self.persist(checkpoint).await?;

        self.publish(
            EventType::StepSkipped,
            json!({
                "step": step.name,
                "layer": step.layer,
                "service": step.service_ref,
                "reason": reason,
            }),
        )
        .await;
        Ok(())
    }

    async fn persist(&mut self, checkpoint: &LayerResults) -> OrchestrationResult<()> {
        self.progress.current_step = None;
        self.progress.percentage = self
            .progress
            .percentage
            .max(self.progress.computed_percentage());
        self.store
            .update_progress(self.job_id, self.progress.clone(), Some(checkpoint.clone()))
            .await?;
        Ok(())
    }

    /// Every progress event carries the percentage reached so far
    async fn publish(&self, event_type: EventType, mut payload: Value) {
        if let Value::Object(fields) = &mut payload {
            fields.insert("percentage".to_string(), json!(self.progress.percentage));
        }
        self.hub.publish(self.job_id, event_type, payload).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{JobsConfig, NotificationsConfig};
    use crate::models::{ContentRequest, Layer, NewJob};
    use crate::notifications::ChannelTransport;
    use crate::state_machine::JobStatus;

    #[tokio::test]
    async fn test_reported_percentages_never_decrease() {
        let store = Arc::new(JobStore::in_memory(JobsConfig::default()));
        let transport = Arc::new(ChannelTransport::new(16));
        let hub = Arc::new(NotificationHub::new(
            transport.clone(),
            NotificationsConfig::default(),
        ));

        let job = store
            .create_job(
                NewJob::for_request(ContentRequest::new("topic"), "wf", 3)
                    .with_initial_status(JobStatus::Processing),
            )
            .await
            .unwrap();

        let mut receiver = transport.attach("c1");
        hub.register_connection("c1", None, None);
        hub.subscribe("c1", job.id).unwrap();

        let a = WorkflowStep::new("a", Layer::Bottom, "svc-a");
        let b = WorkflowStep::new("b", Layer::Middle, "svc-b").optional();
        let c = WorkflowStep::new("c", Layer::Top, "svc-c");

        let mut reporter = ProgressReporter::new(store.clone(), hub.clone(), &job, 3);
        let checkpoint = LayerResults::default();
        reporter.step_started(&a).await.unwrap();
        reporter
            .step_completed(&a, &checkpoint, Duration::from_millis(5), 1)
            .await
            .unwrap();
        reporter.step_failed(&b, &checkpoint, "boom").await.unwrap();
        reporter.step_skipped(&c, &checkpoint, "condition").await.unwrap();

        let mut percentages = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            percentages.push(event.percentage().unwrap());
        }
        assert_eq!(percentages, vec![0, 33, 66, 100]);

        let stored = store.get_job(job.id).await.unwrap();
        assert_eq!(stored.progress.completed_steps, vec!["a".to_string()]);
        assert_eq!(stored.progress.failed_steps, vec!["b".to_string()]);
        assert_eq!(stored.progress.skipped_steps, vec!["c".to_string()]);
        assert_eq!(stored.progress.percentage, 100);
    }
}
