//! # Job Broker
//!
//! Delivery channel for queued jobs. Delivery is at-least-once: consumers
//! must tolerate receiving a job that already ran, which `run` does by
//! ignoring jobs that are no longer queued.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{Job, JobPriority};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMessage {
    pub job_id: Uuid,
    pub priority: JobPriority,
    /// Retry count of the job when it was enqueued
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl JobMessage {
    pub fn for_job(job: &Job) -> Self {
        Self {
            job_id: job.id,
            priority: job.priority,
            attempt: job.retry_count,
            enqueued_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("Broker is unavailable")]
    Unavailable,

    #[error("Broker queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Broker channel is closed")]
    Closed,
}

#[async_trait]
pub trait JobBroker: Send + Sync + 'static {
    async fn enqueue(&self, message: JobMessage) -> Result<(), BrokerError>;

    fn is_available(&self) -> bool;
}

/// Consumer side shared by all workers
pub type JobReceiver = Arc<Mutex<mpsc::Receiver<JobMessage>>>;

/// Bounded in-process broker with an availability switch for outage drills
#[derive(Debug)]
pub struct InMemoryJobBroker {
    sender: mpsc::Sender<JobMessage>,
    available: AtomicBool,
    capacity: usize,
}

impl InMemoryJobBroker {
    pub fn new(capacity: usize) -> (Self, JobReceiver) {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let broker = Self {
            sender,
            available: AtomicBool::new(true),
            capacity,
        };
        (broker, Arc::new(Mutex::new(receiver)))
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        if !available {
            warn!("Job broker marked unavailable");
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Messages waiting for a worker
    pub fn pending(&self) -> usize {
        self.capacity - self.sender.capacity()
    }
}

#[async_trait]
impl JobBroker for InMemoryJobBroker {
    async fn enqueue(&self, message: JobMessage) -> Result<(), BrokerError> {
        if !self.is_available() {
            return Err(BrokerError::Unavailable);
        }

        let job_id = message.job_id;
        self.sender.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => BrokerError::QueueFull {
                capacity: self.capacity,
            },
            mpsc::error::TrySendError::Closed(_) => BrokerError::Closed,
        })?;

        debug!(job_id = %job_id, "Job enqueued");
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst) && !self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentRequest, NewJob};

    fn message() -> JobMessage {
        JobMessage::for_job(&Job::from_new(NewJob::for_request(
            ContentRequest::new("topic"),
            "wf",
            1,
        )))
    }

    #[tokio::test]
    async fn test_enqueue_and_receive() {
        let (broker, receiver) = InMemoryJobBroker::new(4);
        let sent = message();
        broker.enqueue(sent.clone()).await.unwrap();
        assert_eq!(broker.pending(), 1);

        let received = receiver.lock().await.recv().await.unwrap();
        assert_eq!(received, sent);
    }

    #[tokio::test]
    async fn test_outage_and_backpressure() {
        let (broker, _receiver) = InMemoryJobBroker::new(1);

        broker.set_available(false);
        assert_eq!(broker.enqueue(message()).await, Err(BrokerError::Unavailable));

        broker.set_available(true);
        broker.enqueue(message()).await.unwrap();
        assert_eq!(
            broker.enqueue(message()).await,
            Err(BrokerError::QueueFull { capacity: 1 })
        );
    }

    #[tokio::test]
    async fn test_dropped_receiver_closes_broker() {
        let (broker, receiver) = InMemoryJobBroker::new(1);
        drop(receiver);
        assert!(!broker.is_available());
        assert_eq!(broker.enqueue(message()).await, Err(BrokerError::Unavailable));
    }
}
