//! Storage seam for job records.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use super::query::{JobFilter, JobSort, Pagination};
use crate::error::{OrchestrationError, OrchestrationResult};
use crate::models::Job;

/// Persistence backend for jobs: CRUD plus filter/sort/paginate
#[async_trait]
pub trait JobRepository: Send + Sync + 'static {
    async fn insert(&self, job: Job) -> OrchestrationResult<()>;

    /// Overwrite an existing job record
    async fn save(&self, job: Job) -> OrchestrationResult<()>;

    async fn get(&self, id: Uuid) -> OrchestrationResult<Option<Job>>;

    async fn delete(&self, id: Uuid) -> OrchestrationResult<bool>;

    /// One sorted page of matching jobs plus the total match count
    async fn find(
        &self,
        filter: &JobFilter,
        sort: JobSort,
        pagination: &Pagination,
    ) -> OrchestrationResult<(Vec<Job>, u32)>;
}

#[derive(Debug, Default)]
pub struct InMemoryJobRepository {
    jobs: DashMap<Uuid, Job>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn insert(&self, job: Job) -> OrchestrationResult<()> {
        match self.jobs.entry(job.id) {
            Entry::Occupied(_) => Err(OrchestrationError::Persistence(format!(
                "job {} already exists",
                job.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(job);
                Ok(())
            }
        }
    }

    async fn save(&self, job: Job) -> OrchestrationResult<()> {
        match self.jobs.get_mut(&job.id) {
            Some(mut existing) => {
                *existing = job;
                Ok(())
            }
            None => Err(OrchestrationError::job_not_found(job.id)),
        }
    }

    async fn get(&self, id: Uuid) -> OrchestrationResult<Option<Job>> {
        Ok(self.jobs.get(&id).map(|job| job.clone()))
    }

    async fn delete(&self, id: Uuid) -> OrchestrationResult<bool> {
        Ok(self.jobs.remove(&id).is_some())
    }

    async fn find(
        &self,
        filter: &JobFilter,
        sort: JobSort,
        pagination: &Pagination,
    ) -> OrchestrationResult<(Vec<Job>, u32)> {
        let mut matching: Vec<Job> = self
            .jobs
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();

        matching.sort_by(|a, b| sort.compare(a, b));
        let total = matching.len() as u32;
        Ok((pagination.apply(matching), total))
    }
}
