//! Filtering, sorting and pagination for job listings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::models::{Job, JobPriority};
use crate::state_machine::JobStatus;

/// Listing filter; unset fields match everything
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub user_id: Option<String>,
    pub project_id: Option<String>,
    pub job_type: Option<String>,
    pub workflow_id: Option<String>,
    pub priority: Option<JobPriority>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

impl JobFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn for_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_job_type(mut self, job_type: impl Into<String>) -> Self {
        self.job_type = Some(job_type.into());
        self
    }

    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn created_between(mut self, after: DateTime<Utc>, before: DateTime<Utc>) -> Self {
        self.created_after = Some(after);
        self.created_before = Some(before);
        self
    }

    pub fn matches(&self, job: &Job) -> bool {
        self.status.is_none_or(|status| job.status == status)
            && self
                .user_id
                .as_deref()
                .is_none_or(|user| job.user_id.as_deref() == Some(user))
            && self
                .project_id
                .as_deref()
                .is_none_or(|project| job.project_id.as_deref() == Some(project))
            && self.job_type.as_deref().is_none_or(|t| job.job_type == t)
            && self
                .workflow_id
                .as_deref()
                .is_none_or(|id| job.workflow_id == id)
            && self.priority.is_none_or(|p| job.priority == p)
            && self.created_after.is_none_or(|after| job.created_at >= after)
            && self.created_before.is_none_or(|before| job.created_at < before)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobSortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Priority,
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

/// Sort order for listings; defaults to newest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobSort {
    pub field: JobSortField,
    pub direction: SortDirection,
}

impl JobSort {
    pub fn new(field: JobSortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    /// Total order: the sort key, then creation time, then id
    pub fn compare(&self, a: &Job, b: &Job) -> Ordering {
        let primary = match self.field {
            JobSortField::CreatedAt => a.created_at.cmp(&b.created_at),
            JobSortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            JobSortField::Priority => a.priority.cmp(&b.priority),
            JobSortField::Status => a.status.as_str().cmp(b.status.as_str()),
        };
        let ordering = primary
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id));

        match self.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

/// Page-based pagination parameters
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pagination {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl Pagination {
    /// Create pagination with page number (1-indexed) and per-page count
    pub fn new(page: u32, per_page: u32) -> Self {
        let offset = if page > 0 { Some((page - 1) * per_page) } else { None };
        Self {
            limit: Some(per_page),
            offset,
        }
    }

    /// Create pagination with only limit
    pub fn limit_only(limit: u32) -> Self {
        Self {
            limit: Some(limit),
            offset: None,
        }
    }

    /// No limit and no offset
    pub fn all() -> Self {
        Self::default()
    }

    /// Fill a missing limit with `default` and cap it at `max`
    pub fn bounded(&self, default: u32, max: u32) -> Self {
        Self {
            limit: Some(self.limit.unwrap_or(default).clamp(1, max)),
            offset: self.offset,
        }
    }

    /// Calculate total pages given a total count
    pub fn total_pages(&self, total_count: u32) -> u32 {
        match self.limit {
            Some(limit) if limit > 0 => total_count.div_ceil(limit),
            _ => 1,
        }
    }

    /// Get current page number (1-indexed)
    pub fn current_page(&self) -> u32 {
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) if limit > 0 => (offset / limit) + 1,
            _ => 1,
        }
    }

    /// Check if there's a next page
    pub fn has_next_page(&self, total_count: u32) -> bool {
        match self.limit {
            Some(limit) => self.offset.unwrap_or(0) + limit < total_count,
            None => false,
        }
    }

    /// Check if there's a previous page
    pub fn has_previous_page(&self) -> bool {
        self.offset.is_some_and(|offset| offset > 0)
    }

    /// Slice one page out of an already sorted list
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let offset = self.offset.unwrap_or(0) as usize;
        let iter = items.into_iter().skip(offset);
        match self.limit {
            Some(limit) => iter.take(limit as usize).collect(),
            None => iter.collect(),
        }
    }
}

/// One page of a job listing
#[derive(Debug, Clone, Serialize)]
pub struct JobPage {
    pub jobs: Vec<Job>,
    pub total_count: u32,
    pub page: u32,
    pub per_page: Option<u32>,
    pub total_pages: u32,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

impl JobPage {
    pub fn new(jobs: Vec<Job>, total_count: u32, pagination: &Pagination) -> Self {
        Self {
            jobs,
            total_count,
            page: pagination.current_page(),
            per_page: pagination.limit,
            total_pages: pagination.total_pages(total_count),
            has_next_page: pagination.has_next_page(total_count),
            has_previous_page: pagination.has_previous_page(),
        }
    }
}

/// Aggregate counts over jobs, optionally scoped to one user
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct JobStatistics {
    pub total: usize,
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Jobs retried at least once
    pub retried: usize,
    pub average_processing_time_ms: Option<u64>,
    /// Completed share of finished jobs
    pub success_rate: Option<f64>,
}

impl JobStatistics {
    pub fn from_jobs<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Self {
        let mut stats = Self::default();
        let mut processing_total: u64 = 0;
        let mut processing_samples: u64 = 0;

        for job in jobs {
            stats.total += 1;
            match job.status {
                JobStatus::Queued => stats.queued += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
            if job.retry_count > 0 {
                stats.retried += 1;
            }
            if let Some(ms) = job.processing_time_ms {
                processing_total += ms;
                processing_samples += 1;
            }
        }

        if processing_samples > 0 {
            stats.average_processing_time_ms = Some(processing_total / processing_samples);
        }

        let finished = stats.completed + stats.failed + stats.cancelled;
        if finished > 0 {
            stats.success_rate = Some(stats.completed as f64 / finished as f64);
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_based_pagination() {
        let pagination = Pagination::new(2, 10);
        assert_eq!(pagination.limit, Some(10));
        assert_eq!(pagination.offset, Some(10));
        assert_eq!(pagination.current_page(), 2);
        assert!(pagination.has_previous_page());
        assert!(pagination.has_next_page(21));
        assert!(!pagination.has_next_page(20));
        assert_eq!(pagination.total_pages(21), 3);
    }

    #[test]
    fn test_apply_slices_items() {
        let items: Vec<u32> = (0..25).collect();
        assert_eq!(Pagination::new(3, 10).apply(items.clone()), (20..25).collect::<Vec<_>>());
        assert_eq!(Pagination::all().apply(items.clone()).len(), 25);
        assert!(Pagination::new(4, 10).apply(items).is_empty());
    }

    #[test]
    fn test_bounded_fills_and_caps_limit() {
        assert_eq!(Pagination::all().bounded(20, 100).limit, Some(20));
        assert_eq!(Pagination::limit_only(500).bounded(20, 100).limit, Some(100));
        assert_eq!(Pagination::new(2, 5).bounded(20, 100), Pagination::new(2, 5));
    }
}
