//! # Jobs
//!
//! Job records, their guarded lifecycle, and listing queries.

pub mod query;
pub mod repository;
pub mod store;
pub mod sweeper;

pub use query::{JobFilter, JobPage, JobSort, JobSortField, JobStatistics, Pagination, SortDirection};
pub use repository::{InMemoryJobRepository, JobRepository};
pub use store::JobStore;
pub use sweeper::spawn_cleanup_sweeper;
