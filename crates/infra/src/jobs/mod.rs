//! Background jobs: durable queue, retries with backoff, dead letters.
//!
//! Tenant provisioning, projection rebuilds and subscription sweeps all
//! run as jobs so they survive process restarts and failures get retried
//! instead of lost.

pub mod executor;
pub mod store;
pub mod types;

pub use executor::{ExecutorStats, JobExecutor, JobExecutorConfig, JobExecutorHandle, JobHandler};
pub use store::{InMemoryJobStore, JobStats, JobStore, JobStoreError};
pub use types::{
    BackoffStrategy, DeadLetterEntry, Job, JobAttemptRecord, JobId, JobKind, JobResult, JobStatus,
    RetryPolicy,
};
