//! Job persistence.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;

use ventora_core::TenantId;

use super::types::{DeadLetterEntry, Job, JobId, JobKind, JobStatus};

#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("tenant isolation violation")]
    TenantIsolation,
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub dead_lettered: usize,
    pub cancelled: usize,
}

pub trait JobStore: Send + Sync {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError>;

    fn get(&self, tenant_id: TenantId, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    fn update(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Claim the oldest ready job, marking it running. `None` tenant claims
    /// across all tenants (platform workers).
    fn claim_next(&self, tenant_id: Option<TenantId>) -> Result<Option<Job>, JobStoreError>;

    fn list_by_status(
        &self,
        tenant_id: TenantId,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError>;

    fn list_by_kind(
        &self,
        tenant_id: TenantId,
        kind: &JobKind,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError>;

    fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError>;

    fn list_dead_letters(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> Result<Vec<DeadLetterEntry>, JobStoreError>;

    /// Move a dead-lettered job back to pending with a fresh attempt budget.
    fn retry_dead_letter(&self, tenant_id: TenantId, job_id: JobId) -> Result<Job, JobStoreError>;

    fn delete_dead_letter(&self, tenant_id: TenantId, job_id: JobId) -> Result<(), JobStoreError>;

    fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError>;
}

impl<S> JobStore for Arc<S>
where
    S: JobStore + ?Sized,
{
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        (**self).enqueue(job)
    }

    fn get(&self, tenant_id: TenantId, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(tenant_id, job_id)
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        (**self).update(job)
    }

    fn claim_next(&self, tenant_id: Option<TenantId>) -> Result<Option<Job>, JobStoreError> {
        (**self).claim_next(tenant_id)
    }

    fn list_by_status(
        &self,
        tenant_id: TenantId,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        (**self).list_by_status(tenant_id, status, limit)
    }

    fn list_by_kind(
        &self,
        tenant_id: TenantId,
        kind: &JobKind,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        (**self).list_by_kind(tenant_id, kind, limit)
    }

    fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError> {
        (**self).dead_letter(job, reason)
    }

    fn list_dead_letters(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        (**self).list_dead_letters(tenant_id, limit)
    }

    fn retry_dead_letter(&self, tenant_id: TenantId, job_id: JobId) -> Result<Job, JobStoreError> {
        (**self).retry_dead_letter(tenant_id, job_id)
    }

    fn delete_dead_letter(&self, tenant_id: TenantId, job_id: JobId) -> Result<(), JobStoreError> {
        (**self).delete_dead_letter(tenant_id, job_id)
    }

    fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError> {
        (**self).stats(tenant_id)
    }
}

/// In-memory store for tests and development.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    dead_letters: RwLock<HashMap<JobId, DeadLetterEntry>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn poisoned<T>(_: T) -> JobStoreError {
        JobStoreError::Storage("lock poisoned".to_string())
    }
}

impl JobStore for InMemoryJobStore {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(Self::poisoned)?;
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    fn get(&self, tenant_id: TenantId, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let jobs = self.jobs.read().map_err(Self::poisoned)?;
        match jobs.get(&job_id) {
            Some(job) if job.tenant_id == tenant_id => Ok(Some(job.clone())),
            Some(_) => Err(JobStoreError::TenantIsolation),
            None => Ok(None),
        }
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().map_err(Self::poisoned)?;
        if !jobs.contains_key(&job.id) {
            return Err(JobStoreError::NotFound(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    fn claim_next(&self, tenant_id: Option<TenantId>) -> Result<Option<Job>, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(Self::poisoned)?;

        // Oldest ready job first (FIFO per queue).
        let mut candidates: Vec<_> = jobs
            .values()
            .filter(|j| {
                matches!(j.status, JobStatus::Pending | JobStatus::Failed { .. })
                    && j.is_ready()
                    && tenant_id.is_none_or(|t| j.tenant_id == t)
            })
            .map(|j| (j.created_at, j.id))
            .collect();
        candidates.sort();

        if let Some((_, job_id)) = candidates.first() {
            if let Some(job) = jobs.get_mut(job_id) {
                job.mark_running();
                return Ok(Some(job.clone()));
            }
        }

        Ok(None)
    }

    fn list_by_status(
        &self,
        tenant_id: TenantId,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.jobs.read().map_err(Self::poisoned)?;
        let mut result: Vec<_> = jobs
            .values()
            .filter(|j| {
                j.tenant_id == tenant_id
                    && status.as_ref().is_none_or(|s| {
                        std::mem::discriminant(&j.status) == std::mem::discriminant(s)
                    })
            })
            .cloned()
            .collect();

        result.sort_by_key(|j| j.created_at);
        result.truncate(limit);
        Ok(result)
    }

    fn list_by_kind(
        &self,
        tenant_id: TenantId,
        kind: &JobKind,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.jobs.read().map_err(Self::poisoned)?;
        let mut result: Vec<_> = jobs
            .values()
            .filter(|j| j.tenant_id == tenant_id && &j.kind == kind)
            .cloned()
            .collect();

        result.sort_by_key(|j| j.created_at);
        result.truncate(limit);
        Ok(result)
    }

    fn dead_letter(&self, mut job: Job, reason: String) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().map_err(Self::poisoned)?;
        let mut dls = self.dead_letters.write().map_err(Self::poisoned)?;

        job.status = JobStatus::DeadLettered {
            error: reason.clone(),
            attempts: job.attempt,
        };
        job.updated_at = Utc::now();

        jobs.remove(&job.id);
        dls.insert(job.id, DeadLetterEntry::new(job, reason));
        Ok(())
    }

    fn list_dead_letters(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        let dls = self.dead_letters.read().map_err(Self::poisoned)?;
        let mut result: Vec<_> = dls
            .values()
            .filter(|e| e.job.tenant_id == tenant_id)
            .cloned()
            .collect();

        result.sort_by_key(|e| e.dead_lettered_at);
        result.truncate(limit);
        Ok(result)
    }

    fn retry_dead_letter(&self, tenant_id: TenantId, job_id: JobId) -> Result<Job, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(Self::poisoned)?;
        let mut dls = self.dead_letters.write().map_err(Self::poisoned)?;

        let entry = dls.get(&job_id).ok_or(JobStoreError::NotFound(job_id))?;
        if entry.job.tenant_id != tenant_id {
            return Err(JobStoreError::TenantIsolation);
        }

        let Some(entry) = dls.remove(&job_id) else {
            return Err(JobStoreError::NotFound(job_id));
        };
        let mut job = entry.job;
        job.status = JobStatus::Pending;
        job.attempt = 0;
        job.scheduled_at = None;
        job.updated_at = Utc::now();

        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    fn delete_dead_letter(&self, tenant_id: TenantId, job_id: JobId) -> Result<(), JobStoreError> {
        let mut dls = self.dead_letters.write().map_err(Self::poisoned)?;
        match dls.get(&job_id) {
            Some(entry) if entry.job.tenant_id == tenant_id => {
                dls.remove(&job_id);
                Ok(())
            }
            Some(_) => Err(JobStoreError::TenantIsolation),
            None => Err(JobStoreError::NotFound(job_id)),
        }
    }

    fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError> {
        let jobs = self.jobs.read().map_err(Self::poisoned)?;
        let dls = self.dead_letters.read().map_err(Self::poisoned)?;

        let mut stats = JobStats::default();
        for job in jobs.values().filter(|j| j.tenant_id == tenant_id) {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed { .. } => stats.failed += 1,
                JobStatus::DeadLettered { .. } => stats.dead_lettered += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats.dead_lettered += dls
            .values()
            .filter(|e| e.job.tenant_id == tenant_id)
            .count();

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::super::types::RetryPolicy;
    use super::*;

    #[test]
    fn claim_is_fifo_and_tenant_scoped() {
        let store = InMemoryJobStore::new();
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();

        let first = Job::new(tenant_a, JobKind::TenantProvisioning, serde_json::json!({}));
        let first_id = first.id;
        store.enqueue(first).unwrap();
        store
            .enqueue(Job::new(
                tenant_b,
                JobKind::TenantProvisioning,
                serde_json::json!({}),
            ))
            .unwrap();

        let claimed = store.claim_next(Some(tenant_a)).unwrap().unwrap();
        assert_eq!(claimed.id, first_id);
        assert_eq!(claimed.status, JobStatus::Running);

        // Nothing else pending for tenant A.
        assert!(store.claim_next(Some(tenant_a)).unwrap().is_none());
    }

    #[test]
    fn dead_letter_round_trip() {
        let store = InMemoryJobStore::new();
        let tenant_id = TenantId::new();

        let job = Job::new(
            tenant_id,
            JobKind::projection_rebuild("sales.history"),
            serde_json::json!({}),
        )
        .with_retry_policy(RetryPolicy::no_retry());
        let job_id = job.id;
        store.enqueue(job.clone()).unwrap();

        store.dead_letter(job, "handler panicked".to_string()).unwrap();
        assert_eq!(store.list_dead_letters(tenant_id, 10).unwrap().len(), 1);
        assert!(store.get(tenant_id, job_id).unwrap().is_none());

        let retried = store.retry_dead_letter(tenant_id, job_id).unwrap();
        assert_eq!(retried.status, JobStatus::Pending);
        assert_eq!(retried.attempt, 0);
        assert!(store.list_dead_letters(tenant_id, 10).unwrap().is_empty());
    }

    #[test]
    fn other_tenants_cannot_touch_dead_letters() {
        let store = InMemoryJobStore::new();
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();

        let job = Job::new(tenant_a, JobKind::SubscriptionSweep, serde_json::json!({}));
        let job_id = job.id;
        store.enqueue(job.clone()).unwrap();
        store.dead_letter(job, "sweep failed".to_string()).unwrap();

        assert!(matches!(
            store.retry_dead_letter(tenant_b, job_id),
            Err(JobStoreError::TenantIsolation)
        ));
        assert!(matches!(
            store.delete_dead_letter(tenant_b, job_id),
            Err(JobStoreError::TenantIsolation)
        ));
    }
}
