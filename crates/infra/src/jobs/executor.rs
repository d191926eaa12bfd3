//! Polling job executor with retry and dead-letter handling.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use ventora_core::TenantId;

use super::store::JobStore;
use super::types::{Job, JobKind, JobResult, JobStatus};

pub type JobHandler = Box<dyn Fn(&Job) -> JobResult + Send + Sync>;

#[derive(Debug, Clone)]
pub struct JobExecutorConfig {
    pub poll_interval: Duration,
    pub name: String,
    /// Restrict the executor to one tenant's queue.
    pub tenant_id: Option<TenantId>,
}

impl Default for JobExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            name: "job-executor".to_string(),
            tenant_id: None,
        }
    }
}

impl JobExecutorConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ExecutorStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_dead_lettered: u64,
    pub uptime_secs: u64,
}

/// Handle to a spawned executor thread.
#[derive(Debug)]
pub struct JobExecutorHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<ExecutorStats>>,
}

impl JobExecutorHandle {
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }

    pub fn stats(&self) -> ExecutorStats {
        self.stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

/// Polls the store, routes claimed jobs to handlers, applies retry policy.
pub struct JobExecutor<S: JobStore> {
    store: S,
    handlers: HashMap<String, JobHandler>,
}

impl<S: JobStore + 'static> JobExecutor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
        }
    }

    /// Register a handler under a routing key.
    ///
    /// Keys match exactly, by `prefix.*` wildcard, or the catch-all `*`.
    pub fn register_handler<F>(&mut self, key: impl Into<String>, handler: F)
    where
        F: Fn(&Job) -> JobResult + Send + Sync + 'static,
    {
        self.handlers.insert(key.into(), Box::new(handler));
    }

    fn handler_for(&self, kind: &JobKind) -> Option<&JobHandler> {
        let key = kind.routing_key();
        if let Some(handler) = self.handlers.get(&key) {
            return Some(handler);
        }

        for (pattern, handler) in &self.handlers {
            if let Some(prefix) = pattern.strip_suffix(".*") {
                if key.starts_with(prefix) {
                    return Some(handler);
                }
            }
        }

        self.handlers.get("*")
    }

    pub fn spawn(self, config: JobExecutorConfig) -> std::io::Result<JobExecutorHandle>
    where
        S: Send,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(ExecutorStats::default()));
        let loop_stats = stats.clone();

        let name = config.name.clone();
        let join = thread::Builder::new()
            .name(name)
            .spawn(move || executor_loop(self, config, shutdown_rx, loop_stats))?;

        Ok(JobExecutorHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        })
    }

    /// Run one already-claimed job to a verdict. Synchronous path used by
    /// the loop and by tests.
    pub fn execute_one(&self, job: &mut Job) -> Result<(), String> {
        let Some(handler) = self.handler_for(&job.kind) else {
            let error = format!("no handler for job kind: {:?}", job.kind);
            warn!(job_id = %job.id, error = %error, "unroutable job");
            job.mark_failed(error.clone(), Utc::now());
            let _ = self.store.update(job);
            return Err(error);
        };

        let started = Utc::now();

        match handler(job) {
            JobResult::Success => {
                job.mark_completed(started);
                self.store.update(job).map_err(|e| e.to_string())?;
                debug!(job_id = %job.id, "job completed");
                Ok(())
            }
            JobResult::Failure(error) => {
                job.mark_failed(error.clone(), started);
                self.store.update(job).map_err(|e| e.to_string())?;

                if matches!(job.status, JobStatus::DeadLettered { .. }) {
                    warn!(job_id = %job.id, error = %error, "job dead-lettered");
                    let _ = self.store.dead_letter(job.clone(), error.clone());
                }

                Err(error)
            }
            JobResult::RetryNow => {
                job.mark_failed("retry requested".to_string(), started);
                job.scheduled_at = None;
                self.store.update(job).map_err(|e| e.to_string())?;
                Err("retry requested".to_string())
            }
            JobResult::RetryAfter(delay) => {
                job.mark_failed("retry after delay".to_string(), started);
                job.scheduled_at =
                    Some(Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default());
                self.store.update(job).map_err(|e| e.to_string())?;
                Err("retry after delay".to_string())
            }
        }
    }
}

fn executor_loop<S: JobStore + 'static>(
    executor: JobExecutor<S>,
    config: JobExecutorConfig,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<ExecutorStats>>,
) {
    info!(executor = %config.name, "job executor started");
    let start_time = Instant::now();

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        if let Ok(mut s) = stats.lock() {
            s.uptime_secs = start_time.elapsed().as_secs();
        }

        match executor.store.claim_next(config.tenant_id) {
            Ok(Some(mut job)) => {
                debug!(executor = %config.name, job_id = %job.id, kind = ?job.kind, "claimed job");

                let result = executor.execute_one(&mut job);

                if let Ok(mut s) = stats.lock() {
                    s.jobs_processed += 1;
                    match result {
                        Ok(()) => s.jobs_succeeded += 1,
                        Err(_) => {
                            s.jobs_failed += 1;
                            if matches!(job.status, JobStatus::DeadLettered { .. }) {
                                s.jobs_dead_lettered += 1;
                            }
                        }
                    }
                }
            }
            Ok(None) => thread::sleep(config.poll_interval),
            Err(error) => {
                error!(executor = %config.name, ?error, "failed to claim job");
                thread::sleep(config.poll_interval);
            }
        }
    }

    info!(executor = %config.name, "job executor stopped");
}

#[cfg(test)]
mod tests {
    use super::super::store::InMemoryJobStore;
    use super::super::types::RetryPolicy;
    use super::*;

    #[test]
    fn successful_job_completes() {
        let store = Arc::new(InMemoryJobStore::new());
        let mut executor = JobExecutor::new(store.clone());
        executor.register_handler("tenant.provisioning", |_job| JobResult::Success);

        let tenant = TenantId::new();
        store
            .enqueue(Job::new(
                tenant,
                JobKind::TenantProvisioning,
                serde_json::json!({}),
            ))
            .unwrap();

        let mut claimed = store.claim_next(Some(tenant)).unwrap().unwrap();
        executor.execute_one(&mut claimed).unwrap();
        assert!(matches!(claimed.status, JobStatus::Completed));
    }

    #[test]
    fn failures_back_off_then_dead_letter() {
        let store = Arc::new(InMemoryJobStore::new());
        let mut executor = JobExecutor::new(store.clone());
        executor.register_handler("tenant.provisioning", |_job| {
            JobResult::Failure("schema exists".to_string())
        });

        let tenant = TenantId::new();
        store
            .enqueue(
                Job::new(tenant, JobKind::TenantProvisioning, serde_json::json!({}))
                    .with_retry_policy(RetryPolicy {
                        max_attempts: 2,
                        ..Default::default()
                    }),
            )
            .unwrap();

        let mut claimed = store.claim_next(Some(tenant)).unwrap().unwrap();
        assert!(executor.execute_one(&mut claimed).is_err());
        assert!(matches!(claimed.status, JobStatus::Failed { .. }));

        // Skip the backoff window for the test.
        claimed.scheduled_at = None;
        store.update(&claimed).unwrap();

        let mut claimed = store.claim_next(Some(tenant)).unwrap().unwrap();
        assert!(executor.execute_one(&mut claimed).is_err());
        assert!(matches!(claimed.status, JobStatus::DeadLettered { .. }));
    }

    #[test]
    fn prefix_and_wildcard_routing() {
        let store = Arc::new(InMemoryJobStore::new());
        let mut executor = JobExecutor::new(store.clone());
        executor.register_handler("projection.rebuild.*", |_job| JobResult::Success);
        executor.register_handler("*", |_job| JobResult::Failure("fell through".to_string()));

        let tenant = TenantId::new();
        store
            .enqueue(Job::new(
                tenant,
                JobKind::projection_rebuild("sales.history"),
                serde_json::json!({}),
            ))
            .unwrap();
        store
            .enqueue(Job::new(
                tenant,
                JobKind::custom("something.else"),
                serde_json::json!({}),
            ))
            .unwrap();

        let mut first = store.claim_next(Some(tenant)).unwrap().unwrap();
        assert!(executor.execute_one(&mut first).is_ok());

        let mut second = store.claim_next(Some(tenant)).unwrap().unwrap();
        assert!(executor.execute_one(&mut second).is_err());
    }
}
