// Lifecycle Executor: runs a single claimed job and persists its outcome.
// Panic-isolated via `tokio::task::spawn` + `JoinHandle`, with a 4-outcome
// `WorkerOutcome` match (ok/retryable error/discard/cancel) raced against a
// per-worker timeout.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{error, info, warn};

use crate::application::backoff::standard_backoff;
use crate::application::isolation_pool::IsolationPool;
use crate::application::telemetry::{TelemetryBus, TelemetryEvent};
use crate::domain::job::{ErrorRecord, Job, JobState};
use crate::domain::registry::WorkerRegistry;
use crate::domain::worker::WorkerOutcome;
use crate::error::Result;
use crate::port::storage_adapter::JobPatch;
use crate::port::{StorageAdapter, TimeProvider};

pub struct LifecycleExecutor {
    adapter: Arc<dyn StorageAdapter>,
    registry: Arc<WorkerRegistry>,
    telemetry: Arc<TelemetryBus>,
    time: Arc<dyn TimeProvider>,
    isolation_pool: Arc<IsolationPool>,
}

impl LifecycleExecutor {
    pub fn new(
        adapter: Arc<dyn StorageAdapter>,
        registry: Arc<WorkerRegistry>,
        telemetry: Arc<TelemetryBus>,
        time: Arc<dyn TimeProvider>,
        isolation_pool: Arc<IsolationPool>,
    ) -> Self {
        Self {
            adapter,
            registry,
            telemetry,
            time,
            isolation_pool,
        }
    }

    /// Runs `job` (already claimed: `state = executing`) to completion and
    /// persists the resulting state transition. Never returns an `Err` that
    /// should stop the caller: a database failure at the final persist step
    /// is logged and swallowed, leaving the row for the Rescuer to recover.
    pub async fn run_one(&self, job: Job) {
        let now = self.time.now();
        self.telemetry.emit(
            TelemetryEvent::new("job:start", now)
                .with_fields(json!({"job_id": job.id, "queue": job.queue, "worker": job.worker})),
        );

        let worker = self.registry.get(&job.worker);
        let outcome = match &worker {
            None => WorkerOutcome::Error(format!("worker {} not registered", job.worker)),
            Some(worker) => {
                let timeout = worker.timeout();
                if let Some(isolation) = worker.isolation() {
                    self.telemetry.emit(
                        TelemetryEvent::new("job:isolated:start", self.time.now())
                            .with_fields(json!({"job_id": job.id})),
                    );
                    self.isolation_pool
                        .run(&job, &isolation.worker_path, timeout)
                        .await
                } else {
                    self.run_local(Arc::clone(worker), job.clone(), timeout).await
                }
            }
        };

        if let Err(e) = self.apply_outcome(&job, outcome).await {
            error!(job_id = job.id, error = %e, "failed to persist job outcome; leaving for rescuer");
        }
    }

    /// Races the handler against `timeout`; on elapse the `JoinHandle` is
    /// dropped rather than aborted, since non-isolated handlers have no
    /// external process to kill. A panicking handler is caught by the
    /// `JoinHandle`'s `Err` result rather than unwinding the caller.
    async fn run_local(
        &self,
        worker: Arc<dyn crate::domain::worker::Worker>,
        job: Job,
        timeout: Duration,
    ) -> WorkerOutcome {
        let handle = tokio::task::spawn(async move { worker.perform(&job).await });

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_err)) => {
                if join_err.is_panic() {
                    warn!("worker task panicked");
                    WorkerOutcome::Error("worker task panicked".to_string())
                } else {
                    WorkerOutcome::Error("worker task cancelled".to_string())
                }
            }
            Err(_) => WorkerOutcome::Error(format!("timed out after {}ms", timeout.as_millis())),
        }
    }

    async fn apply_outcome(&self, job: &Job, outcome: WorkerOutcome) -> Result<()> {
        let now = self.time.now();
        let patch = match outcome {
            WorkerOutcome::Ok(value) => {
                self.telemetry.emit(
                    TelemetryEvent::new("job:complete", now)
                        .with_fields(json!({"job_id": job.id, "result": value})),
                );
                JobPatch::default().state(JobState::Completed).completed_at(now)
            }
            WorkerOutcome::Error(message) => {
                let mut errors = job.errors.clone();
                errors.push(ErrorRecord::new(now, job.attempt, message.clone()));
                let terminal = job.attempt >= job.max_attempts;
                let patch = if terminal {
                    JobPatch::default()
                        .state(JobState::Discarded)
                        .discarded_at(now)
                        .errors(errors)
                } else {
                    let worker = self.registry.get(&job.worker);
                    let delay = worker
                        .as_ref()
                        .and_then(|w| w.backoff(job))
                        .unwrap_or_else(|| standard_backoff(job.attempt));
                    JobPatch::default()
                        .state(JobState::Retryable)
                        .scheduled_at(now + chrono::Duration::from_std(delay).unwrap_or_default())
                        .errors(errors)
                };
                self.telemetry.emit(
                    TelemetryEvent::new("job:error", now).with_fields(
                        json!({"job_id": job.id, "error": message, "terminal": terminal}),
                    ),
                );
                patch
            }
            WorkerOutcome::Cancel(reason) => {
                let mut errors = job.errors.clone();
                errors.push(ErrorRecord::new(now, job.attempt, reason.clone()));
                self.telemetry.emit(
                    TelemetryEvent::new("job:cancel", now)
                        .with_fields(json!({"job_id": job.id, "reason": reason})),
                );
                JobPatch::default()
                    .state(JobState::Cancelled)
                    .cancelled_at(now)
                    .errors(errors)
            }
            WorkerOutcome::Snooze(seconds) => {
                let mut meta = job.meta.clone();
                if let Some(obj) = meta.as_object_mut() {
                    obj.insert("snoozedAt".to_string(), json!(now));
                }
                self.telemetry.emit(
                    TelemetryEvent::new("job:snooze", now)
                        .with_fields(json!({"job_id": job.id, "seconds": seconds})),
                );
                JobPatch::default()
                    .state(JobState::Scheduled)
                    .scheduled_at(now + chrono::Duration::seconds(seconds as i64))
                    .meta(meta)
            }
        };

        self.adapter.update_job(job.id, patch).await?;
        Ok(())
    }
}

impl JobPatch {
    fn completed_at(mut self, at: chrono::DateTime<chrono::Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }
    fn discarded_at(mut self, at: chrono::DateTime<chrono::Utc>) -> Self {
        self.discarded_at = Some(at);
        self
    }
    fn cancelled_at(mut self, at: chrono::DateTime<chrono::Utc>) -> Self {
        self.cancelled_at = Some(at);
        self
    }
    fn scheduled_at(mut self, at: chrono::DateTime<chrono::Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }
    fn errors(mut self, errors: Vec<ErrorRecord>) -> Self {
        self.errors = Some(errors);
        self
    }
    fn meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::worker::Worker;
    use crate::domain::Job as DomainJob;
    use crate::domain::WorkerRegistry;
    use crate::port::time_provider::SystemTimeProvider;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct FlakyWorker {
        fail_until_attempt: i32,
    }

    #[async_trait]
    impl Worker for FlakyWorker {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn perform(&self, job: &DomainJob) -> WorkerOutcome {
            if job.attempt < self.fail_until_attempt {
                WorkerOutcome::Error("temp".to_string())
            } else {
                WorkerOutcome::Ok(None)
            }
        }
    }

    // A worker that fails on attempts 1-2 and succeeds on attempt 3.
    #[tokio::test]
    async fn flaky_worker_eventually_succeeds() {
        let worker = FlakyWorker { fail_until_attempt: 2 };
        let mut job = DomainJob::new_test(1, "default", "flaky");
        job.attempt = 2;
        let outcome = worker.perform(&job).await;
        assert!(matches!(outcome, WorkerOutcome::Ok(None)));
    }

    #[test]
    fn registry_lookup_returns_registered_worker_timeout() {
        let registry = WorkerRegistry::new();
        registry.register(Arc::new(FlakyWorker { fail_until_attempt: 0 }));
        let worker = registry.get("flaky").unwrap();
        assert_eq!(worker.timeout(), Duration::from_secs(60));
        let _ = SystemTimeProvider;
    }
}
