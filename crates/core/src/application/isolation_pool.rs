// Isolation Pool: a managed pool of separate execution
// contexts for CPU-bound or untrusted workers. Grounded on
// `infra-system/src/subprocess_executor.rs`'s timeout-race-then-forcible-
// terminate structure, generalized from "one executor, stateless" to "a pool
// of longer-lived contexts with idle reaping"; the reaping loop follows the
// same `tokio::time::interval` idiom as the Stager/Rescuer/Pruner plugins.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::application::shutdown::ShutdownToken;
use crate::application::telemetry::{TelemetryBus, TelemetryEvent};
use crate::domain::job::Job;
use crate::domain::worker::WorkerOutcome;
use crate::port::isolation_context::{ExecutionError, IsolationContext, IsolationContextFactory};

#[derive(Debug, Clone)]
pub struct IsolationPoolConfig {
    pub min_contexts: usize,
    pub max_contexts: usize,
    pub idle_timeout: Duration,
}

impl Default for IsolationPoolConfig {
    fn default() -> Self {
        Self {
            min_contexts: 0,
            max_contexts: 4,
            idle_timeout: Duration::from_millis(30_000),
        }
    }
}

struct Idle {
    context: Arc<dyn IsolationContext>,
    since: Instant,
}

pub struct IsolationPool {
    factory: Arc<dyn IsolationContextFactory>,
    telemetry: Arc<TelemetryBus>,
    config: IsolationPoolConfig,
    idle: Mutex<Vec<Idle>>,
    total: AtomicUsize,
    shutting_down: std::sync::atomic::AtomicBool,
}

impl IsolationPool {
    pub fn new(
        factory: Arc<dyn IsolationContextFactory>,
        telemetry: Arc<TelemetryBus>,
        config: IsolationPoolConfig,
    ) -> Self {
        Self {
            factory,
            telemetry,
            config,
            idle: Mutex::new(Vec::new()),
            total: AtomicUsize::new(0),
            shutting_down: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Runs `job` inside an isolation context, mapping every failure mode of
    /// the per-job protocol onto a `WorkerOutcome`
    /// the Lifecycle Executor can apply like any other outcome.
    pub async fn run(&self, job: &Job, worker_path: &str, timeout: Duration) -> WorkerOutcome {
        if self.shutting_down.load(Ordering::SeqCst) {
            return WorkerOutcome::Error("pool shutting down".to_string());
        }

        let context = match self.acquire().await {
            Some(ctx) => ctx,
            None => return WorkerOutcome::Error("no available worker contexts".to_string()),
        };

        match context.execute(job, worker_path, timeout).await {
            Ok(outcome) => {
                self.release(context).await;
                outcome
            }
            Err(ExecutionError::TimedOut(ms)) => {
                context.terminate().await;
                self.total.fetch_sub(1, Ordering::SeqCst);
                self.telemetry.emit(TelemetryEvent::new(
                    "job:isolated:timeout",
                    chrono::Utc::now(),
                ).with_fields(json!({"job_id": job.id, "timeout_ms": ms})));
                WorkerOutcome::Error(format!("isolated job timed out after {ms}ms"))
            }
            Err(ExecutionError::ExitedUnexpectedly(code)) => {
                self.total.fetch_sub(1, Ordering::SeqCst);
                WorkerOutcome::Error(format!(
                    "worker {} exited unexpectedly (code {:?})",
                    job.worker, code
                ))
            }
            Err(ExecutionError::NoAvailableContexts) => {
                WorkerOutcome::Error("no available worker contexts".to_string())
            }
            Err(e) => {
                self.total.fetch_sub(1, Ordering::SeqCst);
                WorkerOutcome::Error(e.to_string())
            }
        }
    }

    async fn acquire(&self) -> Option<Arc<dyn IsolationContext>> {
        {
            let mut idle = self.idle.lock().await;
            if let Some(pooled) = idle.pop() {
                return Some(pooled.context);
            }
        }
        if self.total.load(Ordering::SeqCst) >= self.config.max_contexts {
            return None;
        }
        match self.factory.spawn().await {
            Ok(ctx) => {
                self.total.fetch_add(1, Ordering::SeqCst);
                Some(ctx)
            }
            Err(e) => {
                warn!(error = %e, "failed to spawn isolation context");
                None
            }
        }
    }

    async fn release(&self, context: Arc<dyn IsolationContext>) {
        if !context.is_alive() {
            self.total.fetch_sub(1, Ordering::SeqCst);
            return;
        }
        self.idle.lock().await.push(Idle {
            context,
            since: Instant::now(),
        });
    }

    /// One sweep of the idle reaper: terminates contexts idle longer than
    /// `idle_timeout` as long as the total stays above `min_contexts`.
    pub async fn reap_idle(&self) {
        let mut idle = self.idle.lock().await;
        let min = self.config.min_contexts;
        let timeout = self.config.idle_timeout;
        let now = Instant::now();
        let mut kept = Vec::with_capacity(idle.len());
        for pooled in idle.drain(..) {
            let current_total = self.total.load(Ordering::SeqCst);
            if now.duration_since(pooled.since) > timeout && current_total > min {
                pooled.context.terminate().await;
                self.total.fetch_sub(1, Ordering::SeqCst);
            } else {
                kept.push(pooled);
            }
        }
        *idle = kept;
    }

    /// Drives the idle-reaper loop every `idle_timeout / 2`, matching the
    /// Stager/Rescuer/Pruner interval idiom, until `shutdown` fires.
    pub async fn run_reaper(&self, mut shutdown: ShutdownToken) {
        let period = (self.config.idle_timeout / 2).max(Duration::from_millis(1));
        let mut tick = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = tick.tick() => self.reap_idle().await,
                _ = shutdown.wait() => break,
            }
        }
    }

    /// Stops accepting work, resolves nothing pending (the caller already
    /// holds no in-flight handles at this layer — the Dispatcher races its
    /// own `stop(graceMs)`), and terminates every context, idle or not
    /// released back yet.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let mut idle = self.idle.lock().await;
        for pooled in idle.drain(..) {
            pooled.context.terminate().await;
        }
        info!("isolation pool shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::isolation_context::mocks::{MockBehavior, MockIsolationContextFactory};
    use crate::domain::Job as DomainJob;

    #[tokio::test]
    async fn run_returns_ok_outcome_and_recycles_context() {
        let factory = Arc::new(MockIsolationContextFactory::new(MockBehavior::Outcome(
            WorkerOutcome::Ok(None),
        )));
        let pool = IsolationPool::new(
            factory,
            Arc::new(TelemetryBus::new()),
            IsolationPoolConfig::default(),
        );
        let job = DomainJob::new_test(1, "default", "cpu_worker");
        let outcome = pool.run(&job, "workers/cpu.js", Duration::from_secs(1)).await;
        assert!(matches!(outcome, WorkerOutcome::Ok(None)));
        assert_eq!(pool.idle.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn timeout_terminates_context_and_reports_error() {
        let factory = Arc::new(MockIsolationContextFactory::new(MockBehavior::TimesOut));
        let pool = IsolationPool::new(
            factory,
            Arc::new(TelemetryBus::new()),
            IsolationPoolConfig::default(),
        );
        let job = DomainJob::new_test(1, "default", "cpu_worker");
        let outcome = pool.run(&job, "workers/cpu.js", Duration::from_millis(200)).await;
        match outcome {
            WorkerOutcome::Error(msg) => assert!(msg.contains("timed out")),
            other => panic!("expected error outcome, got {other:?}"),
        }
        assert_eq!(pool.total.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exhausted_pool_fails_job_without_spawning() {
        let factory = Arc::new(MockIsolationContextFactory::new(MockBehavior::Outcome(
            WorkerOutcome::Ok(None),
        )));
        let mut config = IsolationPoolConfig::default();
        config.max_contexts = 0;
        let pool = IsolationPool::new(factory, Arc::new(TelemetryBus::new()), config);
        let job = DomainJob::new_test(1, "default", "cpu_worker");
        let outcome = pool.run(&job, "workers/cpu.js", Duration::from_secs(1)).await;
        match outcome {
            WorkerOutcome::Error(msg) => assert_eq!(msg, "no available worker contexts"),
            other => panic!("expected error outcome, got {other:?}"),
        }
    }
}
