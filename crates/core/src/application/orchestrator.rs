// Orchestrator: composition root. Owns the public insert/getJob/cancel
// surface plus the Dispatchers + Stager + plugins + (optional) Listen
// install + Isolation Pool. Wires them in dependency order (time/id
// providers -> adapter -> pool-dependent services -> dispatchers -> plugins
// -> shutdown) as a reusable library type, so `daemon` is a thin composition
// shell around it rather than owning the wiring itself.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::application::dispatcher::{QueueDispatcher, QueueStatus};
use crate::application::isolation_pool::{IsolationPool, IsolationPoolConfig};
use crate::application::lifecycle::LifecycleExecutor;
use crate::application::plugins::{Plugin, Pruner, Rescuer, Stager};
use crate::application::shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
use crate::application::telemetry::{SubscriptionId, TelemetryBus, TelemetryEvent};
use crate::domain::job::{Job, JobId};
use crate::domain::queue::QueueConfig;
use crate::domain::registry::WorkerRegistry;
use crate::domain::unique::UniqueOptions;
use crate::domain::worker::Worker;
use crate::error::{AppError, Result};
use crate::port::isolation_context::IsolationContextFactory;
use crate::port::notify::NotifyListener;
use crate::port::storage_adapter::{CancelFilter, NewJob};
use crate::port::{IdProvider, StorageAdapter, TimeProvider};

/// `{queue?, maxAttempts?, priority?, scheduledAt?, tags?, meta?, unique?}`
/// insertion defaults: `queue` falls back to the worker's default then
/// `"default"`; `maxAttempts` defaults to 20; `priority` defaults to 0.
#[derive(Debug, Clone, Default)]
pub struct InsertOptions {
    pub queue: Option<String>,
    pub max_attempts: Option<i32>,
    pub priority: Option<i32>,
    pub scheduled_at: Option<chrono::DateTime<chrono::Utc>>,
    pub tags: Vec<String>,
    pub meta: Option<Value>,
    pub unique: Option<UniqueOptions>,
}

/// Result of `InsertWithResult`: the stored (or pre-existing) job plus
/// whether it was a uniqueness-conflict hit.
#[derive(Debug, Clone)]
pub struct InsertResult {
    pub job: Job,
    pub conflict: bool,
}

pub struct OrchestratorConfig {
    pub queues: Vec<QueueConfig>,
    pub isolation_pool: IsolationPoolConfig,
    pub stage_interval: Duration,
    pub rescue_interval: Duration,
    pub rescue_after: Duration,
    pub prune_interval: Duration,
    pub prune_max_age: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            queues: vec![QueueConfig::new("default", 10)],
            isolation_pool: IsolationPoolConfig::default(),
            stage_interval: crate::application::plugins::stager::DEFAULT_INTERVAL,
            rescue_interval: crate::application::plugins::rescuer::DEFAULT_INTERVAL,
            rescue_after: crate::application::plugins::rescuer::DEFAULT_RESCUE_AFTER,
            prune_interval: crate::application::plugins::pruner::DEFAULT_INTERVAL,
            prune_max_age: crate::application::plugins::pruner::DEFAULT_MAX_AGE,
        }
    }
}

struct Running {
    shutdown: ShutdownSender,
    handles: Vec<JoinHandle<()>>,
}

/// Composes queues + staging timer + plugins + listen; the public
/// insert/getJob/cancel surface. Process-wide singletons
/// (worker registry, telemetry bus, isolation pool) are owned here as
/// instance state, not statics, so tests can create and tear down
/// independent orchestrators.
pub struct Orchestrator {
    adapter: Arc<dyn StorageAdapter>,
    registry: Arc<WorkerRegistry>,
    telemetry: Arc<TelemetryBus>,
    time: Arc<dyn TimeProvider>,
    node_id: String,
    isolation_pool: Arc<IsolationPool>,
    executor: Arc<LifecycleExecutor>,
    dispatchers: HashMap<String, Arc<QueueDispatcher>>,
    notify: Option<Arc<dyn NotifyListener>>,
    config: OrchestratorConfig,
    running: std::sync::Mutex<Option<Running>>,
}

impl Orchestrator {
    pub fn new(
        adapter: Arc<dyn StorageAdapter>,
        isolation_factory: Arc<dyn IsolationContextFactory>,
        time: Arc<dyn TimeProvider>,
        id_provider: Arc<dyn IdProvider>,
        notify: Option<Arc<dyn NotifyListener>>,
        config: OrchestratorConfig,
    ) -> Self {
        let registry = Arc::new(WorkerRegistry::new());
        let telemetry = Arc::new(TelemetryBus::new());
        let isolation_pool = Arc::new(IsolationPool::new(
            isolation_factory,
            Arc::clone(&telemetry),
            config.isolation_pool.clone(),
        ));
        let executor = Arc::new(LifecycleExecutor::new(
            Arc::clone(&adapter),
            Arc::clone(&registry),
            Arc::clone(&telemetry),
            Arc::clone(&time),
            Arc::clone(&isolation_pool),
        ));

        let mut dispatchers = HashMap::new();
        for queue_config in &config.queues {
            let dispatcher = Arc::new(QueueDispatcher::new(
                queue_config.clone(),
                Arc::clone(&adapter),
                Arc::clone(&executor),
                Arc::clone(&telemetry),
                Arc::clone(&time),
            ));
            dispatchers.insert(queue_config.name.clone(), dispatcher);
        }

        Self {
            adapter,
            registry,
            telemetry,
            time,
            node_id: id_provider.generate_id(),
            isolation_pool,
            executor,
            dispatchers,
            notify,
            config,
            running: std::sync::Mutex::new(None),
        }
    }

    pub fn telemetry(&self) -> &Arc<TelemetryBus> {
        &self.telemetry
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Registers a worker into the process-wide table; safe before or
    /// after `start()`.
    pub fn register(&self, worker: Arc<dyn Worker>) {
        self.registry.register(worker);
    }

    pub async fn migrate(&self) -> Result<()> {
        self.adapter.migrate().await
    }

    /// `Insert` defaults: `queue` <- option ∨ worker default ∨ `"default"`;
    /// `max_attempts` <- option ∨ worker default ∨ 20; `priority` <- option
    /// ∨ worker default ∨ 0. The worker name is not required to be
    /// registered yet: workers may be registered before or after a job for
    /// them is inserted (or only in another process of a multi-process
    /// deployment), so the lookup here is best-effort for default values
    /// only. An unregistered worker is instead synthesized as an
    /// `error("worker X not registered")` outcome at dispatch time by
    /// `LifecycleExecutor::run_one`, consuming an attempt like any other
    /// failure.
    pub async fn insert(
        &self,
        worker_name: &str,
        args: Value,
        opts: InsertOptions,
    ) -> Result<Job> {
        Ok(self.insert_with_result(worker_name, args, opts).await?.job)
    }

    pub async fn insert_with_result(
        &self,
        worker_name: &str,
        args: Value,
        opts: InsertOptions,
    ) -> Result<InsertResult> {
        let worker = self.registry.get(worker_name);
        let now = self.time.now();

        let mut new_job = NewJob::new(worker_name, args, now);
        new_job.queue = opts
            .queue
            .or_else(|| worker.as_ref().map(|w| w.queue().to_string()))
            .unwrap_or_else(|| "default".to_string());
        new_job.max_attempts = opts
            .max_attempts
            .or_else(|| worker.as_ref().map(|w| w.max_attempts()))
            .unwrap_or(20);
        new_job.priority = opts
            .priority
            .or_else(|| worker.as_ref().map(|w| w.priority()))
            .unwrap_or(0);
        new_job.tags = opts.tags;
        if let Some(meta) = opts.meta {
            new_job.meta = meta;
        }
        if let Some(scheduled_at) = opts.scheduled_at {
            new_job.scheduled_at = scheduled_at;
        }

        if let Some(unique_opts) = &opts.unique {
            if let Some(existing) = self.adapter.check_unique(unique_opts, &new_job).await? {
                self.telemetry.emit(
                    TelemetryEvent::new("job:unique_conflict", now).with_fields(serde_json::json!({
                        "job_id": existing.id,
                        "worker": worker_name,
                    })),
                );
                return Ok(InsertResult {
                    job: existing,
                    conflict: true,
                });
            }
        }

        let job = self.adapter.insert_job(new_job).await?;
        if let Some(notify) = &self.notify {
            if let Err(e) = notify.notify(&job.queue).await {
                warn!(error = %e, "notify after insert failed; dispatcher will pick this up on next poll");
            }
        }
        if let Some(dispatcher) = self.dispatchers.get(&job.queue) {
            dispatcher.wake_now();
        }
        Ok(InsertResult {
            job,
            conflict: false,
        })
    }

    /// Inserts every job in `batch`, each independently (no shared
    /// transaction across rows; an adapter may choose to
    /// batch internally but the contract only requires per-row atomicity).
    pub async fn insert_all(
        &self,
        batch: Vec<(String, Value, InsertOptions)>,
    ) -> Result<Vec<Job>> {
        let mut out = Vec::with_capacity(batch.len());
        for (worker_name, args, opts) in batch {
            out.push(self.insert(&worker_name, args, opts).await?);
        }
        Ok(out)
    }

    pub async fn get_job(&self, id: JobId) -> Result<Option<Job>> {
        self.adapter.get_job(id).await
    }

    pub async fn cancel_jobs(&self, filter: CancelFilter) -> Result<u64> {
        self.adapter.cancel_jobs(filter).await
    }

    pub async fn prune_jobs(&self, max_age: Duration) -> Result<u64> {
        self.adapter.prune_jobs(max_age).await
    }

    pub async fn rescue_stuck_jobs(&self, after: Duration) -> Result<u64> {
        self.adapter.rescue_stuck_jobs(after).await
    }

    pub fn pause_queue(&self, name: &str) -> Result<()> {
        self.dispatcher(name)?.pause();
        Ok(())
    }

    pub fn resume_queue(&self, name: &str) -> Result<()> {
        self.dispatcher(name)?.resume();
        Ok(())
    }

    pub fn scale_queue(&self, name: &str, new_limit: usize) -> Result<()> {
        self.dispatcher(name)?.scale(new_limit);
        Ok(())
    }

    pub fn get_queue_status(&self, name: &str) -> Result<QueueStatus> {
        Ok(self.dispatcher(name)?.status())
    }

    pub fn get_all_queue_status(&self) -> Vec<QueueStatus> {
        self.dispatchers.values().map(|d| d.status()).collect()
    }

    fn dispatcher(&self, name: &str) -> Result<&Arc<QueueDispatcher>> {
        self.dispatchers
            .get(name)
            .ok_or_else(|| AppError::Config(format!("unknown queue: {name}")))
    }

    /// Subscribe to a specific event, or `"*"` for every event. Returns an
    /// unsubscribe handle.
    pub fn on(
        &self,
        event: &str,
        handler: impl Fn(&TelemetryEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        if event == "*" {
            self.telemetry.on_all(handler)
        } else {
            self.telemetry.on(event.to_string(), handler)
        }
    }

    /// Blocks until `queue_name` (or every queue, if `None`) has no more
    /// `available`/`scheduled`/`retryable` rows, re-staging and
    /// re-dispatching in a tight loop until the fetch returns nothing.
    pub async fn drain(&self, queue_name: Option<&str>) -> Result<()> {
        let names: Vec<String> = match queue_name {
            Some(n) => vec![n.to_string()],
            None => self.dispatchers.keys().cloned().collect(),
        };
        loop {
            self.adapter.stage_jobs().await?;
            let mut idle = true;
            for name in &names {
                let dispatcher = self.dispatcher(name)?;
                let remaining = self
                    .adapter
                    .fetch_jobs(name, dispatcher.limit().max(1))
                    .await?;
                if !remaining.is_empty() {
                    idle = false;
                    for job in remaining {
                        self.executor.run_one(job).await;
                    }
                }
            }
            if idle {
                return Ok(());
            }
        }
    }

    /// Validates plugins, constructs dispatchers (already built in `new`),
    /// starts the Stager (always), then every queue's dispatcher
    /// concurrently, installs the Listen callback if the adapter supports
    /// it, then starts the Rescuer and Pruner.
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().expect("orchestrator lock poisoned");
        if running.is_some() {
            return Err(AppError::Config("orchestrator already started".to_string()));
        }

        let dispatchers_for_stager = self.dispatchers.clone();
        let wake_all: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
            for dispatcher in dispatchers_for_stager.values() {
                dispatcher.wake_now();
            }
        });
        let stager = Arc::new(Stager::new(
            Arc::clone(&self.adapter),
            Arc::clone(&self.telemetry),
            Arc::clone(&self.time),
            self.config.stage_interval,
            wake_all,
        ));
        let rescuer = Arc::new(Rescuer::new(
            Arc::clone(&self.adapter),
            Arc::clone(&self.telemetry),
            Arc::clone(&self.time),
            self.config.rescue_interval,
            self.config.rescue_after,
        ));
        let pruner = Arc::new(Pruner::new(
            Arc::clone(&self.adapter),
            Arc::clone(&self.telemetry),
            Arc::clone(&self.time),
            self.config.prune_interval,
            self.config.prune_max_age,
        ));

        let plugins: Vec<Arc<dyn Plugin>> = vec![
            stager.clone() as Arc<dyn Plugin>,
            rescuer.clone() as Arc<dyn Plugin>,
            pruner.clone() as Arc<dyn Plugin>,
        ];
        let mut validation_errors = Vec::new();
        for plugin in &plugins {
            for error in plugin.validate() {
                validation_errors.push(format!("{}: {error}", plugin.name()));
            }
        }
        if !validation_errors.is_empty() {
            return Err(AppError::Config(format!(
                "plugin validation failed: {}",
                validation_errors.join("; ")
            )));
        }

        let (shutdown_tx, shutdown_rx) = shutdown_channel();
        let mut handles = Vec::new();

        if let Some(notify) = &self.notify {
            let dispatchers = self.dispatchers.clone();
            let notify = Arc::clone(notify);
            tokio::spawn(async move {
                let callback: Box<dyn Fn(String) + Send + Sync> = Box::new(move |queue: String| {
                    if let Some(dispatcher) = dispatchers.get(&queue) {
                        dispatcher.wake_now();
                    }
                });
                if let Err(e) = notify.listen(callback).await {
                    error!(error = %e, "notify listen failed to install");
                }
            });
        }

        handles.push(spawn_plugin(stager, shutdown_rx.clone()));

        for dispatcher in self.dispatchers.values() {
            let dispatcher = Arc::clone(dispatcher);
            let token = shutdown_rx.clone();
            handles.push(tokio::spawn(async move {
                dispatcher.run(token).await;
            }));
        }

        handles.push(spawn_plugin(rescuer, shutdown_rx.clone()));
        handles.push(spawn_plugin(pruner, shutdown_rx.clone()));

        let pool = Arc::clone(&self.isolation_pool);
        let token = shutdown_rx.clone();
        handles.push(tokio::spawn(async move {
            pool.run_reaper(token).await;
        }));

        info!(node_id = %self.node_id, "orchestrator started");
        *running = Some(Running {
            shutdown: shutdown_tx,
            handles,
        });
        Ok(())
    }

    /// `-> stopped` for every dispatcher: signals shutdown and waits for
    /// every spawned loop to return (each dispatcher races its own in-flight
    /// completions internally; the Orchestrator itself does not impose an
    /// additional grace period beyond the tasks returning).
    pub async fn stop(&self) -> Result<()> {
        let running = self.running.lock().expect("orchestrator lock poisoned").take();
        match running {
            Some(running) => {
                running.shutdown.shutdown();
                for handle in running.handles {
                    let _ = handle.await;
                }
                info!("orchestrator stopped");
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// `Stop` + isolation-pool shutdown + adapter close + registry clear.
    pub async fn shutdown(&self) -> Result<()> {
        self.stop().await?;
        self.isolation_pool.shutdown().await;
        self.adapter.close().await?;
        self.registry.clear();
        Ok(())
    }
}

fn spawn_plugin(plugin: Arc<dyn Plugin>, shutdown: ShutdownToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        plugin.run(shutdown).await;
    })
}
