// Queue Dispatcher: one instance per configured queue in
// this process, bounded-concurrency polling against the Storage Adapter's
// fetch-and-claim operation. Built from a `tokio::sync::watch`-based shutdown
// (`application::shutdown`), a `tokio::task::JoinSet` for in-flight tracking,
// and a `tokio::time::interval` poll loop raced against a second wake source
// for `Notify()`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::error;

use crate::application::lifecycle::LifecycleExecutor;
use crate::application::shutdown::ShutdownToken;
use crate::application::telemetry::{TelemetryBus, TelemetryEvent};
use crate::domain::queue::QueueConfig;
use crate::port::{StorageAdapter, TimeProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Stopped,
    Running,
    Paused,
}

/// One instance per configured queue. `limit` and `paused` are mutated in
/// place by `scale`/`pause`/`resume` and read fresh on every tick; a job
/// already running when the limit shrinks is never interrupted.
pub struct QueueDispatcher {
    config_name: String,
    limit: AtomicUsize,
    poll_interval: Duration,
    paused: AtomicBool,
    state: std::sync::Mutex<DispatcherState>,
    adapter: Arc<dyn StorageAdapter>,
    executor: Arc<LifecycleExecutor>,
    telemetry: Arc<TelemetryBus>,
    time: Arc<dyn TimeProvider>,
    wake: Arc<Notify>,
}

impl QueueDispatcher {
    pub fn new(
        config: QueueConfig,
        adapter: Arc<dyn StorageAdapter>,
        executor: Arc<LifecycleExecutor>,
        telemetry: Arc<TelemetryBus>,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            config_name: config.name,
            limit: AtomicUsize::new(config.limit),
            poll_interval: config.poll_interval,
            paused: AtomicBool::new(config.paused),
            state: std::sync::Mutex::new(DispatcherState::Stopped),
            adapter,
            executor,
            telemetry,
            time,
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.config_name
    }

    pub fn state(&self) -> DispatcherState {
        *self.state.lock().expect("dispatcher state lock poisoned")
    }

    pub fn limit(&self) -> usize {
        self.limit.load(Ordering::SeqCst)
    }

    /// `scale(newLimit)`: mutates the limit in place; jobs already running
    /// continue, the new limit takes effect on the next tick.
    pub fn scale(&self, new_limit: usize) {
        self.limit.store(new_limit, Ordering::SeqCst);
    }

    /// An external `Notify(queue)` call (or the Stager's post-stage
    /// broadcast) wakes the poll loop between ticks.
    pub fn wake_now(&self) {
        self.wake.notify_one();
    }

    fn set_state(&self, state: DispatcherState) {
        *self.state.lock().expect("dispatcher state lock poisoned") = state;
    }

    /// `stopped -> running` (or `-> paused` if configured paused); emits
    /// `queue:start`. Runs the poll loop until `shutdown` fires.
    pub async fn run(&self, mut shutdown: ShutdownToken) {
        let initial = if self.paused.load(Ordering::SeqCst) {
            DispatcherState::Paused
        } else {
            DispatcherState::Running
        };
        self.set_state(initial);
        self.emit("queue:start");

        let mut inflight = JoinSet::new();
        let mut tick = tokio::time::interval(self.poll_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = self.wake.notified() => {}
                _ = shutdown.wait() => break,
                Some(_) = inflight.join_next(), if !inflight.is_empty() => continue,
            }

            if self.state() != DispatcherState::Running {
                continue;
            }

            if let Err(e) = self.poll_once(&mut inflight).await {
                error!(queue = %self.config_name, error = %e, "dispatcher fetch failed; will retry next tick");
            }
        }

        self.set_state(DispatcherState::Stopped);
        self.emit("queue:stop");
        while inflight.join_next().await.is_some() {}
    }

    /// One tick: compute spare capacity, fetch that many claimed rows, and
    /// start an execution per row in fetch order. Execution completion
    /// order is not guaranteed; start order matches fetch order.
    async fn poll_once(&self, inflight: &mut JoinSet<()>) -> crate::error::Result<()> {
        let limit = self.limit.load(Ordering::SeqCst);
        let spare = limit.saturating_sub(inflight.len());
        if spare == 0 {
            return Ok(());
        }

        let jobs = self.adapter.fetch_jobs(&self.config_name, spare).await?;
        for job in jobs {
            let executor = Arc::clone(&self.executor);
            inflight.spawn(async move {
                executor.run_one(job).await;
            });
        }
        Ok(())
    }

    /// `running -> paused`; does not interrupt in-flight jobs.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        self.set_state(DispatcherState::Paused);
        self.emit("queue:pause");
    }

    /// `paused -> running`; re-arms the poll loop immediately.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.set_state(DispatcherState::Running);
        self.wake_now();
        self.emit("queue:resume");
    }

    fn emit(&self, event: &str) {
        self.telemetry.emit(
            TelemetryEvent::new(event.to_string(), self.time.now())
                .with_fields(json!({"queue": self.config_name})),
        );
    }
}

/// Status snapshot returned by `Orchestrator::get_queue_status`.
#[derive(Debug, Clone)]
pub struct QueueStatus {
    pub name: String,
    pub state: DispatcherState,
    pub limit: usize,
}

impl QueueDispatcher {
    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            name: self.config_name.clone(),
            state: self.state(),
            limit: self.limit(),
        }
    }
}
