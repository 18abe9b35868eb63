// Worker definition: the trait-object abstraction behind the name-keyed registry.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::job::Job;

/// What the Isolation Pool needs to instantiate a context for a worker that
/// opts into isolation: the path identifying its handler entry point, plus
/// optional engine-specific resource limits (opaque to the core).
#[derive(Debug, Clone)]
pub struct IsolationSpec {
    pub worker_path: String,
    pub resource_limits: Option<Value>,
}

/// The four-variant result a handler produces. A handler that returns
/// nothing is equivalent to `Ok(None)`; a handler that panics is mapped to
/// `Error` at the executor boundary (see `application::lifecycle`).
#[derive(Debug, Clone)]
pub enum WorkerOutcome {
    Ok(Option<Value>),
    Error(String),
    Cancel(String),
    Snooze(u64),
}

/// A named handler plus its default options. Implementations are registered
/// into a `WorkerRegistry` behind an `Arc<dyn Worker>` and may be looked up
/// by name from any queue's dispatcher.
#[async_trait]
pub trait Worker: Send + Sync {
    fn name(&self) -> &str;

    async fn perform(&self, job: &Job) -> WorkerOutcome;

    fn queue(&self) -> &str {
        "default"
    }

    fn max_attempts(&self) -> i32 {
        20
    }

    fn priority(&self) -> i32 {
        0
    }

    /// Default 60s per the lifecycle executor's timeout race.
    fn timeout(&self) -> Duration {
        Duration::from_secs(60)
    }

    /// `None` defers to the default backoff formula.
    fn backoff(&self, _job: &Job) -> Option<Duration> {
        None
    }

    /// `Some` routes this worker's jobs through the Isolation Pool.
    fn isolation(&self) -> Option<IsolationSpec> {
        None
    }
}
