// Isolation Context port: the capability an Isolation Pool
// context offers — accept one serialized job, run it, return an outcome or a
// forced-termination signal.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::job::Job;
use crate::domain::worker::WorkerOutcome;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("spawn failed: {0}")]
    SpawnFailed(String),

    #[error("context exited with code {0:?}")]
    ExitedUnexpectedly(Option<i32>),

    #[error("isolated job timed out after {0}ms")]
    TimedOut(u64),

    #[error("no available worker contexts")]
    NoAvailableContexts,

    #[error("IO error: {0}")]
    Io(String),
}

/// A single execution context (an OS subprocess in the production
/// implementation). Contexts do not share mutable state with the
/// dispatcher; every call crosses a serialization boundary.
#[async_trait]
pub trait IsolationContext: Send + Sync {
    /// Serializes `job`, sends it to the context for execution by the
    /// handler at `worker_path`, and races the round-trip against `timeout`.
    /// On elapse the context MUST be forcibly terminated, not awaited.
    async fn execute(
        &self,
        job: &Job,
        worker_path: &str,
        timeout: Duration,
    ) -> Result<WorkerOutcome, ExecutionError>;

    /// Forcibly terminates the context (SIGTERM-then-SIGKILL or platform
    /// equivalent); does not wait for graceful exit.
    async fn terminate(&self);

    /// Whether the context is still usable for another job.
    fn is_alive(&self) -> bool;
}

/// Creates fresh `IsolationContext`s on demand, up to the pool's
/// `maxContexts`. A factory implementation owns the mechanism (subprocess,
/// thread, sub-interpreter) and is otherwise stateless.
#[async_trait]
pub trait IsolationContextFactory: Send + Sync {
    async fn spawn(&self) -> Result<std::sync::Arc<dyn IsolationContext>, ExecutionError>;
}

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// The isolation boundary's outcome space, as a four-way split for tests.
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        Outcome(WorkerOutcome),
        Panic(String),
        TimesOut,
        ExitsUnexpectedly(Option<i32>),
    }

    pub struct MockIsolationContext {
        behavior: Mutex<MockBehavior>,
        call_count: Mutex<usize>,
        alive: Mutex<bool>,
    }

    impl MockIsolationContext {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior: Mutex::new(behavior),
                call_count: Mutex::new(0),
                alive: Mutex::new(true),
            }
        }

        pub fn call_count(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl IsolationContext for MockIsolationContext {
        async fn execute(
            &self,
            _job: &Job,
            _worker_path: &str,
            _timeout: Duration,
        ) -> Result<WorkerOutcome, ExecutionError> {
            *self.call_count.lock().unwrap() += 1;
            match self.behavior.lock().unwrap().clone() {
                MockBehavior::Outcome(outcome) => Ok(outcome),
                MockBehavior::Panic(msg) => panic!("{}", msg),
                MockBehavior::TimesOut => {
                    *self.alive.lock().unwrap() = false;
                    Err(ExecutionError::TimedOut(_timeout.as_millis() as u64))
                }
                MockBehavior::ExitsUnexpectedly(code) => {
                    *self.alive.lock().unwrap() = false;
                    Err(ExecutionError::ExitedUnexpectedly(code))
                }
            }
        }

        async fn terminate(&self) {
            *self.alive.lock().unwrap() = false;
        }

        fn is_alive(&self) -> bool {
            *self.alive.lock().unwrap()
        }
    }

    pub struct MockIsolationContextFactory {
        behavior: MockBehavior,
    }

    impl MockIsolationContextFactory {
        pub fn new(behavior: MockBehavior) -> Self {
            Self { behavior }
        }
    }

    #[async_trait]
    impl IsolationContextFactory for MockIsolationContextFactory {
        async fn spawn(&self) -> Result<Arc<dyn IsolationContext>, ExecutionError> {
            Ok(Arc::new(MockIsolationContext::new(self.behavior.clone())))
        }
    }
}
