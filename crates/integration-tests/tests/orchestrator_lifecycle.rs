//! End-to-end coverage for `Orchestrator` wired to a real SQLite-backed
//! `StorageAdapter`: insert, dispatch, retry/backoff, cancel, and
//! uniqueness conflicts.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use semantica_core::application::orchestrator::{InsertOptions, Orchestrator, OrchestratorConfig};
use semantica_core::domain::job::{Job, JobState};
use semantica_core::domain::queue::QueueConfig;
use semantica_core::domain::unique::{UniqueOptions, UniquePeriod};
use semantica_core::domain::worker::{Worker, WorkerOutcome};
use semantica_core::port::id_provider::UuidProvider;
use semantica_core::port::isolation_context::mocks::{MockBehavior, MockIsolationContextFactory};
use semantica_core::port::storage_adapter::CancelFilter;
use semantica_core::port::time_provider::SystemTimeProvider;
use semantica_infra_sqlite::{create_pool, SqliteStorageAdapter};

struct AlwaysOkWorker;

#[async_trait]
impl Worker for AlwaysOkWorker {
    fn name(&self) -> &str {
        "always_ok"
    }

    async fn perform(&self, job: &Job) -> WorkerOutcome {
        WorkerOutcome::Ok(Some(job.args.clone()))
    }
}

struct AlwaysFailWorker {
    calls: AtomicUsize,
}

#[async_trait]
impl Worker for AlwaysFailWorker {
    fn name(&self) -> &str {
        "always_fail"
    }

    async fn perform(&self, _job: &Job) -> WorkerOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        WorkerOutcome::Error("boom".to_string())
    }

    fn max_attempts(&self) -> i32 {
        2
    }

    /// No real backoff delay, so `drain()` can converge without sleeping.
    fn backoff(&self, _job: &Job) -> Option<Duration> {
        Some(Duration::from_millis(0))
    }
}

async fn new_orchestrator() -> Orchestrator {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    let time = Arc::new(SystemTimeProvider);
    let adapter = Arc::new(SqliteStorageAdapter::new(pool, time.clone()));
    let isolation_factory = Arc::new(MockIsolationContextFactory::new(MockBehavior::Outcome(
        WorkerOutcome::Ok(None),
    )));
    let config = OrchestratorConfig {
        queues: vec![QueueConfig::new("default", 10)],
        ..Default::default()
    };
    let orchestrator = Orchestrator::new(
        adapter,
        isolation_factory,
        time,
        Arc::new(UuidProvider),
        None,
        config,
    );
    orchestrator.migrate().await.unwrap();
    orchestrator
}

#[tokio::test]
async fn insert_then_drain_completes_the_job() {
    let orchestrator = new_orchestrator().await;
    orchestrator.register(Arc::new(AlwaysOkWorker));

    let job = orchestrator
        .insert("always_ok", serde_json::json!({"n": 1}), InsertOptions::default())
        .await
        .unwrap();

    orchestrator.drain(None).await.unwrap();

    let fetched = orchestrator.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(fetched.state, JobState::Completed);
    assert!(fetched.completed_at.is_some());
}

#[tokio::test]
async fn failing_worker_retries_then_is_discarded_at_max_attempts() {
    let orchestrator = new_orchestrator().await;
    let worker = Arc::new(AlwaysFailWorker {
        calls: AtomicUsize::new(0),
    });
    orchestrator.register(worker.clone());

    let job = orchestrator
        .insert("always_fail", serde_json::json!({}), InsertOptions::default())
        .await
        .unwrap();

    orchestrator.drain(None).await.unwrap();

    let fetched = orchestrator.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(fetched.state, JobState::Discarded);
    assert_eq!(fetched.attempt, 2);
    assert_eq!(fetched.errors.len(), 2);
    assert!(worker.calls.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn cancel_jobs_removes_them_from_the_queue() {
    let orchestrator = new_orchestrator().await;
    orchestrator.register(Arc::new(AlwaysOkWorker));

    let a = orchestrator
        .insert("always_ok", serde_json::json!({}), InsertOptions::default())
        .await
        .unwrap();
    let b = orchestrator
        .insert("always_ok", serde_json::json!({}), InsertOptions::default())
        .await
        .unwrap();

    let cancelled = orchestrator
        .cancel_jobs(CancelFilter {
            queue: Some("default".to_string()),
            worker: None,
            state: None,
        })
        .await
        .unwrap();
    assert_eq!(cancelled, 2);

    for id in [a.id, b.id] {
        let fetched = orchestrator.get_job(id).await.unwrap().unwrap();
        assert_eq!(fetched.state, JobState::Cancelled);
    }

    // A cancelled job is not picked up by the dispatcher.
    orchestrator.drain(None).await.unwrap();
    let fetched = orchestrator.get_job(a.id).await.unwrap().unwrap();
    assert_eq!(fetched.state, JobState::Cancelled);
}

#[tokio::test]
async fn duplicate_insert_with_unique_options_returns_existing_job() {
    let orchestrator = new_orchestrator().await;
    orchestrator.register(Arc::new(AlwaysOkWorker));

    let unique = UniqueOptions {
        period: UniquePeriod::Infinity,
        ..Default::default()
    };
    let args = serde_json::json!({"path": "src/main.rs"});

    let first = orchestrator
        .insert_with_result(
            "always_ok",
            args.clone(),
            InsertOptions {
                unique: Some(unique.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(!first.conflict);

    let second = orchestrator
        .insert_with_result(
            "always_ok",
            args,
            InsertOptions {
                unique: Some(unique),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(second.conflict);
    assert_eq!(second.job.id, first.job.id);
}
