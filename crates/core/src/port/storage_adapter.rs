// Storage Adapter port: the polymorphic interface every backend (SQLite,
// PostgreSQL, MySQL) must satisfy identically.
//
// `core` intentionally does not depend on `sqlx`: each adapter crate
// translates its engine's errors into `AppError::Storage` at its own
// boundary (the orphan rule forbids `core` from implementing
// `From<sqlx::Error>` for a type it owns without owning `sqlx::Error` too).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::job::{ErrorRecord, Job, JobId, JobState};
use crate::domain::unique::UniqueOptions;
use crate::error::Result;

/// The inserter-side shape of a job, before the adapter assigns `id` and
/// `inserted_at`. `scheduled_at` defaults to "now" by the caller (the
/// Orchestrator); the adapter derives the initial `state` from it.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub queue: String,
    pub worker: String,
    pub args: Value,
    pub meta: Value,
    pub tags: Vec<String>,
    pub max_attempts: i32,
    pub priority: i32,
    pub scheduled_at: DateTime<Utc>,
}

impl NewJob {
    pub fn new(worker: impl Into<String>, args: Value, now: DateTime<Utc>) -> Self {
        Self {
            queue: "default".to_string(),
            worker: worker.into(),
            args,
            meta: Value::Object(Default::default()),
            tags: Vec::new(),
            max_attempts: 20,
            priority: 0,
            scheduled_at: now,
        }
    }

    /// `scheduled` if `scheduled_at` is strictly in the future of `now`,
    /// else `available`.
    pub fn initial_state(&self, now: DateTime<Utc>) -> JobState {
        if self.scheduled_at > now {
            JobState::Scheduled
        } else {
            JobState::Available
        }
    }
}

/// A partial update: only `Some` fields are applied by `UpdateJob`.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub state: Option<JobState>,
    pub attempt: Option<i32>,
    pub errors: Option<Vec<ErrorRecord>>,
    pub meta: Option<Value>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub attempted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub discarded_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl JobPatch {
    pub fn state(mut self, state: JobState) -> Self {
        self.state = Some(state);
        self
    }
}

/// `CancelJobs({queue?, worker?, state?})`; an all-`None` filter cancels
/// every non-terminal row.
#[derive(Debug, Clone, Default)]
pub struct CancelFilter {
    pub queue: Option<String>,
    pub worker: Option<String>,
    pub state: Option<JobState>,
}

#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Bring the schema to the current version. Idempotent; applies each
    /// pending migration inside its own transaction.
    async fn migrate(&self) -> Result<()>;

    /// Reverse migrations strictly above `target_version`.
    async fn rollback(&self, target_version: i64) -> Result<()>;

    /// Persist `job`, returning the stored row including server-assigned
    /// `id` and `inserted_at`.
    async fn insert_job(&self, job: NewJob) -> Result<Job>;

    async fn get_job(&self, id: JobId) -> Result<Option<Job>>;

    /// Apply only the non-`None` fields of `patch`; `None` if `id` does not
    /// exist.
    async fn update_job(&self, id: JobId, patch: JobPatch) -> Result<Option<Job>>;

    /// The critical operation: atomically claims up to `limit` `available`
    /// rows of `queue` whose `scheduled_at` has passed, in
    /// `(priority ASC, scheduled_at ASC, id ASC)` order, transitioning them
    /// to `executing`. Two concurrent callers (same or different process)
    /// MUST NEVER receive overlapping rows.
    async fn fetch_jobs(&self, queue: &str, limit: usize) -> Result<Vec<Job>>;

    /// `scheduled -> available` for rows whose time has come. Returns the
    /// count staged.
    async fn stage_jobs(&self) -> Result<u64>;

    /// `-> cancelled` for every non-terminal row matching `filter`. Returns
    /// the count cancelled.
    async fn cancel_jobs(&self, filter: CancelFilter) -> Result<u64>;

    /// `executing -> available` for rows whose `attempted_at` is older than
    /// `after` (crashed worker recovery). Returns the count rescued.
    async fn rescue_stuck_jobs(&self, after: Duration) -> Result<u64>;

    /// Deletes terminal rows whose terminal timestamp is older than
    /// `max_age`. Returns the count deleted.
    async fn prune_jobs(&self, max_age: Duration) -> Result<u64>;

    /// Returns the first (LIMIT 1) existing job matching `opts` against
    /// `candidate`.
    async fn check_unique(&self, opts: &UniqueOptions, candidate: &NewJob) -> Result<Option<Job>>;

    async fn close(&self) -> Result<()>;
}
