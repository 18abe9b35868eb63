// SQLite Storage Adapter: claims jobs with the same
// `map_sqlx_error()` SQLite-error-code translation technique used by the
// other adapters. `fetch_jobs` selects and claims in a single
// `priority ASC, scheduled_at ASC, id ASC` multi-row claim inside a
// `BEGIN IMMEDIATE` transaction — SQLite's writer-exclusivity under
// `IMMEDIATE` satisfies the "two concurrent callers never overlap" contract
// without `FOR UPDATE SKIP LOCKED` (SQLite has no such clause).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use semantica_core::domain::job::{Job, JobId, JobState};
use semantica_core::domain::unique::{UniqueField, UniqueOptions, UniquePeriod};
use semantica_core::error::{AppError, Result};
use semantica_core::port::storage_adapter::{CancelFilter, JobPatch, NewJob, StorageAdapter};
use semantica_core::port::TimeProvider;
use sqlx::SqlitePool;
use std::sync::Arc;

fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                match code.as_ref() {
                    "2067" | "1555" => AppError::Storage(format!(
                        "unique constraint violation: {}",
                        db_err.message()
                    )),
                    "5" => AppError::Storage(format!("database locked (SQLITE_BUSY): {}", db_err.message())),
                    other => AppError::Storage(format!("database error [{other}]: {}", db_err.message())),
                }
            } else {
                AppError::Storage(format!("database error: {}", db_err.message()))
            }
        }
        sqlx::Error::RowNotFound => AppError::Storage("row not found".to_string()),
        other => AppError::Storage(other.to_string()),
    }
}

pub struct SqliteStorageAdapter {
    pool: SqlitePool,
    time: Arc<dyn TimeProvider>,
}

impl SqliteStorageAdapter {
    pub fn new(pool: SqlitePool, time: Arc<dyn TimeProvider>) -> Self {
        Self { pool, time }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: i64,
    state: String,
    queue: String,
    worker: String,
    args: String,
    meta: String,
    tags: String,
    errors: String,
    attempt: i32,
    max_attempts: i32,
    priority: i32,
    inserted_at: DateTime<Utc>,
    scheduled_at: DateTime<Utc>,
    attempted_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    discarded_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl JobRow {
    fn into_job(self) -> Job {
        Job {
            id: self.id,
            state: JobState::parse(&self.state).unwrap_or(JobState::Available),
            queue: self.queue,
            worker: self.worker,
            args: serde_json::from_str(&self.args).unwrap_or(serde_json::json!({})),
            meta: serde_json::from_str(&self.meta).unwrap_or(serde_json::json!({})),
            tags: serde_json::from_str(&self.tags).unwrap_or_default(),
            errors: serde_json::from_str(&self.errors).unwrap_or_default(),
            attempt: self.attempt,
            max_attempts: self.max_attempts,
            priority: self.priority,
            inserted_at: self.inserted_at,
            scheduled_at: self.scheduled_at,
            attempted_at: self.attempted_at,
            completed_at: self.completed_at,
            discarded_at: self.discarded_at,
            cancelled_at: self.cancelled_at,
        }
    }
}

fn terminal_states_sql() -> &'static str {
    "('completed', 'discarded', 'cancelled')"
}

#[async_trait]
impl StorageAdapter for SqliteStorageAdapter {
    async fn migrate(&self) -> Result<()> {
        crate::migration::run_migrations(&self.pool)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))
    }

    async fn rollback(&self, target_version: i64) -> Result<()> {
        crate::migration::rollback(&self.pool, target_version)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))
    }

    async fn insert_job(&self, job: NewJob) -> Result<Job> {
        let now = self.time.now();
        let state = job.initial_state(now);
        let row: JobRow = sqlx::query_as(
            r#"
            INSERT INTO jobs (
                state, queue, worker, args, meta, tags, errors,
                attempt, max_attempts, priority, inserted_at, scheduled_at
            ) VALUES (?, ?, ?, ?, ?, ?, '[]', 0, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(state.as_str())
        .bind(&job.queue)
        .bind(&job.worker)
        .bind(job.args.to_string())
        .bind(job.meta.to_string())
        .bind(serde_json::to_string(&job.tags).unwrap_or_else(|_| "[]".to_string()))
        .bind(job.max_attempts)
        .bind(job.priority)
        .bind(now)
        .bind(job.scheduled_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into_job())
    }

    async fn get_job(&self, id: JobId) -> Result<Option<Job>> {
        let row: Option<JobRow> = sqlx::query_as("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(JobRow::into_job))
    }

    async fn update_job(&self, id: JobId, patch: JobPatch) -> Result<Option<Job>> {
        let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> =
            sqlx::QueryBuilder::new("UPDATE jobs SET ");
        let mut first = true;

        macro_rules! set_field {
            ($name:literal, $value:expr) => {{
                if !first {
                    builder.push(", ");
                }
                first = false;
                builder.push($name);
                builder.push(" = ");
                builder.push_bind($value);
            }};
        }

        if let Some(state) = patch.state {
            set_field!("state", state.as_str().to_string());
        }
        if let Some(attempt) = patch.attempt {
            set_field!("attempt", attempt);
        }
        if let Some(errors) = &patch.errors {
            set_field!("errors", serde_json::to_string(errors).unwrap_or_else(|_| "[]".to_string()));
        }
        if let Some(meta) = &patch.meta {
            set_field!("meta", meta.to_string());
        }
        if let Some(scheduled_at) = patch.scheduled_at {
            set_field!("scheduled_at", scheduled_at);
        }
        if let Some(attempted_at) = patch.attempted_at {
            set_field!("attempted_at", attempted_at);
        }
        if let Some(completed_at) = patch.completed_at {
            set_field!("completed_at", completed_at);
        }
        if let Some(discarded_at) = patch.discarded_at {
            set_field!("discarded_at", discarded_at);
        }
        if let Some(cancelled_at) = patch.cancelled_at {
            set_field!("cancelled_at", cancelled_at);
        }

        if first {
            // No fields set: behave like a no-op GetJob.
            return self.get_job(id).await;
        }

        builder.push(" WHERE id = ");
        builder.push_bind(id);
        builder.push(" RETURNING *");

        let row: Option<JobRow> = builder
            .build_query_as()
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(JobRow::into_job))
    }

    async fn fetch_jobs(&self, queue: &str, limit: usize) -> Result<Vec<Job>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let now = self.time.now();
        let mut conn = self.pool.acquire().await.map_err(map_sqlx_error)?;

        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;

        let result: Result<Vec<JobRow>> = async {
            let ids: Vec<i64> = sqlx::query_scalar(
                r#"
                SELECT id FROM jobs
                WHERE queue = ? AND state = 'available' AND scheduled_at <= ?
                ORDER BY priority ASC, scheduled_at ASC, id ASC
                LIMIT ?
                "#,
            )
            .bind(queue)
            .bind(now)
            .bind(limit as i64)
            .fetch_all(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;

            if ids.is_empty() {
                return Ok(Vec::new());
            }

            let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> = sqlx::QueryBuilder::new(
                "UPDATE jobs SET state = 'executing', attempted_at = ",
            );
            builder.push_bind(now);
            builder.push(", attempt = attempt + 1 WHERE id IN (");
            let mut separated = builder.separated(", ");
            for id in &ids {
                separated.push_bind(*id);
            }
            builder.push(") RETURNING *");

            builder
                .build_query_as()
                .fetch_all(&mut *conn)
                .await
                .map_err(map_sqlx_error)
        }
        .await;

        match result {
            Ok(rows) => {
                sqlx::query("COMMIT").execute(&mut *conn).await.map_err(map_sqlx_error)?;
                let mut jobs: Vec<Job> = rows.into_iter().map(JobRow::into_job).collect();
                jobs.sort_by(|a, b| {
                    a.priority
                        .cmp(&b.priority)
                        .then(a.scheduled_at.cmp(&b.scheduled_at))
                        .then(a.id.cmp(&b.id))
                });
                Ok(jobs)
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(e)
            }
        }
    }

    async fn stage_jobs(&self) -> Result<u64> {
        let now = self.time.now();
        let result = sqlx::query(
            "UPDATE jobs SET state = 'available' WHERE state = 'scheduled' AND scheduled_at <= ?",
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn cancel_jobs(&self, filter: CancelFilter) -> Result<u64> {
        let now = self.time.now();
        let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> = sqlx::QueryBuilder::new(
            "UPDATE jobs SET state = 'cancelled', cancelled_at = ",
        );
        builder.push_bind(now);
        builder.push(format!(" WHERE state NOT IN {}", terminal_states_sql()));
        if let Some(queue) = &filter.queue {
            builder.push(" AND queue = ");
            builder.push_bind(queue.clone());
        }
        if let Some(worker) = &filter.worker {
            builder.push(" AND worker = ");
            builder.push_bind(worker.clone());
        }
        if let Some(state) = filter.state {
            builder.push(" AND state = ");
            builder.push_bind(state.as_str().to_string());
        }
        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn rescue_stuck_jobs(&self, after: Duration) -> Result<u64> {
        let now = self.time.now();
        let cutoff = now - chrono::Duration::from_std(after).unwrap_or_default();
        let result = sqlx::query(
            "UPDATE jobs SET state = 'available', scheduled_at = ? WHERE state = 'executing' AND attempted_at < ?",
        )
        .bind(now)
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn prune_jobs(&self, max_age: Duration) -> Result<u64> {
        let now = self.time.now();
        let cutoff = now - chrono::Duration::from_std(max_age).unwrap_or_default();
        let result = sqlx::query(&format!(
            "DELETE FROM jobs WHERE state IN {} AND COALESCE(completed_at, discarded_at, cancelled_at) < ?",
            terminal_states_sql()
        ))
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn check_unique(&self, opts: &UniqueOptions, candidate: &NewJob) -> Result<Option<Job>> {
        let now = self.time.now();
        let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> =
            sqlx::QueryBuilder::new("SELECT * FROM jobs WHERE 1 = 1");

        if !opts.states.is_empty() {
            builder.push(" AND state IN (");
            let mut separated = builder.separated(", ");
            for state in &opts.states {
                separated.push_bind(state.as_str().to_string());
            }
            builder.push(")");
        }
        if let UniquePeriod::Seconds(seconds) = opts.period {
            let cutoff = now - chrono::Duration::seconds(seconds);
            builder.push(" AND inserted_at > ");
            builder.push_bind(cutoff);
        }
        if opts.has_field(UniqueField::Worker) {
            builder.push(" AND worker = ");
            builder.push_bind(candidate.worker.clone());
        }
        if opts.has_field(UniqueField::Queue) {
            builder.push(" AND queue = ");
            builder.push_bind(candidate.queue.clone());
        }
        builder.push(" ORDER BY id ASC LIMIT 100");

        let rows: Vec<JobRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        if !opts.has_field(UniqueField::Args) {
            return Ok(rows.into_iter().next().map(JobRow::into_job));
        }

        for row in rows {
            let job = row.into_job();
            if args_match(&opts.keys, &job.args, &candidate.args) {
                return Ok(Some(job));
            }
        }
        Ok(None)
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// The `"args" ∈ fields` comparison: with `keys`, compare each named key's
/// extracted value (missing on both sides counts as equal); without `keys`,
/// compare the whole JSON value canonically (`serde_json::Value`'s own `Eq`
/// ignores object key order).
fn args_match(keys: &Option<Vec<String>>, existing: &serde_json::Value, candidate: &serde_json::Value) -> bool {
    match keys {
        Some(keys) => keys.iter().all(|key| {
            let a = existing.get(key);
            let b = candidate.get(key);
            match (a, b) {
                (None, None) => true,
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }),
        None => existing == candidate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semantica_core::port::time_provider::SystemTimeProvider;

    async fn setup() -> SqliteStorageAdapter {
        let pool = crate::create_pool("sqlite::memory:").await.unwrap();
        crate::migration::run_migrations(&pool).await.unwrap();
        SqliteStorageAdapter::new(pool, Arc::new(SystemTimeProvider))
    }

    fn new_job(worker: &str) -> NewJob {
        NewJob::new(worker, serde_json::json!({"x": 1}), Utc::now())
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let adapter = setup().await;
        let inserted = adapter.insert_job(new_job("send_email")).await.unwrap();
        assert_eq!(inserted.state, JobState::Available);
        let fetched = adapter.get_job(inserted.id).await.unwrap().unwrap();
        assert_eq!(fetched.worker, "send_email");
    }

    #[tokio::test]
    async fn future_scheduled_at_starts_scheduled() {
        let adapter = setup().await;
        let mut job = new_job("send_email");
        job.scheduled_at = Utc::now() + chrono::Duration::hours(1);
        let inserted = adapter.insert_job(job).await.unwrap();
        assert_eq!(inserted.state, JobState::Scheduled);
    }

    #[tokio::test]
    async fn fetch_jobs_claims_in_priority_order() {
        let adapter = setup().await;
        let mut low = new_job("w");
        low.priority = 10;
        let mut high = new_job("w");
        high.priority = -10;
        adapter.insert_job(low).await.unwrap();
        let high_job = adapter.insert_job(high).await.unwrap();

        let claimed = adapter.fetch_jobs("default", 1).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, high_job.id);
        assert_eq!(claimed[0].state, JobState::Executing);
        assert_eq!(claimed[0].attempt, 1);
    }

    #[tokio::test]
    async fn fetch_jobs_never_returns_overlapping_rows_across_concurrent_callers() {
        let adapter = Arc::new(setup().await);
        for _ in 0..20 {
            adapter.insert_job(new_job("w")).await.unwrap();
        }

        let a = Arc::clone(&adapter);
        let b = Arc::clone(&adapter);
        let (ra, rb) = tokio::join!(
            tokio::spawn(async move { a.fetch_jobs("default", 10).await.unwrap() }),
            tokio::spawn(async move { b.fetch_jobs("default", 10).await.unwrap() }),
        );
        let ids_a: Vec<i64> = ra.unwrap().into_iter().map(|j| j.id).collect();
        let ids_b: Vec<i64> = rb.unwrap().into_iter().map(|j| j.id).collect();
        for id in &ids_a {
            assert!(!ids_b.contains(id));
        }
        assert_eq!(ids_a.len() + ids_b.len(), 20);
    }

    #[tokio::test]
    async fn stage_jobs_promotes_due_scheduled_rows() {
        let adapter = setup().await;
        let mut job = new_job("w");
        job.scheduled_at = Utc::now() + chrono::Duration::milliseconds(50);
        let inserted = adapter.insert_job(job).await.unwrap();
        assert_eq!(inserted.state, JobState::Scheduled);
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        let staged = adapter.stage_jobs().await.unwrap();
        assert_eq!(staged, 1);
        let after = adapter.get_job(inserted.id).await.unwrap().unwrap();
        assert_eq!(after.state, JobState::Available);
    }

    #[tokio::test]
    async fn rescue_stuck_jobs_recovers_crashed_executing_rows() {
        let adapter = setup().await;
        let inserted = adapter.insert_job(new_job("w")).await.unwrap();
        let claimed = adapter.fetch_jobs("default", 1).await.unwrap();
        assert_eq!(claimed[0].id, inserted.id);

        // Back-date attempted_at to simulate a crash 10 minutes ago.
        let stale = Utc::now() - chrono::Duration::minutes(10);
        let mut patch = JobPatch::default().state(JobState::Executing);
        patch.attempted_at = Some(stale);
        adapter.update_job(inserted.id, patch).await.unwrap();

        let rescued = adapter.rescue_stuck_jobs(Duration::from_secs(300)).await.unwrap();
        assert_eq!(rescued, 1);
        let after = adapter.get_job(inserted.id).await.unwrap().unwrap();
        assert_eq!(after.state, JobState::Available);
    }

    #[tokio::test]
    async fn check_unique_matches_on_worker_queue_and_whole_args() {
        let adapter = setup().await;
        let first = adapter.insert_job(new_job("send_email")).await.unwrap();
        let opts = UniqueOptions::default();
        let candidate = new_job("send_email");
        let hit = adapter.check_unique(&opts, &candidate).await.unwrap();
        assert_eq!(hit.unwrap().id, first.id);
    }
}
