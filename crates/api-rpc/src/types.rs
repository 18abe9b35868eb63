//! RPC Request/Response Types
//!
//! Defines the JSON-RPC method parameters and results for the subset of the
//! Orchestrator's public surface this demonstration server exposes
//!.

use semantica_core::domain::job::Job;
use serde::{Deserialize, Serialize};

/// job.insert.v1 - Insert a job
#[derive(Debug, Deserialize)]
pub struct InsertRequest {
    pub worker: String,
    pub args: serde_json::Value,
    pub queue: Option<String>,
    pub priority: Option<i32>,
    pub max_attempts: Option<i32>,
    /// RFC 3339; absent means "now".
    pub scheduled_at: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Seconds; presence alone requests `UniqueOptions::default()` unless
    /// overridden fields are also set. Kept intentionally minimal for the
    /// demonstration surface — the full `UniqueOptions` shape lives in
    /// `semantica_core::domain::unique` for embedders that link the crate
    /// directly instead of going over RPC.
    pub unique_period_secs: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InsertResponse {
    pub job: Job,
    pub conflict: bool,
}

/// job.get.v1 - Fetch a single job by id
#[derive(Debug, Deserialize)]
pub struct GetRequest {
    pub id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    pub job: Option<Job>,
}

/// job.cancel.v1 - Cancel jobs matching an optional filter
#[derive(Debug, Deserialize, Default)]
pub struct CancelRequest {
    pub queue: Option<String>,
    pub worker: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelResponse {
    pub cancelled: u64,
}

/// admin.stats.v1 - Get per-queue dispatcher status
#[derive(Debug, Deserialize)]
pub struct StatsRequest {}

#[derive(Debug, Clone, Serialize)]
pub struct QueueStatusDto {
    pub name: String,
    pub state: String,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub node_id: String,
    pub queues: Vec<QueueStatusDto>,
    pub uptime_seconds: i64,
}

/// admin.maintenance.v1 - Run rescue + prune out of band of their timers
#[derive(Debug, Deserialize)]
pub struct MaintenanceRequest {
    #[serde(default = "default_rescue_after_secs")]
    pub rescue_after_secs: u64,
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
}

fn default_rescue_after_secs() -> u64 {
    300
}

fn default_max_age_secs() -> u64 {
    7 * 24 * 3600
}

#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceResponse {
    pub rescued: u64,
    pub pruned: u64,
}
