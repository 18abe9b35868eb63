//! SDK Request/Response Types
//!
//! Mirrors the JSON-RPC types from the api-rpc crate.

use serde::{Deserialize, Serialize};

/// Request to insert a new job (`job.insert.v1`)
#[derive(Debug, Clone, Serialize, Default)]
pub struct InsertRequest {
    pub worker: String,
    pub args: serde_json::Value,
    pub queue: Option<String>,
    pub priority: Option<i32>,
    pub max_attempts: Option<i32>,
    /// RFC 3339; omit to run as soon as possible.
    pub scheduled_at: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub unique_period_secs: Option<i64>,
}

impl InsertRequest {
    pub fn new(worker: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            worker: worker.into(),
            args,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InsertResponse {
    pub job: Job,
    pub conflict: bool,
}

/// A job as returned over the wire; mirrors `semantica_core::domain::job::Job`.
#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    pub id: i64,
    pub state: String,
    pub queue: String,
    pub worker: String,
    pub args: serde_json::Value,
    pub meta: serde_json::Value,
    pub tags: Vec<String>,
    pub attempt: i32,
    pub max_attempts: i32,
    pub priority: i32,
}

/// Request to fetch a single job (`job.get.v1`)
#[derive(Debug, Clone, Serialize)]
pub struct GetRequest {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetResponse {
    pub job: Option<Job>,
}

/// Request to cancel jobs matching a filter (`job.cancel.v1`)
#[derive(Debug, Clone, Serialize, Default)]
pub struct CancelRequest {
    pub queue: Option<String>,
    pub worker: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelResponse {
    pub cancelled: u64,
}

/// `admin.stats.v1` response
#[derive(Debug, Clone, Deserialize)]
pub struct QueueStatus {
    pub name: String,
    pub state: String,
    pub limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatsResponse {
    pub node_id: String,
    pub queues: Vec<QueueStatus>,
    pub uptime_seconds: i64,
}

/// `admin.maintenance.v1` request
#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceRequest {
    pub rescue_after_secs: u64,
    pub max_age_secs: u64,
}

impl Default for MaintenanceRequest {
    fn default() -> Self {
        Self {
            rescue_after_secs: 300,
            max_age_secs: 7 * 24 * 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceResponse {
    pub rescued: u64,
    pub pruned: u64,
}
