//! Semantica Task SDK - Rust Client Library
//!
//! Provides a convenient client for interacting with the Semantica Task
//! Engine daemon over JSON-RPC.
//!
//! # Example
//!
//! ```no_run
//! use semantica_task_sdk::{InsertRequest, SemanticaTaskClient};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = SemanticaTaskClient::connect("http://127.0.0.1:9527").await?;
//!
//!     let response = client
//!         .insert(InsertRequest::new("echo", json!({"path": "src/main.rs"})))
//!         .await?;
//!
//!     println!("Job inserted: {}", response.job.id);
//!
//!     Ok(())
//! }
//! ```

mod client;
mod error;
mod types;

pub use client::SemanticaTaskClient;
pub use error::{Result, SdkError};
pub use types::{
    CancelRequest, CancelResponse, GetRequest, GetResponse, InsertRequest, InsertResponse, Job,
    MaintenanceRequest, MaintenanceResponse, QueueStatus, StatsResponse,
};
