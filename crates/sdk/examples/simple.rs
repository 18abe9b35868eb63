//! Simple SDK Example
//!
//! Demonstrates basic usage of the Semantica SDK.
//!
//! # Usage
//!
//! 1. Start the daemon:
//!    ```bash
//!    cargo run --package semantica-daemon
//!    ```
//!
//! 2. Run this example:
//!    ```bash
//!    cargo run --example simple
//!    ```

use semantica_task_sdk::{CancelRequest, InsertRequest, SemanticaTaskClient};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Semantica SDK - Simple Example");
    println!("================================\n");

    println!("1. Connecting to daemon...");
    let client = SemanticaTaskClient::connect("http://127.0.0.1:9527").await?;
    println!("   ✓ Connected\n");

    println!("2. Inserting a job...");
    let insert_response = client
        .insert(InsertRequest {
            queue: Some("default".to_string()),
            priority: Some(5),
            ..InsertRequest::new(
                "echo",
                json!({
                    "path": "examples/simple.rs",
                    "mode": "full_index"
                }),
            )
        })
        .await?;

    println!("   ✓ Job inserted:");
    println!("     - ID: {}", insert_response.job.id);
    println!("     - State: {}", insert_response.job.state);
    println!("     - Queue: {}\n", insert_response.job.queue);

    println!("3. Waiting 2 seconds...");
    tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;
    println!("   ✓ Done\n");

    println!("4. Fetching job status...");
    let get_response = client.get(insert_response.job.id).await?;
    match get_response.job {
        Some(job) => println!("   ✓ Job {} is now in state {}", job.id, job.state),
        None => println!("   ⚠ Job not found"),
    }
    println!();

    println!("5. Cancelling any remaining jobs on the default queue...");
    let cancel_response = client
        .cancel(CancelRequest {
            queue: Some("default".to_string()),
            worker: None,
        })
        .await?;
    println!("   ✓ Cancelled {} job(s)", cancel_response.cancelled);

    println!("\n✓ Example completed successfully!");

    Ok(())
}
