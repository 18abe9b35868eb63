//! Semantica Client Implementation

use crate::error::{Result, SdkError};
use crate::types::{
    CancelRequest, CancelResponse, GetRequest, GetResponse, InsertRequest, InsertResponse,
    MaintenanceRequest, MaintenanceResponse, StatsResponse,
};
use jsonrpsee::core::client::ClientT;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use std::time::Duration;

/// Semantica Task Engine Client
///
/// Provides a high-level interface to the subset of the Orchestrator's
/// public surface exposed over JSON-RPC.
///
/// # Example
///
/// ```no_run
/// use semantica_task_sdk::SemanticaTaskClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = SemanticaTaskClient::connect("http://127.0.0.1:9527").await?;
/// # Ok(())
/// # }
/// ```
pub struct SemanticaTaskClient {
    client: HttpClient,
}

impl SemanticaTaskClient {
    /// Connect to the daemon's JSON-RPC endpoint.
    ///
    /// # Arguments
    ///
    /// * `url` - RPC endpoint URL (e.g., `http://127.0.0.1:9527`)
    pub async fn connect(url: impl AsRef<str>) -> Result<Self> {
        let url = url.as_ref();

        let client = HttpClientBuilder::default()
            .request_timeout(Duration::from_secs(30))
            .build(url)
            .map_err(|e| SdkError::Connection(format!("failed to create client: {}", e)))?;

        Ok(Self { client })
    }

    /// Insert a new job.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use semantica_task_sdk::{SemanticaTaskClient, InsertRequest};
    /// # use serde_json::json;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// # let client = SemanticaTaskClient::connect("http://127.0.0.1:9527").await?;
    /// let response = client
    ///     .insert(InsertRequest::new("echo", json!({"path": "src/main.rs"})))
    ///     .await?;
    /// println!("Job ID: {}", response.job.id);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn insert(&self, request: InsertRequest) -> Result<InsertResponse> {
        let params = rpc_params![request];
        let response: InsertResponse = self.client.request("job.insert.v1", params).await?;
        Ok(response)
    }

    /// Fetch a single job by id.
    pub async fn get(&self, id: i64) -> Result<GetResponse> {
        let params = rpc_params![GetRequest { id }];
        let response: GetResponse = self.client.request("job.get.v1", params).await?;
        Ok(response)
    }

    /// Cancel jobs matching an optional queue/worker filter.
    pub async fn cancel(&self, request: CancelRequest) -> Result<CancelResponse> {
        let params = rpc_params![request];
        let response: CancelResponse = self.client.request("job.cancel.v1", params).await?;
        Ok(response)
    }

    /// Fetch per-queue dispatcher status.
    pub async fn stats(&self) -> Result<StatsResponse> {
        let params = rpc_params![];
        let response: StatsResponse = self.client.request("admin.stats.v1", params).await?;
        Ok(response)
    }

    /// Run rescue + prune out of band of their own timers.
    pub async fn maintenance(&self, request: MaintenanceRequest) -> Result<MaintenanceResponse> {
        let params = rpc_params![request];
        let response: MaintenanceResponse =
            self.client.request("admin.maintenance.v1", params).await?;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_sdk_types() {
        // Basic smoke test to ensure SDK compiles.
        // Integration tests require a running daemon.
    }
}
