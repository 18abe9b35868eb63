//! RPC Method Handlers
//!
//! Implements the business logic for each JSON-RPC method as a thin
//! wrapper over `Orchestrator`'s public surface.

use std::sync::Arc;
use std::time::Duration;

use jsonrpsee::types::ErrorObjectOwned;

use crate::error::to_rpc_error;
use crate::rate_limiter::RateLimiter;
use crate::types::{
    CancelRequest, CancelResponse, GetRequest, GetResponse, InsertRequest, InsertResponse,
    MaintenanceRequest, MaintenanceResponse, QueueStatusDto, StatsRequest, StatsResponse,
};
use semantica_core::application::orchestrator::InsertOptions;
use semantica_core::application::Orchestrator;
use semantica_core::domain::unique::UniqueOptions;
use semantica_core::port::storage_adapter::CancelFilter;

/// RPC Handler with an injected `Orchestrator`
pub struct RpcHandler {
    orchestrator: Arc<Orchestrator>,
    rate_limiter: Arc<RateLimiter>,
    start_time: std::time::Instant,
}

impl RpcHandler {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        let max_burst: u32 = std::env::var("QUEUE_RATE_LIMIT_BURST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(200);

        let rate_per_sec: u32 = std::env::var("QUEUE_RATE_LIMIT_RATE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(100);

        Self {
            orchestrator,
            rate_limiter: Arc::new(RateLimiter::new(max_burst, rate_per_sec)),
            start_time: std::time::Instant::now(),
        }
    }

    async fn throttle(&self) -> Result<(), ErrorObjectOwned> {
        if self.rate_limiter.check().await {
            Ok(())
        } else {
            Err(jsonrpsee::types::error::ErrorObject::owned(
                crate::error::code::THROTTLED,
                "Rate limit exceeded. Please slow down.",
                None::<()>,
            ))
        }
    }

    /// job.insert.v1
    pub async fn insert(&self, params: InsertRequest) -> Result<InsertResponse, ErrorObjectOwned> {
        self.throttle().await?;

        let mut opts = InsertOptions {
            queue: params.queue,
            max_attempts: params.max_attempts,
            priority: params.priority,
            tags: params.tags,
            ..Default::default()
        };
        if let Some(raw) = &params.scheduled_at {
            let parsed = chrono::DateTime::parse_from_rfc3339(raw)
                .map_err(|e| jsonrpsee::types::error::ErrorObject::owned(
                    crate::error::code::VALIDATION_ERROR,
                    format!("invalid scheduled_at: {e}"),
                    None::<()>,
                ))?;
            opts.scheduled_at = Some(parsed.with_timezone(&chrono::Utc));
        }
        if let Some(period) = params.unique_period_secs {
            opts.unique = Some(UniqueOptions {
                period: semantica_core::domain::unique::UniquePeriod::Seconds(period),
                ..Default::default()
            });
        }

        let result = self
            .orchestrator
            .insert_with_result(&params.worker, params.args, opts)
            .await
            .map_err(to_rpc_error)?;

        Ok(InsertResponse {
            job: result.job,
            conflict: result.conflict,
        })
    }

    /// job.get.v1
    pub async fn get(&self, params: GetRequest) -> Result<GetResponse, ErrorObjectOwned> {
        let job = self
            .orchestrator
            .get_job(params.id)
            .await
            .map_err(to_rpc_error)?;
        Ok(GetResponse { job })
    }

    /// job.cancel.v1
    pub async fn cancel(&self, params: CancelRequest) -> Result<CancelResponse, ErrorObjectOwned> {
        self.throttle().await?;

        let filter = CancelFilter {
            queue: params.queue,
            worker: params.worker,
            state: None,
        };
        let cancelled = self
            .orchestrator
            .cancel_jobs(filter)
            .await
            .map_err(to_rpc_error)?;

        Ok(CancelResponse { cancelled })
    }

    /// admin.stats.v1
    pub async fn stats(&self, _params: StatsRequest) -> Result<StatsResponse, ErrorObjectOwned> {
        let queues = self
            .orchestrator
            .get_all_queue_status()
            .into_iter()
            .map(|status| QueueStatusDto {
                name: status.name,
                state: format!("{:?}", status.state).to_lowercase(),
                limit: status.limit,
            })
            .collect();

        Ok(StatsResponse {
            node_id: self.orchestrator.node_id().to_string(),
            queues,
            uptime_seconds: self.start_time.elapsed().as_secs() as i64,
        })
    }

    /// admin.maintenance.v1
    pub async fn maintenance(
        &self,
        params: MaintenanceRequest,
    ) -> Result<MaintenanceResponse, ErrorObjectOwned> {
        let rescued = self
            .orchestrator
            .rescue_stuck_jobs(Duration::from_secs(params.rescue_after_secs))
            .await
            .map_err(to_rpc_error)?;

        let pruned = self
            .orchestrator
            .prune_jobs(Duration::from_secs(params.max_age_secs))
            .await
            .map_err(to_rpc_error)?;

        Ok(MaintenanceResponse { rescued, pruned })
    }
}
