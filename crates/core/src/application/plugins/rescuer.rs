// Rescuer: `executing -> available` for rows whose
// `attempted_at` is older than `rescueAfter` (crashed worker recovery).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::error;

use crate::application::plugins::Plugin;
use crate::application::shutdown::ShutdownToken;
use crate::application::telemetry::{TelemetryBus, TelemetryEvent};
use crate::port::{StorageAdapter, TimeProvider};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_RESCUE_AFTER: Duration = Duration::from_secs(300);

pub struct Rescuer {
    adapter: Arc<dyn StorageAdapter>,
    telemetry: Arc<TelemetryBus>,
    time: Arc<dyn TimeProvider>,
    interval: Duration,
    rescue_after: Duration,
}

impl Rescuer {
    pub fn new(
        adapter: Arc<dyn StorageAdapter>,
        telemetry: Arc<TelemetryBus>,
        time: Arc<dyn TimeProvider>,
        interval: Duration,
        rescue_after: Duration,
    ) -> Self {
        Self {
            adapter,
            telemetry,
            time,
            interval,
            rescue_after,
        }
    }

    async fn tick(&self) {
        match self.adapter.rescue_stuck_jobs(self.rescue_after).await {
            Ok(0) => {}
            Ok(count) => {
                self.telemetry.emit(
                    TelemetryEvent::new("job:rescue", self.time.now()).with_fields(
                        json!({"count": count, "rescueAfter": self.rescue_after.as_secs()}),
                    ),
                );
            }
            Err(e) => {
                error!(error = %e, "rescuer tick failed");
                self.telemetry.emit(
                    TelemetryEvent::new("plugin:error", self.time.now())
                        .with_fields(json!({"plugin": "rescuer", "error": e.to_string()})),
                );
            }
        }
    }
}

#[async_trait]
impl Plugin for Rescuer {
    fn name(&self) -> &str {
        "rescuer"
    }

    async fn run(&self, mut shutdown: ShutdownToken) {
        let mut tick = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = tick.tick() => self.tick().await,
                _ = shutdown.wait() => break,
            }
        }
    }
}
