// Pruner: deletes terminal rows whose terminal timestamp
// is older than `maxAge`.

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
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(86_400);

pub struct Pruner {
    adapter: Arc<dyn StorageAdapter>,
    telemetry: Arc<TelemetryBus>,
    time: Arc<dyn TimeProvider>,
    interval: Duration,
    max_age: Duration,
}

impl Pruner {
    pub fn new(
        adapter: Arc<dyn StorageAdapter>,
        telemetry: Arc<TelemetryBus>,
        time: Arc<dyn TimeProvider>,
        interval: Duration,
        max_age: Duration,
    ) -> Self {
        Self {
            adapter,
            telemetry,
            time,
            interval,
            max_age,
        }
    }

    pub async fn prune_now(&self) -> crate::error::Result<u64> {
        self.adapter.prune_jobs(self.max_age).await
    }

    async fn tick(&self) {
        match self.prune_now().await {
            Ok(0) => {}
            Ok(pruned) => {
                self.telemetry.emit(
                    TelemetryEvent::new("job:complete", self.time.now()).with_fields(json!({
                        "queue": "pruner",
                        "pruned": pruned,
                        "maxAge": self.max_age.as_secs(),
                    })),
                );
            }
            Err(e) => {
                error!(error = %e, "pruner tick failed");
                self.telemetry.emit(
                    TelemetryEvent::new("plugin:error", self.time.now())
                        .with_fields(json!({"plugin": "pruner", "error": e.to_string()})),
                );
            }
        }
    }
}

#[async_trait]
impl Plugin for Pruner {
    fn name(&self) -> &str {
        "pruner"
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
