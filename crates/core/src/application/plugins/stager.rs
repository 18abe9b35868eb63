// Stager: `scheduled -> available` for rows whose time has
// come. Runs always, not as an optional plugin; on a nonzero stage count it
// wakes every dispatcher so newly-available rows aren't left for the next
// poll interval.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::error;

use crate::application::plugins::Plugin;
use crate::application::shutdown::ShutdownToken;
use crate::application::telemetry::{TelemetryBus, TelemetryEvent};
use crate::port::{StorageAdapter, TimeProvider};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

pub struct Stager {
    adapter: Arc<dyn StorageAdapter>,
    telemetry: Arc<TelemetryBus>,
    time: Arc<dyn TimeProvider>,
    interval: Duration,
    wake_all: Arc<dyn Fn() + Send + Sync>,
}

impl Stager {
    pub fn new(
        adapter: Arc<dyn StorageAdapter>,
        telemetry: Arc<TelemetryBus>,
        time: Arc<dyn TimeProvider>,
        interval: Duration,
        wake_all: Arc<dyn Fn() + Send + Sync>,
    ) -> Self {
        Self {
            adapter,
            telemetry,
            time,
            interval,
            wake_all,
        }
    }

    async fn tick(&self) {
        match self.adapter.stage_jobs().await {
            Ok(0) => {}
            Ok(count) => {
                (self.wake_all)();
                self.telemetry.emit(
                    TelemetryEvent::new("job:stage", self.time.now())
                        .with_fields(json!({"count": count})),
                );
            }
            Err(e) => {
                error!(error = %e, "stager tick failed");
                self.telemetry.emit(
                    TelemetryEvent::new("plugin:error", self.time.now())
                        .with_fields(json!({"plugin": "stager", "error": e.to_string()})),
                );
            }
        }
    }
}

#[async_trait]
impl Plugin for Stager {
    fn name(&self) -> &str {
        "stager"
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
