// PostgreSQL LISTEN/NOTIFY sub-port. The only
// adapter in this workspace with a native pub/sub primitive; SQLite and
// MySQL rely on the poll interval plus the Stager's dispatch-broadcast
// instead. Reconnects the underlying channel with exponential backoff (up
// to 30s, up to 10 attempts) on connection loss rather than surfacing the
// drop to the caller.

use std::time::Duration;

use async_trait::async_trait;
use semantica_core::error::{AppError, Result};
use semantica_core::port::notify::NotifyListener;
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tracing::{error, warn};

const CHANNEL: &str = "izi_jobs_insert";
const MAX_RECONNECT_ATTEMPTS: u32 = 10;
const MAX_BACKOFF: Duration = Duration::from_secs(30);

pub struct PostgresNotifyListener {
    pool: PgPool,
}

impl PostgresNotifyListener {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotifyListener for PostgresNotifyListener {
    async fn notify(&self, queue: &str) -> Result<()> {
        let payload = serde_json::json!({ "queue": queue }).to_string();
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(CHANNEL)
            .bind(payload)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn listen(&self, callback: Box<dyn Fn(String) + Send + Sync>) -> Result<()> {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            let mut attempt = 0u32;
            loop {
                match PgListener::connect_with(&pool).await {
                    Ok(mut listener) => {
                        attempt = 0;
                        if let Err(e) = listener.listen(CHANNEL).await {
                            error!(error = %e, "failed to LISTEN on notify channel");
                            continue;
                        }
                        loop {
                            match listener.recv().await {
                                Ok(notification) => {
                                    if let Some(queue) = parse_queue(notification.payload()) {
                                        callback(queue);
                                    }
                                }
                                Err(e) => {
                                    warn!(error = %e, "notify channel connection lost, reconnecting");
                                    break;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        attempt += 1;
                        error!(error = %e, attempt, "failed to connect notify listener");
                        if attempt >= MAX_RECONNECT_ATTEMPTS {
                            error!("giving up on notify listener after max reconnect attempts");
                            return;
                        }
                    }
                }
                let backoff = Duration::from_secs(2u64.saturating_pow(attempt.min(5))).min(MAX_BACKOFF);
                tokio::time::sleep(backoff).await;
            }
        });
        Ok(())
    }
}

fn parse_queue(payload: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(payload)
        .ok()
        .and_then(|v| v.get("queue").and_then(|q| q.as_str()).map(String::from))
}
