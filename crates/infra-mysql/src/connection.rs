// MySQL Connection Pool Setup

use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use std::str::FromStr;
use std::time::Duration;

/// Create a MySQL connection pool.
///
/// # Configuration
/// - `QUEUE_POOL_SIZE`: Max connections (default: 20)
/// - `QUEUE_POOL_TIMEOUT`: Acquire-timeout in seconds (default: 5)
pub async fn create_pool(database_url: &str) -> Result<MySqlPool, Box<dyn std::error::Error>> {
    let max_connections: u32 = std::env::var("QUEUE_POOL_SIZE")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(20);

    let acquire_timeout_secs: u64 = std::env::var("QUEUE_POOL_TIMEOUT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(5);

    let options = MySqlConnectOptions::from_str(database_url)?;

    let pool = MySqlPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(acquire_timeout_secs))
        .connect_with(options)
        .await
        .map_err(|e| semantica_core::error::AppError::Storage(e.to_string()))?;

    Ok(pool)
}
