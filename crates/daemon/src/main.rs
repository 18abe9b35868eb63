//! Semantica Task Engine - Main Entry Point
//!
//! Composes a `StorageAdapter`, the `Orchestrator`, and a JSON-RPC front
//! door.

mod telemetry;
mod worker;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use semantica_api_rpc::{server::RpcServerConfig, RpcServer};
use semantica_core::application::orchestrator::{Orchestrator, OrchestratorConfig};
use semantica_core::domain::queue::QueueConfig;
use semantica_core::port::id_provider::UuidProvider;
use semantica_core::port::storage_adapter::StorageAdapter;
use semantica_core::port::time_provider::SystemTimeProvider;
use semantica_infra_system::SubprocessContextFactory;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_DATABASE_URL: &str = "sqlite://~/.semantica/meta.db";

/// Expands a leading `~` in the filesystem-path portion of a `sqlite://`
/// URL (or a bare path, with no scheme at all).
fn expand_sqlite_path(url: &str) -> String {
    let path = url.strip_prefix("sqlite://").unwrap_or(url);
    shellexpand::tilde(path).into_owned()
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_format = std::env::var("QUEUE_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("semantica=info"))
        .expect("failed to create env filter");

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }

    info!("Semantica Task Engine v{} starting...", VERSION);

    if let Err(e) = telemetry::init_telemetry() {
        tracing::warn!(error = ?e, "failed to initialize OpenTelemetry (continuing without it)");
    }

    let database_url =
        std::env::var("QUEUE_DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());

    let rpc_port: u16 = std::env::var("QUEUE_RPC_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(9527);

    info!(database_url = %database_url, "initializing storage adapter...");

    let time_provider = Arc::new(SystemTimeProvider);
    let id_provider = Arc::new(UuidProvider);

    let (adapter, notify): (Arc<dyn StorageAdapter>, Option<Arc<dyn semantica_core::port::notify::NotifyListener>>) =
        if let Some(url) = database_url.strip_prefix("postgres://").or_else(|| database_url.strip_prefix("postgresql://")) {
            let full_url = format!("postgres://{url}");
            let pool = semantica_infra_postgres::create_pool(&full_url)
                .await
                .map_err(|e| anyhow::anyhow!("postgres pool creation failed: {}", e))?;
            let adapter: Arc<dyn StorageAdapter> = Arc::new(
                semantica_infra_postgres::PostgresStorageAdapter::new(pool.clone(), time_provider.clone()),
            );
            let notify: Arc<dyn semantica_core::port::notify::NotifyListener> =
                Arc::new(semantica_infra_postgres::PostgresNotifyListener::new(pool));
            (adapter, Some(notify))
        } else if let Some(url) = database_url.strip_prefix("mysql://") {
            let full_url = format!("mysql://{url}");
            let pool = semantica_infra_mysql::create_pool(&full_url)
                .await
                .map_err(|e| anyhow::anyhow!("mysql pool creation failed: {}", e))?;
            let adapter: Arc<dyn StorageAdapter> = Arc::new(semantica_infra_mysql::MySqlStorageAdapter::new(
                pool.clone(),
                time_provider.clone(),
            ));
            (adapter, None)
        } else {
            let pool = semantica_infra_sqlite::create_pool(&expand_sqlite_path(&database_url))
                .await
                .map_err(|e| anyhow::anyhow!("sqlite pool creation failed: {}", e))?;
            let adapter: Arc<dyn StorageAdapter> = Arc::new(semantica_infra_sqlite::SqliteStorageAdapter::new(
                pool.clone(),
                time_provider.clone(),
            ));
            (adapter, None)
        };

    let isolation_factory = Arc::new(SubprocessContextFactory::new(
        "true",
        Vec::<String>::new(),
    ));

    let config = OrchestratorConfig {
        queues: vec![QueueConfig::new("default", 10)],
        ..Default::default()
    };

    let orchestrator = Arc::new(Orchestrator::new(
        adapter,
        isolation_factory,
        time_provider.clone(),
        id_provider.clone(),
        notify,
        config,
    ));

    orchestrator.register(Arc::new(worker::EchoWorker));

    info!("running migrations...");
    orchestrator
        .migrate()
        .await
        .map_err(|e| anyhow::anyhow!("migration failed: {}", e))?;

    info!("starting orchestrator...");
    orchestrator
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("orchestrator start failed: {}", e))?;

    info!("starting JSON-RPC server...");
    let rpc_config = RpcServerConfig {
        port: rpc_port,
        ..Default::default()
    };
    let rpc_server = RpcServer::new(rpc_config, Arc::clone(&orchestrator));
    let rpc_handle = rpc_server
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    info!("system ready. Waiting for tasks...");
    info!("press Ctrl+C to shutdown");

    tokio::signal::ctrl_c().await?;

    info!("shutdown signal received. Exiting gracefully...");

    rpc_handle
        .stop()
        .map_err(|e| anyhow::anyhow!("RPC server stop failed: {}", e))?;

    orchestrator
        .shutdown()
        .await
        .map_err(|e| anyhow::anyhow!("orchestrator shutdown failed: {}", e))?;

    info!("shutdown complete.");

    Ok(())
}
