// Application Layer - Use Cases and Business Logic

pub mod backoff;
pub mod dispatcher;
pub mod isolation_pool;
pub mod lifecycle;
pub mod orchestrator;
pub mod panic_guard;
pub mod plugins;
pub mod shutdown;
pub mod telemetry;

// Re-exports
pub use dispatcher::QueueDispatcher;
pub use isolation_pool::{IsolationPool, IsolationPoolConfig};
pub use lifecycle::LifecycleExecutor;
pub use orchestrator::{InsertOptions, Orchestrator, OrchestratorConfig};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
pub use telemetry::{TelemetryBus, TelemetryEvent};
