// Background Plugins: Stager, Rescuer, Pruner. Each runs a
// `tokio::time::interval` loop around a fallible maintenance call, with
// per-tick errors logged and swallowed rather than propagated.

pub mod pruner;
pub mod rescuer;
pub mod stager;

pub use pruner::Pruner;
pub use rescuer::Rescuer;
pub use stager::Stager;

use async_trait::async_trait;

/// `{name, start(context), stop(), validate()}`.
/// Validation runs before `start`; any errors returned by `validate` prevent
/// the Orchestrator from starting at all.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn validate(&self) -> Vec<String> {
        Vec::new()
    }

    /// Runs until `shutdown` fires. Each tick's fallible action must catch
    /// its own errors and emit `plugin:error` rather than propagate —
    /// enforced here by each plugin's own `tick()` implementation, never by
    /// this trait.
    async fn run(&self, shutdown: crate::application::shutdown::ShutdownToken);
}
