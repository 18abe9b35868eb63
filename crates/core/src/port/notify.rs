// Optional Listen/Notify sub-port. Only adapters for
// engines with native pub/sub (PostgreSQL's LISTEN/NOTIFY) implement this;
// SQLite and MySQL rely on the poll interval plus the Stager's
// dispatch-broadcast instead, a latency trade-off rather than a correctness
// gap.

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait NotifyListener: Send + Sync {
    /// Wakes dispatchers listening for `queue` between polls.
    async fn notify(&self, queue: &str) -> Result<()>;

    /// Installs a single callback invoked with the queue name for every
    /// insert notification. Implementations reconnect the underlying
    /// channel with exponential backoff (up to 30s, up to 10 attempts) on
    /// connection loss rather than surfacing the drop to the caller.
    async fn listen(&self, callback: Box<dyn Fn(String) + Send + Sync>) -> Result<()>;
}
