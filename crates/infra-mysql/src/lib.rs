// Semantica Infrastructure - MySQL Adapter
// Implements: StorageAdapter. No `NotifyListener`: MySQL
// has no native pub/sub primitive, so this adapter relies on the poll
// interval plus the Stager's dispatch-broadcast instead.

mod connection;
mod migration;
mod storage_adapter;

pub use connection::create_pool;
pub use migration::{rollback, run_migrations};
pub use storage_adapter::MySqlStorageAdapter;
