// Semantica Infrastructure - SQLite Adapter
// Implements: StorageAdapter

mod connection;
mod migration;
mod storage_adapter;

pub use connection::create_pool;
pub use migration::{rollback, run_migrations};
pub use storage_adapter::SqliteStorageAdapter;

// Note: sqlx::Error conversion is handled by wrapping in helper functions
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
