// Domain Layer - Pure business logic and entities

pub mod error;
pub mod job;
pub mod queue;
pub mod registry;
pub mod unique;
pub mod worker;

// Re-exports
pub use error::DomainError;
pub use job::{ErrorRecord, Job, JobId, JobState};
pub use queue::{QueueConfig, QueueId};
pub use registry::WorkerRegistry;
pub use unique::{UniqueField, UniqueOptions, UniquePeriod};
pub use worker::{IsolationSpec, Worker, WorkerOutcome};
