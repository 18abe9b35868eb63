//! A trivial demonstration worker so the RPC surface has something to
//! dispatch to out of the box. Embedders link `semantica-core` directly and
//! register their own workers instead of relying on this one.

use async_trait::async_trait;
use semantica_core::domain::job::Job;
use semantica_core::domain::worker::{Worker, WorkerOutcome};
use tracing::info;

pub struct EchoWorker;

#[async_trait]
impl Worker for EchoWorker {
    fn name(&self) -> &str {
        "echo"
    }

    async fn perform(&self, job: &Job) -> WorkerOutcome {
        info!(job_id = job.id, args = %job.args, "echo worker performing job");
        WorkerOutcome::Ok(Some(job.args.clone()))
    }
}
