// Isolation Pool subprocess context: a context is one
// long-lived `tokio::process::Command` child that accepts line-delimited
// JSON `execute` frames on stdin and answers with `result`/`error` frames on
// stdout, one job at a time. The SIGTERM-then-SIGKILL termination race (via
// `nix`) is spawned once per context and reused across jobs until
// idle-reaped or killed, rather than spawned fresh per job.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{info, warn};

use semantica_core::domain::job::Job;
use semantica_core::domain::worker::WorkerOutcome;
use semantica_core::port::isolation_context::{ExecutionError, IsolationContext, IsolationContextFactory};

#[derive(Serialize)]
struct ExecuteFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(rename = "jobId")]
    job_id: i64,
    job: &'a Job,
    #[serde(rename = "workerPath")]
    worker_path: &'a str,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ResponseFrame {
    Result { result: OutcomeWire },
    Error { error: String, stack: Option<String> },
}

#[derive(Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum OutcomeWire {
    Ok { value: Option<Value> },
    Error { message: String },
    Cancel { reason: String },
    Snooze { seconds: u64 },
}

impl From<OutcomeWire> for WorkerOutcome {
    fn from(wire: OutcomeWire) -> Self {
        match wire {
            OutcomeWire::Ok { value } => WorkerOutcome::Ok(value),
            OutcomeWire::Error { message } => WorkerOutcome::Error(message),
            OutcomeWire::Cancel { reason } => WorkerOutcome::Cancel(reason),
            OutcomeWire::Snooze { seconds } => WorkerOutcome::Snooze(seconds),
        }
    }
}

/// Spawns the generic runner process backing every context (e.g. a small
/// harness that `require`/`import`s the module named by `workerPath` per
/// job and posts the result back).
pub struct SubprocessContextFactory {
    command: String,
    args: Vec<String>,
}

impl SubprocessContextFactory {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

#[async_trait]
impl IsolationContextFactory for SubprocessContextFactory {
    async fn spawn(&self) -> Result<Arc<dyn IsolationContext>, ExecutionError> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecutionError::SpawnFailed(e.to_string()))?;

        let pid = child.id().ok_or_else(|| {
            ExecutionError::SpawnFailed("child exited before its pid could be read".to_string())
        })? as i32;
        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = BufReader::new(child.stdout.take().expect("piped stdout"));

        Ok(Arc::new(SubprocessContext {
            pid,
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(stdout),
            alive: AtomicBool::new(true),
        }))
    }
}

pub struct SubprocessContext {
    pid: i32,
    child: Mutex<Child>,
    stdin: Mutex<tokio::process::ChildStdin>,
    stdout: Mutex<BufReader<tokio::process::ChildStdout>>,
    alive: AtomicBool,
}

impl SubprocessContext {
    async fn send_and_await(&self, job: &Job, worker_path: &str) -> Result<WorkerOutcome, ExecutionError> {
        let frame = ExecuteFrame {
            kind: "execute",
            job_id: job.id,
            job,
            worker_path,
        };
        let mut line = serde_json::to_string(&frame).map_err(|e| ExecutionError::Io(e.to_string()))?;
        line.push('\n');

        {
            let mut stdin = self.stdin.lock().await;
            stdin
                .write_all(line.as_bytes())
                .await
                .map_err(|e| ExecutionError::Io(e.to_string()))?;
            stdin.flush().await.map_err(|e| ExecutionError::Io(e.to_string()))?;
        }

        let mut response = String::new();
        let read = {
            let mut stdout = self.stdout.lock().await;
            stdout.read_line(&mut response).await
        };

        match read {
            Ok(0) => {
                let code = self
                    .child
                    .lock()
                    .await
                    .try_wait()
                    .ok()
                    .flatten()
                    .and_then(|status| status.code());
                Err(ExecutionError::ExitedUnexpectedly(code))
            }
            Ok(_) => match serde_json::from_str::<ResponseFrame>(response.trim()) {
                Ok(ResponseFrame::Result { result }) => Ok(result.into()),
                Ok(ResponseFrame::Error { error, stack }) => {
                    if let Some(stack) = stack {
                        warn!(pid = self.pid, stack = %stack, "isolated job failed");
                    }
                    Ok(WorkerOutcome::Error(error))
                }
                Err(e) => Err(ExecutionError::Io(format!("malformed response frame: {e}"))),
            },
            Err(e) => Err(ExecutionError::Io(e.to_string())),
        }
    }
}

#[async_trait]
impl IsolationContext for SubprocessContext {
    async fn execute(
        &self,
        job: &Job,
        worker_path: &str,
        timeout: Duration,
    ) -> Result<WorkerOutcome, ExecutionError> {
        match tokio::time::timeout(timeout, self.send_and_await(job, worker_path)).await {
            Ok(result) => {
                if result.is_err() {
                    self.alive.store(false, Ordering::SeqCst);
                }
                result
            }
            Err(_) => {
                self.alive.store(false, Ordering::SeqCst);
                Err(ExecutionError::TimedOut(timeout.as_millis() as u64))
            }
        }
    }

    /// SIGTERM, then SIGKILL if the process has not exited within a grace
    /// window (mirrors `SubprocessExecutor::kill_graceful`).
    async fn terminate(&self) {
        self.alive.store(false, Ordering::SeqCst);

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(self.pid);
            if kill(pid, Signal::SIGTERM).is_err() {
                return;
            }
            for _ in 0..20 {
                tokio::time::sleep(Duration::from_millis(100)).await;
                if let Ok(Some(_)) = self.child.lock().await.try_wait() {
                    info!(pid = self.pid, "isolation context exited after SIGTERM");
                    return;
                }
            }
            warn!(pid = self.pid, "isolation context did not exit after SIGTERM, sending SIGKILL");
            let _ = kill(pid, Signal::SIGKILL);
        }

        #[cfg(windows)]
        {
            let _ = self.child.lock().await.start_kill();
        }
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

/// Encodes a `WorkerOutcome` as the `result` field the reference runner
/// harness emits, for use by test doubles and the harness's own fixtures.
pub fn encode_outcome(outcome: &WorkerOutcome) -> Value {
    match outcome {
        WorkerOutcome::Ok(value) => json!({"status": "ok", "value": value}),
        WorkerOutcome::Error(message) => json!({"status": "error", "message": message}),
        WorkerOutcome::Cancel(reason) => json!({"status": "cancel", "reason": reason}),
        WorkerOutcome::Snooze(seconds) => json!({"status": "snooze", "seconds": seconds}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semantica_core::domain::job::{Job, JobState};

    // `Job::new_test` is `#[cfg(test)]`-gated inside `semantica-core` itself
    // and so is invisible to a downstream crate's own test builds; build the
    // fixture directly instead.
    fn test_job() -> Job {
        let now = chrono::Utc::now();
        Job {
            id: 1,
            state: JobState::Executing,
            queue: "default".to_string(),
            worker: "noop".to_string(),
            args: serde_json::json!({}),
            meta: serde_json::json!({}),
            tags: vec![],
            errors: vec![],
            attempt: 1,
            max_attempts: 20,
            priority: 0,
            inserted_at: now,
            scheduled_at: now,
            attempted_at: Some(now),
            completed_at: None,
            discarded_at: None,
            cancelled_at: None,
        }
    }

    fn echo_ok_harness() -> SubprocessContextFactory {
        // A one-line shell harness standing in for a real runner: echoes a
        // fixed `ok` result for every frame it reads on stdin.
        SubprocessContextFactory::new(
            "sh",
            vec![
                "-c".to_string(),
                "while read -r _line; do echo '{\"type\":\"result\",\"jobId\":1,\"result\":{\"status\":\"ok\",\"value\":null}}'; done".to_string(),
            ],
        )
    }

    fn hang_harness() -> SubprocessContextFactory {
        SubprocessContextFactory::new("sh", vec!["-c".to_string(), "sleep 30".to_string()])
    }

    #[tokio::test]
    async fn execute_resolves_ok_outcome_from_harness() {
        let factory = echo_ok_harness();
        let context = factory.spawn().await.unwrap();
        let job = test_job();

        let outcome = context
            .execute(&job, "workers/noop.js", Duration::from_secs(2))
            .await
            .unwrap();
        assert!(matches!(outcome, WorkerOutcome::Ok(None)));
        assert!(context.is_alive());
        context.terminate().await;
    }

    #[tokio::test]
    async fn execute_times_out_and_marks_context_dead() {
        let factory = hang_harness();
        let context = factory.spawn().await.unwrap();
        let job = test_job();

        let outcome = context
            .execute(&job, "workers/noop.js", Duration::from_millis(200))
            .await;
        assert!(matches!(outcome, Err(ExecutionError::TimedOut(_))));
        assert!(!context.is_alive());
    }

    #[test]
    fn encode_outcome_round_trips_each_variant() {
        assert_eq!(
            encode_outcome(&WorkerOutcome::Snooze(30)),
            json!({"status": "snooze", "seconds": 30})
        );
        assert_eq!(
            encode_outcome(&WorkerOutcome::Cancel("dup".to_string())),
            json!({"status": "cancel", "reason": "dup"})
        );
    }
}
