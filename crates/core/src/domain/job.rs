// Job entity and state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::domain::error::DomainError;

pub type JobId = i64;

/// The seven states a job moves through. Transitions not listed in the
/// diagram below are rejected by `Job::transition`.
///
/// ```text
/// scheduled ──► available ──► executing ──► completed
///      │            │             │
///      │            │             ├──► retryable ──► available
///      │            │             │
///      │            │             └──► discarded
///      │            │
///      └────────────┴────────────────────────► cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Scheduled,
    Available,
    Executing,
    Completed,
    Retryable,
    Discarded,
    Cancelled,
}

impl JobState {
    /// Terminal states never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Discarded | JobState::Cancelled
        )
    }

    /// All terminal states, for adapter-side `state IN (...)` predicates.
    pub fn terminals() -> &'static [JobState] {
        &[JobState::Completed, JobState::Discarded, JobState::Cancelled]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Scheduled => "scheduled",
            JobState::Available => "available",
            JobState::Executing => "executing",
            JobState::Completed => "completed",
            JobState::Retryable => "retryable",
            JobState::Discarded => "discarded",
            JobState::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "scheduled" => JobState::Scheduled,
            "available" => JobState::Available,
            "executing" => JobState::Executing,
            "completed" => JobState::Completed,
            "retryable" => JobState::Retryable,
            "discarded" => JobState::Discarded,
            "cancelled" => JobState::Cancelled,
            _ => return None,
        })
    }

    /// True if `self -> to` is a legal edge of the state diagram.
    fn can_transition_to(self, to: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, to),
            (Scheduled, Available)
                | (Available, Executing)
                | (Executing, Completed)
                | (Executing, Retryable)
                | (Retryable, Available)
                | (Executing, Discarded)
                | (Scheduled, Cancelled)
                | (Available, Cancelled)
                | (Executing, Cancelled)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One record per failed attempt, appended to `Job::errors`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub at: DateTime<Utc>,
    pub attempt: i32,
    pub error: String,
    pub stacktrace: Option<String>,
}

impl ErrorRecord {
    pub fn new(now: DateTime<Utc>, attempt: i32, error: impl Into<String>) -> Self {
        Self {
            at: now,
            attempt,
            error: error.into(),
            stacktrace: None,
        }
    }
}

/// A persisted unit of work, addressed by a monotonically increasing integer id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub state: JobState,
    pub queue: String,
    pub worker: String,
    pub args: Value,
    pub meta: Value,
    pub tags: Vec<String>,
    pub errors: Vec<ErrorRecord>,
    pub attempt: i32,
    pub max_attempts: i32,
    pub priority: i32,
    pub inserted_at: DateTime<Utc>,
    pub scheduled_at: DateTime<Utc>,
    pub attempted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub discarded_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Validate and apply a state transition, stamping the matching terminal
    /// timestamp (or clearing it, for the `Retryable -> Available` edge that
    /// a Stager-equivalent pass performs).
    pub fn transition(&mut self, to: JobState, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.state.can_transition_to(to) {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }
        match to {
            JobState::Completed => self.completed_at = Some(now),
            JobState::Discarded => self.discarded_at = Some(now),
            JobState::Cancelled => self.cancelled_at = Some(now),
            JobState::Executing => self.attempted_at = Some(now),
            _ => {}
        }
        self.state = to;
        Ok(())
    }

    /// True when exactly one terminal timestamp is set, matching `state`.
    pub fn terminal_timestamp_invariant_holds(&self) -> bool {
        let set_count = [self.completed_at, self.discarded_at, self.cancelled_at]
            .iter()
            .filter(|t| t.is_some())
            .count();
        if self.state.is_terminal() {
            set_count == 1
        } else {
            set_count == 0
        }
    }

    #[cfg(test)]
    pub fn new_test(id: JobId, queue: &str, worker: &str) -> Self {
        let now = Utc::now();
        Self {
            id,
            state: JobState::Available,
            queue: queue.to_string(),
            worker: worker.to_string(),
            args: serde_json::json!({}),
            meta: serde_json::json!({}),
            tags: vec![],
            errors: vec![],
            attempt: 0,
            max_attempts: 20,
            priority: 0,
            inserted_at: now,
            scheduled_at: now,
            attempted_at: None,
            completed_at: None,
            discarded_at: None,
            cancelled_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn available_to_executing_stamps_attempted_at() {
        let mut job = Job::new_test(1, "default", "noop");
        let now = Utc::now();
        job.transition(JobState::Executing, now).unwrap();
        assert_eq!(job.state, JobState::Executing);
        assert_eq!(job.attempted_at, Some(now));
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let mut job = Job::new_test(1, "default", "noop");
        let err = job.transition(JobState::Completed, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
        assert_eq!(job.state, JobState::Available);
    }

    #[test]
    fn terminal_timestamp_invariant() {
        let mut job = Job::new_test(1, "default", "noop");
        assert!(job.terminal_timestamp_invariant_holds());
        job.transition(JobState::Executing, Utc::now()).unwrap();
        assert!(job.terminal_timestamp_invariant_holds());
        job.transition(JobState::Completed, Utc::now()).unwrap();
        assert!(job.terminal_timestamp_invariant_holds());
    }

    #[test]
    fn retry_cycle_returns_to_available() {
        let mut job = Job::new_test(1, "default", "noop");
        job.transition(JobState::Executing, Utc::now()).unwrap();
        job.transition(JobState::Retryable, Utc::now()).unwrap();
        job.transition(JobState::Available, Utc::now()).unwrap();
        assert_eq!(job.state, JobState::Available);
    }

    #[test]
    fn cancel_reachable_from_scheduled_available_executing() {
        for start in [JobState::Scheduled, JobState::Available, JobState::Executing] {
            let mut job = Job::new_test(1, "default", "noop");
            job.state = start;
            job.transition(JobState::Cancelled, Utc::now()).unwrap();
            assert_eq!(job.state, JobState::Cancelled);
        }
    }
}
