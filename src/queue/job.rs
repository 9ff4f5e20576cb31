//! Job definition and state machine.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::error::JobError;
use crate::session::SessionId;

/// Identifier assigned to a job at construction time.
pub type JobId = Uuid;

/// Deferred unit of work. Produces the job future when the worker picks it up.
pub type JobPayload = Box<dyn FnOnce() -> BoxFuture<'static, crate::Result<()>> + Send>;

/// Run by the worker when it stops waiting for a payload that never finished.
pub type AbortHook = Box<dyn FnOnce(JobAbort) -> BoxFuture<'static, ()> + Send>;

/// Why the worker gave up on a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobAbort {
    TimedOut(Duration),
    Panicked(String),
}

impl fmt::Display for JobAbort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimedOut(timeout) => write!(f, "timed out after {timeout:?}"),
            Self::Panicked(_) => f.write_str("aborted unexpectedly"),
        }
    }
}

/// One deferred unit of work.
///
/// The payload owns everything it needs (input document, output destination,
/// reply target), so nothing it captured can change after enqueue.
pub struct Job {
    pub id: JobId,
    /// Operation name, used in logs and status summaries.
    pub label: String,
    pub session: SessionId,
    pub created_at: DateTime<Utc>,
    payload: JobPayload,
    on_abort: Option<AbortHook>,
}

impl Job {
    pub fn new<F, Fut>(label: impl Into<String>, session: SessionId, f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = crate::Result<()>> + Send + 'static,
    {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            session,
            created_at: Utc::now(),
            payload: Box::new(move || Box::pin(f())),
            on_abort: None,
        }
    }

    /// Register a hook for timeouts and panics. The payload has been dropped
    /// by the time it runs, so it cannot report those outcomes itself.
    pub fn on_abort<F, Fut>(mut self, f: F) -> Self
    where
        F: FnOnce(JobAbort) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_abort = Some(Box::new(move |abort| Box::pin(f(abort))));
        self
    }

    pub(crate) fn into_parts(self) -> (JobPayload, Option<AbortHook>) {
        (self.payload, self.on_abort)
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("session", &self.session)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Lifecycle of a job.
///
/// ```text
/// Pending ──► Running ──► Completed
///                    └──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobState {
    /// Terminal states are never left and never retried.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Pending, JobState::Running)
                | (JobState::Running, JobState::Completed)
                | (JobState::Running, JobState::Failed)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Observable record of a job, kept by the tracker after the payload is gone.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: JobId,
    pub label: String,
    pub session: SessionId,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Failure reason when `state` is `Failed`.
    pub failure: Option<String>,
}

impl JobRecord {
    pub fn for_job(job: &Job) -> Self {
        Self {
            id: job.id,
            label: job.label.clone(),
            session: job.session.clone(),
            state: JobState::Pending,
            created_at: job.created_at,
            started_at: None,
            finished_at: None,
            failure: None,
        }
    }

    /// Move to `next`, stamping timestamps. Illegal transitions are rejected.
    pub fn transition_to(&mut self, next: JobState, reason: Option<String>) -> Result<(), JobError> {
        if !self.state.can_transition_to(next) {
            return Err(JobError::InvalidTransition {
                id: self.id,
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }

        let now = Utc::now();
        match next {
            JobState::Running => self.started_at = Some(now),
            JobState::Completed | JobState::Failed => self.finished_at = Some(now),
            JobState::Pending => {}
        }
        if next == JobState::Failed {
            self.failure = reason;
        }
        self.state = next;
        Ok(())
    }
}
