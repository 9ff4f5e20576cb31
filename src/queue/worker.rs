//! Single-consumer job queue.
//!
//! Command handlers hold cheap `JobQueue` clones and push work without
//! blocking. Exactly one `Worker` task drains the channel and runs each job to
//! completion before receiving the next, so jobs execute strictly in
//! submission order and never overlap.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::QueueConfig;
use crate::error::{JobError, QueueError};
use crate::queue::{AbortHook, Job, JobAbort, JobId, JobRecord, JobState, JobTracker};

/// Longest time an abort hook may take before the worker moves on.
const ABORT_HOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Producer handle for the job queue.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<Job>,
    pending: Arc<AtomicUsize>,
    tracker: Arc<JobTracker>,
    max_pending: Option<usize>,
}

impl JobQueue {
    /// Create the queue and its single worker. The worker does nothing until
    /// `Worker::spawn` or `Worker::run` is called.
    pub fn new(config: QueueConfig) -> (Self, Worker) {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let tracker = Arc::new(JobTracker::new());

        let queue = Self {
            tx,
            pending: Arc::clone(&pending),
            tracker: Arc::clone(&tracker),
            max_pending: config.max_pending,
        };
        let worker = Worker {
            rx,
            pending,
            tracker,
            job_timeout: config.job_timeout,
        };
        (queue, worker)
    }

    /// Append a job to the tail of the queue.
    ///
    /// Never blocks. Fails only when the worker has stopped or the optional
    /// pending limit is reached.
    pub fn enqueue(&self, job: Job) -> Result<JobId, QueueError> {
        let reserved = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| match self.max_pending {
                Some(max) if n >= max => None,
                _ => Some(n + 1),
            });
        if reserved.is_err() {
            let max = self.max_pending.unwrap_or_default();
            tracing::warn!(job_id = %job.id, label = %job.label, max, "Job queue full, rejecting job");
            return Err(QueueError::Full { max });
        }

        let id = job.id;
        let label = job.label.clone();
        let session = job.session.clone();
        self.tracker.register(JobRecord::for_job(&job));

        if self.tx.send(job).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            self.tracker.forget(id);
            tracing::error!(job_id = %id, "Job queue closed, worker is not running");
            return Err(QueueError::Closed);
        }

        tracing::debug!(job_id = %id, label = %label, session = %session, pending = self.pending(), "Enqueued job");
        Ok(id)
    }

    /// Number of jobs waiting to start.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn tracker(&self) -> &Arc<JobTracker> {
        &self.tracker
    }
}

/// The single consumer of a `JobQueue`.
pub struct Worker {
    rx: mpsc::UnboundedReceiver<Job>,
    pending: Arc<AtomicUsize>,
    tracker: Arc<JobTracker>,
    job_timeout: Option<Duration>,
}

impl Worker {
    /// Run the worker on its own task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Process jobs until every `JobQueue` handle has been dropped.
    pub async fn run(mut self) {
        tracing::info!(timeout = ?self.job_timeout, "Job worker started");

        while let Some(job) = self.rx.recv().await {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            self.execute(job).await;
        }

        tracing::info!("Job queue closed, worker stopping");
    }

    /// Run one job and record its terminal state. Never propagates failure.
    async fn execute(&self, job: Job) -> JobState {
        let id = job.id;
        let label = job.label.clone();
        let session = job.session.clone();

        if let Err(e) = self.tracker.transition(id, JobState::Running, None) {
            tracing::warn!(job_id = %id, "Could not mark job running: {}", e);
        }
        tracing::info!(job_id = %id, label = %label, session = %session, "Job started");

        let started = Instant::now();
        let outcome = self.run_payload(id, job).await;
        let elapsed = started.elapsed();

        let (state, reason) = match outcome {
            Ok(()) => {
                tracing::info!(job_id = %id, label = %label, ?elapsed, "Job completed");
                (JobState::Completed, None)
            }
            Err(e) => {
                tracing::error!(job_id = %id, label = %label, ?elapsed, "Job failed: {}", e);
                (JobState::Failed, Some(e.to_string()))
            }
        };

        if let Err(e) = self.tracker.transition(id, state, reason) {
            tracing::warn!(job_id = %id, "Could not record job outcome: {}", e);
        }
        state
    }

    /// Await the payload, converting errors, panics and timeouts into `JobError`.
    async fn run_payload(&self, id: JobId, job: Job) -> Result<(), JobError> {
        let (payload, on_abort) = job.into_parts();
        let guarded = AssertUnwindSafe(async move { payload().await }).catch_unwind();

        let result = match self.job_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, guarded).await {
                Ok(result) => result,
                Err(_) => {
                    notify_abort(id, on_abort, JobAbort::TimedOut(timeout)).await;
                    return Err(JobError::Timeout { id, timeout });
                }
            },
            None => guarded.await,
        };

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(JobError::Failed {
                id,
                reason: e.to_string(),
            }),
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                notify_abort(id, on_abort, JobAbort::Panicked(reason.clone())).await;
                Err(JobError::Panicked { id, reason })
            }
        }
    }
}

/// Run the job's abort hook, bounded by `ABORT_HOOK_TIMEOUT`.
async fn notify_abort(id: JobId, hook: Option<AbortHook>, abort: JobAbort) {
    let Some(hook) = hook else {
        return;
    };
    let guarded = AssertUnwindSafe(hook(abort)).catch_unwind();
    match tokio::time::timeout(ABORT_HOOK_TIMEOUT, guarded).await {
        Ok(Ok(())) => {}
        Ok(Err(panic)) => {
            tracing::warn!(job_id = %id, "Abort hook panicked: {}", panic_message(panic.as_ref()));
        }
        Err(_) => tracing::warn!(job_id = %id, timeout = ?ABORT_HOOK_TIMEOUT, "Abort hook timed out"),
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
