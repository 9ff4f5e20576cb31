//! Job state tracking for status queries.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::error::JobError;
use crate::queue::{JobId, JobRecord, JobState};

/// Finished records kept for status queries before the oldest are dropped.
const MAX_FINISHED_RECORDS: usize = 1024;

#[derive(Default)]
struct TrackerInner {
    records: HashMap<JobId, JobRecord>,
    finished: VecDeque<JobId>,
}

/// Records state transitions for every job the queue has seen.
///
/// Uses a std `Mutex` so `JobQueue::enqueue` can register jobs without
/// awaiting. Critical sections never hold the lock across an await.
#[derive(Default)]
pub struct JobTracker {
    inner: Mutex<TrackerInner>,
}

/// Counts of tracked jobs by state.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct QueueSummary {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn register(&self, record: JobRecord) {
        self.lock().records.insert(record.id, record);
    }

    pub(crate) fn forget(&self, id: JobId) {
        self.lock().records.remove(&id);
    }

    /// Apply a state transition to a tracked job.
    pub fn transition(
        &self,
        id: JobId,
        next: JobState,
        reason: Option<String>,
    ) -> Result<(), JobError> {
        let mut inner = self.lock();
        let record = inner.records.get_mut(&id).ok_or(JobError::NotFound { id })?;
        record.transition_to(next, reason)?;

        if next.is_terminal() {
            inner.finished.push_back(id);
            while inner.finished.len() > MAX_FINISHED_RECORDS {
                if let Some(oldest) = inner.finished.pop_front() {
                    inner.records.remove(&oldest);
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, id: JobId) -> Option<JobRecord> {
        self.lock().records.get(&id).cloned()
    }

    pub fn summary(&self) -> QueueSummary {
        let inner = self.lock();
        let mut summary = QueueSummary::default();
        for record in inner.records.values() {
            match record.state {
                JobState::Pending => summary.pending += 1,
                JobState::Running => summary.running += 1,
                JobState::Completed => summary.completed += 1,
                JobState::Failed => summary.failed += 1,
            }
        }
        summary.total = inner.records.len();
        summary
    }
}
