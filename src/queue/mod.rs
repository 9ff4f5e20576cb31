//! Background job queue.
//!
//! - `Job`: a deferred, immutable unit of work
//! - `JobQueue` / `Worker`: many producers, one sequential consumer
//! - `JobTracker`: observable job states for status replies

mod job;
mod tracker;
mod worker;

pub use job::{AbortHook, Job, JobAbort, JobId, JobPayload, JobRecord, JobState};
pub use tracker::{JobTracker, QueueSummary};
pub use worker::{JobQueue, Worker};
pub(crate) use worker::panic_message;
