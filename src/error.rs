//! Error types for pdfdesk.

use std::time::Duration;

use uuid::Uuid;

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Operation error: {0}")]
    Operation(#[from] crate::pdf::OperationError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to prepare work directory {path}: {reason}")]
    WorkDir { path: String, reason: String },
}

/// Chat transport errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send message on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Failed to edit message {message_id} on channel {name}: {reason}")]
    EditFailed {
        name: String,
        message_id: String,
        reason: String,
    },

    #[error("Failed to download {file_id} on channel {name}: {reason}")]
    DownloadFailed {
        name: String,
        file_id: String,
        reason: String,
    },

    #[error("Channel {name} API error: {reason}")]
    Api { name: String, reason: String },

    #[error("Channel {name} health check failed: {reason}")]
    HealthCheckFailed { name: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised when submitting work to the job queue.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Job queue is closed (worker stopped)")]
    Closed,

    #[error("Job queue is full ({max} pending jobs)")]
    Full { max: usize },
}

/// Errors raised while a job executes or changes state.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Job {id} not found")]
    NotFound { id: Uuid },

    #[error("Job {id} cannot transition from {from} to {to}")]
    InvalidTransition { id: Uuid, from: String, to: String },

    #[error("Job {id} timed out after {timeout:?}")]
    Timeout { id: Uuid, timeout: Duration },

    #[error("Job {id} panicked: {reason}")]
    Panicked { id: Uuid, reason: String },

    #[error("Job {id} failed: {reason}")]
    Failed { id: Uuid, reason: String },
}

/// Errors detected by the command dispatcher before any job is built.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("No current document for session {session}")]
    NoDocument { session: String },

    #[error("Merge needs at least two documents, got {count}")]
    MergeSetTooSmall { count: usize },

    #[error("Invalid argument for /{command}: {reason}")]
    InvalidArgument { command: String, reason: String },

    #[error("Unsupported upload {file_name}: not a PDF")]
    NotAPdf { file_name: String },

    #[error("Failed to enqueue job: {0}")]
    Queue(#[from] QueueError),
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
