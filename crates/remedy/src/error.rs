use std::path::PathBuf;
use thiserror::Error;

use crate::job::JobId;

#[derive(Error, Debug)]
pub enum RemedyError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Enqueue error: {0}")]
    Enqueue(#[from] EnqueueError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Job state error: {0}")]
    JobState(#[from] JobStateError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

/// Errors surfaced by a [`crate::store::JobStore`].
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("An active job already exists for '{target_key}': {existing_job_id}")]
    Conflict {
        target_key: String,
        existing_job_id: JobId,
    },

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Stored job '{job_id}' is unreadable: {reason}")]
    Corrupt { job_id: String, reason: String },

    /// The backing service could not be reached. SQLite reports its failures
    /// as `Database`; this is for `JobStore` implementations over a network
    /// service, where a read may fail and succeed on retry.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Violations of the job record lifecycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobStateError {
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Job already processed all {total} items")]
    Overflow { total: u32 },

    #[error("Job invariant violated: {0}")]
    Invariant(String),
}

#[derive(Error, Debug)]
pub enum EnqueueError {
    #[error("Invalid target key: {0}")]
    InvalidTarget(String),

    #[error("Job {existing_job_id} is still active for this target")]
    Conflict { existing_job_id: JobId },

    #[error("Too many items for one job: {0}")]
    TooManyItems(usize),

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for EnqueueError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict {
                existing_job_id, ..
            } => EnqueueError::Conflict { existing_job_id },
            other => EnqueueError::Store(other),
        }
    }
}

/// A job-level fault raised by an item processor. Terminates the whole job.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct JobFault {
    pub message: String,
}

impl JobFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to access session file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Session file '{path}' is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, RemedyError>;
