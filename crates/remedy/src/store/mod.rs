//! The narrow storage interface the job core reads and writes through.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::job::{JobId, JobRecord, JobStatus};

pub mod sqlite;

pub use sqlite::SqliteJobStore;

/// Filters for listing jobs.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobQuery {
    pub status: Option<JobStatus>,
    pub target_key: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// A page of jobs, newest first.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobList {
    pub jobs: Vec<JobRecord>,
    pub total: u64,
}

/// Persistence for job records.
///
/// Implementations must reject a second active (pending or processing) job
/// for the same target key with [`StoreError::Conflict`].
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Inserts a new record.
    async fn create(&self, record: &JobRecord) -> Result<(), StoreError>;

    /// Reads the current record, or [`StoreError::NotFound`].
    async fn get(&self, id: &JobId) -> Result<JobRecord, StoreError>;

    /// Overwrites an existing record, or [`StoreError::NotFound`] if it vanished.
    async fn save(&self, record: &JobRecord) -> Result<(), StoreError>;

    /// The pending or processing job for `target_key`, if any.
    async fn find_active(&self, target_key: &str) -> Result<Option<JobRecord>, StoreError>;

    async fn list(&self, query: &JobQuery) -> Result<JobList, StoreError>;
}
