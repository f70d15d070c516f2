//! Job store backed by rusqlite.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{JobList, JobQuery, JobStore};
use crate::db::job_repo::{self, JobFilter, JobRow};
use crate::db::{Database, DatabaseError};
use crate::error::StoreError;
use crate::job::{ItemFailure, JobId, JobRecord, JobStatus};

// ─── Helpers ────────────────────────────────────────────────────────────────

fn parse_timestamp(s: &str, job_id: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            log::warn!("Job {}: failed to parse timestamp '{}': {}", job_id, s, e);
            Utc::now()
        })
}

fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn to_count(value: i64, field: &str, job_id: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt {
        job_id: job_id.to_string(),
        reason: format!("{} out of range: {}", field, value),
    })
}

fn record_to_row(record: &JobRecord) -> JobRow {
    let failures = if record.failures.is_empty() {
        None
    } else {
        serde_json::to_string(&record.failures).ok()
    };

    JobRow {
        id: record.id.to_string(),
        target_key: record.target_key.clone(),
        status: record.status.as_str().to_string(),
        total_items: i64::from(record.total_items),
        processed_items: i64::from(record.processed_items),
        success_count: i64::from(record.success_count),
        failed_count: i64::from(record.failed_count),
        skipped_count: i64::from(record.skipped_count),
        progress: i64::from(record.progress),
        current_item: record.current_item.clone(),
        error_message: record.error_message.clone(),
        failures,
        created_at: format_timestamp(record.created_at),
        updated_at: format_timestamp(record.updated_at),
        completed_at: record.completed_at.map(format_timestamp),
    }
}

fn row_to_record(row: &JobRow) -> Result<JobRecord, StoreError> {
    let status = JobStatus::parse(&row.status).ok_or_else(|| StoreError::Corrupt {
        job_id: row.id.clone(),
        reason: format!("unknown status '{}'", row.status),
    })?;

    let failures: Vec<ItemFailure> = match row.failures.as_deref() {
        Some(json) => serde_json::from_str(json).map_err(|e| StoreError::Corrupt {
            job_id: row.id.clone(),
            reason: format!("invalid failures column: {}", e),
        })?,
        None => Vec::new(),
    };

    let progress = to_count(row.progress, "progress", &row.id)?.min(100) as u8;

    Ok(JobRecord {
        id: JobId::from(row.id.clone()),
        target_key: row.target_key.clone(),
        status,
        total_items: to_count(row.total_items, "total_items", &row.id)?,
        processed_items: to_count(row.processed_items, "processed_items", &row.id)?,
        success_count: to_count(row.success_count, "success_count", &row.id)?,
        failed_count: to_count(row.failed_count, "failed_count", &row.id)?,
        skipped_count: to_count(row.skipped_count, "skipped_count", &row.id)?,
        progress,
        current_item: row.current_item.clone(),
        error_message: row.error_message.clone(),
        failures,
        created_at: parse_timestamp(&row.created_at, &row.id),
        updated_at: parse_timestamp(&row.updated_at, &row.id),
        completed_at: row
            .completed_at
            .as_deref()
            .map(|s| parse_timestamp(s, &row.id)),
    })
}

// ─── SqliteJobStore ─────────────────────────────────────────────────────────

/// Persistent job store backed by rusqlite.
///
/// All database operations are synchronous and sub-millisecond, so they run
/// inline on the calling task.
#[derive(Clone)]
pub struct SqliteJobStore {
    db: Database,
}

impl SqliteJobStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// In-memory store with migrations applied.
    pub fn in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn active_conflict(&self, target_key: &str) -> Result<Option<StoreError>, StoreError> {
        Ok(job_repo::find_active_by_target(&self.db, target_key)?.map(|row| {
            StoreError::Conflict {
                target_key: target_key.to_string(),
                existing_job_id: JobId::from(row.id),
            }
        }))
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn create(&self, record: &JobRecord) -> Result<(), StoreError> {
        if record.status.is_active() {
            if let Some(conflict) = self.active_conflict(&record.target_key)? {
                return Err(conflict);
            }
        }

        match job_repo::insert(&self.db, &record_to_row(record)) {
            Ok(()) => Ok(()),
            Err(e) if e.is_constraint_violation() => {
                // Lost a race with another writer; report whoever won.
                match self.active_conflict(&record.target_key)? {
                    Some(conflict) => Err(conflict),
                    None => Err(StoreError::Database(e)),
                }
            }
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    async fn get(&self, id: &JobId) -> Result<JobRecord, StoreError> {
        match job_repo::find_by_id(&self.db, id.as_str())? {
            Some(row) => row_to_record(&row),
            None => Err(StoreError::NotFound(id.clone())),
        }
    }

    async fn save(&self, record: &JobRecord) -> Result<(), StoreError> {
        let changed = job_repo::update(&self.db, &record_to_row(record))?;
        if changed == 0 {
            return Err(StoreError::NotFound(record.id.clone()));
        }
        Ok(())
    }

    async fn find_active(&self, target_key: &str) -> Result<Option<JobRecord>, StoreError> {
        job_repo::find_active_by_target(&self.db, target_key)?
            .as_ref()
            .map(row_to_record)
            .transpose()
    }

    async fn list(&self, query: &JobQuery) -> Result<JobList, StoreError> {
        let filter = JobFilter {
            status: query.status.map(|s| s.as_str().to_string()),
            target_key: query.target_key.clone(),
            limit: query.limit,
            offset: query.offset,
        };
        let (rows, total) = job_repo::query(&self.db, &filter)?;
        let jobs = rows
            .iter()
            .map(row_to_record)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(JobList { jobs, total })
    }
}
