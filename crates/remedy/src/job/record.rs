//! The job record: lifecycle state and per-item accounting for one job.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::item::{ItemFailure, ItemOutcome};
use crate::error::JobStateError;

/// Opaque job handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generates a fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    /// Completed and failed jobs never change state again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Position in the lifecycle. Both terminal states share the last rank.
    pub fn rank(&self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Processing => 1,
            JobStatus::Completed | JobStatus::Failed => 2,
        }
    }

    /// Status only moves forward: pending -> processing -> completed | failed.
    /// A pending job may also fail directly.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `round(processed / total * 100)`, clamped to 100. Zero when `total` is zero.
pub fn progress_percent(processed: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let processed = u64::from(processed.min(total));
    let total = u64::from(total);
    ((processed * 100 + total / 2) / total) as u8
}

/// Persisted state of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: JobId,
    /// What is being processed. At most one active job exists per key.
    pub target_key: String,
    pub status: JobStatus,
    pub total_items: u32,
    pub processed_items: u32,
    pub success_count: u32,
    pub failed_count: u32,
    pub skipped_count: u32,
    /// Percentage 0-100.
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_item: Option<String>,
    /// Set only when the job failed as a whole.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Items that failed, in processing order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ItemFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Creates a pending record with all counters at zero.
    pub fn new(target_key: impl Into<String>, total_items: u32) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::generate(),
            target_key: target_key.into(),
            status: JobStatus::Pending,
            total_items,
            processed_items: 0,
            success_count: 0,
            failed_count: 0,
            skipped_count: 0,
            progress: 0,
            current_item: None,
            error_message: None,
            failures: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), JobStateError> {
        if !self.status.can_transition_to(next) {
            return Err(JobStateError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        if next.is_terminal() {
            self.completed_at = Some(self.updated_at);
        }
        Ok(())
    }

    /// Moves a pending job to processing.
    pub fn start(&mut self) -> Result<(), JobStateError> {
        self.transition(JobStatus::Processing)
    }

    /// Marks `label` as the item currently in flight.
    pub fn begin_item(&mut self, label: &str) {
        self.current_item = Some(label.to_string());
        self.updated_at = Utc::now();
    }

    /// Accounts for one processed item.
    pub fn record_outcome(
        &mut self,
        item_id: &str,
        outcome: &ItemOutcome,
    ) -> Result<(), JobStateError> {
        if self.status != JobStatus::Processing {
            return Err(JobStateError::InvalidTransition {
                from: self.status.to_string(),
                to: JobStatus::Processing.to_string(),
            });
        }
        if self.processed_items >= self.total_items {
            return Err(JobStateError::Overflow {
                total: self.total_items,
            });
        }

        match outcome {
            ItemOutcome::Success => self.success_count += 1,
            ItemOutcome::Failed(reason) => {
                self.failed_count += 1;
                self.failures.push(ItemFailure {
                    item_id: item_id.to_string(),
                    reason: reason.clone(),
                });
            }
            ItemOutcome::Skipped(_) => self.skipped_count += 1,
        }
        self.processed_items += 1;
        self.progress = progress_percent(self.processed_items, self.total_items);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Finishes a processing job once every item has been accounted for.
    pub fn complete(&mut self) -> Result<(), JobStateError> {
        if self.processed_items != self.total_items {
            return Err(JobStateError::Invariant(format!(
                "cannot complete with {} of {} items processed",
                self.processed_items, self.total_items
            )));
        }
        self.transition(JobStatus::Completed)?;
        self.current_item = None;
        self.progress = 100;
        Ok(())
    }

    /// Fails the job as a whole. Counters are left as they are.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), JobStateError> {
        self.transition(JobStatus::Failed)?;
        let message = message.into();
        self.error_message = Some(if message.trim().is_empty() {
            "Job failed".to_string()
        } else {
            message
        });
        Ok(())
    }

    /// Counts reached the total even if the status has not flipped yet.
    pub fn implies_completion(&self) -> bool {
        self.total_items > 0 && self.processed_items >= self.total_items
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// The most recent item failure reason, if any.
    pub fn last_failure(&self) -> Option<&ItemFailure> {
        self.failures.last()
    }

    /// Checks the record-level invariants.
    pub fn check_invariants(&self) -> Result<(), JobStateError> {
        let accounted = self.success_count + self.failed_count + self.skipped_count;
        if accounted != self.processed_items {
            return Err(JobStateError::Invariant(format!(
                "success {} + failed {} + skipped {} != processed {}",
                self.success_count, self.failed_count, self.skipped_count, self.processed_items
            )));
        }
        if self.processed_items > self.total_items {
            return Err(JobStateError::Invariant(format!(
                "processed {} exceeds total {}",
                self.processed_items, self.total_items
            )));
        }
        if self.progress > 100 {
            return Err(JobStateError::Invariant(format!(
                "progress {} out of range",
                self.progress
            )));
        }
        if self.error_message.is_some() != (self.status == JobStatus::Failed) {
            return Err(JobStateError::Invariant(format!(
                "error_message must be set exactly when failed (status {})",
                self.status
            )));
        }
        if self.failures.len() as u32 != self.failed_count {
            return Err(JobStateError::Invariant(format!(
                "{} failure entries for failed count {}",
                self.failures.len(),
                self.failed_count
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processing(total: u32) -> JobRecord {
        let mut job = JobRecord::new("shop-1:meta", total);
        job.start().unwrap();
        job
    }

    #[test]
    fn test_new_record_is_pending_and_zeroed() {
        let job = JobRecord::new("shop-1", 3);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.total_items, 3);
        assert_eq!(job.processed_items, 0);
        assert_eq!(job.progress, 0);
        assert!(job.error_message.is_none());
        assert!(!job.id.as_str().is_empty());
        job.check_invariants().unwrap();
    }

    #[test]
    fn test_status_transitions_only_move_forward() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(Pending.rank() < Processing.rank());
        assert!(Processing.rank() < Completed.rank());
        assert_eq!(Completed.rank(), Failed.rank());
        assert!(!Processing.can_transition_to(Pending));
        for terminal in [Completed, Failed] {
            for next in [Pending, Processing, Completed, Failed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("queued"), None);
    }

    #[test]
    fn test_progress_rounding() {
        assert_eq!(progress_percent(0, 0), 0);
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(2, 3), 67);
        assert_eq!(progress_percent(1, 8), 13);
        assert_eq!(progress_percent(3, 3), 100);
        assert_eq!(progress_percent(5, 3), 100);
    }

    #[test]
    fn test_record_outcome_counts() {
        let mut job = processing(3);
        job.record_outcome("a", &ItemOutcome::Success).unwrap();
        job.record_outcome("b", &ItemOutcome::failed("timeout")).unwrap();
        job.record_outcome("c", &ItemOutcome::skipped("already set"))
            .unwrap();

        assert_eq!(job.processed_items, 3);
        assert_eq!(job.success_count, 1);
        assert_eq!(job.failed_count, 1);
        assert_eq!(job.skipped_count, 1);
        assert_eq!(job.progress, 100);
        assert_eq!(job.last_failure().unwrap().item_id, "b");
        job.check_invariants().unwrap();
    }

    #[test]
    fn test_record_outcome_rejects_overflow() {
        let mut job = processing(1);
        job.record_outcome("a", &ItemOutcome::Success).unwrap();
        let err = job.record_outcome("b", &ItemOutcome::Success).unwrap_err();
        assert_eq!(err, JobStateError::Overflow { total: 1 });
        assert_eq!(job.processed_items, 1);
    }

    #[test]
    fn test_record_outcome_requires_processing() {
        let mut job = JobRecord::new("shop-1", 2);
        assert!(job.record_outcome("a", &ItemOutcome::Success).is_err());
    }

    #[test]
    fn test_complete_requires_all_items() {
        let mut job = processing(2);
        job.record_outcome("a", &ItemOutcome::Success).unwrap();
        assert!(job.complete().is_err());

        job.record_outcome("b", &ItemOutcome::Success).unwrap();
        job.begin_item("b");
        job.complete().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.current_item.is_none());
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_complete_empty_job_reports_full_progress() {
        let mut job = processing(0);
        job.complete().unwrap();
        assert_eq!(job.progress, 100);
        assert!(!job.implies_completion());
    }

    #[test]
    fn test_fail_preserves_counts_and_sets_message() {
        let mut job = processing(4);
        job.record_outcome("a", &ItemOutcome::Success).unwrap();
        job.fail("database went away").unwrap();

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.processed_items, 1);
        assert_eq!(job.error_message.as_deref(), Some("database went away"));
        job.check_invariants().unwrap();
    }

    #[test]
    fn test_fail_with_blank_message_still_sets_message() {
        let mut job = processing(1);
        job.fail("  ").unwrap();
        assert_eq!(job.error_message.as_deref(), Some("Job failed"));
    }

    #[test]
    fn test_terminal_records_cannot_change() {
        let mut job = processing(0);
        job.complete().unwrap();
        assert!(job.fail("late").is_err());
        assert!(job.start().is_err());
        assert!(job.error_message.is_none());
    }

    #[test]
    fn test_implies_completion() {
        let mut job = processing(2);
        assert!(!job.implies_completion());
        job.record_outcome("a", &ItemOutcome::Success).unwrap();
        job.record_outcome("b", &ItemOutcome::Success).unwrap();
        assert!(job.implies_completion());
        assert_eq!(job.status, JobStatus::Processing);
    }

    #[test]
    fn test_check_invariants_detects_mismatch() {
        let mut job = processing(3);
        job.processed_items = 2;
        job.success_count = 1;
        assert!(job.check_invariants().is_err());

        let mut job = processing(1);
        job.error_message = Some("oops".to_string());
        assert!(job.check_invariants().is_err());
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let job = JobRecord::new("shop-1", 1);
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["totalItems"], 1);
        assert_eq!(json["targetKey"], "shop-1");
        assert!(json.get("errorMessage").is_none());
    }
}
