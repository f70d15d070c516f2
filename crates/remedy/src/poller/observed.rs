//! Merges pulled and pushed snapshots of one job into a single view.

use std::time::Duration;

use tokio::time::Instant;

use crate::job::JobRecord;

/// The poller's view of a job.
///
/// Snapshots arrive from two channels in no particular order. A snapshot is
/// applied only if it moves the view forward: repeats, lower
/// `processed_items` and backward status moves are dropped.
#[derive(Debug)]
pub struct ObservedState {
    last: Option<JobRecord>,
    last_change: Instant,
}

impl ObservedState {
    pub fn new() -> Self {
        Self {
            last: None,
            last_change: Instant::now(),
        }
    }

    /// Applies `snapshot` and returns it, or `None` if it was dropped.
    pub fn apply(&mut self, snapshot: JobRecord) -> Option<&JobRecord> {
        if let Some(last) = &self.last {
            if snapshot == *last {
                return None;
            }
            if snapshot.processed_items < last.processed_items {
                return None;
            }
            // Skipped steps are fine; a job can finish between two reads.
            if snapshot.status.rank() < last.status.rank() {
                return None;
            }
            if last.status.is_terminal() && snapshot.status != last.status {
                return None;
            }
        }

        self.last_change = Instant::now();
        self.last = Some(snapshot);
        self.last.as_ref()
    }

    pub fn last(&self) -> Option<&JobRecord> {
        self.last.as_ref()
    }

    /// Time since the last applied snapshot.
    pub fn idle_for(&self) -> Duration {
        self.last_change.elapsed()
    }
}

impl Default for ObservedState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{ItemOutcome, JobStatus};

    fn processing(total: u32, processed: u32) -> JobRecord {
        let mut record = JobRecord::new("shop-1", total);
        record.start().unwrap();
        for i in 0..processed {
            record
                .record_outcome(&format!("p{}", i), &ItemOutcome::Success)
                .unwrap();
        }
        record
    }

    #[test]
    fn test_first_snapshot_is_applied() {
        let mut state = ObservedState::new();
        assert!(state.apply(processing(3, 0)).is_some());
        assert_eq!(state.last().unwrap().processed_items, 0);
    }

    #[test]
    fn test_duplicate_is_dropped() {
        let mut state = ObservedState::new();
        let snapshot = processing(3, 1);
        state.apply(snapshot.clone());
        assert!(state.apply(snapshot).is_none());
    }

    #[test]
    fn test_regression_is_dropped() {
        let mut state = ObservedState::new();
        let older = processing(3, 1);
        let mut newer = older.clone();
        newer
            .record_outcome("p1", &ItemOutcome::failed("bad"))
            .unwrap();

        state.apply(newer);
        assert!(state.apply(older).is_none());
        assert_eq!(state.last().unwrap().processed_items, 2);
    }

    #[test]
    fn test_equal_count_with_new_status_is_applied() {
        let mut state = ObservedState::new();
        let counted = processing(2, 2);
        let mut completed = counted.clone();
        completed.complete().unwrap();

        state.apply(counted);
        let applied = state.apply(completed).unwrap();
        assert_eq!(applied.status, JobStatus::Completed);
    }

    #[test]
    fn test_status_moving_backwards_is_dropped() {
        let mut state = ObservedState::new();
        let pending = JobRecord::new("shop-1", 2);
        let mut started = pending.clone();
        started.start().unwrap();

        state.apply(started);
        assert!(state.apply(pending).is_none());
        assert_eq!(state.last().unwrap().status, JobStatus::Processing);
    }

    #[test]
    fn test_status_may_skip_ahead() {
        let pending = JobRecord::new("shop-1", 2);

        let mut completed = processing(2, 2);
        completed.complete().unwrap();
        let mut state = ObservedState::new();
        state.apply(pending.clone());
        let applied = state.apply(completed).unwrap();
        assert_eq!(applied.status, JobStatus::Completed);

        let mut failed = pending.clone();
        failed.fail("credentials rejected").unwrap();
        let mut state = ObservedState::new();
        state.apply(pending);
        assert_eq!(state.apply(failed).unwrap().status, JobStatus::Failed);
    }

    #[test]
    fn test_terminal_status_is_final() {
        let mut completed = processing(2, 2);
        completed.complete().unwrap();
        let mut failed = completed.clone();
        failed.status = JobStatus::Failed;

        let mut state = ObservedState::new();
        state.apply(completed);
        assert!(state.apply(failed).is_none());
        assert_eq!(state.last().unwrap().status, JobStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_clock_resets_on_apply() {
        let mut state = ObservedState::new();
        let snapshot = processing(3, 1);
        state.apply(snapshot.clone());

        tokio::time::advance(Duration::from_secs(10)).await;
        state.apply(snapshot.clone());
        assert!(state.idle_for() >= Duration::from_secs(10));

        let mut next = snapshot;
        next.record_outcome("p1", &ItemOutcome::Success).unwrap();
        state.apply(next);
        assert!(state.idle_for() < Duration::from_secs(1));
    }
}
