//! The job runner: drives one job record from pending to a terminal state.

use std::sync::Arc;

use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::broadcast::JobUpdateBroadcaster;
use crate::error::StoreError;
use crate::job::{AffectedItem, ItemOutcome, JobId, JobRecord, JobStatus};
use crate::store::JobStore;

pub mod config;
pub mod processor;

pub use config::RunnerConfig;
pub use processor::{processor_fn, FnProcessor, ItemProcessor};

/// What a run ended with.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub job_id: JobId,
    /// Last state the runner held. `None` if the job could not be loaded.
    pub record: Option<JobRecord>,
    /// Set when the run was refused or the job failed.
    pub error: Option<String>,
}

impl RunReport {
    fn finished(record: JobRecord) -> Self {
        Self {
            job_id: record.id.clone(),
            error: record.error_message.clone(),
            record: Some(record),
        }
    }

    fn refused(job_id: &JobId, record: Option<JobRecord>, reason: String) -> Self {
        Self {
            job_id: job_id.clone(),
            record,
            error: Some(reason),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.record
            .as_ref()
            .is_some_and(|r| r.status == JobStatus::Completed)
    }
}

/// Applies an [`ItemProcessor`] to each item of a job, in order, one at a time.
///
/// The runner is the only writer of the job record while it runs. Item
/// failures are counted and never stop the batch; a storage error or a
/// [`crate::error::JobFault`] from the processor fails the whole job with the
/// counts reached so far.
pub struct JobRunner {
    store: Arc<dyn JobStore>,
    broadcaster: JobUpdateBroadcaster,
    config: RunnerConfig,
}

impl JobRunner {
    pub fn new(
        store: Arc<dyn JobStore>,
        broadcaster: JobUpdateBroadcaster,
        config: RunnerConfig,
    ) -> Self {
        Self {
            store,
            broadcaster,
            config,
        }
    }

    /// Runs the job to completion. Never returns an error: job-level problems
    /// end up as a failed record in the report.
    pub async fn run(
        &self,
        job_id: &JobId,
        items: &[AffectedItem],
        processor: &dyn ItemProcessor,
    ) -> RunReport {
        let span = info_span!("job_runner", job_id = %job_id, items = items.len());
        self.run_items(job_id, items, processor)
            .instrument(span)
            .await
    }

    async fn run_items(
        &self,
        job_id: &JobId,
        items: &[AffectedItem],
        processor: &dyn ItemProcessor,
    ) -> RunReport {
        let mut record = match self.store.get(job_id).await {
            Ok(record) => record,
            Err(e) => {
                error!("Cannot load job: {}", e);
                return RunReport::refused(job_id, None, e.to_string());
            }
        };

        if record.status != JobStatus::Pending {
            warn!(status = %record.status, "Refusing to run a job that is not pending");
            let reason = format!("job is already {}", record.status);
            return RunReport::refused(job_id, Some(record), reason);
        }

        if items.len() != record.total_items as usize {
            let message = format!(
                "job expects {} items but {} were supplied",
                record.total_items,
                items.len()
            );
            self.fail_job(&mut record, message).await;
            return RunReport::finished(record);
        }

        if let Some(first) = items.first() {
            record.begin_item(first.display_label());
        }
        if let Err(e) = record.start() {
            return RunReport::refused(job_id, Some(record), e.to_string());
        }
        if let Err(e) = self.persist(&record).await {
            self.fail_job(&mut record, format!("failed to start job: {}", e))
                .await;
            return RunReport::finished(record);
        }
        info!("Job started");

        let persist_every = self.config.persist_every.max(1);

        for (index, item) in items.iter().enumerate() {
            let outcome = match processor.process(item).await {
                Ok(outcome) => outcome,
                Err(fault) => {
                    error!(item_id = %item.id, "Processor raised a job-level fault: {}", fault);
                    self.fail_job(&mut record, fault.message).await;
                    return RunReport::finished(record);
                }
            };

            match &outcome {
                ItemOutcome::Success => debug!(item_id = %item.id, "Item succeeded"),
                ItemOutcome::Failed(reason) => {
                    warn!(item_id = %item.id, "Item failed: {}", reason)
                }
                ItemOutcome::Skipped(reason) => {
                    debug!(item_id = %item.id, "Item skipped: {}", reason)
                }
            }

            if let Err(e) = record.record_outcome(&item.id, &outcome) {
                self.fail_job(&mut record, e.to_string()).await;
                return RunReport::finished(record);
            }

            // The last item is persisted together with the completion below.
            let Some(next) = items.get(index + 1) else {
                break;
            };
            record.begin_item(next.display_label());

            if (index + 1) % persist_every == 0 {
                if let Err(e) = self.persist(&record).await {
                    self.fail_job(&mut record, format!("failed to save progress: {}", e))
                        .await;
                    return RunReport::finished(record);
                }
            }
        }

        let mut finished = record.clone();
        if let Err(e) = finished.complete() {
            self.fail_job(&mut record, e.to_string()).await;
            return RunReport::finished(record);
        }

        match self.persist(&finished).await {
            Ok(()) => {
                info!(
                    success = finished.success_count,
                    failed = finished.failed_count,
                    skipped = finished.skipped_count,
                    "Job completed"
                );
                RunReport::finished(finished)
            }
            Err(e) => {
                self.fail_job(&mut record, format!("failed to save completion: {}", e))
                    .await;
                RunReport::finished(record)
            }
        }
    }

    /// Saves the record, then pushes it to subscribers.
    async fn persist(&self, record: &JobRecord) -> Result<(), StoreError> {
        self.store.save(record).await?;
        self.broadcaster.send(record.clone());
        Ok(())
    }

    /// Marks the job failed and makes a best-effort attempt to store it.
    async fn fail_job(&self, record: &mut JobRecord, message: String) {
        error!(processed = record.processed_items, "Job failed: {}", message);

        if let Err(e) = record.fail(message) {
            warn!("Cannot mark job as failed: {}", e);
            return;
        }

        if let Err(e) = self.store.save(record).await {
            warn!("Failed to store failed job state: {}", e);
        }
        self.broadcaster.send(record.clone());
    }
}
