//! Enqueueing jobs and handing them to a background runner.

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::broadcast::JobUpdateBroadcaster;
use crate::error::{EnqueueError, StoreError};
use crate::job::{AffectedItem, JobId, JobRecord};
use crate::runner::{ItemProcessor, JobRunner, RunnerConfig};
use crate::store::{JobList, JobQuery, JobStore};

/// Accepts bulk jobs and runs each one in its own background task.
///
/// At most one pending or processing job exists per target key. The caller
/// gets the job id back immediately and observes progress through
/// [`JobQueue::get`], [`JobQueue::subscribe`] or a [`crate::poller::JobPoller`].
pub struct JobQueue {
    store: Arc<dyn JobStore>,
    broadcaster: JobUpdateBroadcaster,
    processor: Arc<dyn ItemProcessor>,
    runner_config: RunnerConfig,
    enqueue_lock: Mutex<()>,
}

impl JobQueue {
    pub fn new(
        store: Arc<dyn JobStore>,
        broadcaster: JobUpdateBroadcaster,
        processor: Arc<dyn ItemProcessor>,
        runner_config: RunnerConfig,
    ) -> Self {
        Self {
            store,
            broadcaster,
            processor,
            runner_config,
            enqueue_lock: Mutex::new(()),
        }
    }

    /// Creates a pending job for `target_key` and starts processing `items`
    /// in the background.
    ///
    /// Fails with [`EnqueueError::Conflict`] while another job for the same
    /// key is still pending or processing.
    pub async fn enqueue(
        &self,
        target_key: &str,
        items: Vec<AffectedItem>,
    ) -> Result<JobId, EnqueueError> {
        let target_key = target_key.trim();
        if target_key.is_empty() {
            return Err(EnqueueError::InvalidTarget(
                "target key must not be empty".to_string(),
            ));
        }
        let total =
            u32::try_from(items.len()).map_err(|_| EnqueueError::TooManyItems(items.len()))?;

        let record = {
            let _guard = self.enqueue_lock.lock().await;

            if let Some(existing) = self.store.find_active(target_key).await? {
                info!(
                    target_key,
                    existing_job_id = %existing.id,
                    "Rejected duplicate submission"
                );
                return Err(EnqueueError::Conflict {
                    existing_job_id: existing.id,
                });
            }

            let record = JobRecord::new(target_key, total);
            self.store.create(&record).await?;
            record
        };

        info!(job_id = %record.id, target_key, total, "Job enqueued");
        self.broadcaster.send(record.clone());
        self.spawn_runner(record.id.clone(), items);

        Ok(record.id)
    }

    /// Current state of a job.
    pub async fn get(&self, job_id: &JobId) -> Result<JobRecord, StoreError> {
        self.store.get(job_id).await
    }

    pub async fn list(&self, query: &JobQuery) -> Result<JobList, StoreError> {
        self.store.list(query).await
    }

    /// Snapshots of every job as they are persisted.
    pub fn subscribe(&self) -> broadcast::Receiver<JobRecord> {
        self.broadcaster.subscribe()
    }

    pub fn broadcaster(&self) -> &JobUpdateBroadcaster {
        &self.broadcaster
    }

    pub fn store(&self) -> Arc<dyn JobStore> {
        Arc::clone(&self.store)
    }

    /// Runs the job on its own task. A second task waits for it so that a
    /// panicking processor still leaves a failed record behind.
    fn spawn_runner(&self, job_id: JobId, items: Vec<AffectedItem>) {
        let runner = JobRunner::new(
            Arc::clone(&self.store),
            self.broadcaster.clone(),
            self.runner_config.clone(),
        );
        let processor = Arc::clone(&self.processor);
        let run_id = job_id.clone();

        let run =
            tokio::spawn(async move { runner.run(&run_id, &items, processor.as_ref()).await });

        let store = Arc::clone(&self.store);
        let broadcaster = self.broadcaster.clone();
        let span = info_span!("job_supervisor", job_id = %job_id);

        tokio::spawn(
            async move {
                match run.await {
                    Ok(report) => {
                        debug!(completed = report.is_completed(), "Runner finished");
                    }
                    Err(e) => {
                        error!("Runner task aborted: {}", e);
                        let message = format!("runner aborted: {}", e);
                        mark_failed(store.as_ref(), &broadcaster, &job_id, message).await;
                    }
                }
            }
            .instrument(span),
        );
    }
}

/// Fails a job whose runner died without reaching a terminal state.
async fn mark_failed(
    store: &dyn JobStore,
    broadcaster: &JobUpdateBroadcaster,
    job_id: &JobId,
    message: String,
) {
    let mut record = match store.get(job_id).await {
        Ok(record) => record,
        Err(e) => {
            warn!("Cannot load job to mark it failed: {}", e);
            return;
        }
    };

    if record.is_finished() {
        return;
    }

    if let Err(e) = record.fail(message) {
        warn!("Cannot mark job as failed: {}", e);
        return;
    }
    if let Err(e) = store.save(&record).await {
        warn!("Failed to store failed job state: {}", e);
    }
    broadcaster.send(record);
}
