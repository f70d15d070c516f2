//! Job update broadcaster: pushes every persisted job record to subscribers.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::job::{JobId, JobRecord};

/// Broadcasts job record snapshots as they are persisted.
#[derive(Clone)]
pub struct JobUpdateBroadcaster {
    sender: Arc<broadcast::Sender<JobRecord>>,
}

impl JobUpdateBroadcaster {
    /// Creates a new broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends a snapshot to all subscribers.
    pub fn send(&self, record: JobRecord) {
        // Ignore errors - no active receivers is fine
        let _ = self.sender.send(record);
    }

    /// Subscribes to updates for every job.
    pub fn subscribe(&self) -> broadcast::Receiver<JobRecord> {
        self.sender.subscribe()
    }

    /// Subscribes to updates for a single job.
    pub fn subscribe_job(&self, job_id: &JobId) -> JobSubscription {
        JobSubscription {
            job_id: job_id.clone(),
            receiver: self.sender.subscribe(),
        }
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for JobUpdateBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Receiver filtered down to one job id. Dropping it unsubscribes.
pub struct JobSubscription {
    job_id: JobId,
    receiver: broadcast::Receiver<JobRecord>,
}

impl JobSubscription {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Waits for the next snapshot of this job.
    ///
    /// Returns `Lagged` if the subscriber fell behind and `Closed` once every
    /// sender is gone.
    pub async fn recv(&mut self) -> Result<JobRecord, broadcast::error::RecvError> {
        loop {
            let record = self.receiver.recv().await?;
            if record.id == self.job_id {
                return Ok(record);
            }
        }
    }
}
