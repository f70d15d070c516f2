//! Test harness for isolated test execution.
//!
//! The `TestHarness` struct owns a temporary directory holding the job
//! database and the session file, plus the broadcaster the queue and pollers
//! share.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;

use remedy::db::Database;
use remedy::{
    ItemProcessor, JobId, JobPoller, JobQueue, JobRecord, JobStore, JobUpdateBroadcaster,
    PollObserver, PollerConfig, RunnerConfig, SessionStore, SqliteJobStore,
};

/// What an observer was told, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Seen {
    Update(JobRecord),
    Done(JobRecord),
    Error(String),
}

/// Observer that forwards every callback into a channel.
pub struct RecordingObserver {
    tx: mpsc::UnboundedSender<Seen>,
}

impl RecordingObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Seen>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl PollObserver for RecordingObserver {
    fn on_update(&self, record: &JobRecord) {
        let _ = self.tx.send(Seen::Update(record.clone()));
    }

    fn on_done(&self, record: &JobRecord) {
        let _ = self.tx.send(Seen::Done(record.clone()));
    }

    fn on_error(&self, message: &str) {
        let _ = self.tx.send(Seen::Error(message.to_string()));
    }
}

/// Drains the receiver until the sender is gone.
pub async fn collect(mut rx: mpsc::UnboundedReceiver<Seen>) -> Vec<Seen> {
    let mut seen = Vec::new();
    while let Some(event) = rx.recv().await {
        seen.push(event);
    }
    seen
}

/// Test harness providing an isolated job store on disk.
pub struct TestHarness {
    /// Temporary directory holding the database and session file.
    temp_dir: TempDir,
    pub db_path: PathBuf,
    pub session_path: PathBuf,
    pub store: Arc<SqliteJobStore>,
    pub broadcaster: JobUpdateBroadcaster,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("data").join("remedy.db");
        let session_path = temp_dir.path().join("session.json");

        let db = Database::open(&db_path).expect("Failed to open database");

        Self {
            temp_dir,
            db_path,
            session_path,
            store: Arc::new(SqliteJobStore::new(db)),
            broadcaster: JobUpdateBroadcaster::new(256),
        }
    }

    pub fn store(&self) -> Arc<dyn JobStore> {
        self.store.clone()
    }

    pub fn queue<P: ItemProcessor + 'static>(&self, processor: P) -> JobQueue {
        self.queue_with(processor, RunnerConfig::default())
    }

    pub fn queue_with<P: ItemProcessor + 'static>(
        &self,
        processor: P,
        config: RunnerConfig,
    ) -> JobQueue {
        JobQueue::new(
            self.store(),
            self.broadcaster.clone(),
            Arc::new(processor),
            config,
        )
    }

    /// A poller on this store that also listens to the shared broadcaster.
    pub fn poller(&self, config: PollerConfig) -> JobPoller {
        JobPoller::new(self.store(), config).with_broadcaster(self.broadcaster.clone())
    }

    /// A pull-only poller on an arbitrary store.
    pub fn pull_poller(store: Arc<dyn JobStore>, config: PollerConfig) -> JobPoller {
        JobPoller::new(store, config)
    }

    pub fn sessions(&self) -> SessionStore {
        SessionStore::new(&self.session_path)
    }

    /// A second, independent connection to the same database file.
    pub fn reopen(&self) -> SqliteJobStore {
        SqliteJobStore::new(Database::open(&self.db_path).expect("Failed to reopen database"))
    }

    pub async fn wait_until_finished(&self, id: &JobId) -> JobRecord {
        for _ in 0..1000 {
            let job = self.store.get(id).await.expect("job should exist");
            if job.is_finished() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {} did not finish", id);
    }
}

pub fn fast_poller_config() -> PollerConfig {
    PollerConfig {
        interval: Duration::from_millis(20),
        stale_multiplier: 5,
        stale_floor: Duration::from_millis(200),
        finalize_on_counts: true,
    }
}
