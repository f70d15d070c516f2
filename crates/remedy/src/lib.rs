pub mod broadcast;
pub mod config;
pub mod db;
pub mod error;
pub mod job;
pub mod logging;
pub mod poller;
pub mod queue;
pub mod runner;
pub mod session;
pub mod store;

pub use broadcast::{JobSubscription, JobUpdateBroadcaster};
pub use config::{load_config, load_config_from_str, RemedyConfig};
pub use error::{
    ConfigError, EnqueueError, JobFault, JobStateError, RemedyError, Result, SessionError,
    StoreError,
};
pub use job::{AffectedItem, ItemFailure, ItemOutcome, JobId, JobRecord, JobStatus};
pub use poller::{JobPoller, PollObserver, PollState, PollerConfig};
pub use queue::JobQueue;
pub use runner::{processor_fn, ItemProcessor, JobRunner, RunReport, RunnerConfig};
pub use session::{ActiveJobSession, ClearSessionOnFinish, SessionStore};
pub use store::{JobList, JobQuery, JobStore, SqliteJobStore};
