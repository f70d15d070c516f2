//! The job poller: watches one job until it reaches a terminal state.
//!
//! Two channels feed the watch. The store is pulled on a fixed interval and,
//! when a broadcaster is attached, every persisted snapshot is pushed as it
//! happens. Both go through one [`ObservedState`], so the observer sees each
//! change once and in order.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::broadcast::{JobSubscription, JobUpdateBroadcaster};
use crate::job::{JobId, JobRecord, JobStatus};
use crate::store::JobStore;

pub mod config;
pub mod observed;

pub use config::PollerConfig;
pub use observed::ObservedState;

/// Receives what a [`JobPoller`] sees.
///
/// Callbacks run on the watch task and must not call [`JobPoller::stop`] on
/// the poller that invoked them.
pub trait PollObserver: Send + Sync + 'static {
    /// A new snapshot was applied.
    fn on_update(&self, record: &JobRecord);

    /// The job finished. Called at most once per watch.
    fn on_done(&self, record: &JobRecord);

    /// The job failed, vanished, or a fetch went wrong. After a failed or
    /// missing job no further callback follows; a failed fetch is retried.
    fn on_error(&self, message: &str);
}

/// Where a poller is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Observing,
    Done,
    Errored,
    Cancelled,
}

struct ActiveWatch {
    job_id: JobId,
    /// `true` once the watch is stopped. Held while a callback runs.
    cancelled: Arc<Mutex<bool>>,
    handle: JoinHandle<()>,
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("Poller lock was poisoned, recovering");
        poisoned.into_inner()
    })
}

/// Watches one job at a time.
pub struct JobPoller {
    store: Arc<dyn JobStore>,
    broadcaster: Option<JobUpdateBroadcaster>,
    config: PollerConfig,
    active: Mutex<Option<ActiveWatch>>,
    state: Arc<Mutex<PollState>>,
}

impl JobPoller {
    pub fn new(store: Arc<dyn JobStore>, config: PollerConfig) -> Self {
        Self {
            store,
            broadcaster: None,
            config,
            active: Mutex::new(None),
            state: Arc::new(Mutex::new(PollState::Idle)),
        }
    }

    /// Also listens for pushed snapshots.
    pub fn with_broadcaster(mut self, broadcaster: JobUpdateBroadcaster) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    /// Starts watching `job_id`, replacing any watch already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<O: PollObserver>(&self, job_id: JobId, observer: O) {
        self.stop();

        let cancelled = Arc::new(Mutex::new(false));
        *lock_or_recover(&self.state) = PollState::Observing;

        let watch = Watch {
            job_id: job_id.clone(),
            store: Arc::clone(&self.store),
            subscription: self.broadcaster.as_ref().map(|b| b.subscribe_job(&job_id)),
            config: self.config.clone(),
            reducer: ObservedState::new(),
            emitter: Emitter {
                observer: Box::new(observer),
                cancelled: Arc::clone(&cancelled),
                state: Arc::clone(&self.state),
            },
        };

        let span = info_span!("job_poller", job_id = %job_id);
        let handle = tokio::spawn(watch.run().instrument(span));

        *lock_or_recover(&self.active) = Some(ActiveWatch {
            job_id,
            cancelled,
            handle,
        });
    }

    /// Stops the current watch. Once this returns no further callback starts.
    pub fn stop(&self) {
        let Some(watch) = lock_or_recover(&self.active).take() else {
            return;
        };

        // Waits for a callback that is already running.
        *lock_or_recover(&watch.cancelled) = true;
        watch.handle.abort();

        let mut state = lock_or_recover(&self.state);
        if *state == PollState::Observing {
            *state = PollState::Cancelled;
            debug!(job_id = %watch.job_id, "Poller stopped");
        }
    }

    pub fn state(&self) -> PollState {
        *lock_or_recover(&self.state)
    }

    /// The job currently or most recently watched.
    pub fn job_id(&self) -> Option<JobId> {
        lock_or_recover(&self.active)
            .as_ref()
            .map(|watch| watch.job_id.clone())
    }

    pub fn is_observing(&self) -> bool {
        self.state() == PollState::Observing
    }
}

impl Drop for JobPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Delivers callbacks unless the watch was cancelled.
struct Emitter {
    observer: Box<dyn PollObserver>,
    cancelled: Arc<Mutex<bool>>,
    state: Arc<Mutex<PollState>>,
}

impl Emitter {
    fn update(&self, record: &JobRecord) -> bool {
        let cancelled = lock_or_recover(&self.cancelled);
        if *cancelled {
            return false;
        }
        self.observer.on_update(record);
        true
    }

    fn done(&self, record: &JobRecord) {
        let cancelled = lock_or_recover(&self.cancelled);
        if *cancelled {
            return;
        }
        *lock_or_recover(&self.state) = PollState::Done;
        self.observer.on_done(record);
    }

    /// Reports an error. `terminal` ends the watch in the errored state.
    fn error(&self, message: &str, terminal: bool) -> bool {
        let cancelled = lock_or_recover(&self.cancelled);
        if *cancelled {
            return false;
        }
        if terminal {
            *lock_or_recover(&self.state) = PollState::Errored;
        }
        self.observer.on_error(message);
        true
    }
}

enum Event {
    Tick,
    Pushed(Result<JobRecord, RecvError>),
}

enum Flow {
    Continue,
    Finished,
}

struct Watch {
    job_id: JobId,
    store: Arc<dyn JobStore>,
    subscription: Option<JobSubscription>,
    config: PollerConfig,
    reducer: ObservedState,
    emitter: Emitter,
}

impl Watch {
    async fn run(mut self) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let stale_after = self.config.stale_after();

        loop {
            let event = tokio::select! {
                _ = interval.tick() => Event::Tick,
                received = next_pushed(&mut self.subscription) => Event::Pushed(received),
            };

            let flow = match event {
                Event::Tick => match self.pull().await {
                    Flow::Finished => Flow::Finished,
                    Flow::Continue => self.check_stale(stale_after),
                },
                Event::Pushed(Ok(snapshot)) => self.observe(snapshot),
                Event::Pushed(Err(RecvError::Lagged(n))) => {
                    debug!("Push channel lagged by {} snapshots", n);
                    Flow::Continue
                }
                Event::Pushed(Err(RecvError::Closed)) => {
                    debug!("Push channel closed, polling only");
                    self.subscription = None;
                    Flow::Continue
                }
            };

            if let Flow::Finished = flow {
                return;
            }
        }
    }

    async fn pull(&mut self) -> Flow {
        match self.store.get(&self.job_id).await {
            Ok(snapshot) => self.observe(snapshot),
            Err(e) if e.is_not_found() => {
                warn!("Job disappeared");
                self.emitter
                    .error(&format!("job {} not found", self.job_id), true);
                Flow::Finished
            }
            Err(e) => {
                warn!("Failed to fetch job: {}", e);
                if self.emitter.error(&e.to_string(), false) {
                    Flow::Continue
                } else {
                    Flow::Finished
                }
            }
        }
    }

    fn observe(&mut self, snapshot: JobRecord) -> Flow {
        let Some(applied) = self.reducer.apply(snapshot) else {
            return Flow::Continue;
        };

        if !self.emitter.update(applied) {
            return Flow::Finished;
        }

        match applied.status {
            JobStatus::Completed => {
                info!("Job completed");
                self.emitter.done(applied);
                Flow::Finished
            }
            JobStatus::Failed => {
                let message = applied.error_message.as_deref().unwrap_or("Job failed");
                info!("Job failed: {}", message);
                self.emitter.error(message, true);
                Flow::Finished
            }
            JobStatus::Pending | JobStatus::Processing => {
                if self.config.finalize_on_counts && applied.implies_completion() {
                    info!("All items processed, treating job as done");
                    self.emitter.done(applied);
                    Flow::Finished
                } else {
                    Flow::Continue
                }
            }
        }
    }

    fn check_stale(&self, stale_after: std::time::Duration) -> Flow {
        let Some(last) = self.reducer.last() else {
            return Flow::Continue;
        };
        if last.implies_completion() && self.reducer.idle_for() >= stale_after {
            info!(
                idle_ms = self.reducer.idle_for().as_millis() as u64,
                "No progress since all items were processed, treating job as done"
            );
            self.emitter.done(last);
            return Flow::Finished;
        }
        Flow::Continue
    }
}

/// Next pushed snapshot, or never if there is no subscription.
async fn next_pushed(
    subscription: &mut Option<JobSubscription>,
) -> Result<JobRecord, RecvError> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}
