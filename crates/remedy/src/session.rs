//! The active job session: which job a client is watching, kept on disk so a
//! restarted client can resume polling.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::job::{JobId, JobRecord};
use crate::poller::PollObserver;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveJobSession {
    pub job_id: JobId,
    pub target_key: String,
    pub started_at: DateTime<Utc>,
}

impl ActiveJobSession {
    pub fn new(job_id: JobId, target_key: impl Into<String>) -> Self {
        Self {
            job_id,
            target_key: target_key.into(),
            started_at: Utc::now(),
        }
    }
}

/// Returns the default session file: `~/.remedy/session.json`.
pub fn default_session_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".remedy").join("session.json"))
}

/// JSON file holding at most one [`ActiveJobSession`].
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> SessionError {
        SessionError::Io {
            path: self.path.clone(),
            source,
        }
    }

    pub fn save(&self, session: &ActiveJobSession) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let json = serde_json::to_string_pretty(session).map_err(|e| SessionError::Corrupt {
            path: self.path.clone(),
            source: e,
        })?;
        std::fs::write(&self.path, json).map_err(|e| self.io_error(e))?;

        log::debug!("Saved session for job {} to {:?}", session.job_id, self.path);
        Ok(())
    }

    /// The saved session, or `None` if there is none. A corrupt file is an
    /// error and stays on disk.
    pub fn load(&self) -> Result<Option<ActiveJobSession>, SessionError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| SessionError::Corrupt {
                path: self.path.clone(),
                source: e,
            })
    }

    pub fn clear(&self) -> Result<(), SessionError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                log::debug!("Cleared session at {:?}", self.path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

/// Observer adapter that clears the saved session once the watched job
/// finishes or can no longer be observed, then forwards to `inner`.
pub struct ClearSessionOnFinish<O> {
    inner: O,
    store: SessionStore,
    job_id: JobId,
}

impl<O: PollObserver> ClearSessionOnFinish<O> {
    pub fn new(inner: O, store: SessionStore, job_id: JobId) -> Self {
        Self {
            inner,
            store,
            job_id,
        }
    }

    fn clear(&self) {
        // Only clear our own session; another job may have replaced it.
        match self.store.load() {
            Ok(Some(session)) if session.job_id != self.job_id => return,
            Ok(_) => {}
            Err(e) => log::warn!("Session file unreadable, clearing it: {}", e),
        }
        if let Err(e) = self.store.clear() {
            log::warn!("Failed to clear session: {}", e);
        }
    }
}

impl<O: PollObserver> PollObserver for ClearSessionOnFinish<O> {
    fn on_update(&self, record: &JobRecord) {
        self.inner.on_update(record);
    }

    fn on_done(&self, record: &JobRecord) {
        self.clear();
        self.inner.on_done(record);
    }

    fn on_error(&self, message: &str) {
        self.clear();
        self.inner.on_error(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> SessionStore {
        SessionStore::new(dir.path().join("nested").join("session.json"))
    }

    #[test]
    fn test_save_load_clear() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let session = ActiveJobSession::new(JobId::from("job-1"), "shop-1:meta");

        store.save(&session).unwrap();
        assert_eq!(store.load().unwrap(), Some(session));

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(store.load().unwrap().is_none());
        store.clear().unwrap();
    }

    #[test]
    fn test_corrupt_file_is_reported_and_kept() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{ nope").unwrap();

        let store = SessionStore::new(&path);
        assert!(matches!(store.load(), Err(SessionError::Corrupt { .. })));
        assert!(path.exists());
    }

    #[test]
    fn test_session_json_shape() {
        let session = ActiveJobSession::new(JobId::from("job-1"), "shop-1");
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["jobId"], "job-1");
        assert_eq!(json["targetKey"], "shop-1");
        assert!(json["startedAt"].is_string());
    }

    #[derive(Default)]
    struct Counting {
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    impl PollObserver for Counting {
        fn on_update(&self, _record: &JobRecord) {
            self.calls.lock().unwrap().push("update");
        }

        fn on_done(&self, _record: &JobRecord) {
            self.calls.lock().unwrap().push("done");
        }

        fn on_error(&self, _message: &str) {
            self.calls.lock().unwrap().push("error");
        }
    }

    #[test]
    fn test_clears_session_on_done() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let record = JobRecord::new("shop-1", 1);
        store
            .save(&ActiveJobSession::new(record.id.clone(), "shop-1"))
            .unwrap();

        let inner = Counting::default();
        let calls = Arc::clone(&inner.calls);
        let observer = ClearSessionOnFinish::new(inner, store.clone(), record.id.clone());

        observer.on_update(&record);
        assert!(store.load().unwrap().is_some());

        observer.on_done(&record);
        assert!(store.load().unwrap().is_none());
        assert_eq!(*calls.lock().unwrap(), vec!["update", "done"]);
    }

    #[test]
    fn test_clears_session_on_error() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let job_id = JobId::from("job-1");
        store
            .save(&ActiveJobSession::new(job_id.clone(), "shop-1"))
            .unwrap();

        let observer = ClearSessionOnFinish::new(Counting::default(), store.clone(), job_id);
        observer.on_error("job job-1 not found");
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_keeps_session_of_another_job() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let newer = ActiveJobSession::new(JobId::from("job-2"), "shop-1");
        store.save(&newer).unwrap();

        let observer =
            ClearSessionOnFinish::new(Counting::default(), store.clone(), JobId::from("job-1"));
        observer.on_error("boom");
        assert_eq!(store.load().unwrap(), Some(newer));
    }
}
