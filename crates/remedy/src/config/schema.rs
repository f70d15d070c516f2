use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemedyConfig {
    #[serde(default = "default_version")]
    pub version: String,
    /// SQLite file holding job records. Defaults to `~/.remedy/data/remedy.db`.
    #[serde(default)]
    pub database_path: Option<String>,
    /// File holding the active job session. Defaults to `~/.remedy/session.json`.
    #[serde(default)]
    pub session_path: Option<String>,
    #[serde(default)]
    pub poller: PollerSettings,
    #[serde(default)]
    pub runner: RunnerSettings,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit log lines as JSON instead of plain text.
    #[serde(default)]
    pub log_json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerSettings {
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
    /// Staleness threshold is `max(interval_ms * stale_multiplier, stale_floor_ms)`.
    #[serde(default = "default_stale_multiplier")]
    pub stale_multiplier: u32,
    #[serde(default = "default_stale_floor_ms")]
    pub stale_floor_ms: u64,
    /// Finish as soon as `processed_items >= total_items`, before the status flips.
    #[serde(default = "default_true")]
    pub finalize_on_counts: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerSettings {
    /// Persist the job record after this many items.
    #[serde(default = "default_persist_every")]
    pub persist_every: usize,
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_stale_multiplier() -> u32 {
    5
}

fn default_stale_floor_ms() -> u64 {
    15_000
}

fn default_true() -> bool {
    true
}

fn default_persist_every() -> usize {
    1
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
            stale_multiplier: default_stale_multiplier(),
            stale_floor_ms: default_stale_floor_ms(),
            finalize_on_counts: true,
        }
    }
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            persist_every: default_persist_every(),
        }
    }
}

impl Default for RemedyConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            database_path: None,
            session_path: None,
            poller: PollerSettings::default(),
            runner: RunnerSettings::default(),
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

impl RemedyConfig {
    /// Configured database path, falling back to the per-user default.
    pub fn resolved_database_path(&self) -> Option<PathBuf> {
        self.database_path
            .as_ref()
            .map(PathBuf::from)
            .or_else(crate::db::default_database_path)
    }

    /// Configured session path, falling back to the per-user default.
    pub fn resolved_session_path(&self) -> Option<PathBuf> {
        self.session_path
            .as_ref()
            .map(PathBuf::from)
            .or_else(crate::session::default_session_path)
    }
}
