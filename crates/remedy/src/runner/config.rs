use crate::config::RemedyConfig;

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Persist (and broadcast) the record after this many items. The final
    /// item is always persisted.
    pub persist_every: usize,
}

impl RunnerConfig {
    pub fn from_config(config: &RemedyConfig) -> Self {
        Self {
            persist_every: config.runner.persist_every.max(1),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self { persist_every: 1 }
    }
}
