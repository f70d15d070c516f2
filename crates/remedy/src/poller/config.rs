use std::time::Duration;

use crate::config::RemedyConfig;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Time between pulls. The first pull happens immediately.
    pub interval: Duration,
    pub stale_multiplier: u32,
    pub stale_floor: Duration,
    /// Treat `processed_items >= total_items` as done before the status flips.
    pub finalize_on_counts: bool,
}

impl PollerConfig {
    pub fn from_config(config: &RemedyConfig) -> Self {
        let poller = &config.poller;
        Self {
            interval: Duration::from_millis(poller.interval_ms.max(1)),
            stale_multiplier: poller.stale_multiplier.max(1),
            stale_floor: Duration::from_millis(poller.stale_floor_ms),
            finalize_on_counts: poller.finalize_on_counts,
        }
    }

    /// How long without a new snapshot before a finished-looking job is
    /// treated as done.
    pub fn stale_after(&self) -> Duration {
        self.interval
            .saturating_mul(self.stale_multiplier)
            .max(self.stale_floor)
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            stale_multiplier: 5,
            stale_floor: Duration::from_secs(15),
            finalize_on_counts: true,
        }
    }
}
