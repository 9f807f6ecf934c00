use crate::config::ManagedAppConfig;
use std::time::{Duration, SystemTime};

/// Restart policy derived from an app's configuration
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    /// Whether automatic restart on exit is enabled
    pub autorestart: bool,
    /// Maximum number of restarts within the sliding window
    pub max_restarts: usize,
    /// Sliding window for counting restarts
    pub window: Duration,
    /// Delay before the first restart in a burst
    pub base_delay: Duration,
    /// Upper bound on the backoff delay
    pub max_delay: Duration,
    /// Uninterrupted uptime after which the restart counter resets
    pub stability_window: Duration,
}

impl RestartPolicy {
    /// Create a restart policy from configuration values
    pub fn from_config(config: &ManagedAppConfig) -> Self {
        Self {
            autorestart: config.autorestart,
            max_restarts: config.max_restarts,
            window: config.restart_window(),
            base_delay: config.restart_base_delay(),
            max_delay: config.restart_max_delay(),
            stability_window: config.stability_window(),
        }
    }

    /// Check if another restart fits the budget given the recorded history
    pub fn within_budget(&self, tracker: &RestartTracker) -> bool {
        tracker.count_recent(self.window) < self.max_restarts
    }

    /// Delay before the next restart attempt: base * 2^consecutive, capped
    /// at the configured maximum
    pub fn delay_for(&self, consecutive_restarts: usize) -> Duration {
        let exponent = consecutive_restarts.min(32) as u32;
        let factor = 2_u32.saturating_pow(exponent);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Restart history for one supervised slot
#[derive(Debug, Clone)]
pub struct RestartTracker {
    /// Timestamps of all restarts since the last reset
    restart_times: Vec<SystemTime>,
}

impl RestartTracker {
    /// Create a new restart tracker
    pub fn new() -> Self {
        Self {
            restart_times: Vec::new(),
        }
    }

    /// Record a restart at the current instant
    pub fn record(&mut self) {
        self.restart_times.push(SystemTime::now());
    }

    /// Total restarts since the last reset
    pub fn total(&self) -> usize {
        self.restart_times.len()
    }

    /// Count restarts that fall inside the trailing window
    pub fn count_recent(&self, window: Duration) -> usize {
        let now = SystemTime::now();

        self.restart_times
            .iter()
            .filter(|&&time| {
                now.duration_since(time)
                    .map(|elapsed| elapsed < window)
                    .unwrap_or(false)
            })
            .count()
    }

    /// Clear restart history after a stable run
    pub fn clear(&mut self) {
        self.restart_times.clear();
    }
}

impl Default for RestartTracker {
    fn default() -> Self {
        Self::new()
    }
}
