use crate::error::{Result, WardenError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub mod loader;

/// Signals accepted for `stop_signal`
pub const VALID_STOP_SIGNALS: [&str; 7] = [
    "SIGTERM", "SIGINT", "SIGQUIT", "SIGKILL", "SIGHUP", "SIGUSR1", "SIGUSR2",
];

/// Configuration for one managed application, covering all of its instances
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedAppConfig {
    /// Application name (unique identifier)
    pub name: String,

    /// Path to the executable to run
    pub command: PathBuf,

    /// Command-line arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory for the process (must be absolute)
    pub cwd: PathBuf,

    /// Number of instances to run
    #[serde(default = "default_instances")]
    pub instances: usize,

    /// Whether to automatically restart on crash
    #[serde(default = "default_autorestart")]
    pub autorestart: bool,

    /// Memory threshold in bytes that triggers a proactive restart
    #[serde(default)]
    pub max_memory_restart: Option<u64>,

    /// Environment overrides in declaration order; a later entry for the
    /// same key wins over an earlier one
    #[serde(default)]
    pub env: Vec<(String, String)>,

    /// File receiving the process's stdout
    pub stdout_path: PathBuf,

    /// File receiving the process's stderr
    pub stderr_path: PathBuf,

    /// Route stderr into the stdout file, tagging each line with its source
    #[serde(default)]
    pub merge_logs: bool,

    /// Timestamp pattern for log lines, in moment.js-style tokens
    #[serde(default = "default_log_date_format")]
    pub log_date_format: String,

    /// Signal to send on stop (default: SIGTERM)
    #[serde(default = "default_stop_signal")]
    pub stop_signal: String,

    /// Grace period before force kill (in seconds)
    #[serde(default = "default_stop_grace")]
    pub stop_grace_secs: u64,

    /// Maximum number of restarts within the sliding window
    #[serde(default = "default_max_restarts")]
    pub max_restarts: usize,

    /// Sliding window for counting restarts (in seconds)
    #[serde(default = "default_restart_window")]
    pub restart_window_secs: u64,

    /// Base delay before the first restart (in seconds)
    #[serde(default = "default_restart_delay")]
    pub restart_delay_secs: u64,

    /// Upper bound on the backoff delay (in seconds)
    #[serde(default = "default_max_restart_delay")]
    pub max_restart_delay_secs: u64,

    /// Uninterrupted uptime after which the restart counter resets (in seconds)
    #[serde(default = "default_stability_window")]
    pub stability_window_secs: u64,

    /// Interval between memory samples (in seconds)
    #[serde(default = "default_memory_check")]
    pub memory_check_secs: u64,
}

// Default value functions for serde
fn default_instances() -> usize {
    1
}

fn default_autorestart() -> bool {
    true
}

fn default_log_date_format() -> String {
    "YYYY-MM-DD HH:mm:ss Z".to_string()
}

fn default_stop_signal() -> String {
    "SIGTERM".to_string()
}

fn default_stop_grace() -> u64 {
    5
}

fn default_max_restarts() -> usize {
    10
}

fn default_restart_window() -> u64 {
    60
}

fn default_restart_delay() -> u64 {
    1
}

fn default_max_restart_delay() -> u64 {
    60
}

fn default_stability_window() -> u64 {
    10
}

fn default_memory_check() -> u64 {
    5
}

impl ManagedAppConfig {
    /// Validate the configuration, collecting every violation rather than
    /// stopping at the first
    pub fn validate(&self) -> Result<()> {
        let mut violations = Vec::new();

        if self.name.is_empty() {
            violations.push("name must not be empty".to_string());
        }

        if self.command.as_os_str().is_empty() {
            violations.push("command must not be empty".to_string());
        }

        if !self.cwd.is_absolute() {
            violations.push(format!(
                "cwd must be an absolute path, got: {}",
                self.cwd.display()
            ));
        }

        if self.instances == 0 {
            violations.push("instances must be at least 1".to_string());
        }

        if self.instances > 100 {
            violations.push("instances cannot exceed 100".to_string());
        }

        if self.max_memory_restart == Some(0) {
            violations.push("max_memory_restart must be greater than zero".to_string());
        }

        if !VALID_STOP_SIGNALS.contains(&self.stop_signal.as_str()) {
            violations.push(format!(
                "Invalid stop_signal: {}. Must be one of: {}",
                self.stop_signal,
                VALID_STOP_SIGNALS.join(", ")
            ));
        }

        if self.max_restarts == 0 {
            violations.push("max_restarts must be at least 1".to_string());
        }

        if self.restart_window_secs == 0 {
            violations.push("restart_window_secs must be at least 1".to_string());
        }

        if self.stability_window_secs == 0 {
            violations.push("stability_window_secs must be at least 1".to_string());
        }

        if self.memory_check_secs == 0 {
            violations.push("memory_check_secs must be at least 1".to_string());
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(WardenError::InvalidConfig {
                name: self.name.clone(),
                violations,
            })
        }
    }

    /// Name of the instance slot at `index`: the bare app name for a single
    /// instance, `name-N` otherwise
    pub fn slot_name(&self, index: usize) -> String {
        if self.instances == 1 {
            self.name.clone()
        } else {
            format!("{}-{}", self.name, index)
        }
    }

    /// Get stop grace period as Duration
    pub fn stop_grace_period(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }

    /// Get base restart delay as Duration
    pub fn restart_base_delay(&self) -> Duration {
        Duration::from_secs(self.restart_delay_secs)
    }

    /// Get maximum restart delay as Duration
    pub fn restart_max_delay(&self) -> Duration {
        Duration::from_secs(self.max_restart_delay_secs)
    }

    /// Get restart counting window as Duration
    pub fn restart_window(&self) -> Duration {
        Duration::from_secs(self.restart_window_secs)
    }

    /// Get stability window as Duration
    pub fn stability_window(&self) -> Duration {
        Duration::from_secs(self.stability_window_secs)
    }

    /// Get memory sampling interval as Duration
    pub fn memory_check_interval(&self) -> Duration {
        Duration::from_secs(self.memory_check_secs)
    }
}

/// Build the full environment for a spawned process: the supervisor's own
/// environment first, then the configured overrides in declaration order
pub fn resolve_env(pairs: &[(String, String)]) -> HashMap<String, String> {
    let mut env: HashMap<String, String> = std::env::vars().collect();
    for (key, value) in pairs {
        env.insert(key.clone(), value.clone());
    }
    env
}

/// Parse a human-readable memory size ("500M", "1G", "64K", "123") into bytes
pub fn parse_mem_size(input: &str) -> Result<u64> {
    let s = input.trim();
    let digits_end = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (digits, rest) = s.split_at(digits_end);

    let value: u64 = digits.parse().map_err(|_| {
        WardenError::ConfigError(format!("Invalid memory size: {}", input))
    })?;

    let mut suffix = rest.trim();
    if suffix.len() > 1 && (suffix.ends_with('B') || suffix.ends_with('b')) {
        suffix = &suffix[..suffix.len() - 1];
    }

    let multiplier: u64 = match suffix {
        "" | "B" | "b" => 1,
        "K" | "k" => 1024,
        "M" | "m" => 1024 * 1024,
        "G" | "g" => 1024 * 1024 * 1024,
        _ => {
            return Err(WardenError::ConfigError(format!(
                "Invalid memory size suffix: {}",
                input
            )))
        }
    };

    value.checked_mul(multiplier).ok_or_else(|| {
        WardenError::ConfigError(format!("Memory size too large: {}", input))
    })
}
