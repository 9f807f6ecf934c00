use crate::error::{Result, WardenError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{
    default_autorestart, default_instances, default_log_date_format, default_max_restart_delay,
    default_max_restarts, default_memory_check, default_restart_delay, default_restart_window,
    default_stability_window, default_stop_grace, default_stop_signal, parse_mem_size,
    ManagedAppConfig,
};

/// Top-level config file: a list of app declarations
#[derive(Debug, Deserialize)]
struct AppsFile {
    #[serde(default)]
    apps: Vec<RawAppConfig>,
}

/// Memory threshold as written in the file, either raw bytes or a
/// human-readable size like "500M"
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MemLimit {
    Bytes(u64),
    Human(String),
}

/// One app declaration as written in the config file
#[derive(Debug, Deserialize)]
struct RawAppConfig {
    name: String,
    script: PathBuf,
    #[serde(default)]
    args: Vec<String>,
    cwd: PathBuf,
    #[serde(default = "default_instances")]
    instances: usize,
    #[serde(default = "default_autorestart")]
    autorestart: bool,
    #[serde(default)]
    max_memory_restart: Option<MemLimit>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    env_file: Option<PathBuf>,
    out_file: PathBuf,
    error_file: PathBuf,
    #[serde(default)]
    merge_logs: bool,
    #[serde(default = "default_log_date_format")]
    log_date_format: String,
    #[serde(default = "default_stop_signal")]
    stop_signal: String,
    #[serde(default = "default_stop_grace")]
    stop_grace_secs: u64,
    #[serde(default = "default_max_restarts")]
    max_restarts: usize,
    #[serde(default = "default_restart_window")]
    restart_window_secs: u64,
    #[serde(default = "default_restart_delay")]
    restart_delay_secs: u64,
    #[serde(default = "default_max_restart_delay")]
    max_restart_delay_secs: u64,
    #[serde(default = "default_stability_window")]
    stability_window_secs: u64,
    #[serde(default = "default_memory_check")]
    memory_check_secs: u64,
}

impl RawAppConfig {
    /// Turn a file-level declaration into a runtime config. Inline env
    /// entries come first (sorted by key), env_file entries after them in
    /// file order, so the file wins on conflicting keys.
    fn materialize(self, config_dir: &Path) -> Result<ManagedAppConfig> {
        let mut env: Vec<(String, String)> = self.env.into_iter().collect();

        if let Some(ref env_file) = self.env_file {
            let path = if env_file.is_absolute() {
                env_file.clone()
            } else {
                config_dir.join(env_file)
            };
            let contents = std::fs::read_to_string(&path).map_err(|e| {
                WardenError::ConfigError(format!(
                    "Failed to read env file {}: {}",
                    path.display(),
                    e
                ))
            })?;
            env.extend(parse_env_file(&contents));
        }

        let max_memory_restart = match self.max_memory_restart {
            Some(MemLimit::Bytes(bytes)) => Some(bytes),
            Some(MemLimit::Human(text)) => Some(parse_mem_size(&text)?),
            None => None,
        };

        Ok(ManagedAppConfig {
            name: self.name,
            command: self.script,
            args: self.args,
            cwd: self.cwd,
            instances: self.instances,
            autorestart: self.autorestart,
            max_memory_restart,
            env,
            stdout_path: self.out_file,
            stderr_path: self.error_file,
            merge_logs: self.merge_logs,
            log_date_format: self.log_date_format,
            stop_signal: self.stop_signal,
            stop_grace_secs: self.stop_grace_secs,
            max_restarts: self.max_restarts,
            restart_window_secs: self.restart_window_secs,
            restart_delay_secs: self.restart_delay_secs,
            max_restart_delay_secs: self.max_restart_delay_secs,
            stability_window_secs: self.stability_window_secs,
            memory_check_secs: self.memory_check_secs,
        })
    }
}

/// Load app configurations from a file (supports TOML and JSON)
pub fn load_app_configs(path: &Path) -> Result<Vec<ManagedAppConfig>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| WardenError::ConfigError(format!("Failed to read config file: {}", e)))?;

    let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

    let apps_file: AppsFile = match extension {
        "toml" => toml::from_str(&contents)
            .map_err(|e| WardenError::ConfigError(format!("Failed to parse TOML: {}", e)))?,
        "json" => serde_json::from_str(&contents)
            .map_err(|e| WardenError::ConfigError(format!("Failed to parse JSON: {}", e)))?,
        _ => {
            return Err(WardenError::ConfigError(format!(
                "Unsupported file format: {}. Use .toml or .json",
                extension
            )))
        }
    };

    if apps_file.apps.is_empty() {
        return Err(WardenError::ConfigError(
            "No apps found in config file".to_string(),
        ));
    }

    // Relative env_file paths resolve against the config file's directory
    let config_dir = path.parent().unwrap_or_else(|| Path::new("."));

    let configs = apps_file
        .apps
        .into_iter()
        .map(|raw| raw.materialize(config_dir))
        .collect::<Result<Vec<_>>>()?;

    for config in &configs {
        config.validate()?;
    }

    Ok(configs)
}

/// Parse KEY=VALUE lines. Blank lines and #-comments are skipped; values may
/// be wrapped in single or double quotes.
fn parse_env_file(contents: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            if key.is_empty() {
                continue;
            }

            let mut value = value.trim();
            if value.len() >= 2 {
                let quoted_double = value.starts_with('"') && value.ends_with('"');
                let quoted_single = value.starts_with('\'') && value.ends_with('\'');
                if quoted_double || quoted_single {
                    value = &value[1..value.len() - 1];
                }
            }

            pairs.push((key.to_string(), value.to_string()));
        }
    }

    pairs
}
