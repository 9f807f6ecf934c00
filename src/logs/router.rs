use crate::config::ManagedAppConfig;
use crate::error::{Result, WardenError};
use crate::logs::timefmt;
use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Source tags for merged log lines
const STDOUT_TAG: &str = "[OUT]";
const STDERR_TAG: &str = "[ERR]";

/// Routes a process's output streams to their configured log files. One
/// router lives for the whole slot; it hands out fresh `LogHandles` for each
/// run segment.
pub struct LogRouter {
    slot: String,
    stdout_path: PathBuf,
    stderr_path: PathBuf,
    merged: bool,
    strftime: Arc<str>,
}

impl LogRouter {
    pub fn new(slot: &str, config: &ManagedAppConfig) -> Self {
        Self {
            slot: slot.to_string(),
            stdout_path: config.stdout_path.clone(),
            stderr_path: config.stderr_path.clone(),
            merged: config.merge_logs,
            strftime: timefmt::to_strftime(&config.log_date_format).into(),
        }
    }

    /// Open append-mode handles for one run segment. In merged mode both
    /// streams share the stdout file and every line carries a source tag.
    pub async fn open(&self) -> Result<LogHandles> {
        debug!(slot = %self.slot, "opening log handles");

        let stdout_file = open_append(&self.stdout_path).await?;

        if self.merged {
            let shared = Arc::new(Mutex::new(stdout_file));
            Ok(LogHandles {
                stdout: LogSink {
                    file: Arc::clone(&shared),
                    strftime: Arc::clone(&self.strftime),
                    tag: Some(STDOUT_TAG),
                },
                stderr: LogSink {
                    file: shared,
                    strftime: Arc::clone(&self.strftime),
                    tag: Some(STDERR_TAG),
                },
            })
        } else {
            let stderr_file = open_append(&self.stderr_path).await?;
            Ok(LogHandles {
                stdout: LogSink {
                    file: Arc::new(Mutex::new(stdout_file)),
                    strftime: Arc::clone(&self.strftime),
                    tag: None,
                },
                stderr: LogSink {
                    file: Arc::new(Mutex::new(stderr_file)),
                    strftime: Arc::clone(&self.strftime),
                    tag: None,
                },
            })
        }
    }
}

async fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| WardenError::LogOpenError(format!("{}: {}", path.display(), e)))
}

/// Log handles for one run segment; owned until `close`
pub struct LogHandles {
    stdout: LogSink,
    stderr: LogSink,
}

impl LogHandles {
    pub fn stdout_sink(&self) -> LogSink {
        self.stdout.clone()
    }

    pub fn stderr_sink(&self) -> LogSink {
        self.stderr.clone()
    }

    /// Flush and release both handles. Both flushes run even when the first
    /// fails; failures are aggregated into a single error.
    pub async fn close(self) -> Result<()> {
        let stdout_result = self.stdout.flush().await;
        let stderr_result = self.stderr.flush().await;

        let mut failures = Vec::new();
        if let Err(e) = stdout_result {
            failures.push(format!("stdout: {}", e));
        }
        if let Err(e) = stderr_result {
            failures.push(format!("stderr: {}", e));
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(WardenError::LogError(format!(
                "Failed to close log handles: {}",
                failures.join(", ")
            )))
        }
    }
}

/// Write side handed to a stream pump; clones share the underlying file
#[derive(Clone)]
pub struct LogSink {
    file: Arc<Mutex<File>>,
    strftime: Arc<str>,
    tag: Option<&'static str>,
}

impl LogSink {
    /// Append one line, prefixed with a timestamp and, in merged mode, the
    /// source tag
    pub async fn write_line(&self, line: &str) -> Result<()> {
        let timestamp = Local::now().format(&self.strftime).to_string();
        let entry = match self.tag {
            Some(tag) => format!("[{}] {} {}\n", timestamp, tag, line),
            None => format!("[{}] {}\n", timestamp, line),
        };

        let mut file = self.file.lock().await;
        file.write_all(entry.as_bytes())
            .await
            .map_err(|e| WardenError::LogError(format!("Failed to write to log: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| WardenError::LogError(format!("Failed to flush log: {}", e)))?;

        Ok(())
    }

    pub async fn flush(&self) -> Result<()> {
        let mut file = self.file.lock().await;
        file.flush()
            .await
            .map_err(|e| WardenError::LogError(format!("Failed to flush log: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &Path, merged: bool) -> ManagedAppConfig {
        ManagedAppConfig {
            name: "test-app".to_string(),
            command: PathBuf::from("/bin/echo"),
            args: vec![],
            cwd: PathBuf::from("/tmp"),
            instances: 1,
            autorestart: true,
            max_memory_restart: None,
            env: vec![],
            stdout_path: dir.join("app-out.log"),
            stderr_path: dir.join("app-err.log"),
            merge_logs: merged,
            log_date_format: "YYYY-MM-DD HH:mm:ss".to_string(),
            stop_signal: "SIGTERM".to_string(),
            stop_grace_secs: 5,
            max_restarts: 10,
            restart_window_secs: 60,
            restart_delay_secs: 1,
            max_restart_delay_secs: 60,
            stability_window_secs: 10,
            memory_check_secs: 5,
        }
    }

    #[tokio::test]
    async fn test_write_to_separate_files() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = test_config(temp_dir.path(), false);

        let router = LogRouter::new("test-app", &config);
        let handles = router.open().await.unwrap();

        handles.stdout_sink().write_line("hello out").await.unwrap();
        handles.stderr_sink().write_line("hello err").await.unwrap();
        handles.close().await.unwrap();

        let out = std::fs::read_to_string(&config.stdout_path).unwrap();
        let err = std::fs::read_to_string(&config.stderr_path).unwrap();

        assert!(out.contains("hello out"));
        assert!(out.starts_with('['));
        assert!(!out.contains("[OUT]"));
        assert!(err.contains("hello err"));
        assert!(!err.contains("hello out"));
    }

    #[tokio::test]
    async fn test_merged_lines_are_tagged() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = test_config(temp_dir.path(), true);

        let router = LogRouter::new("test-app", &config);
        let handles = router.open().await.unwrap();

        handles.stdout_sink().write_line("from stdout").await.unwrap();
        handles.stderr_sink().write_line("from stderr").await.unwrap();
        handles.close().await.unwrap();

        let merged = std::fs::read_to_string(&config.stdout_path).unwrap();
        let lines: Vec<&str> = merged.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("[OUT] from stdout"));
        assert!(lines[1].contains("[ERR] from stderr"));
        assert!(!config.stderr_path.exists());
    }

    #[tokio::test]
    async fn test_reopen_appends() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = test_config(temp_dir.path(), false);

        let router = LogRouter::new("test-app", &config);

        let handles = router.open().await.unwrap();
        handles.stdout_sink().write_line("first segment").await.unwrap();
        handles.close().await.unwrap();

        let handles = router.open().await.unwrap();
        handles.stdout_sink().write_line("second segment").await.unwrap();
        handles.close().await.unwrap();

        let out = std::fs::read_to_string(&config.stdout_path).unwrap();
        assert!(out.contains("first segment"));
        assert!(out.contains("second segment"));
        assert_eq!(out.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_timestamp_uses_configured_format() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let mut config = test_config(temp_dir.path(), false);
        config.log_date_format = "HH:mm:ss".to_string();

        let router = LogRouter::new("test-app", &config);
        let handles = router.open().await.unwrap();
        handles.stdout_sink().write_line("stamped").await.unwrap();
        handles.close().await.unwrap();

        let out = std::fs::read_to_string(&config.stdout_path).unwrap();
        let line = out.lines().next().unwrap();

        // "[HH:MM:SS] stamped"
        assert_eq!(&line[0..1], "[");
        assert_eq!(&line[9..10], "]");
        assert!(line.ends_with("stamped"));
    }

    #[tokio::test]
    async fn test_missing_parent_directory() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let mut config = test_config(temp_dir.path(), false);
        config.stdout_path = temp_dir.path().join("no-such-dir").join("out.log");

        let router = LogRouter::new("test-app", &config);
        let result = router.open().await;

        assert!(matches!(result, Err(WardenError::LogOpenError(_))));
    }
}
