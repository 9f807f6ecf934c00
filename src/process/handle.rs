use crate::config::{self, ManagedAppConfig};
use crate::error::{Result, WardenError};
use crate::logs::{LogHandles, LogSink};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::os::unix::process::ExitStatusExt;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How a process run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitKind {
    /// Exited on its own with this status code
    Code(i32),
    /// Terminated by this signal number
    Signal(i32),
}

impl ExitKind {
    fn from_status(status: std::process::ExitStatus) -> Self {
        match status.code() {
            Some(code) => ExitKind::Code(code),
            None => ExitKind::Signal(status.signal().unwrap_or(0)),
        }
    }

    pub fn success(&self) -> bool {
        matches!(self, ExitKind::Code(0))
    }
}

impl std::fmt::Display for ExitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitKind::Code(code) => write!(f, "code {}", code),
            ExitKind::Signal(sig) => write!(f, "signal {}", sig),
        }
    }
}

/// How long to wait for output pumps after the child itself has exited.
/// A grandchild that inherited the pipes can hold them open indefinitely;
/// past this bound the pumps are left to drain in the background.
const PUMP_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Parse a signal name like "SIGTERM" into a deliverable signal
pub fn parse_signal(signal_name: &str) -> Result<Signal> {
    match signal_name {
        "SIGTERM" => Ok(Signal::SIGTERM),
        "SIGINT" => Ok(Signal::SIGINT),
        "SIGQUIT" => Ok(Signal::SIGQUIT),
        "SIGKILL" => Ok(Signal::SIGKILL),
        "SIGHUP" => Ok(Signal::SIGHUP),
        "SIGUSR1" => Ok(Signal::SIGUSR1),
        "SIGUSR2" => Ok(Signal::SIGUSR2),
        _ => Err(WardenError::SignalError(format!(
            "Invalid signal name: {}",
            signal_name
        ))),
    }
}

/// A live child process wired to its log sinks
pub struct ProcessHandle {
    slot: String,
    child: Child,
    pid: u32,
    pumps: Vec<JoinHandle<()>>,
}

impl ProcessHandle {
    /// Spawn the configured command, wiring stdout and stderr into the
    /// given log handles. The child sees the supervisor's environment with
    /// the configured overrides applied on top.
    pub async fn spawn(
        slot: &str,
        config: &ManagedAppConfig,
        handles: &LogHandles,
    ) -> Result<Self> {
        if !config.command.exists() {
            return Err(WardenError::SpawnError(format!(
                "Command does not exist: {}",
                config.command.display()
            )));
        }

        let env = config::resolve_env(&config.env);

        let mut command = Command::new(&config.command);
        command
            .args(&config.args)
            .current_dir(&config.cwd)
            .env_clear()
            .envs(&env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            WardenError::SpawnError(format!("Failed to spawn process '{}': {}", slot, e))
        })?;

        let pid = child.id().ok_or_else(|| {
            WardenError::SpawnError(format!("Failed to get PID for process '{}'", slot))
        })?;

        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(pump_lines(stdout, handles.stdout_sink(), slot.to_string()));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(pump_lines(stderr, handles.stderr_sink(), slot.to_string()));
        }

        debug!(slot, pid, "spawned process");

        Ok(Self {
            slot: slot.to_string(),
            child,
            pid,
            pumps,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Send a signal to the process. Delivery failure is logged rather than
    /// raised; the process may already be gone.
    pub fn signal(&self, signal: Signal) {
        let pid = Pid::from_raw(self.pid as i32);
        if let Err(e) = signal::kill(pid, signal) {
            if e == nix::errno::Errno::ESRCH {
                debug!(slot = %self.slot, pid = self.pid, "signal target already exited");
            } else {
                warn!(
                    slot = %self.slot,
                    pid = self.pid,
                    "failed to deliver {}: {}",
                    signal,
                    e
                );
            }
        }
    }

    /// Wait for the process to exit, then drain the output pumps so every
    /// captured line reaches its sink before the caller moves on
    pub async fn wait(&mut self) -> Result<ExitKind> {
        let status = self.child.wait().await?;
        for pump in self.pumps.drain(..) {
            if tokio::time::timeout(PUMP_DRAIN_TIMEOUT, pump).await.is_err() {
                warn!(slot = %self.slot, "output pipe still open after exit, detaching pump");
            }
        }
        Ok(ExitKind::from_status(status))
    }
}

fn pump_lines<R>(reader: R, sink: LogSink, slot: String) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    let trimmed = line.strip_suffix('\n').unwrap_or(&line);
                    let trimmed = trimmed.strip_suffix('\r').unwrap_or(trimmed);
                    if let Err(e) = sink.write_line(trimmed).await {
                        warn!(slot = %slot, "dropping process output: {}", e);
                        break;
                    }
                }
                Err(e) => {
                    debug!(slot = %slot, "output stream closed: {}", e);
                    break;
                }
            }
        }
    })
}
