// Supervisor module - Per-slot lifecycle state machine

mod restart;

pub use restart::{RestartPolicy, RestartTracker};

use crate::config::ManagedAppConfig;
use crate::logs::{LogHandles, LogRouter};
use crate::process::{parse_signal, ExitKind, MemorySampler, ProcessHandle};
use nix::sys::signal::Signal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Lifecycle phase of a supervised slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecyclePhase {
    Stopped,
    Starting,
    Running,
    Stopping,
    Restarting,
    Failed,
}

impl LifecyclePhase {
    /// Terminal phases never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecyclePhase::Stopped | LifecyclePhase::Failed)
    }
}

impl std::fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecyclePhase::Stopped => "stopped",
            LifecyclePhase::Starting => "starting",
            LifecyclePhase::Running => "running",
            LifecyclePhase::Stopping => "stopping",
            LifecyclePhase::Restarting => "restarting",
            LifecyclePhase::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Observable state of one supervised slot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessState {
    /// Current lifecycle phase
    pub phase: LifecyclePhase,
    /// PID of the live process, if one is running
    pub pid: Option<u32>,
    /// When the current (or last) run segment started
    pub started_at: Option<SystemTime>,
    /// Consecutive restarts since the last stable run
    pub restarts: usize,
    /// How the last run segment ended
    pub last_exit: Option<ExitKind>,
    /// Most recent memory sample in bytes
    pub last_memory: Option<u64>,
}

impl ProcessState {
    fn new() -> Self {
        Self {
            phase: LifecyclePhase::Stopped,
            pid: None,
            started_at: None,
            restarts: 0,
            last_exit: None,
            last_memory: None,
        }
    }
}

/// What ended a run segment
enum RunOutcome {
    /// The process exited on its own; None when the exit status could not
    /// be collected
    Exited(Option<ExitKind>),
    /// A memory sample crossed the configured threshold
    MemoryExceeded(u64),
    /// The shutdown flag flipped
    ShutdownRequested,
}

/// Drives one instance slot through its lifecycle until a terminal phase.
/// Each supervisor owns its process handle, log router, restart history and
/// memory sampler; nothing is shared across slots.
pub struct Supervisor {
    slot: String,
    config: Arc<ManagedAppConfig>,
    policy: RestartPolicy,
    tracker: RestartTracker,
    sampler: MemorySampler,
    router: LogRouter,
    state: ProcessState,
    shutdown: watch::Receiver<bool>,
    state_tx: watch::Sender<ProcessState>,
}

impl Supervisor {
    pub fn new(
        slot: String,
        config: Arc<ManagedAppConfig>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let policy = RestartPolicy::from_config(&config);
        let router = LogRouter::new(&slot, &config);
        let (state_tx, _) = watch::channel(ProcessState::new());

        Self {
            slot,
            config,
            policy,
            tracker: RestartTracker::new(),
            sampler: MemorySampler::new(),
            router,
            state: ProcessState::new(),
            shutdown,
            state_tx,
        }
    }

    pub fn slot(&self) -> &str {
        &self.slot
    }

    /// Subscribe to state snapshots, published at every transition
    pub fn subscribe(&self) -> watch::Receiver<ProcessState> {
        self.state_tx.subscribe()
    }

    /// Drive the slot until it reaches a terminal phase, returning the
    /// final observable state
    pub async fn run(mut self) -> ProcessState {
        let mut shutdown = self.shutdown.clone();

        loop {
            if *shutdown.borrow() {
                self.set_phase(LifecyclePhase::Stopped);
                break;
            }

            self.set_phase(LifecyclePhase::Starting);

            let handles = match self.router.open().await {
                Ok(handles) => handles,
                Err(e) => {
                    error!(slot = %self.slot, "cannot open log files: {}", e);
                    self.set_phase(LifecyclePhase::Failed);
                    break;
                }
            };

            let mut process =
                match ProcessHandle::spawn(&self.slot, &self.config, &handles).await {
                    Ok(process) => process,
                    Err(e) => {
                        warn!(slot = %self.slot, "spawn failed: {}", e);
                        self.close_handles(handles).await;
                        if self.pause_for_restart(&mut shutdown, false).await {
                            continue;
                        }
                        break;
                    }
                };

            self.state.pid = Some(process.pid());
            self.state.started_at = Some(SystemTime::now());
            self.set_phase(LifecyclePhase::Running);
            info!(slot = %self.slot, pid = process.pid(), "process running");

            match self.watch_process(&mut process, &mut shutdown).await {
                RunOutcome::Exited(exit) => {
                    if let Some(exit) = exit {
                        info!(slot = %self.slot, %exit, "process exited");
                    }
                    self.record_exit(exit);
                    self.close_handles(handles).await;
                    if self.pause_for_restart(&mut shutdown, false).await {
                        continue;
                    }
                    break;
                }
                RunOutcome::MemoryExceeded(rss) => {
                    warn!(
                        slot = %self.slot,
                        rss,
                        threshold = self.config.max_memory_restart,
                        "memory threshold exceeded, restarting"
                    );
                    self.set_phase(LifecyclePhase::Restarting);
                    self.stop_process(&mut process, &mut shutdown).await;
                    self.close_handles(handles).await;
                    if self.pause_for_restart(&mut shutdown, true).await {
                        continue;
                    }
                    break;
                }
                RunOutcome::ShutdownRequested => {
                    self.set_phase(LifecyclePhase::Stopping);
                    self.stop_process(&mut process, &mut shutdown).await;
                    self.close_handles(handles).await;
                    self.set_phase(LifecyclePhase::Stopped);
                    break;
                }
            }
        }

        info!(slot = %self.slot, phase = %self.state.phase, "supervisor finished");
        self.state
    }

    /// Observe a running process until it exits, trips the memory
    /// threshold, or shutdown is requested
    async fn watch_process(
        &mut self,
        process: &mut ProcessHandle,
        shutdown: &mut watch::Receiver<bool>,
    ) -> RunOutcome {
        let memory_threshold = self.config.max_memory_restart;
        let mut memory_ticks = tokio::time::interval(self.config.memory_check_interval());
        memory_ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut stability_pending = self.tracker.total() > 0;
        let stabilize = tokio::time::sleep(self.policy.stability_window);
        tokio::pin!(stabilize);

        loop {
            tokio::select! {
                status = process.wait() => {
                    return RunOutcome::Exited(match status {
                        Ok(exit) => Some(exit),
                        Err(e) => {
                            error!(slot = %self.slot, "wait failed: {}", e);
                            None
                        }
                    });
                }
                _ = shutdown.changed() => {
                    return RunOutcome::ShutdownRequested;
                }
                _ = &mut stabilize, if stability_pending => {
                    stability_pending = false;
                    self.tracker.clear();
                    self.state.restarts = 0;
                    self.publish();
                    debug!(slot = %self.slot, "uptime stable, restart counter reset");
                }
                _ = memory_ticks.tick(), if memory_threshold.is_some() => {
                    if let (Some(threshold), Some(pid)) = (memory_threshold, self.state.pid) {
                        // A missing sample is no observation, not a breach
                        if let Some(rss) = self.sampler.rss_bytes(pid) {
                            self.state.last_memory = Some(rss);
                            self.publish();
                            if rss > threshold {
                                return RunOutcome::MemoryExceeded(rss);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Graceful stop: deliver the configured signal, wait out the grace
    /// period, then escalate to SIGKILL. Another shutdown edge during the
    /// grace wait escalates immediately.
    async fn stop_process(
        &mut self,
        process: &mut ProcessHandle,
        shutdown: &mut watch::Receiver<bool>,
    ) {
        let stop_signal = parse_signal(&self.config.stop_signal).unwrap_or(Signal::SIGTERM);
        let grace = self.config.stop_grace_period();

        info!(slot = %self.slot, signal = %self.config.stop_signal, "stopping process");
        process.signal(stop_signal);

        let waited = tokio::select! {
            result = tokio::time::timeout(grace, process.wait()) => match result {
                Ok(exit) => Some(exit),
                Err(_) => None,
            },
            _ = shutdown.changed() => {
                debug!(slot = %self.slot, "repeated shutdown request, escalating");
                None
            }
        };

        match waited {
            Some(Ok(exit)) => {
                info!(slot = %self.slot, %exit, "process exited gracefully");
                self.record_exit(Some(exit));
            }
            Some(Err(e)) => {
                error!(slot = %self.slot, "wait failed during stop: {}", e);
                self.record_exit(None);
            }
            None => {
                warn!(
                    slot = %self.slot,
                    "process did not exit within {:?}, sending SIGKILL",
                    grace
                );
                process.signal(Signal::SIGKILL);
                match process.wait().await {
                    Ok(exit) => self.record_exit(Some(exit)),
                    Err(e) => {
                        error!(slot = %self.slot, "wait failed after SIGKILL: {}", e);
                        self.record_exit(None);
                    }
                }
            }
        }
    }

    /// Decide whether the loop spins again after a dead run segment and sit
    /// out the backoff delay if so. Returns false once the slot has reached
    /// a terminal phase. `forced` restarts (memory threshold) ignore the
    /// autorestart flag but still count against the budget.
    async fn pause_for_restart(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
        forced: bool,
    ) -> bool {
        if *shutdown.borrow() {
            self.set_phase(LifecyclePhase::Stopped);
            return false;
        }

        if !forced && !self.policy.autorestart {
            info!(slot = %self.slot, "autorestart disabled, not restarting");
            self.set_phase(LifecyclePhase::Failed);
            return false;
        }

        if !self.policy.within_budget(&self.tracker) {
            error!(
                slot = %self.slot,
                recent = self.tracker.count_recent(self.policy.window),
                window = ?self.policy.window,
                "restart budget exhausted"
            );
            self.set_phase(LifecyclePhase::Failed);
            return false;
        }

        let delay = self.policy.delay_for(self.state.restarts);
        self.tracker.record();
        self.state.restarts = self.tracker.total();
        self.set_phase(LifecyclePhase::Restarting);
        info!(
            slot = %self.slot,
            restarts = self.state.restarts,
            delay = ?delay,
            "restarting after delay"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = shutdown.changed() => {
                info!(slot = %self.slot, "shutdown during restart delay");
                self.set_phase(LifecyclePhase::Stopped);
                false
            }
        }
    }

    async fn close_handles(&self, handles: LogHandles) {
        if let Err(e) = handles.close().await {
            warn!(slot = %self.slot, "{}", e);
        }
    }

    fn record_exit(&mut self, exit: Option<ExitKind>) {
        self.state.last_exit = exit;
        self.state.pid = None;
        self.publish();
    }

    fn set_phase(&mut self, phase: LifecyclePhase) {
        if self.state.phase != phase {
            debug!(slot = %self.slot, from = %self.state.phase, to = %phase, "phase transition");
            self.state.phase = phase;
        }
        self.publish();
    }

    fn publish(&self) {
        let _ = self.state_tx.send(self.state.clone());
    }
}
