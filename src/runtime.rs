use crate::config::ManagedAppConfig;
use crate::error::{Result, WardenError};
use crate::supervisor::{LifecyclePhase, ProcessState, Supervisor};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

/// Flips the shared shutdown flag observed by every supervisor
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Request shutdown of every slot. Repeated calls escalate stops that
    /// are already waiting out their grace period.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

/// Owns one supervisor per instance slot and the shutdown flag they all
/// observe. Slots never interact; a failing app cannot take down its
/// siblings.
pub struct SupervisorRuntime {
    supervisors: Vec<Supervisor>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl SupervisorRuntime {
    /// Validate the given app configs and lay out one supervisor per
    /// instance slot. App names must be unique across the set.
    pub fn new(configs: Vec<ManagedAppConfig>) -> Result<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        let shutdown_tx = Arc::new(shutdown_tx);

        let mut seen = HashSet::new();
        for config in &configs {
            config.validate()?;
            if !seen.insert(config.name.clone()) {
                return Err(WardenError::InvalidConfig {
                    name: config.name.clone(),
                    violations: vec!["duplicate app name".to_string()],
                });
            }
        }

        let mut supervisors = Vec::new();
        for config in configs {
            let config = Arc::new(config);
            for index in 0..config.instances {
                let slot = config.slot_name(index);
                supervisors.push(Supervisor::new(
                    slot,
                    Arc::clone(&config),
                    shutdown_tx.subscribe(),
                ));
            }
        }

        Ok(Self {
            supervisors,
            shutdown_tx,
        })
    }

    /// Number of instance slots laid out
    pub fn slot_count(&self) -> usize {
        self.supervisors.len()
    }

    /// Handle for requesting shutdown from outside the runtime
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Per-slot state subscriptions for observers
    pub fn subscribe_all(&self) -> BTreeMap<String, watch::Receiver<ProcessState>> {
        self.supervisors
            .iter()
            .map(|s| (s.slot().to_string(), s.subscribe()))
            .collect()
    }

    /// Run every slot to its terminal phase and collect the final states.
    /// Returns once all slots are Stopped or Failed, which happens after a
    /// shutdown request or when every slot has burned out on its own.
    pub async fn run(self) -> BTreeMap<String, ProcessState> {
        info!(slots = self.supervisors.len(), "starting supervisors");

        let mut tasks = Vec::with_capacity(self.supervisors.len());
        for supervisor in self.supervisors {
            let slot = supervisor.slot().to_string();
            tasks.push((slot, tokio::spawn(supervisor.run())));
        }

        let mut final_states = BTreeMap::new();
        for (slot, task) in tasks {
            match task.await {
                Ok(state) => {
                    if state.phase == LifecyclePhase::Failed {
                        error!(slot = %slot, "slot finished in failed state");
                    }
                    final_states.insert(slot, state);
                }
                Err(e) => {
                    error!(slot = %slot, "supervisor task panicked: {}", e);
                }
            }
        }

        info!("all supervisors finished");
        final_states
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn app(name: &str, instances: usize) -> ManagedAppConfig {
        ManagedAppConfig {
            name: name.to_string(),
            command: PathBuf::from("/bin/sleep"),
            args: vec!["30".to_string()],
            cwd: PathBuf::from("/tmp"),
            instances,
            autorestart: true,
            max_memory_restart: None,
            env: vec![],
            stdout_path: PathBuf::from("/tmp/warden-test-out.log"),
            stderr_path: PathBuf::from("/tmp/warden-test-err.log"),
            merge_logs: false,
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
    async fn test_slot_fanout() {
        let runtime = SupervisorRuntime::new(vec![app("solo", 1), app("fleet", 3)]).unwrap();
        assert_eq!(runtime.slot_count(), 4);

        let slots: Vec<String> = runtime.subscribe_all().into_keys().collect();
        assert_eq!(slots, vec!["fleet-0", "fleet-1", "fleet-2", "solo"]);
    }

    #[tokio::test]
    async fn test_duplicate_app_name_rejected() {
        let result = SupervisorRuntime::new(vec![app("web", 1), app("web", 2)]);
        match result {
            Err(WardenError::InvalidConfig { name, violations }) => {
                assert_eq!(name, "web");
                assert!(violations[0].contains("duplicate"));
            }
            _ => panic!("expected InvalidConfig"),
        }
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut bad = app("web", 1);
        bad.cwd = PathBuf::from("not/absolute");

        assert!(matches!(
            SupervisorRuntime::new(vec![bad]),
            Err(WardenError::InvalidConfig { .. })
        ));
    }
}
