use sysinfo::{Pid, ProcessRefreshKind, System};
use tracing::debug;

/// Samples resident memory for a supervised process. A sample can be
/// unavailable when the process has just exited or the platform withholds
/// the data; callers treat that as "no observation", not an error.
pub struct MemorySampler {
    system: System,
}

impl MemorySampler {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    /// Resident set size of `pid` in bytes, if observable
    pub fn rss_bytes(&mut self, pid: u32) -> Option<u64> {
        let sys_pid = Pid::from_u32(pid);

        self.system.refresh_processes_specifics(
            sysinfo::ProcessesToUpdate::Some(&[sys_pid]),
            true,
            ProcessRefreshKind::everything(),
        );

        let sample = self.system.process(sys_pid).map(|p| p.memory());
        if sample.is_none() {
            debug!(pid, "memory sample unavailable");
        }
        sample
    }
}
