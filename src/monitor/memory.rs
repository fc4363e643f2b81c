//! Process memory snapshots

use sysinfo::{Pid, System};
use tracing::warn;

/// Reads the resident memory of the current process.
pub struct MemoryProbe {
    system: System,
    pid: Option<Pid>,
}

impl Default for MemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                warn!("Memory probe disabled, cannot resolve current pid: {}", e);
                None
            }
        };
        Self {
            system: System::new(),
            pid,
        }
    }

    /// Current memory in bytes, `None` when the process cannot be read.
    pub fn current_bytes(&mut self) -> Option<u64> {
        let pid = self.pid?;
        if !self.system.refresh_process(pid) {
            warn!("Memory probe could not refresh process {}", pid);
            return None;
        }
        self.system.process(pid).map(|p| p.memory())
    }
}

/// `after - before`, zero when either reading is missing.
pub fn memory_delta(before: Option<u64>, after: Option<u64>) -> i64 {
    match (before, after) {
        (Some(b), Some(a)) => a as i64 - b as i64,
        _ => 0,
    }
}
