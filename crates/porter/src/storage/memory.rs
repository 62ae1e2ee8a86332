//! Process memory sampling for flush diagnostics.

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::warn;

/// Samples this process's resident memory.
pub struct MemorySampler {
    system: System,
    pid: Option<Pid>,
}

impl MemorySampler {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                warn!("Memory sampling disabled: {}", e);
                None
            }
        };
        Self {
            system: System::new(),
            pid,
        }
    }

    /// Resident memory in bytes, or 0 when unavailable.
    pub fn sample(&mut self) -> u64 {
        let Some(pid) = self.pid else {
            return 0;
        };
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
        self.system.process(pid).map(|p| p.memory()).unwrap_or(0)
    }
}

impl Default for MemorySampler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemorySampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySampler").field("pid", &self.pid).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_reports_resident_memory() {
        let mut sampler = MemorySampler::new();
        assert!(sampler.sample() > 0);
    }
}
