//! Per-core activity table.
//!
//! Events from inactive cores are ignored. The table is indexed by core id
//! and sized once from the configuration. It also remembers the process
//! last seen running on each core.

use super::error::EngineError;

/// Activity flags for every core the trace source may report.
#[derive(Debug, Clone)]
pub struct CoreTable {
    active: Vec<bool>,
    process: Vec<Option<u64>>,
}

impl CoreTable {
    /// `capacity` cores, all active.
    pub fn new(capacity: usize) -> Self {
        Self {
            active: vec![true; capacity],
            process: vec![None; capacity],
        }
    }

    /// Number of cores.
    pub fn capacity(&self) -> usize {
        self.active.len()
    }

    /// Whether `core` is being traced. Out-of-range cores read as inactive.
    pub fn is_active(&self, core: usize) -> bool {
        self.active.get(core).copied().unwrap_or(false)
    }

    /// Enable or disable tracing of `core`.
    pub fn set_active(&mut self, core: usize, active: bool) -> Result<(), EngineError> {
        let capacity = self.active.len();
        let slot = self
            .active
            .get_mut(core)
            .ok_or(EngineError::CoreOutOfRange { core, capacity })?;
        *slot = active;
        Ok(())
    }

    /// Process last seen on `core`.
    pub fn process(&self, core: usize) -> Option<u64> {
        self.process.get(core).copied().flatten()
    }

    /// Record `pid` as running on `core`. Returns the previous process if it changed.
    pub fn bind_process(&mut self, core: usize, pid: u64) -> Option<u64> {
        let slot = self.process.get_mut(core)?;
        match slot.replace(pid) {
            Some(previous) if previous != pid => Some(previous),
            _ => None,
        }
    }

    /// Number of active cores.
    pub fn active_count(&self) -> usize {
        self.active.iter().filter(|&&a| a).count()
    }
}
