//! Per-thread resource ledger.
//!
//! A [`ThreadLedger`] holds everything the analysis knows about one hardware
//! thread: counters, local and remote accumulators, and the keyed ledgers
//! for register liveness, memory liveness, memory load times, and the
//! per-source remote breakdown.
//!
//! Liveness is measured in the thread's own instruction numbers. A read of a
//! resource charges the distance back to its previous access and moves the
//! resource's baseline to the current instruction, so every window is
//! charged once.

use super::aggregate::{AggregateMap, LedgerError, Tally};
use super::exposure::{Exposure, ResourceClass};
use super::factors::{local_factor, remote_factor};
use crate::decode::{AccessKind, InstructionEffect};

/// Liveness record for one register.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegisterLiveness {
    /// Instruction number of the most recent access.
    pub last_access: u64,
    /// Vulnerability accumulated by this register so far.
    pub vulnerability: f64,
}

impl Tally for RegisterLiveness {
    fn tally(&self) -> f64 {
        self.vulnerability
    }
}

/// Remote exposure inherited from one source thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemoteShare {
    /// Summed total factors of the consumed stores.
    pub exposure: Exposure,
    /// Number of consumed stores.
    pub count: u64,
}

/// Per-source remote breakdown, one map per class plus a sample count.
#[derive(Debug, Clone, Default)]
pub struct RemoteBreakdown {
    pub alu: AggregateMap<usize, f64>,
    pub register: AggregateMap<usize, f64>,
    pub memory: AggregateMap<usize, f64>,
    pub count: AggregateMap<usize, u64>,
}

impl RemoteBreakdown {
    fn record(&mut self, source: usize, exposure: Exposure) -> Result<(), LedgerError> {
        self.alu.accumulate(source, exposure.alu)?;
        self.register.accumulate(source, exposure.register)?;
        self.memory.accumulate(source, exposure.memory)?;
        self.count.accumulate(source, 1)
    }

    /// What this thread inherited from `source`, if anything.
    pub fn share(&self, source: usize) -> Option<RemoteShare> {
        let count = *self.count.get(&source)?;
        Some(RemoteShare {
            exposure: Exposure::new(
                self.alu.get(&source).copied().unwrap_or(0.0),
                self.register.get(&source).copied().unwrap_or(0.0),
                self.memory.get(&source).copied().unwrap_or(0.0),
            ),
            count,
        })
    }

    /// Source thread indices in ascending order.
    pub fn sources(&self) -> Vec<usize> {
        self.count.sorted().into_iter().map(|(k, _)| *k).collect()
    }
}

/// Everything tracked for one hardware thread.
#[derive(Debug, Clone)]
pub struct ThreadLedger {
    /// Position in the engine's ledger table.
    pub index: usize,
    /// Thread (or process) id reported by the trace source.
    pub thread_id: u64,
    /// Core the thread was first seen on.
    pub core: usize,
    /// Retired instructions; the thread's liveness clock.
    pub instructions: u64,
    /// Instruction fetch attempts.
    pub fetches: u64,
    /// Register reads charged.
    pub register_reads: u64,
    /// Memory reads that closed a non-empty window.
    pub memory_reads: u64,
    /// Loads attributed to another thread's store.
    pub remote_count: u64,
    /// Locally generated vulnerability.
    pub local: Exposure,
    /// Remote total factors summed over all attributions.
    pub remote: Exposure,
    /// Local accumulators captured at the latest remote attribution.
    pub self_baseline: Exposure,
    /// Last non-zero baseline before `self_baseline`.
    pub previous_baseline: Exposure,
    registers: AggregateMap<String, RegisterLiveness>,
    memory: AggregateMap<u64, f64>,
    memory_loads: AggregateMap<u64, u64>,
    remote_sources: RemoteBreakdown,
}

impl ThreadLedger {
    /// Create an empty ledger.
    pub fn new(index: usize, thread_id: u64, core: usize) -> Self {
        Self {
            index,
            thread_id,
            core,
            instructions: 0,
            fetches: 0,
            register_reads: 0,
            memory_reads: 0,
            remote_count: 0,
            local: Exposure::ZERO,
            remote: Exposure::ZERO,
            self_baseline: Exposure::ZERO,
            previous_baseline: Exposure::ZERO,
            registers: AggregateMap::default(),
            memory: AggregateMap::default(),
            memory_loads: AggregateMap::default(),
            remote_sources: RemoteBreakdown::default(),
        }
    }

    /// Discard all state and rebind to a new thread.
    pub fn reinitialize(&mut self, thread_id: u64, core: usize) {
        *self = Self::new(self.index, thread_id, core);
    }

    /// Count one fetched and retired instruction.
    pub fn retire_instruction(&mut self) {
        self.fetches += 1;
        self.instructions += 1;
    }

    /// Charge one instruction of ALU exposure.
    pub fn charge_alu(&mut self) {
        self.local.alu += 1.0;
    }

    /// Read `name` at the current instruction and return the charged window.
    pub fn read_register(&mut self, name: &str) -> Result<f64, LedgerError> {
        let now = self.instructions;
        let (window, vulnerability) = match self.registers.get(name) {
            Some(entry) => {
                let window = now.saturating_sub(entry.last_access) as f64;
                (window, entry.vulnerability + window)
            }
            None => (0.0, 0.0),
        };

        self.registers.put(
            name.to_string(),
            RegisterLiveness {
                last_access: now,
                vulnerability,
            },
        )?;
        self.register_reads += 1;
        self.local.register += window;
        Ok(window)
    }

    /// Write `name` at the current instruction.
    pub fn write_register(&mut self, name: &str) -> Result<(), LedgerError> {
        let vulnerability = self
            .registers
            .get(name)
            .map(|entry| entry.vulnerability)
            .unwrap_or(0.0);
        self.registers.put(
            name.to_string(),
            RegisterLiveness {
                last_access: self.instructions,
                vulnerability,
            },
        )?;
        Ok(())
    }

    /// Replay a decoded instruction's register accesses.
    pub fn apply(&mut self, effect: &InstructionEffect) -> Result<(), LedgerError> {
        for access in &effect.accesses {
            match access.kind {
                AccessKind::Read => {
                    self.read_register(&access.name)?;
                }
                AccessKind::Write => self.write_register(&access.name)?,
            }
        }
        if effect.uses_alu() {
            self.charge_alu();
        }
        Ok(())
    }

    /// Close the liveness window of `address` for a load.
    ///
    /// `stored_at` is this thread's instruction number when the value was
    /// stored. If this thread already loaded the address since then, the
    /// window starts at that load instead. Returns the charged window.
    pub fn load_memory(&mut self, address: u64, stored_at: u64) -> Result<f64, LedgerError> {
        let start = match self.memory_loads.get(&address) {
            Some(&last_load) if last_load > stored_at => last_load,
            _ => stored_at,
        };
        let window = self.instructions.saturating_sub(start) as f64;

        if window != 0.0 {
            self.memory_reads += 1;
            self.local.memory += window;
            self.memory.accumulate(address, window)?;
        }
        self.memory_loads.put(address, self.instructions)?;
        Ok(window)
    }

    /// Credit a consumed store from thread `source`.
    pub fn record_remote(&mut self, source: usize, exposure: Exposure) -> Result<(), LedgerError> {
        self.remote_sources.record(source, exposure)?;
        self.remote += exposure;
        self.remote_count += 1;
        Ok(())
    }

    /// Move the self baseline to `snapshot`.
    ///
    /// A non-zero baseline is kept as the fallback for
    /// [`self_exposure`](Self::self_exposure).
    pub fn rebase_self(&mut self, snapshot: Exposure) {
        for class in ResourceClass::ALL {
            let current = self.self_baseline.get(class);
            if current != 0.0 {
                *self.previous_baseline.get_mut(class) = current;
            }
            *self.self_baseline.get_mut(class) = snapshot.get(class);
        }
    }

    /// Vulnerability generated since the latest remote attribution.
    ///
    /// A difference of exactly zero falls back to the previous baseline.
    pub fn self_exposure(&self) -> Exposure {
        let mut out = Exposure::ZERO;
        for class in ResourceClass::ALL {
            let total = self.local.get(class);
            let mut delta = total - self.self_baseline.get(class);
            if delta == 0.0 {
                delta = total - self.previous_baseline.get(class);
            }
            *out.get_mut(class) = delta;
        }
        out
    }

    /// Local vulnerability factors.
    pub fn local_factors(&self) -> Exposure {
        Exposure::new(
            local_factor(self.local.alu, self.instructions, 1),
            local_factor(self.local.register, self.instructions, self.registers.count()),
            local_factor(self.local.memory, self.instructions, self.memory.count()),
        )
    }

    /// Remote vulnerability factors.
    pub fn remote_factors(&self) -> Exposure {
        self.remote.map(|v| remote_factor(v, self.remote_count))
    }

    /// `exposure` normalized by instructions and distinct resources.
    pub fn normalize(&self, exposure: Exposure) -> Exposure {
        Exposure::new(
            local_factor(exposure.alu, self.instructions, 1),
            local_factor(exposure.register, self.instructions, self.registers.count()),
            local_factor(exposure.memory, self.instructions, self.memory.count()),
        )
    }

    /// Register liveness ledger.
    pub fn registers(&self) -> &AggregateMap<String, RegisterLiveness> {
        &self.registers
    }

    /// Memory liveness ledger.
    pub fn memory(&self) -> &AggregateMap<u64, f64> {
        &self.memory
    }

    /// Instruction number of the last load of each address.
    pub fn memory_loads(&self) -> &AggregateMap<u64, u64> {
        &self.memory_loads
    }

    /// Remote exposure split by source thread.
    pub fn remote_sources(&self) -> &RemoteBreakdown {
        &self.remote_sources
    }

    /// Distinct registers touched.
    pub fn distinct_registers(&self) -> usize {
        self.registers.count()
    }

    /// Distinct addresses with charged memory exposure.
    pub fn distinct_memory(&self) -> usize {
        self.memory.count()
    }
}
