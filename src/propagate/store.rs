//! Pending stores keyed by address.
//!
//! Every memory write leaves a [`PendingStore`] behind: who wrote, how
//! vulnerable the writer was at that moment, and every thread's instruction
//! number at the time. A later load of the same address resolves it. Only
//! the latest write to an address is kept.

use std::collections::HashMap;

use smallvec::SmallVec;

use crate::ledger::Exposure;

/// Inline capacity for per-thread instruction snapshots.
pub const INLINE_THREADS: usize = 9;

/// Snapshot taken when a thread writes memory.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingStore {
    /// Ledger index of the writing thread.
    pub owner: usize,
    /// Writer's total vulnerability factors.
    pub total: Exposure,
    /// Writer's local vulnerability factors (feeds the fan matrix).
    pub local_factor: Exposure,
    /// Writer's raw local accumulators.
    pub local: Exposure,
    /// Instruction number of every thread, indexed by ledger index.
    pub instruction_marks: SmallVec<[u64; INLINE_THREADS]>,
}

impl PendingStore {
    /// Instruction number `thread` had reached when this store happened.
    ///
    /// Threads that did not exist yet read as zero.
    pub fn mark_for(&self, thread: usize) -> u64 {
        self.instruction_marks.get(thread).copied().unwrap_or(0)
    }
}

/// Shared ledger of the most recent store to each address.
#[derive(Debug, Default, Clone)]
pub struct StoreLedger {
    stores: HashMap<u64, PendingStore>,
    writes: u64,
}

impl StoreLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a store, replacing whatever was pending at `address`.
    pub fn record(&mut self, address: u64, store: PendingStore) -> Option<PendingStore> {
        self.writes += 1;
        self.stores.insert(address, store)
    }

    /// The pending store for `address`, if any.
    pub fn lookup(&self, address: u64) -> Option<&PendingStore> {
        self.stores.get(&address)
    }

    /// Number of addresses with a pending store.
    pub fn len(&self) -> usize {
        self.stores.len()
    }

    /// True if nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// Total stores recorded, including superseded ones.
    pub fn writes(&self) -> u64 {
        self.writes
    }
}
