//! Cross-thread attribution of consumed stores.
//!
//! When a load resolves a store written by a different thread, the reader
//! inherits the writer's total vulnerability factors, the writer's self
//! baseline moves, and (with fan tracking on) the fan matrices record the
//! edge and push established upstream influence one hop further.

use super::fan::FanMatrix;
use super::store::PendingStore;
use crate::ledger::{LedgerError, ThreadLedger};

/// What a resolved load did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribution {
    /// The reader consumed its own store; nothing remote happened.
    Local,
    /// The reader inherited exposure from `owner`.
    Remote {
        owner: usize,
        /// The `owner -> reader` edge is past the propagation threshold.
        channel: bool,
        /// Indirect cells raised by this event.
        raised: usize,
    },
}

/// Applies remote attribution and maintains the fan matrices.
#[derive(Debug, Clone)]
pub struct Propagator {
    fan: FanMatrix,
    fan_tracking: bool,
    attributions: u64,
}

impl Propagator {
    /// Create a propagator over `threads` ledgers.
    pub fn new(threads: usize, threshold: u64, decay: f64, fan_tracking: bool) -> Self {
        Self {
            fan: FanMatrix::new(threads, threshold, decay),
            fan_tracking,
            attributions: 0,
        }
    }

    /// The fan matrices.
    pub fn fan(&self) -> &FanMatrix {
        &self.fan
    }

    /// Remote attributions performed so far.
    pub fn attributions(&self) -> u64 {
        self.attributions
    }

    /// Attribute a store resolved by `reader`.
    ///
    /// `threads` is the primary ledger table; both `reader` and
    /// `store.owner` index into it.
    pub fn attribute(
        &mut self,
        threads: &mut [ThreadLedger],
        store: &PendingStore,
        reader: usize,
    ) -> Result<Attribution, LedgerError> {
        let owner = store.owner;
        if owner == reader {
            return Ok(Attribution::Local);
        }

        threads[reader].record_remote(owner, store.total)?;
        threads[owner].rebase_self(store.local);
        self.attributions += 1;

        let (mut channel, mut raised) = (false, 0);
        if self.fan_tracking {
            channel = self.fan.record_direct(owner, reader, store.local_factor);
            if channel {
                raised = self.fan.propagate(owner, reader);
            }
        }

        log::debug!(
            "remote attribution {} -> {} (tvf alu={:.6} reg={:.6} mem={:.6})",
            owner,
            reader,
            store.total.alu,
            store.total.register,
            store.total.memory
        );
        if raised > 0 {
            log::debug!("{} indirect cells raised via {} -> {}", raised, owner, reader);
        }

        Ok(Attribution::Remote {
            owner,
            channel,
            raised,
        })
    }
}
