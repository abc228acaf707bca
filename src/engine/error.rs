//! Engine errors.

use thiserror::Error;

use crate::config::ConfigError;
use crate::ledger::LedgerError;

/// Errors raised while processing events.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The event names a core beyond the configured capacity.
    #[error("core {core} is outside the configured capacity of {capacity}")]
    CoreOutOfRange { core: usize, capacity: usize },

    /// Core-level mapping put the event on a ledger that does not exist.
    #[error("thread index {index} is outside the configured capacity of {capacity}")]
    ThreadOutOfRange { index: usize, capacity: usize },

    /// Thread-level mapping ran out of ledgers.
    #[error("thread {thread} on core {core} exceeds the capacity of {capacity} tracked threads")]
    ThreadCapacityExhausted {
        thread: u64,
        core: usize,
        capacity: usize,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Ledger storage rejected a value.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Writing a report failed.
    #[error("report output failed: {0}")]
    Report(#[from] std::io::Error),
}

impl EngineError {
    /// True for errors that only affect the offending event.
    ///
    /// Drivers may log these and keep feeding events.
    pub fn is_event_local(&self) -> bool {
        matches!(
            self,
            Self::CoreOutOfRange { .. }
                | Self::ThreadOutOfRange { .. }
                | Self::ThreadCapacityExhausted { .. }
        )
    }
}
