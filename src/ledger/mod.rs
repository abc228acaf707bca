//! Vulnerability ledgers.
//!
//! - [`aggregate`] - keyed storage with an O(1) running sum
//! - [`exposure`] - ALU / register / memory triples
//! - [`factors`] - LVF, RVF, and TVF arithmetic
//! - [`thread`] - the per-thread resource ledger

pub mod aggregate;
pub mod exposure;
pub mod factors;
pub mod thread;

pub use aggregate::{AggregateMap, LedgerError, Tally, DEFAULT_BUCKETS};
pub use exposure::{Exposure, ResourceClass};
pub use factors::{local_factor, remote_factor, total_factor, FactorWeights};
pub use thread::{RegisterLiveness, RemoteBreakdown, RemoteShare, ThreadLedger};
