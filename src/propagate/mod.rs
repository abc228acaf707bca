//! Cross-thread vulnerability propagation.
//!
//! - [`store`] - pending stores keyed by address
//! - [`fan`] - direct / indirect fan-in and fan-out matrices
//! - [`remote`] - remote attribution of consumed stores

pub mod fan;
pub mod remote;
pub mod store;

pub use fan::{CriticalThreads, FanMatrix, FanPlane, RowSums};
pub use remote::{Attribution, Propagator};
pub use store::{PendingStore, StoreLedger, INLINE_THREADS};
