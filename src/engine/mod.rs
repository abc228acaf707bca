//! Event-driven vulnerability engine.
//!
//! - [`event`] - trace events delivered by the host
//! - [`cores`] - per-core activity flags
//! - [`engine`] - the dispatcher owning every ledger
//! - [`error`] - engine errors

pub mod cores;
pub mod engine;
pub mod error;
pub mod event;

pub use cores::CoreTable;
pub use engine::{Dispatch, Engine, EventStats};
pub use error::EngineError;
pub use event::{Access, EventKind, MemoryAccess, TraceEvent};
