//! avf-trace library
//!
//! Architectural vulnerability factor estimation for multiprocessor
//! execution traces.

pub mod config;
pub mod decode;
pub mod engine;
pub mod ledger;
pub mod propagate;
pub mod report;
pub mod trace;
