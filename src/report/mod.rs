//! Plain-text vulnerability reports.
//!
//! Reports are `key: value` lines. A full session report holds one block per
//! primary thread, the shadow ledger block if a redundant region ran, the
//! fan-matrix dump, and the event counters. Partial reports are prefixed
//! with their region number and carry the primary threads and the fan dump.
//!
//! - [`thread`] - per-thread blocks
//! - [`fan`] - fan-in / fan-out dump

pub mod fan;
pub mod thread;

use std::io::{self, Write};

use crate::engine::EventStats;
use crate::ledger::ThreadLedger;
use crate::propagate::FanMatrix;

pub use fan::write_fan;
pub use thread::{write_thread, ThreadSummary};

/// Write the full-session report.
pub fn write_session<W: Write + ?Sized>(
    out: &mut W,
    threads: &[ThreadLedger],
    shadow: Option<&ThreadLedger>,
    fan: &FanMatrix,
    stats: &EventStats,
) -> io::Result<()> {
    for ledger in threads {
        write_thread(out, ledger)?;
    }
    if let Some(shadow) = shadow {
        writeln!(out, "Shadow:")?;
        write_thread(out, shadow)?;
    }
    write_fan(out, fan)?;
    write_stats(out, stats)
}

/// Write one partial report for `region`.
pub fn write_partial<W: Write + ?Sized>(
    out: &mut W,
    region: u64,
    threads: &[ThreadLedger],
    fan: &FanMatrix,
) -> io::Result<()> {
    writeln!(out, "Region: {}", region)?;
    for ledger in threads {
        write_thread(out, ledger)?;
    }
    write_fan(out, fan)
}

/// Write the event counters.
pub fn write_stats<W: Write + ?Sized>(out: &mut W, stats: &EventStats) -> io::Result<()> {
    writeln!(out, "Instruction events: {}", stats.instructions)?;
    writeln!(out, "Untracked instructions: {}", stats.untracked)?;
    writeln!(out, "Data events: {}", stats.data)?;
    writeln!(out, "Exception events: {}", stats.exceptions)?;
    writeln!(out, "Ignored events: {}", stats.ignored)?;
    writeln!(out, "Elapsed cycles: {}", stats.elapsed_cycles)
}
