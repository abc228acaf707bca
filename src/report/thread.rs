//! Per-thread report blocks.

use std::io::{self, Write};

use crate::ledger::{Exposure, ResourceClass, ThreadLedger};

/// Derived figures printed for one thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThreadSummary {
    /// Vulnerability generated since the latest remote attribution.
    pub self_raw: Exposure,
    /// `self_raw` normalized.
    pub self_normalized: Exposure,
    /// All local vulnerability, normalized.
    pub complete: Exposure,
    /// Remote sums averaged over the remote count.
    pub remote_average: Exposure,
}

impl ThreadSummary {
    /// Compute the summary without touching the ledger.
    pub fn of(ledger: &ThreadLedger) -> Self {
        let self_raw = ledger.self_exposure();
        Self {
            self_raw,
            self_normalized: ledger.normalize(self_raw),
            complete: ledger.normalize(ledger.local),
            remote_average: ledger.remote_factors(),
        }
    }
}

/// Write the block for one ledger.
pub fn write_thread<W: Write + ?Sized>(out: &mut W, ledger: &ThreadLedger) -> io::Result<()> {
    let summary = ThreadSummary::of(ledger);

    writeln!(out, "Thread: {}", ledger.index)?;
    writeln!(out, "PID: {}", ledger.thread_id)?;
    writeln!(out, "Core: {}", ledger.core)?;
    writeln!(out, "Total instr: {}", ledger.instructions)?;
    writeln!(out, "Total count: {}", ledger.fetches)?;
    writeln!(out, "Register live: {}", ledger.register_reads.max(1))?;
    writeln!(out, "Memory live: {}", ledger.memory_reads.max(1))?;
    writeln!(out, "Total remote count: {}", ledger.remote_count)?;

    write_triple(out, "Self ", summary.self_raw)?;
    write_triple(out, "", summary.self_normalized)?;
    write_triple(out, "Complete raw ", ledger.local)?;
    write_triple(out, "Complete ", summary.complete)?;

    let sources = ledger.remote_sources();
    let ids = sources.sources();
    for class in ResourceClass::ALL {
        writeln!(out, "Remote {}: {:.6}", heading(class), summary.remote_average.get(class))?;
        for &source in &ids {
            if let Some(share) = sources.share(source) {
                writeln!(out, "  {}: {:.6}", source, share.exposure.get(class))?;
            }
        }
    }
    writeln!(out, "Remote count:")?;
    for &source in &ids {
        if let Some(share) = sources.share(source) {
            writeln!(out, "  {}: {}", source, share.count)?;
        }
    }

    writeln!(out, "Registers: {:.6}", ledger.registers().sum())?;
    for (name, liveness) in ledger.registers().sorted() {
        writeln!(
            out,
            "  {}: {:.6} (last {})",
            name, liveness.vulnerability, liveness.last_access
        )?;
    }
    writeln!(
        out,
        "Memory: {:.6} over {} addresses",
        ledger.memory().sum(),
        ledger.distinct_memory()
    )?;
    writeln!(out, "************")?;
    writeln!(out)
}

fn heading(class: ResourceClass) -> &'static str {
    match class {
        ResourceClass::Alu => "ALU",
        ResourceClass::Register => "Register",
        ResourceClass::Memory => "Memory",
    }
}

fn write_triple<W: Write + ?Sized>(out: &mut W, prefix: &str, value: Exposure) -> io::Result<()> {
    for class in ResourceClass::ALL {
        writeln!(out, "{}{}: {:.6}", prefix, heading(class), value.get(class))?;
    }
    Ok(())
}
