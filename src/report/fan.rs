//! Fan-in / fan-out dump.
//!
//! For each plane (register, memory, ALU, count) every direct and indirect
//! cell is listed row by row, followed by the row sums of that thread. The
//! plane ends with the most critical thread per category.

use std::io::{self, Write};

use crate::propagate::{FanMatrix, FanPlane};

/// Write every plane of `fan`.
pub fn write_fan<W: Write + ?Sized>(out: &mut W, fan: &FanMatrix) -> io::Result<()> {
    for plane in FanPlane::ALL {
        write_plane(out, fan, plane)?;
    }
    Ok(())
}

fn write_plane<W: Write + ?Sized>(out: &mut W, fan: &FanMatrix, plane: FanPlane) -> io::Result<()> {
    let tag = plane.tag();
    let label = plane.label();

    for from in 0..fan.size() {
        for to in 0..fan.size() {
            writeln!(out, "DIRECT_{}[{}][{}]: {:.6}", tag, from, to, fan.direct(plane, from, to))?;
            writeln!(out, "INDIRECT_{}[{}][{}]: {:.6}", tag, from, to, fan.indirect(plane, from, to))?;
        }
        let sums = fan.row_sums(plane, from);
        writeln!(out, "{} direct {} sum: {:.6}", from, label, sums.direct)?;
        writeln!(out, "{} indirect {} sum: {:.6}", from, label, sums.indirect)?;
        writeln!(out, "{} total {} sum: {:.6}", from, label, sums.total())?;
    }

    let critical = fan.critical(plane);
    writeln!(out, "Most critical {}: {}", label, critical.total)?;
    writeln!(out, "Most critical direct {}: {}", label, critical.direct)?;
    writeln!(out, "Most critical indirect {}: {}", label, critical.indirect)
}
