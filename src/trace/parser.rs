//! Regex-based trace record parser.

use regex::{Captures, Regex};
use std::io::{self, BufRead};
use std::str::FromStr;
use std::sync::LazyLock;

use crate::engine::{Access, EventKind, MemoryAccess, TraceEvent};

struct Patterns {
    instruction: Regex,
    memory: Regex,
    exception: Regex,
    region: Regex,
    partial: Regex,
}

static PATTERNS: LazyLock<Patterns> = LazyLock::new(|| Patterns {
    instruction: Regex::new(r"^I\s+(\d+)\s+(\d+)\s+(\d+)(?:\s+(.*\S))?\s*$").unwrap(),
    memory: Regex::new(
        r"^([RW])\s+(\d+)\s+(\d+)\s+(\d+)\s+(?:0[xX])?([0-9a-fA-F]+)\s+(\d+)\s+([01])\s*$",
    )
    .unwrap(),
    exception: Regex::new(r"^E\s+(\d+)\s+(\d+)\s+(\d+)\s+(\d+)\s*$").unwrap(),
    region: Regex::new(r"^Z\s+([01])\s*$").unwrap(),
    partial: Regex::new(r"^P\s*$").unwrap(),
});

/// Error type for trace reading failures.
#[derive(Debug, thiserror::Error)]
pub enum TraceParseError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

impl TraceParseError {
    /// True if only one line was bad and reading can continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }
}

/// One parsed trace line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceRecord {
    /// An event for the engine.
    Event(TraceEvent),
    /// Request a partial report.
    PartialReport,
    /// Open (`true`) or close (`false`) the redundant region.
    Region(bool),
}

/// Parse one line. Returns `None` for blank lines and comments.
pub fn parse_line(text: &str, line: usize) -> Result<Option<TraceRecord>, TraceParseError> {
    let text = text.trim();
    if text.is_empty() || text.starts_with('#') {
        return Ok(None);
    }

    let malformed = |reason: String| TraceParseError::Malformed { line, reason };

    if let Some(caps) = PATTERNS.instruction.captures(text) {
        let disassembly = caps.get(4).map(|m| m.as_str().to_string());
        return Ok(Some(TraceRecord::Event(TraceEvent {
            core: field(&caps, 1, "core", line)?,
            thread: field(&caps, 2, "thread", line)?,
            timestamp_delta: field(&caps, 3, "delta", line)?,
            kind: EventKind::Instruction { disassembly },
        })));
    }

    if let Some(caps) = PATTERNS.memory.captures(text) {
        let access = if &caps[1] == "W" { Access::Write } else { Access::Read };
        let address = u64::from_str_radix(&caps[5], 16)
            .map_err(|e| malformed(format!("address {}: {}", &caps[5], e)))?;
        return Ok(Some(TraceRecord::Event(TraceEvent {
            core: field(&caps, 2, "core", line)?,
            thread: field(&caps, 3, "thread", line)?,
            timestamp_delta: field(&caps, 4, "delta", line)?,
            kind: EventKind::Memory(MemoryAccess {
                access,
                virtual_address: address,
                physical_address: address,
                size: field(&caps, 6, "size", line)?,
                cache_hit: &caps[7] == "1",
            }),
        })));
    }

    if let Some(caps) = PATTERNS.exception.captures(text) {
        return Ok(Some(TraceRecord::Event(TraceEvent {
            core: field(&caps, 1, "core", line)?,
            thread: field(&caps, 2, "thread", line)?,
            timestamp_delta: field(&caps, 3, "delta", line)?,
            kind: EventKind::Exception {
                number: field(&caps, 4, "exception", line)?,
            },
        })));
    }

    if let Some(caps) = PATTERNS.region.captures(text) {
        return Ok(Some(TraceRecord::Region(&caps[1] == "1")));
    }

    if PATTERNS.partial.is_match(text) {
        return Ok(Some(TraceRecord::PartialReport));
    }

    Err(malformed(format!("unrecognized record: {}", text)))
}

fn field<T>(caps: &Captures<'_>, index: usize, name: &str, line: usize) -> Result<T, TraceParseError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = caps.get(index).map(|m| m.as_str()).unwrap_or("");
    raw.parse().map_err(|e| TraceParseError::Malformed {
        line,
        reason: format!("{} {}: {}", name, raw, e),
    })
}

/// Iterator over the records of a trace.
pub struct TraceReader<R> {
    lines: io::Lines<R>,
    line: usize,
}

impl<R: BufRead> TraceReader<R> {
    /// Read records from `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
        }
    }

    /// Number of lines consumed so far.
    pub fn line(&self) -> usize {
        self.line
    }
}

impl<R: BufRead> Iterator for TraceReader<R> {
    type Item = Result<TraceRecord, TraceParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let text = match self.lines.next()? {
                Ok(text) => text,
                Err(e) => return Some(Err(e.into())),
            };
            self.line += 1;
            match parse_line(&text, self.line) {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
