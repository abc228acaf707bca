//! Line-oriented trace files.
//!
//! A stand-in event source for driving the engine from recorded traces.
//! One record per line; blank lines and `#` comments are skipped.
//!
//! ```text
//! I <core> <thread> <delta> <disassembly...>
//! R <core> <thread> <delta> <phys-addr-hex> <size> <hit 0|1>
//! W <core> <thread> <delta> <phys-addr-hex> <size> <hit 0|1>
//! E <core> <thread> <delta> <exception-number>
//! P
//! Z <0|1>
//! ```

mod parser;

pub use parser::{parse_line, TraceParseError, TraceReader, TraceRecord};
