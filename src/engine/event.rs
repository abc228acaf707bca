//! Trace events delivered to the engine.

/// Direction of a memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// A data access observed in the memory hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryAccess {
    /// Read or write.
    pub access: Access,
    /// Virtual (logical) address.
    pub virtual_address: u64,
    /// Physical address; ledgers are keyed by this.
    pub physical_address: u64,
    /// Access size in bytes.
    pub size: u32,
    /// Whether the access hit in the first-level cache.
    pub cache_hit: bool,
}

/// Payload of a trace event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// An instruction was fetched and retired.
    Instruction {
        /// Disassembled text, if the source could provide it.
        disassembly: Option<String>,
    },
    /// A data memory access.
    Memory(MemoryAccess),
    /// An exception was raised.
    Exception {
        /// Architecture-specific exception number.
        number: u32,
    },
}

/// One event in the globally ordered trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    /// Core that produced the event.
    pub core: usize,
    /// Software thread (process) id running on that core.
    pub thread: u64,
    /// Cycles since the previous event.
    pub timestamp_delta: u64,
    /// What happened.
    pub kind: EventKind,
}

impl TraceEvent {
    /// An instruction event with disassembly.
    pub fn instruction(core: usize, thread: u64, text: impl Into<String>) -> Self {
        Self {
            core,
            thread,
            timestamp_delta: 0,
            kind: EventKind::Instruction {
                disassembly: Some(text.into()),
            },
        }
    }

    /// A cache-hitting read of `address`.
    pub fn load(core: usize, thread: u64, address: u64) -> Self {
        Self::memory(core, thread, Access::Read, address, true)
    }

    /// A cache-hitting write of `address`.
    pub fn store(core: usize, thread: u64, address: u64) -> Self {
        Self::memory(core, thread, Access::Write, address, true)
    }

    /// A memory access with explicit direction and hit flag.
    pub fn memory(core: usize, thread: u64, access: Access, address: u64, cache_hit: bool) -> Self {
        Self {
            core,
            thread,
            timestamp_delta: 0,
            kind: EventKind::Memory(MemoryAccess {
                access,
                virtual_address: address,
                physical_address: address,
                size: 8,
                cache_hit,
            }),
        }
    }

    /// An exception event.
    pub fn exception(core: usize, thread: u64, number: u32) -> Self {
        Self {
            core,
            thread,
            timestamp_delta: 0,
            kind: EventKind::Exception { number },
        }
    }

    /// Set the timestamp delta.
    pub fn with_delta(mut self, delta: u64) -> Self {
        self.timestamp_delta = delta;
        self
    }
}
