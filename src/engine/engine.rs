//! Main analysis engine.
//!
//! The engine consumes trace events one at a time, in delivery order, and
//! routes each one into the ledger of the thread that produced it:
//! - Instruction events advance the thread's clock and replay the register
//!   accesses of tracked mnemonics
//! - Writes leave a pending store snapshot behind
//! - Reads resolve pending stores, close memory liveness windows, and
//!   trigger remote attribution across threads
//!
//! # Usage
//!
//! ```
//! use avf_trace::config::Config;
//! use avf_trace::engine::{Engine, TraceEvent};
//!
//! let mut engine = Engine::new(Config::default()).unwrap();
//! engine.process(&TraceEvent::instruction(0, 0, "mov eax, 1")).unwrap();
//! engine.process(&TraceEvent::store(0, 0, 0x1000)).unwrap();
//! engine.process(&TraceEvent::load(1, 0, 0x1000)).unwrap();
//!
//! assert_eq!(engine.thread(1).unwrap().remote_count, 1);
//! ```

use std::collections::HashMap;
use std::io::Write;

use super::cores::CoreTable;
use super::error::EngineError;
use super::event::{Access, EventKind, MemoryAccess, TraceEvent};
use crate::config::{Config, Granularity};
use crate::decode;
use crate::ledger::{total_factor, Exposure, ThreadLedger};
use crate::propagate::{Attribution, FanMatrix, PendingStore, Propagator, StoreLedger};
use crate::report;

/// Running event counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventStats {
    /// Instruction events routed to a ledger.
    pub instructions: u64,
    /// Data events routed to a ledger.
    pub data: u64,
    /// Exception events.
    pub exceptions: u64,
    /// Events dropped because their core was inactive.
    pub ignored: u64,
    /// Instructions with no tracked mnemonic.
    pub untracked: u64,
    /// Sum of timestamp deltas.
    pub elapsed_cycles: u64,
}

/// What the engine did with one event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dispatch {
    /// The core is inactive; nothing changed.
    Ignored,
    /// Counted without touching any ledger.
    Counted,
    /// Instruction retired; `tracked` if its operands were replayed.
    Instruction { tracked: bool },
    /// A pending store was recorded; `replaced` an earlier one.
    Stored { replaced: bool },
    /// A load was processed.
    Loaded {
        /// A pending store existed for the address.
        resolved: bool,
        /// Memory liveness window charged to the reader.
        window: f64,
        /// Remote attribution outcome, if a store was resolved.
        attribution: Option<Attribution>,
    },
}

/// Vulnerability analysis engine.
///
/// Owns every ledger; callers drive it with [`process`](Self::process) and
/// render reports at the end of the session.
pub struct Engine {
    config: Config,
    cores: CoreTable,
    threads: Vec<ThreadLedger>,
    /// Shadow ledger mirroring one core inside redundant regions.
    shadow: ThreadLedger,
    shadow_core: Option<usize>,
    thread_map: HashMap<u64, usize>,
    stores: StoreLedger,
    propagator: Propagator,
    region_open: bool,
    partial_requested: bool,
    region: u64,
    partial_sink: Option<Box<dyn Write>>,
    stats: EventStats,
}

impl Engine {
    /// Create an engine from a configuration.
    pub fn new(config: Config) -> Result<Self, EngineError> {
        config.validate()?;

        let mut cores = CoreTable::new(config.core_capacity);
        for &core in &config.inactive_cores {
            cores.set_active(core, false)?;
        }

        let capacity = config.thread_capacity;
        let threads = (0..capacity)
            .map(|i| ThreadLedger::new(i, i as u64, i))
            .collect();
        let propagator = Propagator::new(
            capacity,
            config.remote_threshold,
            config.decay,
            config.fan_tracking,
        );

        Ok(Self {
            cores,
            threads,
            shadow: ThreadLedger::new(capacity, 0, 0),
            shadow_core: None,
            thread_map: HashMap::new(),
            stores: StoreLedger::new(),
            propagator,
            region_open: false,
            partial_requested: false,
            region: 0,
            partial_sink: None,
            stats: EventStats::default(),
            config,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Core activity table.
    pub fn cores(&self) -> &CoreTable {
        &self.cores
    }

    /// Mutable core activity table.
    pub fn cores_mut(&mut self) -> &mut CoreTable {
        &mut self.cores
    }

    /// All primary ledgers, indexed by ledger index.
    pub fn threads(&self) -> &[ThreadLedger] {
        &self.threads
    }

    /// One primary ledger.
    pub fn thread(&self, index: usize) -> Option<&ThreadLedger> {
        self.threads.get(index)
    }

    /// The shadow ledger, once a redundant region has bound it to a core.
    pub fn shadow(&self) -> Option<&ThreadLedger> {
        self.shadow_core.map(|_| &self.shadow)
    }

    /// Fan-in / fan-out matrices.
    pub fn fan(&self) -> &FanMatrix {
        self.propagator.fan()
    }

    /// Pending store ledger.
    pub fn stores(&self) -> &StoreLedger {
        &self.stores
    }

    /// Event counters.
    pub fn stats(&self) -> &EventStats {
        &self.stats
    }

    /// Partial reports emitted so far.
    pub fn region(&self) -> u64 {
        self.region
    }

    /// Where partial reports are appended.
    pub fn set_partial_sink(&mut self, sink: Box<dyn Write>) {
        self.partial_sink = Some(sink);
    }

    /// Emit a partial report at the next instruction event.
    pub fn request_partial_report(&mut self) {
        if self.config.partial_reports {
            self.partial_requested = true;
        } else {
            log::debug!("partial reports disabled; trigger ignored");
        }
    }

    /// Start mirroring the configured region core into the shadow ledger.
    pub fn open_redundant_region(&mut self) {
        if self.config.region_thread.is_none() {
            log::warn!("redundant region opened without a configured region_thread");
        }
        self.region_open = true;
    }

    /// Stop mirroring into the shadow ledger.
    pub fn close_redundant_region(&mut self) {
        self.region_open = false;
    }

    /// Whether a redundant region is open.
    pub fn is_region_open(&self) -> bool {
        self.region_open
    }

    /// Process one trace event.
    pub fn process(&mut self, event: &TraceEvent) -> Result<Dispatch, EngineError> {
        self.stats.elapsed_cycles = self
            .stats
            .elapsed_cycles
            .saturating_add(event.timestamp_delta);

        match &event.kind {
            EventKind::Exception { number } => {
                self.check_core(event.core)?;
                if !self.cores.is_active(event.core) {
                    self.stats.ignored += 1;
                    return Ok(Dispatch::Ignored);
                }
                self.stats.exceptions += 1;
                log::trace!("exception {} on core {}", number, event.core);
                Ok(Dispatch::Counted)
            }
            EventKind::Instruction { disassembly } => {
                let Some(index) = self.resolve(event)? else {
                    return Ok(Dispatch::Ignored);
                };
                self.on_instruction(index, event, disassembly.as_deref())
            }
            EventKind::Memory(access) => {
                let Some(index) = self.resolve(event)? else {
                    return Ok(Dispatch::Ignored);
                };
                self.on_memory(index, event, access)
            }
        }
    }

    /// Render the full-session report.
    pub fn write_report<W: Write + ?Sized>(&self, out: &mut W) -> std::io::Result<()> {
        report::write_session(
            out,
            &self.threads,
            self.shadow(),
            self.propagator.fan(),
            &self.stats,
        )
    }

    fn check_core(&self, core: usize) -> Result<(), EngineError> {
        let capacity = self.cores.capacity();
        if core >= capacity {
            return Err(EngineError::CoreOutOfRange { core, capacity });
        }
        Ok(())
    }

    /// Map an event onto a ledger index, or `None` if its core is inactive.
    fn resolve(&mut self, event: &TraceEvent) -> Result<Option<usize>, EngineError> {
        self.check_core(event.core)?;
        if !self.cores.is_active(event.core) {
            self.stats.ignored += 1;
            return Ok(None);
        }
        if let Some(previous) = self.cores.bind_process(event.core, event.thread) {
            log::trace!(
                "core {} switched from process {} to {}",
                event.core,
                previous,
                event.thread
            );
        }

        let capacity = self.threads.len();
        match self.config.granularity {
            Granularity::Core => {
                if event.core >= capacity {
                    return Err(EngineError::ThreadOutOfRange {
                        index: event.core,
                        capacity,
                    });
                }
                Ok(Some(event.core))
            }
            Granularity::Thread => {
                if let Some(&index) = self.thread_map.get(&event.thread) {
                    return Ok(Some(index));
                }
                let index = self.thread_map.len();
                if index >= capacity {
                    return Err(EngineError::ThreadCapacityExhausted {
                        thread: event.thread,
                        core: event.core,
                        capacity,
                    });
                }
                self.thread_map.insert(event.thread, index);
                let ledger = &mut self.threads[index];
                ledger.thread_id = event.thread;
                ledger.core = event.core;
                log::debug!(
                    "thread {} on core {} mapped to ledger {}",
                    event.thread,
                    event.core,
                    index
                );
                Ok(Some(index))
            }
        }
    }

    /// Whether the shadow ledger mirrors this event, binding it on first use.
    fn engage_shadow(&mut self, event: &TraceEvent) -> bool {
        if !self.region_open || self.config.region_thread != Some(event.core) {
            return false;
        }
        if self.shadow_core != Some(event.core) {
            self.shadow.reinitialize(event.thread, event.core);
            self.shadow_core = Some(event.core);
            log::debug!("shadow ledger bound to core {}", event.core);
        }
        true
    }

    fn on_instruction(
        &mut self,
        index: usize,
        event: &TraceEvent,
        disassembly: Option<&str>,
    ) -> Result<Dispatch, EngineError> {
        self.stats.instructions += 1;
        let shadow = self.engage_shadow(event);

        self.threads[index].retire_instruction();
        if shadow {
            self.shadow.retire_instruction();
        }

        if self.partial_requested {
            self.emit_partial()?;
        }

        let Some(text) = disassembly else {
            return Ok(Dispatch::Instruction { tracked: false });
        };
        let Some(effect) = decode::extract(text) else {
            self.stats.untracked += 1;
            log::trace!("untracked instruction on ledger {}: {}", index, text);
            return Ok(Dispatch::Instruction { tracked: false });
        };

        self.threads[index].apply(&effect)?;
        if shadow {
            self.shadow.apply(&effect)?;
        }
        Ok(Dispatch::Instruction { tracked: true })
    }

    fn on_memory(
        &mut self,
        index: usize,
        event: &TraceEvent,
        access: &MemoryAccess,
    ) -> Result<Dispatch, EngineError> {
        self.stats.data += 1;
        let shadow = self.engage_shadow(event);
        let address = access.physical_address;

        match access.access {
            Access::Write => {
                let replaced = self.record_store(index, address, shadow);
                Ok(Dispatch::Stored { replaced })
            }
            Access::Read => self.resolve_load(index, address, access.cache_hit, shadow),
        }
    }

    /// Snapshot the writer's vulnerability state under `address`.
    fn record_store(&mut self, index: usize, address: u64, shadow: bool) -> bool {
        let writer = &self.threads[index];
        let source = if shadow { &self.shadow } else { writer };
        let redundant = shadow || self.config.redundant_thread == Some(index);

        let (total, local_factor) = if writer.instructions == 0 {
            (Exposure::ZERO, Exposure::ZERO)
        } else {
            let local = source.local_factors();
            let total = total_factor(
                local,
                writer.remote_factors(),
                writer.remote_count > 0,
                redundant,
                self.config.weights(),
            );
            (total, if redundant { local.squared() } else { local })
        };

        let store = PendingStore {
            owner: index,
            total,
            local_factor,
            local: writer.local,
            instruction_marks: self.threads.iter().map(|t| t.instructions).collect(),
        };
        log::trace!("store to {:#x} by ledger {}", address, index);
        self.stores.record(address, store).is_some()
    }

    fn resolve_load(
        &mut self,
        index: usize,
        address: u64,
        cache_hit: bool,
        shadow: bool,
    ) -> Result<Dispatch, EngineError> {
        let Some(store) = self.stores.lookup(address) else {
            return Ok(Dispatch::Loaded {
                resolved: false,
                window: 0.0,
                attribution: None,
            });
        };

        let stored_at = store.mark_for(index);
        let mut window = 0.0;
        if cache_hit {
            window = self.threads[index].load_memory(address, stored_at)?;
            if shadow {
                self.shadow.load_memory(address, stored_at)?;
            }
        }

        let attribution = self.propagator.attribute(&mut self.threads, store, index)?;
        Ok(Dispatch::Loaded {
            resolved: true,
            window,
            attribution: Some(attribution),
        })
    }

    fn emit_partial(&mut self) -> Result<(), EngineError> {
        self.partial_requested = false;
        self.region += 1;
        log::info!("writing partial report for region {}", self.region);

        if let Some(sink) = self.partial_sink.as_mut() {
            report::write_partial(sink, self.region, &self.threads, self.propagator.fan())?;
            sink.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::propagate::FanPlane;
    use proptest::prelude::*;
    use smallvec::smallvec;
    use std::cell::RefCell;
    use std::rc::Rc;

    const ADDR: u64 = 0xA000;

    fn engine() -> Engine {
        Engine::new(Config::default()).unwrap()
    }

    fn fan_engine(threshold: u64) -> Engine {
        Engine::new(Config {
            fan_tracking: true,
            remote_threshold: threshold,
            ..Config::default()
        })
        .unwrap()
    }

    fn run(engine: &mut Engine, core: usize, texts: &[&str]) {
        for text in texts {
            engine.process(&TraceEvent::instruction(core, core as u64, *text)).unwrap();
        }
    }

    /// Shared buffer usable as a boxed sink.
    #[derive(Clone, Default)]
    struct SharedBuf(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_engine_creation() {
        let engine = engine();
        assert_eq!(engine.threads().len(), 8);
        assert_eq!(engine.cores().capacity(), 32);
        assert!(engine.shadow().is_none());
        assert_eq!(engine.fan().size(), 8);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = Engine::new(Config {
            decay: 0.0,
            ..Config::default()
        });
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn test_remote_store_scenario() {
        // Thread 0 stored A at its instruction 10 with TVF (1, 2, 3)
        let mut engine = fan_engine(100);
        run(&mut engine, 1, &["nop"; 5]);
        engine.stores.record(
            ADDR,
            PendingStore {
                owner: 0,
                total: Exposure::new(1.0, 2.0, 3.0),
                local_factor: Exposure::new(0.25, 0.5, 0.75),
                local: Exposure::new(10.0, 20.0, 30.0),
                instruction_marks: smallvec![10, 5, 0, 0, 0, 0, 0, 0],
            },
        );

        let dispatch = engine.process(&TraceEvent::load(1, 1, ADDR)).unwrap();
        assert!(matches!(
            dispatch,
            Dispatch::Loaded {
                resolved: true,
                attribution: Some(Attribution::Remote { owner: 0, .. }),
                ..
            }
        ));

        let reader = engine.thread(1).unwrap();
        assert_eq!(reader.remote, Exposure::new(1.0, 2.0, 3.0));
        assert_eq!(reader.remote_count, 1);
        assert_eq!(engine.fan().direct(FanPlane::Register, 0, 1), 0.5);
        assert_eq!(engine.thread(0).unwrap().self_baseline, Exposure::new(10.0, 20.0, 30.0));
    }

    #[test]
    fn test_register_liveness_scenario() {
        let mut engine = engine();
        run(&mut engine, 0, &["mov r1, 5", "nop", "nop", "add r2, r1"]);
        let t = engine.thread(0).unwrap();
        assert_eq!(t.local.register, 3.0);

        // Same instruction overwrote nothing yet; write r1 at a new step
        run(&mut engine, 0, &["mov r1, r2"]);
        let t = engine.thread(0).unwrap();
        // r2 written at 4, read at 5
        assert_eq!(t.local.register, 4.0);
        assert_eq!(t.registers().get("r1").unwrap().last_access, 5);
    }

    #[test]
    fn test_load_without_store_is_noop() {
        let mut engine = engine();
        run(&mut engine, 0, &["nop", "nop"]);
        let dispatch = engine.process(&TraceEvent::load(0, 0, ADDR)).unwrap();
        assert_eq!(
            dispatch,
            Dispatch::Loaded {
                resolved: false,
                window: 0.0,
                attribution: None
            }
        );
        let t = engine.thread(0).unwrap();
        assert_eq!(t.local.memory, 0.0);
        assert_eq!(t.remote_count, 0);
    }

    #[test]
    fn test_own_store_is_local() {
        let mut engine = engine();
        run(&mut engine, 0, &["add eax, ebx"]);
        engine.process(&TraceEvent::store(0, 0, ADDR)).unwrap();
        run(&mut engine, 0, &["nop", "nop", "nop"]);
        let dispatch = engine.process(&TraceEvent::load(0, 0, ADDR)).unwrap();

        assert!(matches!(
            dispatch,
            Dispatch::Loaded {
                resolved: true,
                attribution: Some(Attribution::Local),
                ..
            }
        ));
        let t = engine.thread(0).unwrap();
        assert_eq!(t.local.memory, 3.0);
        assert_eq!(t.remote_count, 0);
        assert_eq!(t.remote, Exposure::ZERO);
    }

    #[test]
    fn test_store_snapshot_from_instructions() {
        let mut engine = engine();
        // Two ALU ops over four instructions, one register read window of 2
        run(&mut engine, 0, &["mov eax, 1", "nop", "add ebx, eax", "inc ecx"]);
        engine.process(&TraceEvent::store(0, 0, ADDR)).unwrap();

        let store = engine.stores().lookup(ADDR).unwrap();
        assert_eq!(store.owner, 0);
        assert_eq!(store.total.alu, 2.0 / 4.0);
        // eax, ebx, ecx touched; windows: eax read at 3 (2), ecx read at 4 (0)
        assert_eq!(store.total.register, 2.0 / (4.0 * 3.0));
        assert_eq!(store.total, store.local_factor);
        assert_eq!(store.mark_for(0), 4);
        assert_eq!(store.mark_for(1), 0);

        engine.process(&TraceEvent::load(1, 1, ADDR)).unwrap();
        assert_eq!(engine.thread(1).unwrap().remote, store_total(&engine));
    }

    fn store_total(engine: &Engine) -> Exposure {
        engine.stores().lookup(ADDR).unwrap().total
    }

    #[test]
    fn test_store_with_remote_history_is_weighted() {
        let mut engine = engine();
        run(&mut engine, 0, &["add eax, ebx", "add eax, ebx"]);
        engine.process(&TraceEvent::store(0, 0, ADDR)).unwrap();
        run(&mut engine, 1, &["nop", "nop"]);
        engine.process(&TraceEvent::load(1, 1, ADDR)).unwrap();

        // Thread 1 now has one remote sample with alu TVF 1.0
        engine.process(&TraceEvent::store(1, 1, ADDR + 8)).unwrap();
        let store = engine.stores().lookup(ADDR + 8).unwrap();
        assert_eq!(store.total.alu, 0.5 * 0.0 + 0.5 * 1.0);
    }

    #[test]
    fn test_memory_window_measured_on_reader_clock() {
        let mut engine = engine();
        run(&mut engine, 1, &["nop", "nop"]);
        engine.process(&TraceEvent::store(0, 0, ADDR)).unwrap();
        run(&mut engine, 1, &["nop", "nop", "nop"]);
        engine.process(&TraceEvent::load(1, 1, ADDR)).unwrap();

        let t = engine.thread(1).unwrap();
        assert_eq!(t.local.memory, 3.0);
        assert_eq!(t.memory_reads, 1);
    }

    #[test]
    fn test_cache_miss_skips_liveness_but_attributes() {
        let mut engine = engine();
        run(&mut engine, 1, &["nop"]);
        engine.process(&TraceEvent::store(0, 0, ADDR)).unwrap();
        run(&mut engine, 1, &["nop", "nop"]);
        engine
            .process(&TraceEvent::memory(1, 1, Access::Read, ADDR, false))
            .unwrap();

        let t = engine.thread(1).unwrap();
        assert_eq!(t.local.memory, 0.0);
        assert_eq!(t.remote_count, 1);
    }

    #[test]
    fn test_threshold_gating_through_engine() {
        fn drive(reads_0_to_1: usize) -> Engine {
            let mut engine = fan_engine(100);
            // 2 -> 0 is an established channel
            for i in 0..150u64 {
                engine.process(&TraceEvent::store(2, 2, i)).unwrap();
                engine.process(&TraceEvent::load(0, 0, i)).unwrap();
            }
            for i in 0..reads_0_to_1 as u64 {
                engine.process(&TraceEvent::store(0, 0, 0x10_0000 + i)).unwrap();
                engine.process(&TraceEvent::load(1, 1, 0x10_0000 + i)).unwrap();
            }
            engine
        }

        let below = drive(99);
        assert_eq!(below.fan().direct(FanPlane::Count, 0, 1), 99.0);
        for plane in FanPlane::ALL {
            assert_eq!(below.fan().indirect(plane, 2, 1), 0.0);
        }

        let above = drive(101);
        assert_eq!(above.fan().direct(FanPlane::Count, 0, 1), 101.0);
        assert!((above.fan().indirect(FanPlane::Count, 2, 1) - 0.8 * 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_inactive_core_ignored() {
        let mut engine = Engine::new(Config {
            inactive_cores: vec![3],
            ..Config::default()
        })
        .unwrap();
        let dispatch = engine.process(&TraceEvent::instruction(3, 3, "add eax, ebx")).unwrap();
        assert_eq!(dispatch, Dispatch::Ignored);
        assert_eq!(engine.thread(3).unwrap().instructions, 0);
        assert_eq!(engine.stats().ignored, 1);

        engine.cores_mut().set_active(3, true).unwrap();
        engine.process(&TraceEvent::instruction(3, 3, "add eax, ebx")).unwrap();
        assert_eq!(engine.thread(3).unwrap().instructions, 1);
    }

    #[test]
    fn test_out_of_range_ids() {
        let mut engine = engine();
        let err = engine.process(&TraceEvent::instruction(40, 0, "nop")).unwrap_err();
        assert!(matches!(err, EngineError::CoreOutOfRange { core: 40, capacity: 32 }));
        assert!(err.is_event_local());

        // Core exists but has no ledger at core granularity
        let err = engine.process(&TraceEvent::instruction(9, 0, "nop")).unwrap_err();
        assert!(matches!(err, EngineError::ThreadOutOfRange { index: 9, capacity: 8 }));
    }

    #[test]
    fn test_thread_granularity() {
        let mut engine = Engine::new(Config {
            granularity: Granularity::Thread,
            thread_capacity: 2,
            ..Config::default()
        })
        .unwrap();

        engine.process(&TraceEvent::instruction(5, 1001, "nop")).unwrap();
        engine.process(&TraceEvent::instruction(7, 1002, "nop")).unwrap();
        engine.process(&TraceEvent::instruction(5, 1001, "nop")).unwrap();

        assert_eq!(engine.thread(0).unwrap().thread_id, 1001);
        assert_eq!(engine.cores().process(7), Some(1002));
        assert_eq!(engine.thread(0).unwrap().core, 5);
        assert_eq!(engine.thread(0).unwrap().instructions, 2);
        assert_eq!(engine.thread(1).unwrap().thread_id, 1002);

        let err = engine.process(&TraceEvent::instruction(5, 1003, "nop")).unwrap_err();
        assert!(matches!(err, EngineError::ThreadCapacityExhausted { thread: 1003, .. }));
    }

    #[test]
    fn test_redundant_thread_squares_local() {
        let mut engine = Engine::new(Config {
            redundant_thread: Some(0),
            ..Config::default()
        })
        .unwrap();
        run(&mut engine, 0, &["add eax, ebx", "nop"]);
        engine.process(&TraceEvent::store(0, 0, ADDR)).unwrap();
        let store = engine.stores().lookup(ADDR).unwrap();
        assert_eq!(store.total.alu, 0.25);
        assert_eq!(store.local_factor.alu, 0.25);
    }

    #[test]
    fn test_redundant_region_shadow() {
        let mut engine = Engine::new(Config {
            region_thread: Some(0),
            ..Config::default()
        })
        .unwrap();

        run(&mut engine, 0, &["add eax, ebx"]);
        assert!(engine.shadow().is_none());

        engine.open_redundant_region();
        run(&mut engine, 0, &["add eax, ebx", "nop"]);
        run(&mut engine, 1, &["add eax, ebx"]);
        engine.process(&TraceEvent::store(0, 0, ADDR)).unwrap();
        engine.close_redundant_region();
        run(&mut engine, 0, &["nop"]);

        let shadow = engine.shadow().unwrap();
        assert_eq!(shadow.index, 8);
        assert_eq!(shadow.core, 0);
        assert_eq!(shadow.instructions, 2);
        assert_eq!(shadow.local.alu, 1.0);
        assert_eq!(engine.thread(0).unwrap().instructions, 4);

        // Store inside the region used the shadow's LVF, squared
        let store = engine.stores().lookup(ADDR).unwrap();
        assert_eq!(store.total.alu, 0.25);
    }

    #[test]
    fn test_partial_report_on_next_instruction() {
        let buf = SharedBuf::default();
        let mut engine = engine();
        engine.set_partial_sink(Box::new(buf.clone()));

        run(&mut engine, 0, &["nop"]);
        engine.request_partial_report();
        assert!(buf.0.borrow().is_empty());

        run(&mut engine, 0, &["nop"]);
        engine.request_partial_report();
        run(&mut engine, 1, &["nop"]);
        assert_eq!(engine.region(), 2);

        let text = String::from_utf8(buf.0.borrow().clone()).unwrap();
        assert!(text.contains("Region: 1"));
        assert!(text.contains("Region: 2"));
    }

    #[test]
    fn test_partial_reports_disabled() {
        let mut engine = Engine::new(Config {
            partial_reports: false,
            ..Config::default()
        })
        .unwrap();
        engine.request_partial_report();
        run(&mut engine, 0, &["nop"]);
        assert_eq!(engine.region(), 0);
    }

    #[test]
    fn test_elapsed_cycles_saturate() {
        let mut engine = engine();
        engine
            .process(&TraceEvent::instruction(0, 0, "nop").with_delta(u64::MAX))
            .unwrap();
        engine
            .process(&TraceEvent::instruction(0, 0, "nop").with_delta(1))
            .unwrap();
        assert_eq!(engine.stats().elapsed_cycles, u64::MAX);
        assert_eq!(engine.thread(0).unwrap().instructions, 2);
    }

    #[test]
    fn test_inactive_core_exception_ignored() {
        let mut engine = Engine::new(Config {
            inactive_cores: vec![2],
            ..Config::default()
        })
        .unwrap();
        let dispatch = engine.process(&TraceEvent::exception(2, 2, 14)).unwrap();
        assert_eq!(dispatch, Dispatch::Ignored);
        assert_eq!(engine.stats().exceptions, 0);
        assert_eq!(engine.stats().ignored, 1);

        engine.process(&TraceEvent::exception(1, 1, 14)).unwrap();
        assert_eq!(engine.stats().exceptions, 1);
    }

    #[test]
    fn test_exception_counted() {
        let mut engine = engine();
        let dispatch = engine
            .process(&TraceEvent::exception(0, 0, 14).with_delta(7))
            .unwrap();
        assert_eq!(dispatch, Dispatch::Counted);
        assert_eq!(engine.stats().exceptions, 1);
        assert_eq!(engine.stats().elapsed_cycles, 7);
        assert_eq!(engine.thread(0).unwrap().instructions, 0);
    }

    #[test]
    fn test_full_report_renders() {
        let mut engine = fan_engine(100);
        run(&mut engine, 0, &["mov eax, 1", "add ebx, eax"]);
        engine.process(&TraceEvent::store(0, 0, ADDR)).unwrap();
        engine.process(&TraceEvent::load(1, 1, ADDR)).unwrap();

        let mut out = Vec::new();
        engine.write_report(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Thread: 0"));
        assert!(text.contains("Thread: 7"));
        assert!(text.contains("Total remote count: 1"));
        assert!(text.contains("DIRECT_REG[0][1]:"));
        assert!(text.contains("Most critical register:"));
    }

    #[derive(Debug, Clone)]
    enum Step {
        Instruction(&'static str),
        Store(u64),
        Load(u64),
    }

    fn step_strategy() -> impl Strategy<Value = Step> {
        prop_oneof![
            prop::sample::select(vec![
                "mov eax, ebx",
                "add ecx, eax",
                "inc edx",
                "mov ebx, edx",
                "nop",
                "xor eax, eax",
            ])
            .prop_map(Step::Instruction),
            (0u64..4).prop_map(Step::Store),
            (0u64..4).prop_map(Step::Load),
        ]
    }

    proptest! {
        /// Every charged liveness window is non-negative and counters never shrink.
        #[test]
        fn liveness_never_negative(steps in prop::collection::vec(step_strategy(), 1..300)) {
            let mut engine = engine();
            let mut last = (0.0f64, 0.0f64, 0u64);

            for step in steps {
                let dispatch = match step {
                    Step::Instruction(text) => engine.process(&TraceEvent::instruction(0, 0, text)),
                    Step::Store(a) => engine.process(&TraceEvent::store(0, 0, a)),
                    Step::Load(a) => engine.process(&TraceEvent::load(0, 0, a)),
                }
                .unwrap();

                if let Dispatch::Loaded { window, .. } = dispatch {
                    prop_assert!(window >= 0.0);
                }
                let t = engine.thread(0).unwrap();
                prop_assert!(t.local.register >= last.0);
                prop_assert!(t.local.memory >= last.1);
                prop_assert!(t.instructions >= last.2);
                last = (t.local.register, t.local.memory, t.instructions);
            }
        }
    }
}
