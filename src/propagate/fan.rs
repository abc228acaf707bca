//! Fan-in / fan-out influence matrices.
//!
//! `direct[p][from][to]` accumulates the local factor of every store made by
//! `from` and consumed by `to`. `indirect[p][j][to]` records influence that
//! reached `to` through an intermediate thread. Rows are producers and
//! columns consumers throughout.
//!
//! Direct cells only grow. Indirect cells are a watermark: they are raised
//! to a new candidate only when the candidate is larger.

use std::fmt;

use crate::ledger::{Exposure, ResourceClass};

/// One of the four planes tracked per direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FanPlane {
    Register,
    Memory,
    Alu,
    Count,
}

impl FanPlane {
    /// All planes in report order.
    pub const ALL: [FanPlane; 4] = [Self::Register, Self::Memory, Self::Alu, Self::Count];

    #[inline]
    fn slot(self) -> usize {
        match self {
            Self::Register => 0,
            Self::Memory => 1,
            Self::Alu => 2,
            Self::Count => 3,
        }
    }

    /// Short upper-case tag used in matrix dumps.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Register => "REG",
            Self::Memory => "MEM",
            Self::Alu => "ALU",
            Self::Count => "COUNT",
        }
    }

    /// Long label used in summaries.
    pub fn label(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Memory => "memory",
            Self::Alu => "alu",
            Self::Count => "count",
        }
    }
}

impl From<ResourceClass> for FanPlane {
    fn from(class: ResourceClass) -> Self {
        match class {
            ResourceClass::Alu => Self::Alu,
            ResourceClass::Register => Self::Register,
            ResourceClass::Memory => Self::Memory,
        }
    }
}

impl fmt::Display for FanPlane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Row sums of one thread in one plane.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RowSums {
    pub direct: f64,
    pub indirect: f64,
}

impl RowSums {
    /// Direct plus indirect.
    pub fn total(&self) -> f64 {
        self.direct + self.indirect
    }
}

/// Thread with the largest row sum in each category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CriticalThreads {
    pub total: usize,
    pub direct: usize,
    pub indirect: usize,
}

#[derive(Debug, Clone)]
struct Grid {
    size: usize,
    cells: Vec<f64>,
}

impl Grid {
    fn new(size: usize) -> Self {
        Self {
            size,
            cells: vec![0.0; size * size],
        }
    }

    #[inline]
    fn get(&self, row: usize, col: usize) -> f64 {
        self.cells[row * self.size + col]
    }

    #[inline]
    fn cell_mut(&mut self, row: usize, col: usize) -> &mut f64 {
        &mut self.cells[row * self.size + col]
    }

    fn row_sum(&self, row: usize) -> f64 {
        self.cells[row * self.size..(row + 1) * self.size].iter().sum()
    }
}

/// Direct and indirect influence between all tracked threads.
#[derive(Debug, Clone)]
pub struct FanMatrix {
    size: usize,
    threshold: f64,
    decay: f64,
    direct: [Grid; 4],
    indirect: [Grid; 4],
}

impl FanMatrix {
    /// Zeroed matrices for `size` threads.
    ///
    /// `threshold` is the direct event count an edge must exceed before it
    /// carries indirect influence; `decay` scales each propagated hop.
    pub fn new(size: usize, threshold: u64, decay: f64) -> Self {
        Self {
            size,
            threshold: threshold as f64,
            decay,
            direct: std::array::from_fn(|_| Grid::new(size)),
            indirect: std::array::from_fn(|_| Grid::new(size)),
        }
    }

    /// Number of threads per side.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Direct influence of `from` on `to`.
    pub fn direct(&self, plane: FanPlane, from: usize, to: usize) -> f64 {
        self.direct[plane.slot()].get(from, to)
    }

    /// Indirect influence of `from` on `to`.
    pub fn indirect(&self, plane: FanPlane, from: usize, to: usize) -> f64 {
        self.indirect[plane.slot()].get(from, to)
    }

    /// True once the `from -> to` edge carries indirect influence.
    pub fn is_channel(&self, from: usize, to: usize) -> bool {
        self.direct(FanPlane::Count, from, to) > self.threshold
            || self.indirect(FanPlane::Count, from, to) > self.threshold
    }

    /// Record one consumed store from `owner` to `reader`.
    ///
    /// Returns true when the edge's direct count now exceeds the threshold.
    pub fn record_direct(&mut self, owner: usize, reader: usize, local_factor: Exposure) -> bool {
        for class in ResourceClass::ALL {
            let plane = FanPlane::from(class);
            *self.direct[plane.slot()].cell_mut(owner, reader) += local_factor.get(class);
        }
        let count = self.direct[FanPlane::Count.slot()].cell_mut(owner, reader);
        *count += 1.0;
        *count > self.threshold
    }

    /// Push `owner`'s established upstream influence one hop on to `reader`.
    ///
    /// For every third thread `j` whose edge into `owner` is a channel,
    /// `indirect[j][reader]` is raised to `decay × (direct[j][owner] +
    /// indirect[j][owner])` if that is larger. Returns the number of raised
    /// cells.
    pub fn propagate(&mut self, owner: usize, reader: usize) -> usize {
        let mut raised = 0;
        for j in 0..self.size {
            if j == owner || j == reader || !self.is_channel(j, owner) {
                continue;
            }
            for plane in FanPlane::ALL {
                let slot = plane.slot();
                let candidate = self.decay
                    * (self.direct[slot].get(j, owner) + self.indirect[slot].get(j, owner));
                let cell = self.indirect[slot].cell_mut(j, reader);
                if candidate > *cell {
                    *cell = candidate;
                    raised += 1;
                }
            }
        }
        raised
    }

    /// Direct and indirect row sums of `thread`.
    pub fn row_sums(&self, plane: FanPlane, thread: usize) -> RowSums {
        RowSums {
            direct: self.direct[plane.slot()].row_sum(thread),
            indirect: self.indirect[plane.slot()].row_sum(thread),
        }
    }

    /// Threads with the largest direct, indirect, and total row sums.
    ///
    /// Ties and all-zero planes resolve to the lowest index.
    pub fn critical(&self, plane: FanPlane) -> CriticalThreads {
        let mut best = CriticalThreads::default();
        let (mut max_total, mut max_direct, mut max_indirect) = (0.0, 0.0, 0.0);

        for thread in 0..self.size {
            let sums = self.row_sums(plane, thread);
            if sums.total() > max_total {
                max_total = sums.total();
                best.total = thread;
            }
            if sums.direct > max_direct {
                max_direct = sums.direct;
                best.direct = thread;
            }
            if sums.indirect > max_indirect {
                max_indirect = sums.indirect;
                best.indirect = thread;
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn feed(fan: &mut FanMatrix, owner: usize, reader: usize, times: usize, lvf: Exposure) {
        for _ in 0..times {
            if fan.record_direct(owner, reader, lvf) {
                fan.propagate(owner, reader);
            }
        }
    }

    #[test]
    fn test_direct_accumulates() {
        let mut fan = FanMatrix::new(4, 100, 0.8);
        let lvf = Exposure::new(0.5, 1.0, 2.0);
        assert!(!fan.record_direct(0, 1, lvf));
        assert!(!fan.record_direct(0, 1, lvf));

        assert_eq!(fan.direct(FanPlane::Alu, 0, 1), 1.0);
        assert_eq!(fan.direct(FanPlane::Register, 0, 1), 2.0);
        assert_eq!(fan.direct(FanPlane::Memory, 0, 1), 4.0);
        assert_eq!(fan.direct(FanPlane::Count, 0, 1), 2.0);
        assert_eq!(fan.direct(FanPlane::Count, 1, 0), 0.0);
    }

    #[test]
    fn test_threshold_is_strict() {
        let mut fan = FanMatrix::new(2, 3, 0.8);
        let lvf = Exposure::ZERO;
        assert!(!fan.record_direct(0, 1, lvf));
        assert!(!fan.record_direct(0, 1, lvf));
        assert!(!fan.record_direct(0, 1, lvf));
        assert!(fan.record_direct(0, 1, lvf));
    }

    #[test]
    fn test_indirect_gated_below_threshold() {
        let mut fan = FanMatrix::new(3, 100, 0.8);
        let lvf = Exposure::new(1.0, 1.0, 1.0);
        // 2 -> 0 well established, 0 -> 1 just below the threshold
        feed(&mut fan, 2, 0, 150, lvf);
        feed(&mut fan, 0, 1, 99, lvf);
        for plane in FanPlane::ALL {
            assert_eq!(fan.indirect(plane, 2, 1), 0.0);
        }
    }

    #[test]
    fn test_indirect_propagates_after_threshold() {
        let mut fan = FanMatrix::new(3, 100, 0.8);
        let lvf = Exposure::new(1.0, 1.0, 1.0);
        feed(&mut fan, 2, 0, 150, lvf);
        feed(&mut fan, 0, 1, 101, lvf);

        let expected = 0.8 * 150.0;
        assert!((fan.indirect(FanPlane::Register, 2, 1) - expected).abs() < 1e-9);
        assert!((fan.indirect(FanPlane::Count, 2, 1) - expected).abs() < 1e-9);
        // No self loops and nothing flowing backwards
        assert_eq!(fan.indirect(FanPlane::Count, 1, 1), 0.0);
        assert_eq!(fan.indirect(FanPlane::Count, 1, 2), 0.0);
    }

    #[test]
    fn test_upstream_must_be_channel() {
        let mut fan = FanMatrix::new(3, 100, 0.8);
        let lvf = Exposure::new(1.0, 1.0, 1.0);
        feed(&mut fan, 2, 0, 50, lvf);
        feed(&mut fan, 0, 1, 200, lvf);
        assert_eq!(fan.indirect(FanPlane::Alu, 2, 1), 0.0);
    }

    #[test]
    fn test_critical_threads() {
        let mut fan = FanMatrix::new(3, 100, 0.8);
        feed(&mut fan, 1, 0, 3, Exposure::new(0.0, 2.0, 0.0));
        feed(&mut fan, 2, 0, 1, Exposure::new(0.0, 1.0, 0.0));

        let sums = fan.row_sums(FanPlane::Register, 1);
        assert_eq!(sums.direct, 6.0);
        assert_eq!(sums.total(), 6.0);

        let critical = fan.critical(FanPlane::Register);
        assert_eq!(critical.total, 1);
        assert_eq!(critical.direct, 1);
        assert_eq!(critical.indirect, 0);
    }

    proptest! {
        /// Indirect cells never decrease, whatever the event order.
        #[test]
        fn indirect_is_watermark(edges in prop::collection::vec((0usize..4, 0usize..4, 0u8..4), 1..600)) {
            let mut fan = FanMatrix::new(4, 5, 0.8);
            let mut previous = vec![0.0f64; 4 * 4 * 4];

            for (owner, reader, weight) in edges {
                if owner == reader {
                    continue;
                }
                let w = f64::from(weight);
                if fan.record_direct(owner, reader, Exposure::new(w, w, w)) {
                    fan.propagate(owner, reader);
                }

                let mut i = 0;
                for plane in FanPlane::ALL {
                    for from in 0..4 {
                        for to in 0..4 {
                            let now = fan.indirect(plane, from, to);
                            prop_assert!(now >= previous[i]);
                            previous[i] = now;
                            i += 1;
                        }
                    }
                }
            }
        }
    }
}
