//! Per-resource-class vulnerability triples.
//!
//! Nearly every quantity the analysis tracks comes in three flavours: ALU,
//! register, and memory. [`Exposure`] bundles the three so accumulators,
//! snapshots, and factors can be moved around as one value.

use std::fmt;
use std::ops::{Add, AddAssign, Sub};

/// Hardware resource class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    /// Functional units; one instruction's worth of exposure per ALU op.
    Alu,
    /// Architectural registers named in disassembly.
    Register,
    /// Memory locations keyed by physical address.
    Memory,
}

impl ResourceClass {
    /// All classes in report order.
    pub const ALL: [ResourceClass; 3] = [Self::Alu, Self::Register, Self::Memory];

    /// Lower-case label used in reports.
    pub fn label(self) -> &'static str {
        match self {
            Self::Alu => "alu",
            Self::Register => "register",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One value per resource class.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Exposure {
    pub alu: f64,
    pub register: f64,
    pub memory: f64,
}

impl Exposure {
    /// All three classes zero.
    pub const ZERO: Exposure = Exposure {
        alu: 0.0,
        register: 0.0,
        memory: 0.0,
    };

    /// Build from explicit components.
    pub const fn new(alu: f64, register: f64, memory: f64) -> Self {
        Self { alu, register, memory }
    }

    /// Component for `class`.
    #[inline]
    pub fn get(&self, class: ResourceClass) -> f64 {
        match class {
            ResourceClass::Alu => self.alu,
            ResourceClass::Register => self.register,
            ResourceClass::Memory => self.memory,
        }
    }

    /// Mutable component for `class`.
    #[inline]
    pub fn get_mut(&mut self, class: ResourceClass) -> &mut f64 {
        match class {
            ResourceClass::Alu => &mut self.alu,
            ResourceClass::Register => &mut self.register,
            ResourceClass::Memory => &mut self.memory,
        }
    }

    /// Apply `f` to each component.
    pub fn map(self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            alu: f(self.alu),
            register: f(self.register),
            memory: f(self.memory),
        }
    }

    /// Component-wise square.
    pub fn squared(self) -> Self {
        self.map(|v| v * v)
    }

    /// Scale every component by `factor`.
    pub fn scaled(self, factor: f64) -> Self {
        self.map(|v| v * factor)
    }
}

impl Add for Exposure {
    type Output = Exposure;

    fn add(self, rhs: Exposure) -> Exposure {
        Exposure {
            alu: self.alu + rhs.alu,
            register: self.register + rhs.register,
            memory: self.memory + rhs.memory,
        }
    }
}

impl AddAssign for Exposure {
    fn add_assign(&mut self, rhs: Exposure) {
        *self = *self + rhs;
    }
}

impl Sub for Exposure {
    type Output = Exposure;

    fn sub(self, rhs: Exposure) -> Exposure {
        Exposure {
            alu: self.alu - rhs.alu,
            register: self.register - rhs.register,
            memory: self.memory - rhs.memory,
        }
    }
}
