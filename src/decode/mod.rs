//! Instruction-text decoding.
//!
//! The trace source hands over already-disassembled text; this module only
//! works out which registers an instruction reads and writes.
//!
//! - [`operand`] - mnemonic families and operand classification

pub mod operand;

pub use operand::{
    extract, AccessKind, InstructionEffect, MnemonicClass, Operand, RegisterAccess,
};
