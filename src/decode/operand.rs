//! Operand extraction from disassembled x86-style instruction text.
//!
//! Only a handful of mnemonic families are tracked. Each yields an ordered
//! list of register accesses that the per-thread ledger replays:
//!
//! | Family      | Operand 1            | Operand 2 | ALU |
//! |-------------|----------------------|-----------|-----|
//! | Arithmetic  | write                | read      | +1  |
//! | Move        | write                | read      | -   |
//! | Unary       | read, then write     | -         | +1  |
//!
//! A memory operand (`[...]`) contributes its base register as a read, even
//! in the write position: the address register is consumed, not produced.
//!
//! # Normalization
//!
//! The bracketed form is not a real addressing-mode parser. Text after `[`
//! is stripped of spaces and cut at `*` or `]`; any digit rejects the
//! operand, as does a result shorter than 2 or longer than 4 characters.
//! Multi-component expressions such as `[rax+rbx]` therefore drop out.

use smallvec::SmallVec;

/// Shortest plausible register name.
const MIN_REGISTER_LEN: usize = 2;
/// Longest plausible register name.
const MAX_REGISTER_LEN: usize = 4;

/// Mnemonic prefixes of the three-operand arithmetic/logic family.
const ARITHMETIC_PREFIXES: &[&str] = &[
    "add", "fadd", "sub", "fsub", "mul", "fmul", "imul", "lea", "cmp", "and", "or", "xor", "shl",
    "shr", "test",
];

/// Mnemonic prefixes of the move family (`mov` also covers `movzx`).
const MOVE_PREFIXES: &[&str] = &["mov"];

/// Mnemonic prefixes of the unary read-modify-write family.
const UNARY_PREFIXES: &[&str] = &["inc", "neg"];

/// Tracked mnemonic family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MnemonicClass {
    /// add, sub, mul, cmp, logic and shift ops, with floating variants.
    Arithmetic,
    /// mov, movzx.
    Move,
    /// inc, neg.
    Unary,
}

impl MnemonicClass {
    /// Classify a mnemonic by prefix. Returns `None` for untracked ones.
    pub fn of(mnemonic: &str) -> Option<Self> {
        let matches = |prefixes: &[&str]| {
            prefixes.iter().any(|p| {
                mnemonic
                    .get(..p.len())
                    .is_some_and(|head| head.eq_ignore_ascii_case(p))
            })
        };

        if matches(ARITHMETIC_PREFIXES) {
            Some(Self::Arithmetic)
        } else if matches(MOVE_PREFIXES) {
            Some(Self::Move)
        } else if matches(UNARY_PREFIXES) {
            Some(Self::Unary)
        } else {
            None
        }
    }

    /// Whether the family charges one instruction of ALU exposure.
    pub fn uses_alu(self) -> bool {
        matches!(self, Self::Arithmetic | Self::Unary)
    }
}

/// Classified operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// Immediate or otherwise untracked.
    Immediate,
    /// Plain register, by name.
    Register(String),
    /// Memory operand, by normalized base register.
    Memory(String),
}

impl Operand {
    /// Classify raw operand text.
    pub fn classify(raw: &str) -> Self {
        let raw = raw.trim_start();
        match raw.chars().next() {
            None => return Self::Immediate,
            Some(c) if c.is_ascii_digit() => return Self::Immediate,
            _ => {}
        }

        if let Some(open) = raw.find('[') {
            let mut base = String::new();
            for c in raw[open + 1..].chars() {
                if c.is_ascii_digit() {
                    return Self::Immediate;
                }
                if c == '*' || c == ']' {
                    break;
                }
                if !c.is_whitespace() {
                    base.push(c);
                }
            }
            return if plausible_register(&base) {
                Self::Memory(base)
            } else {
                Self::Immediate
            };
        }

        let name: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        if !plausible_register(&name) || name.starts_with('0') {
            return Self::Immediate;
        }
        Self::Register(name)
    }
}

fn plausible_register(name: &str) -> bool {
    (MIN_REGISTER_LEN..=MAX_REGISTER_LEN).contains(&name.len())
}

/// Direction of a register access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
}

/// One register access, in replay order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterAccess {
    pub name: String,
    pub kind: AccessKind,
}

impl RegisterAccess {
    fn read(name: String) -> Self {
        Self { name, kind: AccessKind::Read }
    }

    fn write(name: String) -> Self {
        Self { name, kind: AccessKind::Write }
    }
}

/// Ledger effect of one tracked instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionEffect {
    /// Mnemonic family.
    pub class: MnemonicClass,
    /// Register accesses in the order they must be applied.
    pub accesses: SmallVec<[RegisterAccess; 3]>,
}

impl InstructionEffect {
    /// Whether this instruction adds ALU exposure.
    pub fn uses_alu(&self) -> bool {
        self.class.uses_alu()
    }
}

/// Extract the ledger effect of a disassembled instruction.
///
/// Returns `None` when the mnemonic is not tracked. Operands that fail to
/// classify are skipped; the instruction itself is still reported so ALU
/// exposure is charged.
pub fn extract(text: &str) -> Option<InstructionEffect> {
    let text = text.trim();
    let (mnemonic, rest) = match text.split_once(char::is_whitespace) {
        Some((m, r)) => (m, r),
        None => (text, ""),
    };
    let class = MnemonicClass::of(mnemonic)?;

    let mut operands = rest.split(',');
    let first = operands.next().map(Operand::classify).unwrap_or(Operand::Immediate);
    let mut accesses = SmallVec::new();

    match class {
        MnemonicClass::Arithmetic | MnemonicClass::Move => {
            let second = operands.next().map(Operand::classify).unwrap_or(Operand::Immediate);
            match second {
                Operand::Register(name) | Operand::Memory(name) => {
                    accesses.push(RegisterAccess::read(name))
                }
                Operand::Immediate => {}
            }
            match first {
                Operand::Register(name) => accesses.push(RegisterAccess::write(name)),
                Operand::Memory(name) => accesses.push(RegisterAccess::read(name)),
                Operand::Immediate => {}
            }
        }
        MnemonicClass::Unary => match first {
            Operand::Register(name) => {
                accesses.push(RegisterAccess::read(name.clone()));
                accesses.push(RegisterAccess::write(name));
            }
            Operand::Memory(name) => accesses.push(RegisterAccess::read(name)),
            Operand::Immediate => {}
        },
    }

    Some(InstructionEffect { class, accesses })
}
