//! Per-node bit flags
//!
//! One `u32` per node. Each subsystem owns a byte so flags set by the parser,
//! the planner and the runtime can never collide.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Fixed-width flag set carried by every expression node
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Flags(u32);

impl Flags {
    // Node semantics: bits 0-7
    pub const SEMANTIC_MASK: u32 = 0x0000_00ff;
    pub const CONDITIONAL: Flags = Flags(1 << 0);
    pub const VOLATILE: Flags = Flags(1 << 1);
    pub const PROPAGATE_MISSING_INHIBITED: Flags = Flags(1 << 2);
    pub const PROPAGATE_NULL_INHIBITED: Flags = Flags(1 << 3);
    pub const CASE_INSENSITIVE: Flags = Flags(1 << 4);

    // Parser: bits 8-15
    pub const PARSER_MASK: u32 = 0x0000_ff00;
    pub const PARENTHESIZED: Flags = Flags(1 << 8);
    pub const NOT_EQUAL: Flags = Flags(1 << 9);

    // Planner: bits 16-23
    pub const PLANNER_MASK: u32 = 0x00ff_0000;
    pub const BINDING_VARIABLE: Flags = Flags(1 << 16);
    pub const STATIC_VARIABLE: Flags = Flags(1 << 17);
    pub const DERIVED_FROM_FLATTEN: Flags = Flags(1 << 18);
    pub const COVERED_BY_INDEX: Flags = Flags(1 << 19);

    // Runtime: bits 24-31
    pub const RUNTIME_MASK: u32 = 0xff00_0000;

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(&self, other: Flags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: Flags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Flags) {
        self.0 &= !other.0;
    }

    pub fn set(&mut self, other: Flags, on: bool) {
        if on {
            self.insert(other);
        } else {
            self.remove(other);
        }
    }

    /// Flags owned by the parser
    pub const fn parser_bits(&self) -> Flags {
        Flags(self.0 & Self::PARSER_MASK)
    }
}

const _: () = {
    let masks = [
        Flags::SEMANTIC_MASK,
        Flags::PARSER_MASK,
        Flags::PLANNER_MASK,
        Flags::RUNTIME_MASK,
    ];
    let mut i = 0;
    while i < masks.len() {
        let mut j = i + 1;
        while j < masks.len() {
            assert!(masks[i] & masks[j] == 0);
            j += 1;
        }
        i += 1;
    }

    assert!(Flags::CONDITIONAL.0 & !Flags::SEMANTIC_MASK == 0);
    assert!(Flags::CASE_INSENSITIVE.0 & !Flags::SEMANTIC_MASK == 0);
    assert!(Flags::NOT_EQUAL.0 & !Flags::PARSER_MASK == 0);
    assert!(Flags::COVERED_BY_INDEX.0 & !Flags::PLANNER_MASK == 0);
};

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Flags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Flags({:#010x})", self.0)
    }
}
