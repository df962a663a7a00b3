//! Opcode vocabularies and the input-type lattice.
//!
//! Every IR node carries a stable opcode tag from one of two closed
//! vocabularies: [`InputOpcode`] for expression nodes and [`StackOpcode`]
//! for statement nodes. The serialized spelling of each tag is the
//! SCREAMING_SNAKE_CASE form used by previously compiled projects, so the
//! wire format stays compatible across compiler versions.
//!
//! [`InputType`] is the analysis domain: a 32-bit mask denoting the set of
//! value categories an expression might produce at runtime. Join is bitwise
//! OR, so merging control-flow paths is O(1).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Opcode tag for an expression (input) node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InputOpcode {
    Constant,
    VarGet,
    AddonCall,
    CastNumber,
    CastNumberOrNan,
    OpAdd,
    OpSubtract,
    OpMultiply,
    OpDivide,
    ProcedureCall,
}

/// Opcode tag for a statement (stack) node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StackOpcode {
    VarSet,
    ControlWhile,
    ControlFor,
    ControlRepeat,
    ControlIfElse,
    ControlStopScript,
    ControlWaitUntil,
    ProcedureCall,
    CompatibilityLayer,
}

/// Set of possible runtime value categories, encoded as a 32-bit mask.
///
/// A set bit means "this category is possible". `ANY` (all bits) is the top
/// of the lattice: no knowledge. A value `a` is at least as precise as `b`
/// exactly when `a`'s bits are a subset of `b`'s. Bits with no assigned
/// meaning are still legal masks and behave consistently under OR/AND.
///
/// The numeric bit group partitions numbers along independent refinements:
/// sign, zero vs nonzero, integer vs fractional, finite vs infinite, and
/// NaN vs well-formed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputType(pub u32);

impl InputType {
    /// Top of the lattice: the value could be anything.
    pub const ANY: InputType = InputType(0xFFFF_FFFF);

    /// Any well-formed (non-NaN) number.
    pub const NUMBER: InputType = InputType(0x0000_FFFF);
    /// Any number, including NaN.
    pub const NUMBER_OR_NAN: InputType = InputType(0x0001_FFFF);
    /// Exactly NaN.
    pub const NUMBER_NAN: InputType = InputType(0x0001_0000);

    pub const NUMBER_INF: InputType = InputType(0x0000_0300);
    pub const NUMBER_POS_INF: InputType = InputType(0x0000_0100);
    pub const NUMBER_NEG_INF: InputType = InputType(0x0000_0200);

    pub const NUMBER_ANY_ZERO: InputType = InputType(0x0000_000C);
    pub const NUMBER_ZERO: InputType = InputType(0x0000_0004);
    pub const NUMBER_NEG_ZERO: InputType = InputType(0x0000_0008);

    pub const NUMBER_FRACT: InputType = InputType(0x0000_00F0);
    pub const NUMBER_POS_FRACT: InputType = InputType(0x0000_0010);
    pub const NUMBER_NEG_FRACT: InputType = InputType(0x0000_0020);

    pub const NUMBER_INT: InputType = InputType(0x0000_FF00);
    pub const NUMBER_POS_INT: InputType = InputType(0x0000_0400);
    pub const NUMBER_NEG_INT: InputType = InputType(0x0000_0800);

    /// Positive int, fract, zero or +inf.
    pub const NUMBER_POS: InputType = InputType(0x0000_0514);
    /// Negative int, fract, zero or -inf.
    pub const NUMBER_NEG: InputType = InputType(0x0000_0A28);
    pub const NUMBER_POS_REAL: InputType = Self::NUMBER_POS;
    pub const NUMBER_NEG_REAL: InputType = Self::NUMBER_NEG;
    /// Union of both signed real groups.
    pub const NUMBER_REAL: InputType = InputType(0x0000_0F3C);

    /// Least upper bound of two lattice values.
    pub const fn join(self, other: InputType) -> InputType {
        InputType(self.0 | other.0)
    }

    /// True when every category possible for `self` is also possible for
    /// `other`; i.e. `self` is at least as precise as `other`.
    pub const fn is_subtype_of(self, other: InputType) -> bool {
        self.0 & !other.0 == 0
    }

    /// True when `self` and `other` share at least one category.
    pub const fn intersects(self, other: InputType) -> bool {
        self.0 & other.0 != 0
    }

    /// Exact category of a numeric literal.
    pub fn of_number(n: f64) -> InputType {
        if n.is_nan() {
            Self::NUMBER_NAN
        } else if n == f64::INFINITY {
            Self::NUMBER_POS_INF
        } else if n == f64::NEG_INFINITY {
            Self::NUMBER_NEG_INF
        } else if n == 0.0 {
            if n.is_sign_negative() {
                Self::NUMBER_NEG_ZERO
            } else {
                Self::NUMBER_ZERO
            }
        } else if n.fract() == 0.0 {
            if n > 0.0 {
                Self::NUMBER_POS_INT
            } else {
                Self::NUMBER_NEG_INT
            }
        } else if n > 0.0 {
            Self::NUMBER_POS_FRACT
        } else {
            Self::NUMBER_NEG_FRACT
        }
    }
}

impl BitOr for InputType {
    type Output = InputType;

    fn bitor(self, rhs: InputType) -> InputType {
        self.join(rhs)
    }
}

impl BitOrAssign for InputType {
    fn bitor_assign(&mut self, rhs: InputType) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for InputType {
    type Output = InputType;

    fn bitand(self, rhs: InputType) -> InputType {
        InputType(self.0 & rhs.0)
    }
}

impl fmt::Debug for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InputType({:#010X})", self.0)
    }
}
