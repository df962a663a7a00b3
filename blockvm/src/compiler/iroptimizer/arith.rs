//! Category propagation rules for the numeric opcodes.
//!
//! Each operand mask is decomposed into its category atoms (signed integer,
//! signed fractional, signed zero, signed infinity, NaN) and the result is
//! the union of a per-pair rule over the cartesian product of the two
//! operands' atoms. Union-of-pairs makes every rule monotone by
//! construction: growing an operand can only add pairs, and pairs only add
//! result bits.
//!
//! The pair rules follow IEEE-754 double semantics, including the edges a
//! naive algebraic reading misses: overflow to the signed infinity,
//! underflow to the signed zero, rounding that can make a sum or product of
//! fractionals integral, and the invalid operations (inf − inf, 0 × inf,
//! 0 / 0, inf / inf) that produce NaN.

use crate::compiler::enums::InputType;
use crate::compiler::intermediate::BinaryNumericOp;

const NAN: u32 = InputType::NUMBER_NAN.0;
const POS_INF: u32 = InputType::NUMBER_POS_INF.0;
const NEG_INF: u32 = InputType::NUMBER_NEG_INF.0;
const ZERO: u32 = InputType::NUMBER_ZERO.0;
const NEG_ZERO: u32 = InputType::NUMBER_NEG_ZERO.0;
const POS_FRACT: u32 = InputType::NUMBER_POS_FRACT.0;
const NEG_FRACT: u32 = InputType::NUMBER_NEG_FRACT.0;
const POS_INT: u32 = InputType::NUMBER_POS_INT.0;
const NEG_INT: u32 = InputType::NUMBER_NEG_INT.0;

/// One atomic value category of the numeric lattice bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumCat {
    NegInf,
    NegInt,
    NegFract,
    NegZero,
    PosZero,
    PosFract,
    PosInt,
    PosInf,
    Nan,
}

impl NumCat {
    const ALL: [NumCat; 9] = [
        NumCat::NegInf,
        NumCat::NegInt,
        NumCat::NegFract,
        NumCat::NegZero,
        NumCat::PosZero,
        NumCat::PosFract,
        NumCat::PosInt,
        NumCat::PosInf,
        NumCat::Nan,
    ];

    fn mask(self) -> u32 {
        match self {
            NumCat::NegInf => NEG_INF,
            NumCat::NegInt => NEG_INT,
            NumCat::NegFract => NEG_FRACT,
            NumCat::NegZero => NEG_ZERO,
            NumCat::PosZero => ZERO,
            NumCat::PosFract => POS_FRACT,
            NumCat::PosInt => POS_INT,
            NumCat::PosInf => POS_INF,
            NumCat::Nan => NAN,
        }
    }

    /// IEEE sign, where zeros carry theirs. Meaningless for NaN.
    fn sign(self) -> i8 {
        match self {
            NumCat::NegInf | NumCat::NegInt | NumCat::NegFract | NumCat::NegZero => -1,
            _ => 1,
        }
    }

    fn is_inf(self) -> bool {
        matches!(self, NumCat::PosInf | NumCat::NegInf)
    }

    fn is_zero(self) -> bool {
        matches!(self, NumCat::PosZero | NumCat::NegZero)
    }

    fn is_int(self) -> bool {
        matches!(self, NumCat::PosInt | NumCat::NegInt)
    }

    fn is_fract(self) -> bool {
        matches!(self, NumCat::PosFract | NumCat::NegFract)
    }
}

fn int_mask(sign: i8) -> u32 {
    if sign < 0 {
        NEG_INT
    } else {
        POS_INT
    }
}

fn fract_mask(sign: i8) -> u32 {
    if sign < 0 {
        NEG_FRACT
    } else {
        POS_FRACT
    }
}

fn zero_mask(sign: i8) -> u32 {
    if sign < 0 {
        NEG_ZERO
    } else {
        ZERO
    }
}

fn inf_mask(sign: i8) -> u32 {
    if sign < 0 {
        NEG_INF
    } else {
        POS_INF
    }
}

/// Atoms an operand may inhabit. Possibilities the numeric bits cannot
/// express are widened first: a non-numeric operand is coerced by the
/// runtime and may land anywhere in number-or-NaN, and unassigned numeric
/// bits widen to every real category.
fn decompose(t: InputType) -> Vec<NumCat> {
    let mut mask = t.0;
    if mask & !InputType::NUMBER_OR_NAN.0 != 0 {
        mask = InputType::NUMBER_OR_NAN.0;
    } else if mask & InputType::NUMBER.0 & !InputType::NUMBER_REAL.0 != 0 {
        mask |= InputType::NUMBER_REAL.0;
    }
    NumCat::ALL
        .iter()
        .copied()
        .filter(|cat| mask & cat.mask() != 0)
        .collect()
}

fn pairwise(a: InputType, b: InputType, rule: fn(NumCat, NumCat) -> u32) -> InputType {
    let left = decompose(a);
    let right = decompose(b);
    let mut out = 0;
    for &ca in &left {
        for &cb in &right {
            out |= rule(ca, cb);
        }
    }
    InputType(out)
}

/// Sign-negate a mask: swap each signed bit pair, keep everything else.
pub(crate) fn negate(t: InputType) -> InputType {
    const SWAPS: [(u32, u32); 4] = [
        (ZERO, NEG_ZERO),
        (POS_FRACT, NEG_FRACT),
        (POS_INT, NEG_INT),
        (POS_INF, NEG_INF),
    ];
    let mut out = t.0;
    for (pos, neg) in SWAPS {
        out &= !(pos | neg);
        if t.0 & pos != 0 {
            out |= neg;
        }
        if t.0 & neg != 0 {
            out |= pos;
        }
    }
    InputType(out)
}

fn add_pair(a: NumCat, b: NumCat) -> u32 {
    if a == NumCat::Nan || b == NumCat::Nan {
        return NAN;
    }
    // Infinities absorb finite addends; opposite infinities cancel to NaN.
    match (a.is_inf(), b.is_inf()) {
        (true, true) => return if a == b { a.mask() } else { NAN },
        (true, false) => return a.mask(),
        (false, true) => return b.mask(),
        (false, false) => {}
    }
    // Signed zeros: the sum is +0 unless both addends are -0.
    if a.is_zero() && b.is_zero() {
        return if a == NumCat::NegZero && b == NumCat::NegZero {
            NEG_ZERO
        } else {
            ZERO
        };
    }
    if a.is_zero() {
        return b.mask();
    }
    if b.is_zero() {
        return a.mask();
    }

    let (sa, sb) = (a.sign(), b.sign());
    if sa == sb {
        // Magnitudes only grow: the sign is fixed and the sum may overflow.
        // A fractional addend can round away against a large partner, so
        // int-ness is only guaranteed when both addends are integers.
        let finite = if a.is_int() && b.is_int() {
            int_mask(sa)
        } else {
            int_mask(sa) | fract_mask(sa)
        };
        finite | inf_mask(sa)
    } else {
        // Opposite signs: either sign may survive and the magnitude only
        // shrinks, so no overflow. Exact cancellation (to +0) needs equal
        // magnitudes, which an integer and a non-integer never have.
        if a.is_int() && b.is_int() {
            POS_INT | NEG_INT | ZERO
        } else if a.is_fract() && b.is_fract() {
            POS_INT | NEG_INT | POS_FRACT | NEG_FRACT | ZERO
        } else {
            POS_INT | NEG_INT | POS_FRACT | NEG_FRACT
        }
    }
}

fn mul_pair(a: NumCat, b: NumCat) -> u32 {
    if a == NumCat::Nan || b == NumCat::Nan {
        return NAN;
    }
    let s = a.sign() * b.sign();
    if a.is_inf() || b.is_inf() {
        if a.is_zero() || b.is_zero() {
            return NAN;
        }
        return inf_mask(s);
    }
    if a.is_zero() || b.is_zero() {
        return zero_mask(s);
    }
    if a.is_int() && b.is_int() {
        // Exact products of integers are integral, and every representable
        // double above 2^53 is integral too, so rounding preserves int-ness.
        return int_mask(s) | inf_mask(s);
    }
    if a.is_fract() && b.is_fract() {
        // Rounding can make the product integral; tiny factors underflow to
        // the signed zero and huge ones overflow.
        return int_mask(s) | fract_mask(s) | zero_mask(s) | inf_mask(s);
    }
    // int x fract: the integer factor has magnitude >= 1, so the product
    // never shrinks below the fractional factor and cannot underflow.
    int_mask(s) | fract_mask(s) | inf_mask(s)
}

fn div_pair(a: NumCat, b: NumCat) -> u32 {
    if a == NumCat::Nan || b == NumCat::Nan {
        return NAN;
    }
    let s = a.sign() * b.sign();
    if b.is_zero() {
        return if a.is_zero() { NAN } else { inf_mask(s) };
    }
    if a.is_zero() {
        return zero_mask(s);
    }
    if a.is_inf() {
        return if b.is_inf() { NAN } else { inf_mask(s) };
    }
    if b.is_inf() {
        return zero_mask(s);
    }
    // Both finite and nonzero. An integer divisor has magnitude >= 1, which
    // caps the quotient at the dividend (no overflow); an integer dividend
    // keeps the quotient at or above 1/max (no underflow).
    match (a.is_int(), b.is_int()) {
        (true, true) => int_mask(s) | fract_mask(s),
        (true, false) => int_mask(s) | fract_mask(s) | inf_mask(s),
        (false, true) => int_mask(s) | fract_mask(s) | zero_mask(s),
        (false, false) => int_mask(s) | fract_mask(s) | zero_mask(s) | inf_mask(s),
    }
}

pub(crate) fn add(a: InputType, b: InputType) -> InputType {
    pairwise(a, b, add_pair)
}

pub(crate) fn subtract(a: InputType, b: InputType) -> InputType {
    add(a, negate(b))
}

pub(crate) fn multiply(a: InputType, b: InputType) -> InputType {
    pairwise(a, b, mul_pair)
}

pub(crate) fn divide(a: InputType, b: InputType) -> InputType {
    pairwise(a, b, div_pair)
}

pub(crate) fn binary_result(op: BinaryNumericOp, a: InputType, b: InputType) -> InputType {
    match op {
        BinaryNumericOp::Add => add(a, b),
        BinaryNumericOp::Subtract => subtract(a, b),
        BinaryNumericOp::Multiply => multiply(a, b),
        BinaryNumericOp::Divide => divide(a, b),
    }
}

/// Coerce-to-number result: the numeric part survives, NaN collapses to 0,
/// and a possibly non-numeric operand may become any well-formed number.
pub(crate) fn cast_number(t: InputType) -> InputType {
    if t.is_subtype_of(InputType::NUMBER) {
        return t;
    }
    if !t.is_subtype_of(InputType::NUMBER_OR_NAN) {
        return InputType::NUMBER;
    }
    InputType((t.0 & InputType::NUMBER.0) | InputType::NUMBER_ZERO.0)
}

/// NaN-preserving coercion: already-numeric operands pass through.
pub(crate) fn cast_number_or_nan(t: InputType) -> InputType {
    if t.is_subtype_of(InputType::NUMBER_OR_NAN) {
        t
    } else {
        InputType::NUMBER_OR_NAN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PI: InputType = InputType::NUMBER_POS_INT;
    const NI: InputType = InputType::NUMBER_NEG_INT;
    const PF: InputType = InputType::NUMBER_POS_FRACT;

    #[test]
    fn test_add_same_sign_ints_stay_integral() {
        let out = add(PI, PI);
        assert_eq!(out, PI | InputType::NUMBER_POS_INF);
        let out = add(NI, NI);
        assert_eq!(out, NI | InputType::NUMBER_NEG_INF);
    }

    #[test]
    fn test_add_mixed_sign_ints_may_cancel() {
        let out = add(PI, NI);
        assert_eq!(out, PI | NI | InputType::NUMBER_ZERO);
    }

    #[test]
    fn test_add_zero_is_identity_on_nonzero() {
        assert_eq!(add(InputType::NUMBER_ZERO, PI), PI);
        assert_eq!(
            add(InputType::NUMBER_NEG_ZERO, InputType::NUMBER_NEG_ZERO),
            InputType::NUMBER_NEG_ZERO
        );
        assert_eq!(
            add(InputType::NUMBER_ZERO, InputType::NUMBER_NEG_ZERO),
            InputType::NUMBER_ZERO
        );
    }

    #[test]
    fn test_add_opposite_infinities_is_nan() {
        let out = add(InputType::NUMBER_POS_INF, InputType::NUMBER_NEG_INF);
        assert_eq!(out, InputType::NUMBER_NAN);
        let out = add(InputType::NUMBER_POS_INF, PI);
        assert_eq!(out, InputType::NUMBER_POS_INF);
    }

    #[test]
    fn test_nan_propagates() {
        assert_eq!(add(InputType::NUMBER_NAN, PI), InputType::NUMBER_NAN);
        assert_eq!(multiply(InputType::NUMBER_NAN, PI), InputType::NUMBER_NAN);
        assert_eq!(divide(PI, InputType::NUMBER_NAN), InputType::NUMBER_NAN);
    }

    #[test]
    fn test_subtract_same_sign_ints_may_cancel() {
        let out = subtract(PI, PI);
        assert_eq!(out, PI | NI | InputType::NUMBER_ZERO);
        assert_eq!(out, add(PI, NI));
    }

    #[test]
    fn test_negate_swaps_signed_pairs() {
        assert_eq!(negate(PI), NI);
        assert_eq!(negate(InputType::NUMBER_POS), InputType::NUMBER_NEG);
        assert_eq!(negate(InputType::NUMBER_NAN), InputType::NUMBER_NAN);
        assert_eq!(negate(negate(InputType::NUMBER_POS)), InputType::NUMBER_POS);
    }

    #[test]
    fn test_multiply_sign_product() {
        let out = multiply(PI, NI);
        assert_eq!(out, NI | InputType::NUMBER_NEG_INF);
        let out = multiply(NI, NI);
        assert_eq!(out, PI | InputType::NUMBER_POS_INF);
    }

    #[test]
    fn test_multiply_zero_by_infinity_is_nan() {
        let out = multiply(InputType::NUMBER_ZERO, InputType::NUMBER_POS_INF);
        assert_eq!(out, InputType::NUMBER_NAN);
        // Zero times a finite value keeps a signed zero.
        let out = multiply(InputType::NUMBER_ZERO, NI);
        assert_eq!(out, InputType::NUMBER_NEG_ZERO);
    }

    #[test]
    fn test_divide_by_zero() {
        let out = divide(PI, InputType::NUMBER_ZERO);
        assert_eq!(out, InputType::NUMBER_POS_INF);
        let out = divide(PI, InputType::NUMBER_NEG_ZERO);
        assert_eq!(out, InputType::NUMBER_NEG_INF);
        let out = divide(InputType::NUMBER_ZERO, InputType::NUMBER_ZERO);
        assert_eq!(out, InputType::NUMBER_NAN);
    }

    #[test]
    fn test_divide_ints_may_be_fractional() {
        let out = divide(PI, PI);
        assert_eq!(out, PI | PF);
    }

    #[test]
    fn test_results_stay_within_number_or_nan() {
        let everything = InputType::NUMBER_OR_NAN;
        for op in [
            BinaryNumericOp::Add,
            BinaryNumericOp::Subtract,
            BinaryNumericOp::Multiply,
            BinaryNumericOp::Divide,
        ] {
            let out = binary_result(op, everything, everything);
            assert!(
                out.is_subtype_of(InputType::NUMBER_OR_NAN),
                "{:?} escaped the numeric domain: {:?}",
                op,
                out
            );
        }
    }

    #[test]
    fn test_non_numeric_operand_widens() {
        let out = add(InputType::ANY, PI);
        assert!(PF.is_subtype_of(out));
        assert!(InputType::NUMBER_NAN.is_subtype_of(out));
        assert!(out.is_subtype_of(InputType::NUMBER_OR_NAN));
    }

    #[test]
    fn test_pairwise_rules_are_monotone() {
        // Widening an operand may only widen the result.
        let narrow = add(PI, PI);
        let wide = add(PI | PF, PI);
        assert!(narrow.is_subtype_of(wide));

        let narrow = divide(PI, NI);
        let wide = divide(PI | InputType::NUMBER_ZERO, NI);
        assert!(narrow.is_subtype_of(wide));
    }

    #[test]
    fn test_cast_number_preserves_known_numbers() {
        assert_eq!(cast_number(PI), PI);
        assert_eq!(cast_number(InputType::NUMBER), InputType::NUMBER);
        // NaN coerces to zero.
        assert_eq!(
            cast_number(InputType::NUMBER_NAN),
            InputType::NUMBER_ZERO
        );
        assert_eq!(
            cast_number(PI | InputType::NUMBER_NAN),
            PI | InputType::NUMBER_ZERO
        );
        // Anything non-numeric parses to some number.
        assert_eq!(cast_number(InputType::ANY), InputType::NUMBER);
    }

    #[test]
    fn test_cast_number_or_nan() {
        assert_eq!(cast_number_or_nan(PI), PI);
        assert_eq!(
            cast_number_or_nan(InputType::NUMBER_NAN),
            InputType::NUMBER_NAN
        );
        assert_eq!(cast_number_or_nan(InputType::ANY), InputType::NUMBER_OR_NAN);
    }
}
