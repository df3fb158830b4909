//! Fixed-point proportional shares.
//!
//! All reward arithmetic runs on integers; intermediate products widen
//! to 256 bits so a full-size balance times a perbill numerator cannot
//! overflow. Rounding is half away from zero throughout, which keeps
//! a distribution's total within participant-count units of the exact
//! value.

use primitive_types::U256;

/// A ratio `parts / unit` with a fixed denominator unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Share {
    parts: u128,
    unit: u128,
}

pub const PERBILL_UNIT: u128 = 1_000_000_000;
pub const PERCENT_UNIT: u128 = 100;

impl Share {
    pub fn perbill(parts: u128) -> Self {
        Self {
            parts,
            unit: PERBILL_UNIT,
        }
    }

    pub fn percent(parts: u128) -> Self {
        Self {
            parts,
            unit: PERCENT_UNIT,
        }
    }

    /// The ratio `numerator / denominator` scaled to `unit`.
    ///
    /// A zero denominator yields a zero share: distributions over an
    /// empty total pay nothing rather than fault.
    pub fn from_rational(numerator: u128, denominator: u128, unit: u128) -> Self {
        if denominator == 0 {
            return Self { parts: 0, unit };
        }
        Self {
            parts: mul_div_round(numerator, unit, denominator),
            unit,
        }
    }

    pub fn parts(&self) -> u128 {
        self.parts
    }

    /// `round(parts * value / unit)`.
    pub fn of(&self, value: u128) -> u128 {
        mul_div_round(self.parts, value, self.unit)
    }
}

/// `round(a * b / d)`, half away from zero, saturating at `u128::MAX`.
fn mul_div_round(a: u128, b: u128, d: u128) -> u128 {
    assert!(d > 0);
    let divisor = U256::from(d);
    let product = U256::from(a) * U256::from(b);
    let quotient = product / divisor;
    let remainder = product % divisor;
    let rounded = if remainder * U256::from(2u8) >= divisor {
        quotient + U256::one()
    } else {
        quotient
    };
    if rounded > U256::from(u128::MAX) {
        u128::MAX
    } else {
        rounded.as_u128()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn of_rounds_half_up() {
        // 1/2 of 3 = 1.5 -> 2
        assert_eq!(Share::percent(50).of(3), 2);
        // 1/4 of 2 = 0.5 -> 1
        assert_eq!(Share::percent(25).of(2), 1);
        // 1/4 of 1 = 0.25 -> 0
        assert_eq!(Share::percent(25).of(1), 0);
    }

    #[test]
    fn from_rational_scales_to_unit() {
        let third = Share::from_rational(1, 3, PERBILL_UNIT);
        assert_eq!(third.parts(), 333_333_333);
        let half = Share::from_rational(1, 2, PERCENT_UNIT);
        assert_eq!(half.parts(), 50);
        // 2/3 scaled to perbill rounds up
        let two_thirds = Share::from_rational(2, 3, PERBILL_UNIT);
        assert_eq!(two_thirds.parts(), 666_666_667);
    }

    #[test]
    fn zero_denominator_pays_nothing() {
        let share = Share::from_rational(5, 0, PERBILL_UNIT);
        assert_eq!(share.of(1_000_000), 0);
    }

    #[test]
    fn widening_avoids_overflow() {
        // numerator * value overflows u128 but not u256
        let all = Share::perbill(PERBILL_UNIT);
        let huge = u128::MAX / 2;
        assert_eq!(all.of(huge), huge);
    }

    #[test]
    fn distribution_error_is_bounded() {
        // Three equal point holders of a 1000-unit pot: each share
        // rounds independently, total stays within 3 units.
        let total: u128 = 1000;
        let each = Share::from_rational(1, 3, PERBILL_UNIT).of(total);
        let distributed = each * 3;
        assert!(distributed.abs_diff(total) <= 3);
    }
}
