// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Fixed-point helpers. Money and prices are `Decimal`; share counts are
//! integers; ownership fractions are apportioned in integer units so that
//! they sum exactly.

use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use thiserror::Error;

pub type ShareCount = u64;

/// Decimal places carried by ownership fractions.
pub const OWNERSHIP_SCALE: u32 = 18;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("decimal arithmetic overflow")]
    Overflow,
    #[error("division by zero")]
    DivisionByZero,
    #[error("value {0} is negative")]
    Negative(Decimal),
    #[error("value {value} has precision finer than {scale} decimal places")]
    FractionalUnits { value: Decimal, scale: u32 },
}

/// Truncate toward zero at `scale` decimal places.
pub fn floor_to_scale(value: Decimal, scale: u32) -> Decimal {
    value.round_dp_with_strategy(scale, RoundingStrategy::ToZero)
}

/// `a * b / c` with overflow and zero-divisor checks.
pub fn checked_mul_div(a: Decimal, b: Decimal, c: Decimal) -> Result<Decimal, MoneyError> {
    if c.is_zero() {
        return Err(MoneyError::DivisionByZero);
    }
    let product = a.checked_mul(b).ok_or(MoneyError::Overflow)?;
    product.checked_div(c).ok_or(MoneyError::Overflow)
}

/// Whole shares in a non-negative decimal quantity, rounding down.
pub fn whole_shares(value: Decimal) -> Result<ShareCount, MoneyError> {
    if value < Decimal::ZERO {
        return Err(MoneyError::Negative(value));
    }
    value.trunc().to_u64().ok_or(MoneyError::Overflow)
}

fn scale_factor(scale: u32) -> Result<Decimal, MoneyError> {
    10i128
        .checked_pow(scale)
        .map(|factor| Decimal::from_i128_with_scale(factor, 0))
        .ok_or(MoneyError::Overflow)
}

/// Integer count of minor currency units (cents at scale 2). Fails if the
/// amount carries sub-unit precision.
pub fn to_minor_units(amount: Decimal, scale: u32) -> Result<i128, MoneyError> {
    let scaled = amount
        .checked_mul(scale_factor(scale)?)
        .ok_or(MoneyError::Overflow)?;
    if !scaled.fract().is_zero() {
        return Err(MoneyError::FractionalUnits {
            value: amount,
            scale,
        });
    }
    scaled.to_i128().ok_or(MoneyError::Overflow)
}

pub fn from_minor_units(units: i128, scale: u32) -> Decimal {
    Decimal::from_i128_with_scale(units, scale)
}

/// Split `total_units` across `weights` by largest remainder. Each share is
/// `floor(total_units * w / W)`; leftover units go one at a time to the
/// largest fractional remainders, ties to the lower index. Returns all zeros
/// when the weights sum to zero.
pub fn apportion(total_units: u128, weights: &[u128]) -> Vec<u128> {
    let weight_sum: u128 = weights.iter().sum();
    if weight_sum == 0 {
        return vec![0; weights.len()];
    }
    let mut units = Vec::with_capacity(weights.len());
    let mut remainders = Vec::with_capacity(weights.len());
    for (idx, weight) in weights.iter().enumerate() {
        let product = total_units * weight;
        units.push(product / weight_sum);
        remainders.push((product % weight_sum, idx));
    }
    let assigned: u128 = units.iter().sum();
    let mut leftover = total_units - assigned;
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    for (_, idx) in remainders {
        if leftover == 0 {
            break;
        }
        units[idx] += 1;
        leftover -= 1;
    }
    units
}

/// Fraction of one at [`OWNERSHIP_SCALE`] for an apportioned unit count.
pub fn ownership_fraction(units: u128) -> Decimal {
    Decimal::from_i128_with_scale(units as i128, OWNERSHIP_SCALE)
}

pub fn ownership_unit_total() -> u128 {
    10u128.pow(OWNERSHIP_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn minor_units_reject_sub_cent_amounts() {
        assert_eq!(to_minor_units(dec!(12.34), 2), Ok(1234));
        assert_eq!(to_minor_units(dec!(12), 2), Ok(1200));
        assert!(matches!(
            to_minor_units(dec!(0.001), 2),
            Err(MoneyError::FractionalUnits { .. })
        ));
        assert_eq!(from_minor_units(1234, 2), dec!(12.34));
    }

    #[test]
    fn apportion_sums_exactly() {
        let units = apportion(100, &[1, 1, 1]);
        assert_eq!(units, vec![34, 33, 33]);
        let units = apportion(ownership_unit_total(), &[2, 3, 7, 11]);
        assert_eq!(units.iter().sum::<u128>(), ownership_unit_total());
        assert_eq!(apportion(10, &[0, 0]), vec![0, 0]);
    }

    #[test]
    fn whole_shares_floors_and_rejects_negative() {
        assert_eq!(whole_shares(dec!(10.999)), Ok(10));
        assert!(matches!(whole_shares(dec!(-1)), Err(MoneyError::Negative(_))));
    }

    #[test]
    fn mul_div_guards_zero() {
        assert_eq!(checked_mul_div(dec!(10), dec!(3), dec!(4)), Ok(dec!(7.5)));
        assert_eq!(
            checked_mul_div(dec!(1), dec!(1), Decimal::ZERO),
            Err(MoneyError::DivisionByZero)
        );
    }
}
