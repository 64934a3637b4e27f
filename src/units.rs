//! Conversion between human decimal amounts and fixed-point on-chain integers
//!
//! USDC and outcome tokens on Polygon use 6 decimals, but every function takes
//! the precision explicitly. Amounts never pass through floating point.

use alloy::primitives::U256;
use rust_decimal::prelude::*;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UnitsError {
    #[error("invalid decimal amount: {0}")]
    Invalid(String),
    #[error("negative amount: {0}")]
    Negative(Decimal),
    #[error("amount does not fit the target representation")]
    Overflow,
}

/// Convert a human amount into raw units, truncating digits finer than `decimals`.
///
/// `parse_units(dec!(1.5), 6)` is `1_500_000`.
pub fn parse_units(value: Decimal, decimals: u8) -> Result<U256, UnitsError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(UnitsError::Negative(value));
    }

    let truncated = value.round_dp_with_strategy(u32::from(decimals), RoundingStrategy::ToZero);
    let mantissa = u128::try_from(truncated.mantissa()).map_err(|_| UnitsError::Overflow)?;
    let shift = u32::from(decimals) - truncated.scale();

    U256::from(mantissa)
        .checked_mul(U256::from(10u8).pow(U256::from(shift)))
        .ok_or(UnitsError::Overflow)
}

/// Same as [`parse_units`] for a decimal string such as `"12.34"`.
pub fn parse_units_str(value: &str, decimals: u8) -> Result<U256, UnitsError> {
    let parsed = Decimal::from_str(value.trim()).map_err(|_| UnitsError::Invalid(value.to_string()))?;
    parse_units(parsed, decimals)
}

/// Convert raw units into a human amount rounded to `precision` places.
pub fn format_units(raw: U256, decimals: u8, precision: u32) -> Result<Decimal, UnitsError> {
    let raw: u128 = raw.try_into().map_err(|_| UnitsError::Overflow)?;
    let raw = i128::try_from(raw).map_err(|_| UnitsError::Overflow)?;
    let value = Decimal::try_from_i128_with_scale(raw, u32::from(decimals))
        .map_err(|_| UnitsError::Overflow)?;

    Ok(value
        .round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero)
        .normalize())
}

/// One whole token in raw units
pub fn one_unit(decimals: u8) -> U256 {
    U256::from(10u8).pow(U256::from(decimals))
}

/// Gas price conversion from gwei to wei
pub fn gwei_to_wei(gwei: u64) -> u128 {
    u128::from(gwei) * 1_000_000_000
}
