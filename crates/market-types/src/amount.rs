//! Fixed-point amount helpers. Every amount is a `Decimal`; floats never appear.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::TypesError;

/// Fractional digits kept for points (8, e.g. `0.00000001`).
pub const DEFAULT_SCALE: u32 = 8;

/// Largest scale `rust_decimal` can represent.
pub const MAX_SCALE: u32 = 28;

/// Round to `scale` fractional digits, ties to even ("banker's rounding").
///
/// Idempotent: `round_half_even(round_half_even(x, s), s) == round_half_even(x, s)`.
pub fn round_half_even(value: Decimal, scale: u32) -> Decimal {
    value.round_dp_with_strategy(scale, RoundingStrategy::MidpointNearestEven)
}

/// Rounds, then pads to exactly `scale` digits so `10` renders as `10.00000000`.
pub fn to_scale(value: Decimal, scale: u32) -> Decimal {
    let mut out = round_half_even(value, scale);
    out.rescale(scale);
    out
}

/// A price must be positive and representable at `scale` without rounding.
pub fn check_price(price: Decimal, scale: u32) -> Result<Decimal, TypesError> {
    if price <= Decimal::ZERO {
        return Err(TypesError::InvalidPrice(format!(
            "price must be greater than zero, got {price}"
        )));
    }
    if price.normalize().scale() > scale {
        return Err(TypesError::InvalidPrice(format!(
            "price {price} has more than {scale} decimal places"
        )));
    }
    Ok(to_scale(price, scale))
}
