// =============================================================================
// Exact-decimal rounding for order quantities and prices
// =============================================================================
//
// Instrument increments (quantity_increment, price_increment) are themselves
// decimals (e.g. 1e-6), so floor-to-increment must be done in `Decimal`
// arithmetic — floating point would reintroduce the binary-representation
// error the increment rounding exists to remove.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;

/// Floor `value` down to the nearest multiple of `increment` and return it
/// with exactly the increment's own scale (trailing zeros stripped, no
/// scientific notation — `Decimal`'s `Display` already guarantees both).
///
/// Returns `Decimal::ZERO` if `increment` is zero or negative, or if the
/// floored result is not positive.
pub fn floor_to_increment(value: f64, increment: f64) -> Decimal {
    let Some(value) = Decimal::from_f64(value) else {
        return Decimal::ZERO;
    };
    let Some(increment) = Decimal::from_f64(increment) else {
        return Decimal::ZERO;
    };
    if increment <= Decimal::ZERO || value <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    let steps = (value / increment).floor();
    let floored = steps * increment;
    floored.normalize()
}

/// Round `value` to the nearest multiple of `increment` (used for limit
/// prices, which round rather than floor).
pub fn round_to_increment(value: f64, increment: f64) -> Decimal {
    let Some(value) = Decimal::from_f64(value) else {
        return Decimal::ZERO;
    };
    let Some(increment) = Decimal::from_f64(increment) else {
        return Decimal::ZERO;
    };
    if increment <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    let steps = (value / increment).round();
    (steps * increment).normalize()
}

/// Format a decimal the way the signed venue's order payload requires: no
/// scientific notation, trailing zeros stripped but not precision beyond
/// that — `Decimal`'s own `to_string` already satisfies this once
/// `normalize()` has been applied upstream.
pub fn format_decimal(value: Decimal) -> String {
    value.normalize().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s6_precision_rounding_scenario() {
        // quantity_increment=1e-6, price_increment=0.01
        let qty = floor_to_increment(0.1234567, 1e-6);
        assert_eq!(format_decimal(qty), "0.123456");

        let price = round_to_increment(65.12345, 0.01);
        assert_eq!(format_decimal(price), "65.12");
    }

    #[test]
    fn boundary_quantity_increment_1e8() {
        let qty = floor_to_increment(1.234567891, 1e-8);
        assert_eq!(format_decimal(qty), "1.23456789");

        let tiny = floor_to_increment(0.5e-9, 1e-8);
        assert_eq!(tiny, Decimal::ZERO);
    }

    #[test]
    fn format_decimal_is_idempotent() {
        let qty = floor_to_increment(0.1234567, 1e-6);
        let once = format_decimal(qty);
        let twice = format_decimal(Decimal::from_str(&once).unwrap());
        assert_eq!(once, twice);
    }

    #[test]
    fn zero_increment_rejected() {
        assert_eq!(floor_to_increment(1.0, 0.0), Decimal::ZERO);
        assert_eq!(round_to_increment(1.0, -1.0), Decimal::ZERO);
    }

    #[test]
    fn negative_or_zero_value_floors_to_zero() {
        assert_eq!(floor_to_increment(0.0, 0.01), Decimal::ZERO);
        assert_eq!(floor_to_increment(-1.0, 0.01), Decimal::ZERO);
    }
}
