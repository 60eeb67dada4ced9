use std::str::FromStr;

use bigdecimal::{BigDecimal, RoundingMode};
use num_bigint::BigInt;
use once_cell::sync::Lazy;
use serde_json::Value;

/// Fractional digits kept by the `numeric(36, 12)` columns.
const STORED_SCALE: i64 = 12;

static POW10_CACHE: Lazy<[BigDecimal; 25]> =
    Lazy::new(|| std::array::from_fn(|i| BigDecimal::from(BigInt::from(10u32).pow(i as u32))));

/// Compute 10^exp as BigDecimal.
pub fn big_pow10(exp: u8) -> BigDecimal {
    if (exp as usize) < POW10_CACHE.len() {
        POW10_CACHE[exp as usize].clone()
    } else {
        BigDecimal::from(BigInt::from(10u32).pow(exp as u32))
    }
}

/// Parse a decimal out of a JSON field that may be either a bare number or
/// a string-wrapped number (TzKT serializes big integers as strings).
pub fn json_decimal(value: &Value) -> Option<BigDecimal> {
    match value {
        Value::String(s) => BigDecimal::from_str(s).ok(),
        Value::Number(n) => BigDecimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

/// Round a computed value to the stored column scale.
///
/// Division can produce arbitrarily long expansions; derived prices and
/// values are normalized to 12 fractional digits before they are used or
/// persisted.
pub fn round_stored(value: BigDecimal) -> BigDecimal {
    value.with_scale_round(STORED_SCALE, RoundingMode::HalfEven)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pow10_small_and_large() {
        assert_eq!(big_pow10(0), BigDecimal::from(1));
        assert_eq!(big_pow10(6), BigDecimal::from(1_000_000));
        assert_eq!(
            big_pow10(30),
            BigDecimal::from_str("1000000000000000000000000000000").unwrap()
        );
    }

    #[test]
    fn json_decimal_accepts_strings_and_numbers() {
        assert_eq!(
            json_decimal(&json!("123456789123456789")),
            Some(BigDecimal::from_str("123456789123456789").unwrap())
        );
        assert_eq!(json_decimal(&json!(42)), Some(BigDecimal::from(42)));
        assert_eq!(json_decimal(&json!(null)), None);
        assert_eq!(json_decimal(&json!("not-a-number")), None);
    }

    #[test]
    fn round_stored_truncates_long_expansions() {
        let v = BigDecimal::from(1) / BigDecimal::from(3);
        assert_eq!(
            round_stored(v),
            BigDecimal::from_str("0.333333333333").unwrap()
        );
    }
}
