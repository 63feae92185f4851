//! Canonical text form of a decimal result.
//!
//! Integral values print without a decimal point (`15`, never `15.00`);
//! other values print in plain decimal notation with trailing zeros removed
//! (`2.12`). Exponent notation is never produced. Callers parse this text,
//! so the format is part of the wire contract.

use bigdecimal::BigDecimal;

/// Encodes `value` in its canonical wire form.
///
/// # Examples
///
/// ```
/// use std::str::FromStr;
/// use bigdecimal::BigDecimal;
/// use calcbus_core::encoder::encode;
///
/// assert_eq!(encode(&BigDecimal::from_str("15.00").unwrap()), "15");
/// assert_eq!(encode(&BigDecimal::from_str("2.1200").unwrap()), "2.12");
/// ```
#[must_use]
pub fn encode(value: &BigDecimal) -> String {
    let normalized = value.normalized();
    if normalized.is_integer() {
        normalized.with_scale(0).to_plain_string()
    } else {
        normalized.to_plain_string()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn enc(s: &str) -> String {
        encode(&BigDecimal::from_str(s).unwrap())
    }

    #[test]
    fn integral_values_have_no_point() {
        assert_eq!(enc("15"), "15");
        assert_eq!(enc("15.00"), "15");
        assert_eq!(enc("-42.0"), "-42");
    }

    #[test]
    fn trailing_zeros_of_integers_are_kept_as_digits() {
        assert_eq!(enc("1500"), "1500");
        assert_eq!(enc("1.5E3"), "1500");
    }

    #[test]
    fn fractional_values_strip_trailing_zeros() {
        assert_eq!(enc("2.1200000000"), "2.12");
        assert_eq!(enc("-0.50"), "-0.5");
    }

    #[test]
    fn zero_is_plain_zero() {
        assert_eq!(enc("0"), "0");
        assert_eq!(enc("0.000"), "0");
    }

    #[test]
    fn small_values_avoid_exponent_notation() {
        assert_eq!(enc("0.00000001"), "0.00000001");
        assert_eq!(enc("1E-12"), "0.000000000001");
    }
}
