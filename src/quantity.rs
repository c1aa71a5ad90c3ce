//! Resource quantity parsing
//!
//! Claim and volume capacities come back from the API server in canonical
//! form, which is not always the string that was submitted ("1024Mi" may come
//! back as "1Gi"). Capacities are therefore compared as integer values.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use crate::{Error, Result};

const BINARY_SUFFIXES: [(&str, u32); 6] = [
    ("Ki", 10),
    ("Mi", 20),
    ("Gi", 30),
    ("Ti", 40),
    ("Pi", 50),
    ("Ei", 60),
];

const DECIMAL_SUFFIXES: [(&str, i32); 9] = [
    ("n", -9),
    ("u", -6),
    ("m", -3),
    ("k", 3),
    ("M", 6),
    ("G", 9),
    ("T", 12),
    ("P", 15),
    ("E", 18),
];

/// Integer value of a quantity, rounded up (so "500m" is 1).
pub fn quantity_value(quantity: &Quantity) -> Result<i128> {
    parse_quantity(&quantity.0)
}

/// Parse a quantity string such as "4Gi", "500M", "1e3" or "1.5Ki".
///
/// Arithmetic is exact on integers; fractional results round up.
pub fn parse_quantity(raw: &str) -> Result<i128> {
    let invalid = |message: &str| Error::Quantity {
        value: raw.to_string(),
        message: message.to_string(),
    };

    let s = raw.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '+' || c == '-'))
        .unwrap_or(s.len());
    let (number, suffix) = s.split_at(split);

    let (negative, digits) = match number.as_bytes().first() {
        Some(b'-') => (true, &number[1..]),
        Some(b'+') => (false, &number[1..]),
        _ => (false, number),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid("missing numeric part"));
    }
    if !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(invalid("malformed number"));
    }
    let mantissa: i128 = format!("{whole}{fraction}")
        .parse()
        .map_err(|_| invalid("value out of range"))?;

    let (binary_shift, mut exp10) = if suffix.is_empty() {
        (0, 0)
    } else if let Some((_, shift)) = BINARY_SUFFIXES.iter().find(|(sfx, _)| *sfx == suffix) {
        (*shift, 0)
    } else if let Some((_, exp)) = DECIMAL_SUFFIXES.iter().find(|(sfx, _)| *sfx == suffix) {
        (0, *exp)
    } else if let Some(exp) = suffix
        .strip_prefix('e')
        .or_else(|| suffix.strip_prefix('E'))
    {
        let exp: i32 = exp.parse().map_err(|_| invalid("malformed exponent"))?;
        (0, exp)
    } else {
        return Err(invalid("unknown suffix"));
    };
    exp10 = exp10
        .checked_sub(i32::try_from(fraction.len()).map_err(|_| invalid("value out of range"))?)
        .ok_or_else(|| invalid("value out of range"))?;

    let mut numerator = mantissa
        .checked_mul(1i128 << binary_shift)
        .ok_or_else(|| invalid("value out of range"))?;
    if negative {
        numerator = -numerator;
    }

    if exp10 >= 0 {
        return pow10(exp10.unsigned_abs())
            .and_then(|m| numerator.checked_mul(m))
            .ok_or_else(|| invalid("value out of range"));
    }
    match pow10(exp10.unsigned_abs()) {
        Some(denominator) => Ok(ceil_div(numerator, denominator)),
        // smaller than any representable fraction
        None => Ok(if numerator > 0 { 1 } else { 0 }),
    }
}

fn pow10(exp: u32) -> Option<i128> {
    10i128.checked_pow(exp)
}

fn ceil_div(numerator: i128, denominator: i128) -> i128 {
    let quotient = numerator.div_euclid(denominator);
    if numerator.rem_euclid(denominator) == 0 {
        quotient
    } else {
        quotient + 1
    }
}
