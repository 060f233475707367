use std::str::FromStr;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::import::AttrValue;

/// Fractional digits kept on a characteristic.
const SCALE: u32 = 4;

/// Values must stay below one million in magnitude (six integer digits).
const INTEGER_LIMIT: i64 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantizeError {
    #[error("'{raw}' is not a decimal number")]
    Parse { raw: String },
    #[error("{value} does not fit in six integer digits")]
    Overflow { value: String },
}

/// Parse `raw` as a decimal and truncate it toward zero to four fractional digits.
///
/// ```
/// use districtbuilder::quantize;
/// assert_eq!(quantize("1.23456").unwrap().to_string(), "1.2345");
/// ```
pub fn quantize(raw: &str) -> Result<Decimal, QuantizeError> {
    let parse_error = || QuantizeError::Parse { raw: raw.to_string() };
    let digits = Digits::parse(raw.trim()).ok_or_else(parse_error)?;

    // Cut the digit string before handing it to `Decimal`, which rounds past 28 digits.
    let text = digits.truncated().ok_or_else(|| QuantizeError::Overflow { value: raw.trim().to_string() })?;
    let mut quantized = Decimal::from_str(&text).map_err(|_| parse_error())?;
    if quantized.abs() >= Decimal::from(INTEGER_LIMIT) {
        return Err(QuantizeError::Overflow { value: raw.trim().to_string() });
    }
    if quantized.is_zero() { quantized.set_sign_positive(true) }
    quantized.rescale(SCALE);
    Ok(quantized)
}

/// A decimal literal split into sign, significant digits and decimal point position.
struct Digits {
    negative: bool,
    /// Significant digits without leading zeros.
    digits: String,
    /// Number of `digits` before the decimal point; may be negative or exceed `digits.len()`.
    point: i64,
}

impl Digits {
    /// Accepts `[+-]digits[.digits][(e|E)[+-]digits]`.
    fn parse(text: &str) -> Option<Self> {
        let (mantissa, exponent) = match text.find(['e', 'E']) {
            Some(at) => (&text[..at], text[at + 1..].parse::<i64>().ok()?),
            None => (text, 0),
        };
        let (negative, mantissa) = match mantissa.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, mantissa.strip_prefix('+').unwrap_or(mantissa)),
        };
        let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));

        let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if (int_part.is_empty() && frac_part.is_empty()) || !all_digits(int_part) || !all_digits(frac_part) {
            return None;
        }

        let joined = format!("{int_part}{frac_part}");
        let significant = joined.trim_start_matches('0');
        let leading_zeros = (joined.len() - significant.len()) as i64;
        Some(Self {
            negative,
            digits: significant.to_string(),
            point: (int_part.len() as i64).saturating_add(exponent).saturating_sub(leading_zeros),
        })
    }

    /// Plain decimal text with at most `SCALE` fractional digits, cut toward zero.
    /// `None` when the integer part alone is out of range.
    fn truncated(&self) -> Option<String> {
        if self.digits.is_empty() || self.point <= -(SCALE as i64) {
            return Some("0".to_string());
        }
        if self.point > INTEGER_LIMIT.ilog10() as i64 {
            return None;
        }

        let (int_part, frac_part) = if self.point <= 0 {
            ("0".to_string(), format!("{}{}", "0".repeat(self.point.unsigned_abs() as usize), self.digits))
        } else {
            let point = self.point as usize;
            if point >= self.digits.len() {
                (format!("{}{}", self.digits, "0".repeat(point - self.digits.len())), String::new())
            } else {
                (self.digits[..point].to_string(), self.digits[point..].to_string())
            }
        };

        let frac = &frac_part[..frac_part.len().min(SCALE as usize)];
        let sign = if self.negative { "-" } else { "" };
        Some(if frac.is_empty() { format!("{sign}{int_part}") } else { format!("{sign}{int_part}.{frac}") })
    }
}

/// Quantize a shapefile attribute value.
pub(crate) fn quantize_attr(value: &AttrValue) -> Result<Decimal, QuantizeError> {
    match value {
        AttrValue::Text(text) => quantize(text),
        AttrValue::Number(number) if number.is_finite() => quantize(&number.to_string()),
        AttrValue::Integer(integer) => quantize(&integer.to_string()),
        other => Err(QuantizeError::Parse { raw: other.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal { Decimal::from_str(s).unwrap() }

    #[test]
    fn truncates_to_four_places() {
        assert_eq!(quantize("1.23456").unwrap(), dec("1.2345"));
        assert_eq!(quantize("1.23456").unwrap().to_string(), "1.2345");
        assert_eq!(quantize("-2.99999").unwrap(), dec("-2.9999"));
        assert_eq!(quantize(" 42 ").unwrap().to_string(), "42.0000");
    }

    #[test]
    fn scientific_notation_is_accepted() {
        assert_eq!(quantize("1.5e3").unwrap(), dec("1500"));
        assert_eq!(quantize("1.23456E-2").unwrap().to_string(), "0.0123");
        assert_eq!(quantize("-4e-7").unwrap().to_string(), "0.0000");
        assert!(matches!(quantize("1e400"), Err(QuantizeError::Overflow { .. })));
    }

    #[test]
    fn long_inputs_are_cut_not_rounded() {
        assert_eq!(quantize("0.99999999999999999999999999999").unwrap().to_string(), "0.9999");
        assert_eq!(quantize("-123456.999999999999999999999999999999").unwrap().to_string(), "-123456.9999");
        assert_eq!(quantize("000012.50000000000000000000000000001").unwrap().to_string(), "12.5000");
    }

    #[test]
    fn six_integer_digits_fit() {
        assert_eq!(quantize("999999.99999").unwrap(), dec("999999.9999"));
        assert!(matches!(quantize("1000000"), Err(QuantizeError::Overflow { .. })));
        assert!(matches!(quantize("-1000000.5"), Err(QuantizeError::Overflow { .. })));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert_eq!(quantize("n/a"), Err(QuantizeError::Parse { raw: "n/a".into() }));
        assert!(quantize("").is_err());
        assert!(quantize(".").is_err());
        assert!(quantize("1.2.3").is_err());
        assert!(quantize("1e").is_err());
    }

    #[test]
    fn attribute_values_quantize() {
        assert_eq!(quantize_attr(&AttrValue::Number(12.5)).unwrap(), dec("12.5"));
        assert_eq!(quantize_attr(&AttrValue::Integer(7)).unwrap(), dec("7"));
        assert!(quantize_attr(&AttrValue::Null).is_err());
        assert!(quantize_attr(&AttrValue::Number(f64::NAN)).is_err());
    }
}
