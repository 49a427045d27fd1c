//! Radix-aware conversion between cells and text.

use crate::{word::Cell, Error};

pub const MIN_BASE: Cell = 2;
pub const MAX_BASE: Cell = 36;

/// Parses `token` as a signed integer in `base`.
///
/// Any character that is not a digit of `base` (or a lone sign with nothing
/// after it) is a parse error naming the token; a well-formed number that does
/// not fit in a cell is [`Error::NumberOutOfRange`].
pub fn parse_number(token: &str, base: Cell) -> Result<Cell, Error> {
    let bad = || Error::Parse(token.to_string());
    if !(MIN_BASE..=MAX_BASE).contains(&base) {
        return Err(bad());
    }
    let (negative, digits) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token),
    };
    if digits.is_empty() {
        return Err(bad());
    }
    let digits = digits
        .chars()
        .map(|c| c.to_digit(base as u32).map(|d| d as Cell))
        .collect::<Option<Vec<Cell>>>()
        .ok_or_else(bad)?;

    // Accumulate towards the sign so that `Cell::MIN` still parses.
    digits.into_iter().try_fold(0 as Cell, |acc, d| {
        let acc = acc.checked_mul(base)?;
        if negative {
            acc.checked_sub(d)
        } else {
            acc.checked_add(d)
        }
    })
    .ok_or(Error::NumberOutOfRange)
}

/// Renders `value` in `base`, falling back to decimal for a nonsensical base.
pub fn format_number(value: Cell, base: Cell) -> String {
    let base = if (MIN_BASE..=MAX_BASE).contains(&base) {
        base as u32
    } else {
        10
    };
    let mut magnitude = i64::from(value).unsigned_abs();
    if magnitude == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while magnitude > 0 {
        let d = (magnitude % u64::from(base)) as u32;
        digits.push(
            char::from_digit(d, base)
                .unwrap_or('?')
                .to_ascii_uppercase(),
        );
        magnitude /= u64::from(base);
    }
    if value < 0 {
        digits.push('-');
    }
    digits.iter().rev().collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_in_base() {
        assert_eq!(parse_number("123", 10), Ok(123));
        assert_eq!(parse_number("-5", 10), Ok(-5));
        assert_eq!(parse_number("FF", 16), Ok(255));
        assert_eq!(parse_number("ff", 16), Ok(255));
        assert_eq!(parse_number("-101", 2), Ok(-5));
        assert_eq!(parse_number("-2147483648", 10), Ok(Cell::MIN));
    }

    #[test]
    fn rejects_bad_tokens() {
        assert_eq!(parse_number("-", 10), Err(Error::Parse("-".into())));
        assert_eq!(parse_number("12x", 10), Err(Error::Parse("12x".into())));
        assert_eq!(parse_number("FF", 10), Err(Error::Parse("FF".into())));
        assert_eq!(parse_number("1", 1), Err(Error::Parse("1".into())));
        assert_eq!(parse_number("2147483648", 10), Err(Error::NumberOutOfRange));
    }

    #[test]
    fn formats_in_base() {
        assert_eq!(format_number(0, 10), "0");
        assert_eq!(format_number(255, 16), "FF");
        assert_eq!(format_number(-5, 2), "-101");
        assert_eq!(format_number(Cell::MIN, 10), "-2147483648");
        assert_eq!(format_number(42, 99), "42");
    }
}
