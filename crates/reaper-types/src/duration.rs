//! TTL duration grammar
//!
//! A TTL is one or more `(unsigned integer)(unit)` pairs written back to
//! back, e.g. `24h`, `1h30m`, `1500ms`. Units are `h`, `m`, `s`, `ms`,
//! `us` (or `µs`), and `ns`. Whitespace, signs, fractions and a bare number
//! are all rejected. The total must fit in signed 64-bit nanoseconds.

use std::time::Duration;
use thiserror::Error;

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Unit suffixes and their length in nanoseconds
const UNITS: &[(&str, u64)] = &[
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000), // U+00B5 micro sign
    ("μs", 1_000), // U+03BC greek small letter mu
    ("ms", 1_000_000),
    ("s", NANOS_PER_SECOND),
    ("m", 60 * NANOS_PER_SECOND),
    ("h", 60 * 60 * NANOS_PER_SECOND),
];

/// Errors produced while parsing a TTL value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationParseError {
    #[error("empty duration")]
    Empty,

    #[error("invalid duration {input:?}: expected a number at {rest:?}")]
    MissingNumber { input: String, rest: String },

    #[error("invalid duration {input:?}: missing unit after {value}")]
    MissingUnit { input: String, value: u64 },

    #[error("invalid duration {input:?}: unknown unit {unit:?}")]
    UnknownUnit { input: String, unit: String },

    #[error("invalid duration {input:?}: value out of range")]
    Overflow { input: String },
}

/// Parse a TTL annotation value into a [`Duration`]
pub fn parse_ttl(input: &str) -> Result<Duration, DurationParseError> {
    if input.is_empty() {
        return Err(DurationParseError::Empty);
    }

    let overflow = || DurationParseError::Overflow {
        input: input.to_string(),
    };

    let mut rest = input;
    let mut total: u64 = 0;

    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits_end == 0 {
            return Err(DurationParseError::MissingNumber {
                input: input.to_string(),
                rest: rest.to_string(),
            });
        }

        let (digits, tail) = rest.split_at(digits_end);
        let value: u64 = digits.parse().map_err(|_| overflow())?;

        let unit_end = tail.find(|c: char| c.is_ascii_digit()).unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_end);
        if unit.is_empty() {
            return Err(DurationParseError::MissingUnit {
                input: input.to_string(),
                value,
            });
        }

        let scale = UNITS
            .iter()
            .find(|(suffix, _)| *suffix == unit)
            .map(|(_, scale)| *scale)
            .ok_or_else(|| DurationParseError::UnknownUnit {
                input: input.to_string(),
                unit: unit.to_string(),
            })?;

        total = value
            .checked_mul(scale)
            .and_then(|nanos| total.checked_add(nanos))
            .filter(|nanos| *nanos <= i64::MAX as u64)
            .ok_or_else(overflow)?;

        rest = next;
    }

    Ok(Duration::from_nanos(total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_single_units() {
        assert_eq!(parse_ttl("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_ttl("30m").unwrap(), Duration::from_secs(1800));
        assert_eq!(parse_ttl("45s").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_ttl("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_ttl("10us").unwrap(), Duration::from_micros(10));
        assert_eq!(parse_ttl("10µs").unwrap(), Duration::from_micros(10));
        assert_eq!(parse_ttl("10μs").unwrap(), Duration::from_micros(10));
        assert_eq!(parse_ttl("7ns").unwrap(), Duration::from_nanos(7));
        assert_eq!(parse_ttl("0s").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_compound() {
        assert_eq!(parse_ttl("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(
            parse_ttl("2m3s4ms").unwrap(),
            Duration::from_millis(123_004)
        );
        // Repeated units simply add up
        assert_eq!(parse_ttl("1m1m").unwrap(), Duration::from_secs(120));
    }

    #[test]
    fn test_rejects_malformed() {
        assert_eq!(parse_ttl(""), Err(DurationParseError::Empty));
        assert!(matches!(
            parse_ttl("bad"),
            Err(DurationParseError::MissingNumber { .. })
        ));
        assert!(matches!(
            parse_ttl("10"),
            Err(DurationParseError::MissingUnit { value: 10, .. })
        ));
        assert!(matches!(
            parse_ttl("1h30"),
            Err(DurationParseError::MissingUnit { value: 30, .. })
        ));
        assert!(matches!(
            parse_ttl("5d"),
            Err(DurationParseError::UnknownUnit { .. })
        ));
        assert!(matches!(
            parse_ttl("1h 30m"),
            Err(DurationParseError::UnknownUnit { .. })
        ));
        assert!(matches!(
            parse_ttl("-1h"),
            Err(DurationParseError::MissingNumber { .. })
        ));
        assert!(matches!(
            parse_ttl("1.5h"),
            Err(DurationParseError::UnknownUnit { .. })
        ));
    }

    #[test]
    fn test_overflow() {
        assert!(matches!(
            parse_ttl("99999999999999999999h"),
            Err(DurationParseError::Overflow { .. })
        ));
        assert!(matches!(
            parse_ttl("3000000h"),
            Err(DurationParseError::Overflow { .. })
        ));
        assert!(parse_ttl("2000000h").is_ok());
    }

    fn pairs() -> impl Strategy<Value = Vec<(u64, usize)>> {
        prop::collection::vec((0u64..10_000, 0..UNITS.len()), 1..10)
    }

    fn render(pairs: &[(u64, usize)]) -> String {
        pairs
            .iter()
            .map(|(n, unit)| format!("{}{}", n, UNITS[*unit].0))
            .collect()
    }

    proptest! {
        #[test]
        fn prop_rendered_pairs_sum_up(pairs in pairs()) {
            let expected: u64 = pairs.iter().map(|(n, unit)| n * UNITS[*unit].1).sum();
            prop_assert_eq!(parse_ttl(&render(&pairs)), Ok(Duration::from_nanos(expected)));
        }

        #[test]
        fn prop_foreign_character_is_rejected(
            pairs in pairs(),
            position in any::<prop::sample::Index>(),
            foreign in any::<char>().prop_filter("outside the grammar", |c| {
                !c.is_ascii_digit() && !"hmsunµμ".contains(*c)
            }),
        ) {
            let mut chars: Vec<char> = render(&pairs).chars().collect();
            chars.insert(position.index(chars.len() + 1), foreign);
            let input: String = chars.into_iter().collect();
            prop_assert!(parse_ttl(&input).is_err(), "accepted {:?}", input);
        }
    }
}
