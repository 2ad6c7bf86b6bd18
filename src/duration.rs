//! Human-readable durations for the `[timing]` config section ("500ms", "30s", "2h").

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{de, Deserialize, Deserializer};

const UNITS: &[(&str, u64)] = &[
    ("ms", 1),
    ("s", 1_000),
    ("m", 60 * 1_000),
    ("h", 60 * 60 * 1_000),
    ("d", 24 * 60 * 60 * 1_000),
];

/// Parse a duration string such as `"1s"`, `"250ms"`, `"30m"` or `"2h"`.
///
/// The input is case-insensitive and surrounding whitespace is ignored.
///
/// ```
/// use billharvest::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
/// assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
/// assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(2 * 60 * 60));
/// ```
pub fn parse_duration(input: &str) -> Result<Duration> {
    let s = input.trim().to_lowercase();

    // "ms" must be tried before "m" and "s".
    let (number, millis_per_unit) = UNITS
        .iter()
        .find_map(|(suffix, factor)| s.strip_suffix(suffix).map(|n| (n, *factor)))
        .with_context(|| format!("Duration {input:?} must end with ms, s, m, h or d"))?;

    let number: u64 = number
        .trim()
        .parse()
        .with_context(|| format!("Invalid number in duration {input:?}"))?;

    let millis = number
        .checked_mul(millis_per_unit)
        .with_context(|| format!("Duration {input:?} is too large"))?;

    Ok(Duration::from_millis(millis))
}

/// Render a duration using the largest unit that divides it exactly.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis() as u64;
    if millis == 0 {
        return "0s".to_string();
    }
    UNITS
        .iter()
        .rev()
        .find(|(_, factor)| millis % factor == 0)
        .map(|(suffix, factor)| format!("{}{}", millis / factor, suffix))
        .unwrap_or_else(|| format!("{millis}ms"))
}

pub fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(de::Error::custom)
}

pub fn deserialize_optional_duration<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    s.map(|s| parse_duration(&s).map_err(de::Error::custom))
        .transpose()
}

pub fn serialize_duration<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&format_duration(*duration))
}

pub fn serialize_optional_duration<S>(
    duration: &Option<Duration>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match duration {
        Some(d) => serializer.serialize_some(&format_duration(*d)),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_unit() {
        assert_eq!(parse_duration("15ms").unwrap(), Duration::from_millis(15));
        assert_eq!(parse_duration("1s").unwrap(), Duration::from_secs(1));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration(" 2H ").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86_400));
    }

    #[test]
    fn rejects_missing_unit_and_garbage() {
        assert!(parse_duration("30").is_err());
        assert!(parse_duration("abcs").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn rejects_overflow() {
        assert!(parse_duration("18446744073709551615d").is_err());
    }

    #[test]
    fn formats_with_largest_exact_unit() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
        assert_eq!(format_duration(Duration::from_secs(7200)), "2h");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }
}
