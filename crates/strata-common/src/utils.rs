//! Strata Utils - Time and Duration Utilities
//!
//! Conversions between wall-clock timestamps and the nanosecond integers
//! stored in sequence headers, plus a Go-style duration syntax (`1h30m`,
//! `-2h`, `500ms`) shared by configuration files and expression text.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use chrono::{DateTime, Duration, Utc};

const NANOS_PER_MICRO: i64 = 1_000;
const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_SECOND: i64 = 1_000_000_000;
const NANOS_PER_MINUTE: i64 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: i64 = 60 * NANOS_PER_MINUTE;

// =============================================================================
// Timestamp Conversions
// =============================================================================

/// Nanoseconds since the Unix epoch.
#[inline]
pub fn to_nanos(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_nanos_opt().unwrap_or(0)
}

/// Timestamp from nanoseconds since the Unix epoch.
#[inline]
pub fn from_nanos(nanos: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(nanos)
}

#[inline]
pub fn nanos_to_millis(nanos: i64) -> i64 {
    nanos / NANOS_PER_MILLI
}

#[inline]
pub fn time_to_millis(ts: DateTime<Utc>) -> i64 {
    nanos_to_millis(to_nanos(ts))
}

/// Total nanoseconds in `d`, saturating at the i64 range.
#[inline]
pub fn duration_nanos(d: Duration) -> i64 {
    d.num_nanoseconds().unwrap_or(if d < Duration::zero() {
        i64::MIN
    } else {
        i64::MAX
    })
}

// =============================================================================
// Duration Syntax
// =============================================================================

/// Parse a Go-style duration such as `1h30m`, `-2h`, `1.5s` or `250ms`.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (negative, mut rest) = match s.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };

    if rest == "0" {
        return Some(Duration::zero());
    }
    if rest.is_empty() {
        return None;
    }

    let mut total: i64 = 0;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_end == 0 {
            return None;
        }
        let number: f64 = rest[..num_end].parse().ok()?;
        rest = &rest[num_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = match &rest[..unit_end] {
            "ns" => 1,
            "us" | "µs" => NANOS_PER_MICRO,
            "ms" => NANOS_PER_MILLI,
            "s" => NANOS_PER_SECOND,
            "m" => NANOS_PER_MINUTE,
            "h" => NANOS_PER_HOUR,
            _ => return None,
        };
        rest = &rest[unit_end..];

        let nanos = (number * unit as f64).round();
        if !nanos.is_finite() || nanos > i64::MAX as f64 {
            return None;
        }
        total = total.checked_add(nanos as i64)?;
    }

    Some(Duration::nanoseconds(if negative { -total } else { total }))
}

/// Format a duration in the compact syntax accepted by [`parse_duration`].
pub fn format_duration(d: Duration) -> String {
    let nanos = duration_nanos(d);
    if nanos == 0 {
        return "0s".to_string();
    }

    let mut out = String::new();
    if nanos < 0 {
        out.push('-');
    }
    let mut remaining = nanos.unsigned_abs();

    for (unit, suffix) in [
        (NANOS_PER_HOUR as u64, "h"),
        (NANOS_PER_MINUTE as u64, "m"),
        (NANOS_PER_SECOND as u64, "s"),
    ] {
        let count = remaining / unit;
        if count > 0 {
            out.push_str(&format!("{}{}", count, suffix));
            remaining %= unit;
        }
    }

    if remaining > 0 {
        if remaining % NANOS_PER_MILLI as u64 == 0 {
            out.push_str(&format!("{}ms", remaining / NANOS_PER_MILLI as u64));
        } else if remaining % NANOS_PER_MICRO as u64 == 0 {
            out.push_str(&format!("{}us", remaining / NANOS_PER_MICRO as u64));
        } else {
            out.push_str(&format!("{}ns", remaining));
        }
    }

    out
}

// =============================================================================
// Serde Adapters
// =============================================================================

/// Serialize durations as Go-style strings (configuration files).
pub mod serde_duration {
    use super::{format_duration, parse_duration};
    use chrono::Duration;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).ok_or_else(|| D::Error::custom(format!("invalid duration '{}'", s)))
    }
}

/// Serialize durations as signed nanosecond integers (binary encodings).
pub mod serde_duration_nanos {
    use super::duration_nanos;
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(duration_nanos(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        i64::deserialize(deserializer).map(Duration::nanoseconds)
    }
}

// =============================================================================
// Tests
// =============================================================================
