//! Parsing of stored counter values
//!
//! Counters are stored as decimal strings. Reads never fail on content:
//! a value that is not a clean integer is read as its leading integer
//! prefix (`"12abc"` is 12, `"abc"` is 0), so historical data written by
//! other tools does not break range queries.

use tracing::warn;

/// Parse a stored counter value, coercing unparsable content
///
/// Accepts surrounding whitespace, an optional sign, and digits. Anything
/// after the leading digits is ignored. Values beyond `i64` saturate.
pub fn parse_counter_value(key: &str, raw: &str) -> i64 {
    if let Ok(v) = raw.parse::<i64>() {
        return v;
    }

    let trimmed = raw.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let mut value: i64 = 0;
    let mut seen_digit = false;
    for b in digits.bytes() {
        if !b.is_ascii_digit() {
            break;
        }
        seen_digit = true;
        let d = i64::from(b - b'0');
        value = value.saturating_mul(10);
        value = if negative {
            value.saturating_sub(d)
        } else {
            value.saturating_add(d)
        };
    }

    if !(seen_digit && digits.trim_end().bytes().all(|b| b.is_ascii_digit())) {
        warn!(key, raw, coerced = value, "non-integer counter value coerced");
    }
    value
}
