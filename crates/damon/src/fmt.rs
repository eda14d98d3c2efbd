#![forbid(unsafe_code)]

//! Conversions between compact human text (`5ms`, `10%`, `1.5GiB`,
//! `0x1000`) and the canonical units the rest of the crate works in:
//! microseconds, bytes and raw counters.
//!
//! Every parser accepts the `min` and `max` sentinels, which map to the
//! smallest and largest representable value. Formatters print the largest
//! value back as `max` so open-ended ranges survive a round trip.

use crate::error::ParseError;

pub const MIN_SENTINEL: &str = "min";
pub const MAX_SENTINEL: &str = "max";

/// Time units, largest first, as nanosecond factors.
const TIME_UNITS_NS: [(&str, u128); 7] = [
    ("d", 86_400_000_000_000),
    ("h", 3_600_000_000_000),
    ("m", 60_000_000_000),
    ("s", 1_000_000_000),
    ("ms", 1_000_000),
    ("us", 1_000),
    ("ns", 1),
];

/// Binary size units, largest first, as byte factors.
const SIZE_UNITS: [(&str, u128); 7] = [
    ("EiB", 1 << 60),
    ("PiB", 1 << 50),
    ("TiB", 1 << 40),
    ("GiB", 1 << 30),
    ("MiB", 1 << 20),
    ("KiB", 1 << 10),
    ("B", 1),
];

const NS_PER_US: u128 = 1_000;
const NS_PER_MS: u128 = 1_000_000;

fn sentinel(text: &str, max: u64) -> Option<u64> {
    match text {
        MIN_SENTINEL => Some(0),
        MAX_SENTINEL => Some(max),
        _ => None,
    }
}

/// Split `text` into its leading numeric part and the trailing suffix.
fn split_magnitude(text: &str) -> (&str, &str) {
    let idx = text
        .find(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | ',' | '_')))
        .unwrap_or(text.len());
    (text[..idx].trim(), text[idx..].trim())
}

/// Scale `magnitude` by `factor / divisor`, rejecting anything that does not
/// fit a `u64`. Integral magnitudes are computed exactly.
fn scale(text: &str, magnitude: &str, factor: u128, divisor: u128) -> Result<u64, ParseError> {
    let bad = || ParseError::BadMagnitude(text.to_string());
    let digits: String = magnitude.chars().filter(|c| !matches!(c, ',' | '_')).collect();
    if digits.is_empty() {
        return Err(bad());
    }

    let value = if digits.contains('.') {
        let float: f64 = digits.parse().map_err(|_| bad())?;
        let scaled = (float * factor as f64 / divisor as f64).round();
        if !scaled.is_finite() || scaled < 0.0 || scaled > u64::MAX as f64 {
            return Err(bad());
        }
        scaled as u128
    } else {
        let int: u128 = digits.parse().map_err(|_| bad())?;
        int.checked_mul(factor).ok_or_else(bad)? / divisor
    };
    u64::try_from(value).map_err(|_| bad())
}

fn text_to_time(text: &str, unitless_ns: u128, divisor: u128) -> Result<u64, ParseError> {
    let text = text.trim();
    if let Some(value) = sentinel(text, u64::MAX) {
        return Ok(value);
    }
    let (magnitude, suffix) = split_magnitude(text);
    let factor = if suffix.is_empty() {
        unitless_ns
    } else {
        TIME_UNITS_NS
            .iter()
            .find(|(name, _)| *name == suffix)
            .map(|(_, factor)| *factor)
            .ok_or_else(|| ParseError::BadSuffix {
                text: text.to_string(),
                suffix: suffix.to_string(),
            })?
    };
    scale(text, magnitude, factor, divisor)
}

/// Parse a duration into microseconds. A bare number is microseconds.
pub fn text_to_us(text: &str) -> Result<u64, ParseError> {
    text_to_time(text, NS_PER_US, NS_PER_US)
}

/// Parse a duration into milliseconds. A bare number is milliseconds.
pub fn text_to_ms(text: &str) -> Result<u64, ParseError> {
    text_to_time(text, NS_PER_MS, NS_PER_MS)
}

/// Format `value` using the first applicable unit of `units`, the last of
/// which is the unit `value` is expressed in.
///
/// `exact` picks the largest unit dividing `value` evenly and prints an
/// integer. Otherwise the largest unit not exceeding `value` is used with two
/// decimals.
fn format_scaled(value: u128, units: &[(&str, u128)], exact: bool) -> String {
    let (base_name, base) = units[units.len() - 1];
    if value == 0 {
        return format!("0 {base_name}");
    }
    for &(name, factor) in units {
        if factor == base {
            break;
        }
        if exact {
            if value % factor == 0 {
                return format!("{} {}", value / factor, name);
            }
        } else if value >= factor {
            return format!("{:.2} {}", value as f64 / factor as f64, name);
        }
    }
    format!("{} {}", value / base, base_name)
}

/// Format microseconds. `u64::MAX` prints as `max`.
pub fn format_time_us(us: u64, exact: bool) -> String {
    if us == u64::MAX {
        return MAX_SENTINEL.to_string();
    }
    format_scaled(us as u128 * NS_PER_US, &TIME_UNITS_NS[..6], exact)
}

/// Format milliseconds. `u64::MAX` prints as `max`.
pub fn format_time_ms(ms: u64, exact: bool) -> String {
    if ms == u64::MAX {
        return MAX_SENTINEL.to_string();
    }
    format_scaled(ms as u128 * NS_PER_MS, &TIME_UNITS_NS[..5], exact)
}

/// Parse a size into bytes. Suffixes are binary and case insensitive; a
/// bare number is bytes.
pub fn text_to_bytes(text: &str) -> Result<u64, ParseError> {
    let text = text.trim();
    if let Some(value) = sentinel(text, u64::MAX) {
        return Ok(value);
    }
    let (magnitude, suffix) = split_magnitude(text);
    let factor = if suffix.is_empty() {
        1
    } else {
        SIZE_UNITS
            .iter()
            .find(|(name, _)| {
                name.eq_ignore_ascii_case(suffix)
                    || (name.len() == 3 && name[..1].eq_ignore_ascii_case(suffix))
            })
            .map(|(_, factor)| *factor)
            .ok_or_else(|| ParseError::BadSuffix {
                text: text.to_string(),
                suffix: suffix.to_string(),
            })?
    };
    scale(text, magnitude, factor, 1)
}

/// Format bytes with binary units. `u64::MAX` prints as `max`.
pub fn format_sz(bytes: u64, exact: bool) -> String {
    if bytes == u64::MAX {
        return MAX_SENTINEL.to_string();
    }
    format_scaled(bytes as u128, &SIZE_UNITS, exact)
}

/// Parse a plain counter or address. Accepts `0x` hexadecimal and `,`/`_`
/// digit separators.
pub fn text_to_nr(text: &str) -> Result<u64, ParseError> {
    let text = text.trim();
    if let Some(value) = sentinel(text, u64::MAX) {
        return Ok(value);
    }
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        let digits: String = hex.chars().filter(|c| *c != '_').collect();
        return u64::from_str_radix(&digits, 16)
            .map_err(|_| ParseError::BadMagnitude(text.to_string()));
    }
    let (magnitude, suffix) = split_magnitude(text);
    if !suffix.is_empty() {
        return Err(ParseError::BadSuffix {
            text: text.to_string(),
            suffix: suffix.to_string(),
        });
    }
    if magnitude.contains('.') {
        return Err(ParseError::BadMagnitude(text.to_string()));
    }
    scale(text, magnitude, 1, 1)
}

/// Format a counter. `raw` prints plain decimal, otherwise thousands are
/// separated with commas. `u64::MAX` prints as `max`.
pub fn format_nr(nr: u64, raw: bool) -> String {
    if nr == u64::MAX {
        return MAX_SENTINEL.to_string();
    }
    let digits = nr.to_string();
    if raw {
        return digits;
    }
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Parse a percentage. The `%` suffix is mandatory so that a bare number can
/// be told apart from a raw counter.
pub fn text_to_percent(text: &str) -> Result<f64, ParseError> {
    let text = text.trim();
    match text {
        MIN_SENTINEL => return Ok(0.0),
        MAX_SENTINEL => return Ok(100.0),
        _ => {}
    }
    let Some(magnitude) = text.strip_suffix('%') else {
        let (_, suffix) = split_magnitude(text);
        return Err(ParseError::BadSuffix {
            text: text.to_string(),
            suffix: suffix.to_string(),
        });
    };
    let digits: String = magnitude
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | '_'))
        .collect();
    match digits.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(value),
        _ => Err(ParseError::BadMagnitude(text.to_string())),
    }
}

pub fn format_percent(value: f64) -> String {
    format!("{value}")
}

/// Parse a counter followed by an optional unit word, e.g.
/// `5 sample_intervals`. The unit is returned as written, empty if absent.
pub fn text_to_nr_unit(text: &str) -> Result<(u64, String), ParseError> {
    let text = text.trim();
    if let Ok(nr) = text_to_nr(text) {
        return Ok((nr, String::new()));
    }
    let (number, unit) = match text.split_once(char::is_whitespace) {
        Some((number, unit)) => (number, unit.trim()),
        None => split_magnitude(text),
    };
    let nr = text_to_nr(number)?;
    Ok((nr, unit.to_string()))
}

/// Format a half-open address range and its size.
pub fn format_addr_range(start: u64, end: u64, exact: bool) -> String {
    format!(
        "[{}, {}) ({})",
        format_nr(start, exact),
        format_nr(end, exact),
        format_sz(end.saturating_sub(start), exact)
    )
}

pub fn indent_lines(text: &str, indent: usize) -> String {
    let pad = " ".repeat(indent);
    text.lines()
        .map(|line| format!("{pad}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}
