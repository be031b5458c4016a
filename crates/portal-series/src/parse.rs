//! Field-level parsing shared by every decoder.

use chrono::{DateTime, TimeZone};
use serde_json::Value;
use std::fmt::Display;

/// Labels at or under this many characters are never read as timestamps.
const TIMESTAMP_MIN_LEN: usize = 8;

/// Short date format used for timestamp labels.
pub const LABEL_DATE_FORMAT: &str = "%d/%m/%Y";

/// Parses a reading written with either a decimal comma or a decimal point.
///
/// Like a lenient float parse, the longest numeric prefix is used
/// (`"12,5 m3"` reads as `12.5`). Returns `None` when there is no numeric
/// prefix or the result is not finite.
#[must_use]
pub fn parse_number(raw: &str) -> Option<f64> {
    let normalized = raw.trim().replace(',', ".");
    let prefix = numeric_prefix(&normalized);
    prefix
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Longest prefix of `s` shaped like `[+-]digits[.digits][e[+-]digits]`.
fn numeric_prefix(s: &str) -> &str {
    let bytes = s.as_bytes();
    let mut end = 0;
    let digits = |mut i: usize| {
        while bytes.get(i).is_some_and(u8::is_ascii_digit) {
            i += 1;
        }
        i
    };

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let int_end = digits(end);
    let mut mantissa_end = int_end;
    if bytes.get(int_end) == Some(&b'.') {
        let frac_end = digits(int_end + 1);
        if frac_end > int_end + 1 || int_end > end {
            mantissa_end = frac_end;
        }
    }
    if mantissa_end == end {
        return "";
    }

    let mut full_end = mantissa_end;
    if matches!(bytes.get(mantissa_end), Some(b'e' | b'E')) {
        let mut exp = mantissa_end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_end = digits(exp);
        if exp_end > exp {
            full_end = exp_end;
        }
    }
    &s[..full_end]
}

/// Reads a JSON value as a finite reading.
#[must_use]
pub fn value_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

/// Reads a JSON value as display text; `null` and missing become empty.
#[must_use]
pub fn value_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Formats a raw label for display.
///
/// A number, or a string of digits longer than eight characters, is read as
/// epoch milliseconds and rendered as a short date in `tz`, using the offset
/// in force at that instant. Anything else passes through unchanged.
#[must_use]
pub fn format_label<Tz>(raw: &Value, tz: &Tz) -> Option<String>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let millis = match raw {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            if s.len() > TIMESTAMP_MIN_LEN && s.bytes().all(|b| b.is_ascii_digit()) {
                s.parse::<i64>().ok()
            } else {
                return Some(s.to_string()).filter(|s| !s.is_empty());
            }
        }
        _ => return None,
    };

    millis
        .and_then(DateTime::from_timestamp_millis)
        .map(|dt| dt.with_timezone(tz).format(LABEL_DATE_FORMAT).to_string())
}

/// Formats a label given as text; see [`format_label`].
#[must_use]
pub fn format_label_str<Tz>(raw: &str, tz: &Tz) -> Option<String>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format_label(&Value::String(raw.to_string()), tz)
}
