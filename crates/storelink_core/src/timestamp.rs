//! Timestamp parsing and formatting.
//!
//! Remote systems report modification dates in several shapes. Offsets are
//! honoured when present; naive values are taken as UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

/// Format used when timestamps are stored in record fields.
pub const STORE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%d %H:%M:%S%z"];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
];

/// Parses a remote timestamp.
pub fn parse(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(input, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Parses a timestamp held in a JSON value. Non-strings yield `None`.
pub fn from_value(value: &Value) -> Option<DateTime<Utc>> {
    value.as_str().and_then(parse)
}

/// Formats a timestamp the way record fields store it.
pub fn format(dt: &DateTime<Utc>) -> String {
    dt.format(STORE_FORMAT).to_string()
}

/// Converts a timestamp into a stored field value.
pub fn to_value(dt: &DateTime<Utc>) -> Value {
    Value::from(format(dt))
}
