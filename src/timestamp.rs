//! Timestamp normalization.
//!
//! The backend emits timestamps as plain numbers, numeric strings, or
//! MongoDB extended-JSON wrappers depending on which code path produced
//! the document. Everything that compares or formats a timestamp goes
//! through [`normalize`] first.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use serde_json::{Map, Value};

/// Convert any supported timestamp encoding into unix seconds.
///
/// Never fails: absent, malformed or non-finite input yields `0.0`.
pub fn normalize(value: &Value) -> f64 {
    match value {
        Value::Number(n) => finite(n.as_f64()),
        Value::String(s) => parse_seconds(s),
        Value::Object(map) => tagged(map),
        _ => 0.0,
    }
}

fn finite(v: Option<f64>) -> f64 {
    v.filter(|f| f.is_finite()).unwrap_or(0.0)
}

fn parse_seconds(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    finite(trimmed.parse::<f64>().ok())
}

fn tagged(map: &Map<String, Value>) -> f64 {
    for tag in ["$numberDouble", "$numberLong", "$numberInt"] {
        if let Some(inner) = map.get(tag) {
            return normalize(inner);
        }
    }
    match map.get("$date") {
        Some(Value::Number(ms)) => finite(ms.as_f64()) / 1000.0,
        Some(Value::String(text)) => parse_date(text).unwrap_or(0.0),
        // canonical extended JSON: {"$date": {"$numberLong": "<millis>"}}
        Some(Value::Object(inner)) => tagged(inner) / 1000.0,
        _ => 0.0,
    }
}

/// Parse a calendar date/time string into unix seconds.
fn parse_date(text: &str) -> Option<f64> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(epoch_seconds(dt.timestamp(), dt.timestamp_subsec_nanos()));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(epoch_seconds(dt.timestamp(), dt.timestamp_subsec_nanos()));
    }
    // date-time without an offset is local time
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
            let local = Local.from_local_datetime(&naive).earliest()?;
            return Some(epoch_seconds(local.timestamp(), local.timestamp_subsec_nanos()));
        }
    }
    // date-only forms are UTC midnight
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
    let utc = date.and_hms_opt(0, 0, 0)?.and_utc();
    Some(utc.timestamp() as f64)
}

fn epoch_seconds(secs: i64, nanos: u32) -> f64 {
    secs as f64 + f64::from(nanos) / 1_000_000_000.0
}
