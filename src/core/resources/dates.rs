#![allow(clippy::result_large_err)]

use super::params::invalid;
use crate::core::error::AppError;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

/// Convert a date parameter to unix seconds.
///
/// Accepts unix seconds (number or numeric string), RFC 3339 timestamps,
/// naive `YYYY-MM-DDTHH:MM:SS` (read as UTC) and `YYYY-MM-DD` (UTC midnight).
/// `null` and empty strings yield `None`.
pub fn to_unix_seconds(value: &Value) -> Result<Option<i64>, AppError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|secs| secs.trunc() as i64))
            .map(Some)
            .ok_or_else(|| invalid(format!("'{}' is not a valid timestamp", number))),
        Value::String(text) => parse_date_string(text.trim()),
        other => Err(invalid(format!("'{}' is not a valid date", other))),
    }
}

fn parse_date_string(text: &str) -> Result<Option<i64>, AppError> {
    if text.is_empty() {
        return Ok(None);
    }
    if let Ok(secs) = text.parse::<i64>() {
        return Ok(Some(secs));
    }
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Ok(Some(at.timestamp()));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(at) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(Some(at.and_utc().timestamp()));
        }
    }
    if let Ok(day) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        if let Some(midnight) = day.and_hms_opt(0, 0, 0) {
            return Ok(Some(midnight.and_utc().timestamp()));
        }
    }
    Err(invalid(format!("'{}' is not a recognised date", text)))
}

/// Rewrite the named fields of `item` in place; empty dates are removed.
pub fn convert_date_fields(item: &mut Map<String, Value>, fields: &[&str]) -> Result<(), AppError> {
    for field in fields {
        let Some(value) = item.get(*field) else {
            continue;
        };
        match to_unix_seconds(value).map_err(|err| {
            invalid(format!("field '{}': {}", field, err.message))
        })? {
            Some(secs) => {
                item.insert(field.to_string(), Value::from(secs));
            }
            None => {
                item.remove(*field);
            }
        }
    }
    Ok(())
}
