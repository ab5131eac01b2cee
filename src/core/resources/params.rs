#![allow(clippy::result_large_err)]

//! Typed access to workflow parameters (a JSON object per item).

use crate::core::error::AppError;
use crate::core::transport::Query;
use crate::core::types::ErrorCategory;
use serde_json::{Map, Value};

/// Keys forwarded verbatim as query parameters on read operations.
pub const PASSTHROUGH_QUERY_KEYS: [&str; 4] = ["filter", "query", "order", "with"];

pub fn invalid<T: Into<String>>(message: T) -> AppError {
    AppError::new(ErrorCategory::ValidationError, message)
}

pub fn object(params: &Value) -> Result<&Map<String, Value>, AppError> {
    params
        .as_object()
        .ok_or_else(|| invalid("operation parameters must be a JSON object"))
}

fn present<'a>(params: &'a Value, key: &str) -> Option<&'a Value> {
    params.get(key).filter(|value| !value.is_null())
}

pub fn bool_param(params: &Value, key: &str, default: bool) -> Result<bool, AppError> {
    match present(params, key) {
        None => Ok(default),
        Some(Value::Bool(flag)) => Ok(*flag),
        Some(Value::String(text)) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" | "" => Ok(false),
            _ => Err(invalid(format!("parameter '{}' must be a boolean", key))),
        },
        Some(_) => Err(invalid(format!("parameter '{}' must be a boolean", key))),
    }
}

pub fn u64_param(params: &Value, key: &str) -> Result<Option<u64>, AppError> {
    match present(params, key) {
        None => Ok(None),
        Some(Value::Number(number)) => number
            .as_u64()
            .map(Some)
            .ok_or_else(|| invalid(format!("parameter '{}' must be a positive integer", key))),
        Some(Value::String(text)) if text.trim().is_empty() => Ok(None),
        Some(Value::String(text)) => text
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| invalid(format!("parameter '{}' must be a positive integer", key))),
        Some(_) => Err(invalid(format!("parameter '{}' must be a positive integer", key))),
    }
}

/// Required positive identifier, given as a number or numeric string.
pub fn id_param(params: &Value, key: &str) -> Result<u64, AppError> {
    match u64_param(params, key)? {
        Some(id) if id > 0 => Ok(id),
        _ => Err(invalid(format!("parameter '{}' is required", key))),
    }
}

/// Identifier of a body item, given as a number or numeric string.
pub fn item_id(item: &Map<String, Value>, index: usize) -> Result<u64, AppError> {
    let numeric = match item.get("id") {
        Some(Value::Number(number)) => number.as_u64(),
        Some(Value::String(text)) => text.trim().parse::<u64>().ok(),
        _ => None,
    };
    numeric
        .filter(|id| *id > 0)
        .ok_or_else(|| invalid(format!("items[{}] requires a numeric 'id'", index)))
}

pub fn str_param<'a>(params: &'a Value, key: &str) -> Result<Option<&'a str>, AppError> {
    match present(params, key) {
        None => Ok(None),
        Some(Value::String(text)) if text.trim().is_empty() => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.trim())),
        Some(_) => Err(invalid(format!("parameter '{}' must be a string", key))),
    }
}

pub fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, AppError> {
    str_param(params, key)?.ok_or_else(|| invalid(format!("parameter '{}' is required", key)))
}

/// Body supplied verbatim through `json: true` + `jsonString`.
pub fn raw_json_body(params: &Value) -> Result<Option<Value>, AppError> {
    if !bool_param(params, "json", false)? {
        return Ok(None);
    }
    match present(params, "jsonString") {
        Some(Value::String(text)) => serde_json::from_str(text)
            .map(Some)
            .map_err(|err| invalid(format!("jsonString is not valid JSON: {}", err))),
        Some(value @ (Value::Array(_) | Value::Object(_))) => Ok(Some(value.clone())),
        _ => Err(invalid("parameter 'jsonString' is required when 'json' is true")),
    }
}

/// Non-empty `items` array.
pub fn items(params: &Value) -> Result<&Vec<Value>, AppError> {
    match present(params, "items") {
        Some(Value::Array(items)) if !items.is_empty() => Ok(items),
        Some(Value::Array(_)) => Err(invalid("parameter 'items' must not be empty")),
        Some(_) => Err(invalid("parameter 'items' must be an array")),
        None => Err(invalid("parameter 'items' is required")),
    }
}

pub fn item_object<'a>(item: &'a Value, index: usize) -> Result<&'a Map<String, Value>, AppError> {
    item.as_object()
        .ok_or_else(|| invalid(format!("items[{}] must be a JSON object", index)))
}

/// Copy `filter`, `query`, `order` and `with` into the query string.
pub fn passthrough_query(params: &Value, query: &mut Query) {
    for key in PASSTHROUGH_QUERY_KEYS {
        if let Some(value) = present(params, key) {
            query.insert(key.to_string(), value.clone());
        }
    }
}

/// Either a raw JSON body or an `items` array; used by create/update validation.
pub fn require_body_source(params: &Value) -> Result<(), AppError> {
    if raw_json_body(params)?.is_some() {
        return Ok(());
    }
    items(params).map(|_| ())
}
