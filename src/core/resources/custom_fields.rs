#![allow(clippy::result_large_err)]

use super::dates::to_unix_seconds;
use super::params::invalid;
use crate::core::error::AppError;
use serde_json::{json, Map, Number, Value};

/// Convert one `{field_id, field_type, value}` entry to Kommo's
/// `{field_id, values: [...]}` shape, coercing the value by field type.
pub fn convert_custom_field(field: &Value) -> Result<Value, AppError> {
    let field_id = field
        .get("field_id")
        .and_then(Value::as_u64)
        .ok_or_else(|| invalid("custom field requires a numeric 'field_id'"))?;
    let field_type = field
        .get("field_type")
        .and_then(Value::as_str)
        .unwrap_or("text");

    if let Some(enum_id) = field.get("enum_id").and_then(Value::as_u64) {
        return Ok(json!({"field_id": field_id, "values": [{"enum_id": enum_id}]}));
    }

    let value = field.get("value").unwrap_or(&Value::Null);
    let values = match field_type {
        "select" | "radiobutton" => vec![json!({"value": as_text(value)})],
        "multiselect" => match value {
            Value::String(text) if text.contains(',') => text
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| json!({"value": part}))
                .collect(),
            Value::Array(parts) => parts.iter().map(|part| json!({"value": as_text(part)})).collect(),
            other => vec![json!({"value": as_text(other)})],
        },
        "checkbox" => vec![json!({"value": as_bool(value)})],
        "date" | "date_time" | "birthday" => {
            let secs = to_unix_seconds(value)
                .map_err(|err| invalid(format!("custom field {}: {}", field_id, err.message)))?
                .ok_or_else(|| invalid(format!("custom field {} requires a date", field_id)))?;
            vec![json!({"value": secs})]
        }
        "numeric" | "price" | "monetary" => vec![json!({"value": as_number(value, field_id)?})],
        _ => vec![json!({"value": as_text(value)})],
    };

    Ok(json!({"field_id": field_id, "values": values}))
}

pub fn convert_custom_fields(fields: &Value) -> Result<Vec<Value>, AppError> {
    match fields {
        Value::Null => Ok(Vec::new()),
        Value::Array(entries) => entries.iter().map(convert_custom_field).collect(),
        _ => Err(invalid("'custom_fields' must be an array")),
    }
}

/// Move an item's `custom_fields` into `custom_fields_values`, appending to
/// any values the item already carries in Kommo's own format.
pub fn apply_custom_fields(item: &mut Map<String, Value>) -> Result<(), AppError> {
    let Some(fields) = item.remove("custom_fields") else {
        return Ok(());
    };
    let converted = convert_custom_fields(&fields)?;
    if converted.is_empty() {
        return Ok(());
    }
    match item
        .entry("custom_fields_values")
        .or_insert_with(|| Value::Array(Vec::new()))
    {
        Value::Array(existing) => {
            existing.extend(converted);
            Ok(())
        }
        _ => Err(invalid("'custom_fields_values' must be an array")),
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn as_bool(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|n| n != 0.0).unwrap_or(false),
        Value::String(text) => !matches!(text.trim().to_ascii_lowercase().as_str(), "" | "false" | "0"),
        Value::Null => false,
        _ => true,
    }
}

fn as_number(value: &Value, field_id: u64) -> Result<Value, AppError> {
    let not_numeric = || invalid(format!("custom field {} requires a number", field_id));
    match value {
        Value::Number(_) => Ok(value.clone()),
        Value::String(text) => {
            let text = text.trim();
            if let Ok(integer) = text.parse::<i64>() {
                return Ok(Value::from(integer));
            }
            text.parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(not_numeric)
        }
        _ => Err(not_numeric()),
    }
}
