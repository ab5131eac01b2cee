use indexmap::IndexMap;
use serde_json::Value;
use url::form_urlencoded::Serializer;
use url::{Url, UrlQuery};

/// Ordered query parameters; values may be scalars, arrays or objects.
pub type Query = IndexMap<String, Value>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseQueryError {
    #[error("query parameter '{0}' must look like key=value")]
    MissingSeparator(String),
    #[error("query parameter '{0}' has an empty key")]
    EmptyKey(String),
}

/// Append `query` to `url` using bracket notation for nested values.
///
/// Scalars encode as `key=value`, arrays as repeated `key[]=v` and objects as
/// bracketed paths such as `filter[customer_id][]=7`. `null` values are skipped.
pub fn append_query(url: &mut Url, query: &Query) {
    if query.values().all(Value::is_null) {
        return;
    }
    let mut pairs = url.query_pairs_mut();
    for (key, value) in query {
        push_value(&mut pairs, key, value);
    }
}

fn push_value(pairs: &mut Serializer<'_, UrlQuery<'_>>, key: &str, value: &Value) {
    match value {
        Value::Null => {}
        Value::String(text) => {
            pairs.append_pair(key, text);
        }
        Value::Array(items) => {
            let nested = format!("{}[]", key);
            for item in items {
                push_value(pairs, &nested, item);
            }
        }
        Value::Object(map) => {
            for (sub_key, item) in map {
                push_value(pairs, &format!("{}[{}]", key, sub_key), item);
            }
        }
        scalar => {
            pairs.append_pair(key, &scalar.to_string());
        }
    }
}

/// Parse a `key=value` command-line pair; JSON-looking values keep their type.
pub fn parse_query_pair(raw: &str) -> Result<(String, Value), ParseQueryError> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| ParseQueryError::MissingSeparator(raw.to_string()))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(ParseQueryError::EmptyKey(raw.to_string()));
    }
    let value = serde_json::from_str::<Value>(value)
        .ok()
        .filter(|parsed| !parsed.is_string())
        .unwrap_or_else(|| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
