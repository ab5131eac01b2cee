#![allow(clippy::result_large_err)]

use super::{Query, Transport};
use crate::core::error::AppError;
use reqwest::Method;
use serde_json::{json, Value};

/// Largest page Kommo serves; used when the caller gives no `limit`.
pub const DEFAULT_PAGE_LIMIT: u32 = 250;

impl Transport {
    /// Fetch every page of a collection endpoint.
    ///
    /// Seeds `page = 1` and `limit` (caller value or the configured page
    /// limit), then follows `_links.next.href` until it disappears. Raw page
    /// responses are returned in order. An empty (`null`) page ends the loop
    /// and is not collected.
    pub async fn request_all_pages(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
        query: &Query,
    ) -> Result<Vec<Value>, AppError> {
        let mut query = query.clone();
        let has_limit = query.get("limit").map(is_truthy).unwrap_or(false);
        if !has_limit {
            query.insert("limit".to_string(), json!(self.page_limit()));
        }

        let mut pages = Vec::new();
        let mut page: u64 = 1;
        loop {
            query.insert("page".to_string(), json!(page));
            let response = self
                .request(method.clone(), endpoint, body, &query)
                .await?;
            if response.is_null() {
                break;
            }
            let more = has_next_page(&response);
            pages.push(response);
            if !more {
                break;
            }
            page += 1;
        }
        tracing::debug!(endpoint, pages = pages.len(), "pagination finished");
        Ok(pages)
    }
}

/// True when the page carries a non-empty `_links.next.href`.
pub fn has_next_page(page: &Value) -> bool {
    page.pointer("/_links/next/href")
        .and_then(Value::as_str)
        .map(|href| !href.is_empty())
        .unwrap_or(false)
}

/// Concatenate `_embedded.{key}` arrays across pages.
pub fn flatten_embedded(pages: &[Value], key: &str) -> Vec<Value> {
    pages
        .iter()
        .filter_map(|page| page.get("_embedded").and_then(|embedded| embedded.get(key)))
        .filter_map(Value::as_array)
        .flat_map(|items| items.iter().cloned())
        .collect()
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|n| n != 0.0).unwrap_or(false),
        Value::String(text) => !text.is_empty(),
        _ => true,
    }
}
