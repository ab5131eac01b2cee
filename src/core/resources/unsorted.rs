#![allow(clippy::result_large_err)]

//! Incoming ("unsorted") leads: listing, summary, form submissions and triage.

use super::dates::to_unix_seconds;
use super::params::{invalid, item_object, items, object, raw_json_body, required_str, u64_param};
use super::registry::{OperationContext, ResourceOperation};
use crate::core::error::AppError;
use crate::core::transport::Query;
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Map, Value};

const CATEGORIES: [&str; 4] = ["forms", "chats", "sip", "mail"];

/// `category` (string or array) becomes `filter[category][]`.
pub fn category_filter(params: &Value, query: &mut Query) -> Result<(), AppError> {
    let categories: Vec<String> = match params.get("category") {
        None | Some(Value::Null) => return Ok(()),
        Some(Value::String(one)) if one.is_empty() => return Ok(()),
        Some(Value::String(one)) => vec![one.clone()],
        Some(Value::Array(many)) => many
            .iter()
            .map(|category| {
                category
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| invalid("'category' entries must be strings"))
            })
            .collect::<Result<_, _>>()?,
        Some(_) => return Err(invalid("'category' must be a string or an array")),
    };
    if let Some(unknown) = categories.iter().find(|c| !CATEGORIES.contains(&c.as_str())) {
        return Err(invalid(format!(
            "unknown unsorted category '{}' (expected one of {})",
            unknown,
            CATEGORIES.join(", ")
        )));
    }
    if categories.is_empty() {
        return Ok(());
    }
    let filter = query
        .entry("filter".to_string())
        .or_insert_with(|| json!({}));
    match filter {
        Value::Object(filter) => {
            filter.insert("category".to_string(), json!(categories));
            Ok(())
        }
        _ => Err(invalid("'filter' must be an object")),
    }
}

/// `GET leads/unsorted/summary`.
pub struct UnsortedSummary;

#[async_trait]
impl ResourceOperation for UnsortedSummary {
    fn resource(&self) -> &'static str {
        "unsorted"
    }

    fn operation(&self) -> &'static str {
        "summary"
    }

    fn validate_params(&self, params: &Value) -> Result<(), AppError> {
        object(params)?;
        category_filter(params, &mut Query::new())
    }

    async fn execute(&self, params: Value, ctx: OperationContext) -> Result<Vec<Value>, AppError> {
        let mut query = Query::new();
        if let Some(filter) = params.get("filter").filter(|f| !f.is_null()) {
            query.insert("filter".to_string(), filter.clone());
        }
        category_filter(&params, &mut query)?;
        let response = ctx
            .transport
            .request(Method::GET, "leads/unsorted/summary", None, &query)
            .await?;
        Ok(if response.is_null() {
            Vec::new()
        } else {
            vec![response]
        })
    }
}

/// `POST leads/unsorted/forms`.
pub struct UnsortedCreateForms;

impl UnsortedCreateForms {
    fn build_body(params: &Value) -> Result<Value, AppError> {
        if let Some(raw) = raw_json_body(params)? {
            return Ok(raw);
        }
        items(params)?
            .iter()
            .enumerate()
            .map(|(index, item)| form_item(item_object(item, index)?, index))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }
}

fn form_item(item: &Map<String, Value>, index: usize) -> Result<Value, AppError> {
    let mut body = Map::new();
    for key in ["source_name", "source_uid"] {
        match item.get(key).and_then(Value::as_str).filter(|v| !v.is_empty()) {
            Some(value) => {
                body.insert(key.to_string(), json!(value));
            }
            None => {
                return Err(invalid(format!("items[{}] requires '{}'", index, key)));
            }
        }
    }
    copy_present(item, &mut body, &["request_id", "pipeline_id"]);
    if let Some(created_at) = item.get("created_at") {
        if let Some(secs) = to_unix_seconds(created_at)? {
            body.insert("created_at".to_string(), json!(secs));
        }
    }

    if let Some(Value::Object(fields)) = item.get("metadata") {
        let mut metadata = Map::new();
        copy_present(
            fields,
            &mut metadata,
            &["form_id", "form_name", "form_page", "ip", "referer"],
        );
        if let Some(sent_at) = fields.get("form_sent_at") {
            if let Some(secs) = to_unix_seconds(sent_at)? {
                metadata.insert("form_sent_at".to_string(), json!(secs));
            }
        }
        if !metadata.is_empty() {
            body.insert("metadata".to_string(), Value::Object(metadata));
        }
    }

    if let Some(Value::Object(embedded)) = item.get("_embedded") {
        let mut out = Map::new();
        for (single, plural) in [("lead", "leads"), ("contact", "contacts"), ("company", "companies")] {
            if let Some(entity @ Value::Object(_)) = embedded.get(single) {
                out.insert(plural.to_string(), json!([entity]));
            }
        }
        if !out.is_empty() {
            body.insert("_embedded".to_string(), Value::Object(out));
        }
    }
    Ok(Value::Object(body))
}

fn copy_present(from: &Map<String, Value>, to: &mut Map<String, Value>, keys: &[&str]) {
    for key in keys {
        match from.get(*key) {
            None | Some(Value::Null) => {}
            Some(Value::String(text)) if text.is_empty() => {}
            Some(value) => {
                to.insert(key.to_string(), value.clone());
            }
        }
    }
}

#[async_trait]
impl ResourceOperation for UnsortedCreateForms {
    fn resource(&self) -> &'static str {
        "unsorted"
    }

    fn operation(&self) -> &'static str {
        "create"
    }

    fn validate_params(&self, params: &Value) -> Result<(), AppError> {
        object(params)?;
        Self::build_body(params).map(|_| ())
    }

    async fn execute(&self, params: Value, ctx: OperationContext) -> Result<Vec<Value>, AppError> {
        let body = Self::build_body(&params)?;
        let response = ctx
            .transport
            .request(Method::POST, "leads/unsorted/forms", Some(&body), &Query::new())
            .await?;
        Ok(super::entities::shape_response(response, true, "unsorted"))
    }
}

/// Triage action on one incoming lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsortedAction {
    Accept,
    Reject,
    Link,
}

impl UnsortedAction {
    fn as_str(self) -> &'static str {
        match self {
            UnsortedAction::Accept => "accept",
            UnsortedAction::Reject => "reject",
            UnsortedAction::Link => "link",
        }
    }

    fn build_body(self, params: &Value) -> Result<Value, AppError> {
        let mut body = Map::new();
        if let Some(user_id) = u64_param(params, "user_id")? {
            body.insert("user_id".to_string(), json!(user_id));
        }
        match self {
            UnsortedAction::Accept => {
                if let Some(status_id) = u64_param(params, "status_id")? {
                    body.insert("status_id".to_string(), json!(status_id));
                }
            }
            UnsortedAction::Reject => {}
            UnsortedAction::Link => match params.get("link") {
                Some(link @ Value::Object(_)) => {
                    body.insert("link".to_string(), link.clone());
                }
                _ => return Err(invalid("parameter 'link' is required for link")),
            },
        }
        Ok(Value::Object(body))
    }
}

/// `POST leads/unsorted/{uid}/{accept|reject|link}`.
pub struct UnsortedTriage(pub UnsortedAction);

#[async_trait]
impl ResourceOperation for UnsortedTriage {
    fn resource(&self) -> &'static str {
        "unsorted"
    }

    fn operation(&self) -> &'static str {
        self.0.as_str()
    }

    fn validate_params(&self, params: &Value) -> Result<(), AppError> {
        object(params)?;
        required_str(params, "uid")?;
        self.0.build_body(params).map(|_| ())
    }

    async fn execute(&self, params: Value, ctx: OperationContext) -> Result<Vec<Value>, AppError> {
        let uid = required_str(&params, "uid")?;
        let endpoint = format!("leads/unsorted/{}/{}", uid, self.0.as_str());
        let body = self.0.build_body(&params)?;
        let response = ctx
            .transport
            .request(Method::POST, &endpoint, Some(&body), &Query::new())
            .await?;
        Ok(if response.is_null() {
            Vec::new()
        } else {
            vec![response]
        })
    }
}
