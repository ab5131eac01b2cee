#![allow(clippy::result_large_err)]

//! Table-driven list/create/update handlers shared by most resources.

use super::custom_fields::apply_custom_fields;
use super::dates::convert_date_fields;
use super::params::{
    bool_param, item_id, item_object, items, object, passthrough_query, raw_json_body,
    require_body_source, u64_param,
};
use super::registry::{OperationContext, ResourceOperation};
use crate::core::error::AppError;
use crate::core::transport::{flatten_embedded, Query};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};

/// Page size for single-page reads when the item gives no `limit`.
pub const DEFAULT_LIST_LIMIT: u64 = 50;

/// Resolves the endpoint from the item's params.
pub type EndpointFn = fn(&Value) -> Result<String, AppError>;

/// Adds resource-specific query parameters.
pub type QueryFn = fn(&Value, &mut Query) -> Result<(), AppError>;

/// Per-item check run before a create/update body is sent.
pub type ItemCheckFn = fn(&serde_json::Map<String, Value>, usize) -> Result<(), AppError>;

/// `GET` a collection, one page or all of them.
pub struct ListEntities {
    pub resource: &'static str,
    pub operation: &'static str,
    pub endpoint: EndpointFn,
    /// Key under `_embedded` holding the collection.
    pub embedded_key: &'static str,
    pub extra_query: Option<QueryFn>,
}

#[async_trait]
impl ResourceOperation for ListEntities {
    fn resource(&self) -> &'static str {
        self.resource
    }

    fn operation(&self) -> &'static str {
        self.operation
    }

    fn validate_params(&self, params: &Value) -> Result<(), AppError> {
        object(params)?;
        (self.endpoint)(params)?;
        bool_param(params, "returnAll", false)?;
        bool_param(params, "simplify", true)?;
        u64_param(params, "limit")?;
        u64_param(params, "page")?;
        Ok(())
    }

    async fn execute(&self, params: Value, ctx: OperationContext) -> Result<Vec<Value>, AppError> {
        let endpoint = (self.endpoint)(&params)?;
        let mut query = Query::new();
        passthrough_query(&params, &mut query);
        if let Some(extra) = self.extra_query {
            extra(&params, &mut query)?;
        }
        let simplify = bool_param(&params, "simplify", true)?;

        if bool_param(&params, "returnAll", false)? {
            if let Some(limit) = u64_param(&params, "limit")? {
                query.insert("limit".to_string(), json!(limit));
            }
            let pages = ctx
                .transport
                .request_all_pages(Method::GET, &endpoint, None, &query)
                .await?;
            return Ok(if simplify {
                flatten_embedded(&pages, self.embedded_key)
            } else {
                pages
            });
        }

        let limit = u64_param(&params, "limit")?.unwrap_or(DEFAULT_LIST_LIMIT);
        query.insert("limit".to_string(), json!(limit));
        if let Some(page) = u64_param(&params, "page")? {
            query.insert("page".to_string(), json!(page));
        }
        let response = ctx
            .transport
            .request(Method::GET, &endpoint, None, &query)
            .await?;
        Ok(shape_response(response, simplify, self.embedded_key))
    }
}

/// `POST` or `PATCH` a batch of entities built from `items` (or a raw JSON body).
pub struct WriteEntities {
    pub resource: &'static str,
    pub operation: &'static str,
    pub method: Method,
    pub endpoint: EndpointFn,
    pub embedded_key: &'static str,
    /// Fields converted to unix seconds on every item.
    pub date_fields: &'static [&'static str],
    /// Updates require an `id` on every item.
    pub require_id: bool,
    pub item_check: Option<ItemCheckFn>,
}

impl WriteEntities {
    pub fn create(
        resource: &'static str,
        operation: &'static str,
        endpoint: EndpointFn,
        embedded_key: &'static str,
    ) -> Self {
        WriteEntities {
            resource,
            operation,
            method: Method::POST,
            endpoint,
            embedded_key,
            date_fields: &[],
            require_id: false,
            item_check: None,
        }
    }

    pub fn update(
        resource: &'static str,
        operation: &'static str,
        endpoint: EndpointFn,
        embedded_key: &'static str,
    ) -> Self {
        WriteEntities {
            method: Method::PATCH,
            require_id: true,
            ..WriteEntities::create(resource, operation, endpoint, embedded_key)
        }
    }

    pub fn with_date_fields(mut self, date_fields: &'static [&'static str]) -> Self {
        self.date_fields = date_fields;
        self
    }

    pub fn with_item_check(mut self, check: ItemCheckFn) -> Self {
        self.item_check = Some(check);
        self
    }

    fn build_body(&self, params: &Value) -> Result<Value, AppError> {
        if let Some(raw) = raw_json_body(params)? {
            return Ok(raw);
        }
        let prepared = items(params)?
            .iter()
            .enumerate()
            .map(|(index, item)| self.prepare_item(item, index))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Value::Array(prepared))
    }

    fn prepare_item(&self, item: &Value, index: usize) -> Result<Value, AppError> {
        let mut item = item_object(item, index)?.clone();
        if self.require_id {
            let id = item_id(&item, index)?;
            item.insert("id".to_string(), json!(id));
        }
        if let Some(check) = self.item_check {
            check(&item, index)?;
        }
        convert_date_fields(&mut item, self.date_fields)?;
        apply_custom_fields(&mut item)?;
        Ok(Value::Object(item))
    }
}

#[async_trait]
impl ResourceOperation for WriteEntities {
    fn resource(&self) -> &'static str {
        self.resource
    }

    fn operation(&self) -> &'static str {
        self.operation
    }

    fn validate_params(&self, params: &Value) -> Result<(), AppError> {
        object(params)?;
        (self.endpoint)(params)?;
        require_body_source(params)?;
        self.build_body(params).map(|_| ())
    }

    async fn execute(&self, params: Value, ctx: OperationContext) -> Result<Vec<Value>, AppError> {
        let endpoint = (self.endpoint)(&params)?;
        let body = self.build_body(&params)?;
        let simplify = bool_param(&params, "simplify", true)?;
        let response = ctx
            .transport
            .request(self.method.clone(), &endpoint, Some(&body), &Query::new())
            .await?;
        Ok(shape_response(response, simplify, self.embedded_key))
    }
}

/// Unwrap `_embedded.{key}` when simplifying; otherwise return the raw response.
pub fn shape_response(response: Value, simplify: bool, embedded_key: &str) -> Vec<Value> {
    if response.is_null() {
        return Vec::new();
    }
    if simplify {
        if let Some(items) = response
            .get("_embedded")
            .and_then(|embedded| embedded.get(embedded_key))
            .and_then(Value::as_array)
        {
            return items.clone();
        }
    }
    match response {
        Value::Array(items) => items,
        other => vec![other],
    }
}
