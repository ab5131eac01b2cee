#![allow(clippy::result_large_err)]

//! Purchases are elements of an invoices catalog. The caller names the
//! catalog and the id of its items field; nothing is discovered.

use super::custom_fields::apply_custom_fields;
use super::entities::shape_response;
use super::params::{
    bool_param, id_param, invalid, item_id, item_object, items, object, raw_json_body,
    require_body_source, u64_param,
};
use super::registry::{OperationContext, ResourceOperation};
use crate::core::error::AppError;
use crate::core::transport::Query;
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Map, Number, Value};

pub fn purchases_endpoint(params: &Value) -> Result<String, AppError> {
    Ok(format!("catalogs/{}/elements", id_param(params, "catalog_id")?))
}

/// One invoice line as the value of the catalog's items field.
pub fn invoice_item_value(line: &Value, index: usize) -> Result<Value, AppError> {
    let line = line
        .as_object()
        .ok_or_else(|| invalid(format!("invoice_items[{}] must be a JSON object", index)))?;
    let mut value = Map::new();
    value.insert(
        "quantity".to_string(),
        number_field(line, "quantity", index)?.unwrap_or_else(|| json!(1)),
    );
    value.insert(
        "unit_price".to_string(),
        number_field(line, "unit_price", index)?
            .ok_or_else(|| invalid(format!("invoice_items[{}] requires 'unit_price'", index)))?,
    );
    let unit_type = line
        .get("unit_type")
        .and_then(Value::as_str)
        .filter(|unit| !unit.is_empty())
        .unwrap_or("pcs");
    value.insert("unit_type".to_string(), json!(unit_type));

    let as_params = Value::Object(line.clone());
    let product = match u64_param(&as_params, "catalog_element_id")? {
        Some(id) => Some(id),
        None => u64_param(&as_params, "product_id")?,
    };
    if let Some(product_id) = product {
        value.insert("product_id".to_string(), json!(product_id));
    }
    if let Some(discount) = number_field(line, "discount", index)? {
        if discount.as_f64().map(|d| d > 0.0).unwrap_or(false) {
            value.insert(
                "discount".to_string(),
                json!({"type": "amount", "value": discount}),
            );
        }
    }
    Ok(Value::Object(value))
}

fn number_field(line: &Map<String, Value>, key: &str, index: usize) -> Result<Option<Value>, AppError> {
    match line.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(number @ Value::Number(_)) => Ok(Some(number.clone())),
        Some(Value::String(text)) if text.trim().is_empty() => Ok(None),
        Some(Value::String(text)) => text
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(|n| Some(Value::Number(n)))
            .ok_or_else(|| invalid(format!("invoice_items[{}].{} must be a number", index, key))),
        Some(_) => Err(invalid(format!("invoice_items[{}].{} must be a number", index, key))),
    }
}

/// Create or update catalog elements representing purchases.
pub struct WritePurchases {
    operation: &'static str,
    method: Method,
    require_id: bool,
}

impl WritePurchases {
    pub fn create() -> Self {
        WritePurchases {
            operation: "createPurchases",
            method: Method::POST,
            require_id: false,
        }
    }

    pub fn update() -> Self {
        WritePurchases {
            operation: "updatePurchases",
            method: Method::PATCH,
            require_id: true,
        }
    }

    fn build_body(&self, params: &Value) -> Result<Value, AppError> {
        if let Some(raw) = raw_json_body(params)? {
            return Ok(raw);
        }
        let items_field_id = u64_param(params, "items_field_id")?;
        items(params)?
            .iter()
            .enumerate()
            .map(|(index, item)| self.element(item_object(item, index)?, index, items_field_id))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }

    fn element(
        &self,
        item: &Map<String, Value>,
        index: usize,
        items_field_id: Option<u64>,
    ) -> Result<Value, AppError> {
        let mut element = Map::new();
        if self.require_id {
            let id = item_id(item, index)?;
            element.insert("id".to_string(), json!(id));
        }
        if let Some(name) = item.get("name").and_then(Value::as_str).filter(|n| !n.is_empty()) {
            element.insert("name".to_string(), json!(name));
        }
        if let Some(request_id) = item.get("request_id").filter(|r| !r.is_null()) {
            element.insert("request_id".to_string(), request_id.clone());
        }

        if let Some(buyer) = item.get("buyer").and_then(Value::as_object) {
            apply_buyer(&mut element, buyer, index)?;
        }
        if !self.require_id && !element.contains_key("name") {
            return Err(invalid(format!(
                "items[{}] requires a 'name' or a buyer title",
                index
            )));
        }

        let mut values = Vec::new();
        if let Some(lines) = item.get("invoice_items").filter(|l| !l.is_null()) {
            let lines = lines
                .as_array()
                .ok_or_else(|| invalid(format!("items[{}].invoice_items must be an array", index)))?;
            if !lines.is_empty() {
                let field_id = items_field_id.ok_or_else(|| {
                    invalid("parameter 'items_field_id' is required when invoice items are given")
                })?;
                let line_values = lines
                    .iter()
                    .enumerate()
                    .map(|(line, value)| invoice_item_value(value, line).map(|v| json!({"value": v})))
                    .collect::<Result<Vec<_>, _>>()?;
                values.push(json!({"field_id": field_id, "values": line_values}));
            }
        }
        if !values.is_empty() {
            element.insert("custom_fields_values".to_string(), Value::Array(values));
        }
        if let Some(custom) = item.get("custom_fields") {
            element.insert("custom_fields".to_string(), custom.clone());
            apply_custom_fields(&mut element)?;
        }
        Ok(Value::Object(element))
    }
}

fn apply_buyer(
    element: &mut Map<String, Value>,
    buyer: &Map<String, Value>,
    index: usize,
) -> Result<(), AppError> {
    match buyer.get("mode").and_then(Value::as_str).unwrap_or("id") {
        "id" => {
            let buyer_value = Value::Object(buyer.clone());
            if let Some(entity_id) = u64_param(&buyer_value, "entity_id")?.filter(|id| *id > 0) {
                let entity_type = buyer
                    .get("entity_type")
                    .and_then(Value::as_str)
                    .filter(|t| !t.is_empty())
                    .unwrap_or("contacts");
                let mut embedded = Map::new();
                embedded.insert(entity_type.to_string(), json!([{"id": entity_id}]));
                element.insert("_embedded".to_string(), Value::Object(embedded));
            }
            Ok(())
        }
        "name" => {
            if let Some(title) = buyer.get("title").and_then(Value::as_str).filter(|t| !t.is_empty()) {
                element.insert("name".to_string(), json!(title));
            }
            Ok(())
        }
        other => Err(invalid(format!(
            "items[{}].buyer.mode '{}' must be 'id' or 'name'",
            index, other
        ))),
    }
}

#[async_trait]
impl ResourceOperation for WritePurchases {
    fn resource(&self) -> &'static str {
        "purchases"
    }

    fn operation(&self) -> &'static str {
        self.operation
    }

    fn validate_params(&self, params: &Value) -> Result<(), AppError> {
        object(params)?;
        purchases_endpoint(params)?;
        require_body_source(params)?;
        self.build_body(params).map(|_| ())
    }

    async fn execute(&self, params: Value, ctx: OperationContext) -> Result<Vec<Value>, AppError> {
        let endpoint = purchases_endpoint(&params)?;
        let body = self.build_body(&params)?;
        let response = ctx
            .transport
            .request(self.method.clone(), &endpoint, Some(&body), &Query::new())
            .await?;
        Ok(shape_response(
            response,
            bool_param(&params, "simplify", true)?,
            "elements",
        ))
    }
}
