#![allow(clippy::result_large_err)]

//! Sequential execution of `(resource, operation, params)` items.

use super::params::invalid;
use super::registry::{OperationContext, OperationRegistry};
use crate::core::error::AppError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Instant;

/// One unit of work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchItem {
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default = "empty_params")]
    pub params: Value,
}

fn empty_params() -> Value {
    json!({})
}

impl BatchItem {
    pub fn new(resource: impl Into<String>, operation: Option<&str>, params: Value) -> Self {
        BatchItem {
            resource: resource.into(),
            operation: operation.map(str::to_string),
            params,
        }
    }
}

#[derive(Debug)]
pub enum ItemOutcome {
    Success(Vec<Value>),
    /// Recorded failure when the batch continues past errors.
    Failed { input: Value, error: AppError },
}

#[derive(Debug)]
pub struct ItemResult {
    pub item_index: usize,
    pub outcome: ItemOutcome,
}

impl ItemResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ItemOutcome::Success(_))
    }

    /// Output records, each tagged with the item it came from.
    pub fn to_records(&self) -> Vec<Value> {
        match &self.outcome {
            ItemOutcome::Success(records) => records
                .iter()
                .map(|record| json!({"item_index": self.item_index, "json": record}))
                .collect(),
            ItemOutcome::Failed { input, error } => vec![json!({
                "item_index": self.item_index,
                "json": input,
                "error": {
                    "category": error.category.to_string(),
                    "code": error.code,
                    "message": error.message,
                    "description": error.description,
                },
            })],
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("item {item_index} failed: {source}")]
pub struct BatchError {
    pub item_index: usize,
    #[source]
    pub source: AppError,
}

/// Runs items against the operation registry.
#[derive(Clone)]
pub struct BatchRunner {
    registry: OperationRegistry,
    ctx: OperationContext,
}

impl BatchRunner {
    pub fn new(registry: OperationRegistry, ctx: OperationContext) -> Self {
        BatchRunner { registry, ctx }
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    pub async fn run_batch(
        &self,
        items: Vec<BatchItem>,
        continue_on_fail: bool,
    ) -> Result<Vec<ItemResult>, BatchError> {
        let mut results = Vec::with_capacity(items.len());
        for (item_index, item) in items.into_iter().enumerate() {
            let started = Instant::now();
            let input = item.params.clone();
            match self.run_item(item).await {
                Ok(records) => {
                    tracing::debug!(
                        item_index,
                        records = records.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "batch item completed"
                    );
                    results.push(ItemResult {
                        item_index,
                        outcome: ItemOutcome::Success(records),
                    });
                }
                Err(error) if continue_on_fail => {
                    tracing::warn!(item_index, error = %error, "batch item failed; continuing");
                    results.push(ItemResult {
                        item_index,
                        outcome: ItemOutcome::Failed { input, error },
                    });
                }
                Err(source) => {
                    tracing::error!(item_index, error = %source, "batch item failed; aborting");
                    return Err(BatchError { item_index, source });
                }
            }
        }
        Ok(results)
    }

    async fn run_item(&self, item: BatchItem) -> Result<Vec<Value>, AppError> {
        let handler = self
            .registry
            .resolve(&item.resource, item.operation.as_deref())
            .ok_or_else(|| {
                invalid(format!(
                    "unknown operation '{}' for resource '{}'",
                    item.operation.as_deref().unwrap_or("<default>"),
                    item.resource
                ))
                .with_context("resource", &item.resource)
            })?;
        handler.validate_params(&item.params)?;
        handler.execute(item.params, self.ctx.clone()).await
    }
}
