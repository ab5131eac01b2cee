#![allow(clippy::result_large_err)] // Operation trait and registry return AppError directly for structured diagnostics without boxing.

use crate::core::error::AppError;
use crate::core::transport::Transport;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Collaborators available to an operation run.
#[derive(Clone)]
pub struct OperationContext {
    pub transport: Transport,
}

impl OperationContext {
    pub fn new(transport: Transport) -> Self {
        OperationContext { transport }
    }
}

/// One `(resource, operation)` handler.
#[async_trait]
pub trait ResourceOperation: Send + Sync + 'static {
    fn resource(&self) -> &'static str;

    fn operation(&self) -> &'static str;

    /// Validate params ahead of execution.
    fn validate_params(&self, params: &Value) -> Result<(), AppError>;

    /// Execute with the item's params, returning the output records.
    async fn execute(&self, params: Value, ctx: OperationContext) -> Result<Vec<Value>, AppError>;
}

fn operation_key(resource: &str, operation: &str) -> String {
    format!("{}.{}", resource, operation)
}

/// Builder used to register operations before execution.
pub struct OperationRegistryBuilder {
    operations: HashMap<String, Arc<dyn ResourceOperation>>,
}

impl Default for OperationRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationRegistryBuilder {
    pub fn new() -> Self {
        Self {
            operations: HashMap::new(),
        }
    }

    pub fn register<T: ResourceOperation>(&mut self, operation: T) -> &mut Self {
        let key = operation_key(operation.resource(), operation.operation());
        if self.operations.contains_key(&key) {
            panic!("duplicate operation registered: {}", key);
        }
        self.operations.insert(key, Arc::new(operation));
        self
    }

    pub fn build(self) -> OperationRegistry {
        OperationRegistry {
            inner: Arc::new(self.operations),
        }
    }
}

/// Immutable `(resource, operation)` lookup table.
#[derive(Clone)]
pub struct OperationRegistry {
    inner: Arc<HashMap<String, Arc<dyn ResourceOperation>>>,
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationRegistry {
    pub fn new() -> Self {
        OperationRegistryBuilder::new().build()
    }

    pub fn builder() -> OperationRegistryBuilder {
        OperationRegistryBuilder::new()
    }

    /// Registry holding every operation this crate ships.
    pub fn with_builtins() -> Self {
        let mut builder = Self::builder();
        super::register_builtins(&mut builder);
        builder.build()
    }

    pub fn get(&self, resource: &str, operation: &str) -> Option<Arc<dyn ResourceOperation>> {
        self.inner.get(&operation_key(resource, operation)).cloned()
    }

    /// Look up a handler, falling back to the resource's default operation.
    pub fn resolve(
        &self,
        resource: &str,
        operation: Option<&str>,
    ) -> Option<Arc<dyn ResourceOperation>> {
        let operation = operation
            .filter(|op| !op.is_empty())
            .or_else(|| default_operation(resource))?;
        self.get(resource, operation)
    }

    /// Registered pairs, sorted for display.
    pub fn operations(&self) -> Vec<(&'static str, &'static str)> {
        let mut pairs: Vec<_> = self
            .inner
            .values()
            .map(|handler| (handler.resource(), handler.operation()))
            .collect();
        pairs.sort_unstable();
        pairs
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Operation used when an item names only its resource.
pub fn default_operation(resource: &str) -> Option<&'static str> {
    match resource {
        "account" => Some("getInfo"),
        "contacts" => Some("getContacts"),
        "leads" => Some("getLeads"),
        "tasks" => Some("getTasks"),
        "companies" => Some("getCompany"),
        "notes" => Some("getNotes"),
        "lists" => Some("getLists"),
        "customers" => Some("getCustomers"),
        "transactions" => Some("getTransactions"),
        "purchases" => Some("getPurchases"),
        "unsorted" => Some("get"),
        _ => None,
    }
}
