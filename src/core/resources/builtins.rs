#![allow(clippy::result_large_err)]

use super::entities::{ListEntities, WriteEntities};
use super::params::{bool_param, id_param, invalid, object, required_str, u64_param};
use super::purchases::{purchases_endpoint, WritePurchases};
use super::registry::{OperationContext, OperationRegistryBuilder, ResourceOperation};
use super::unsorted::{
    category_filter, UnsortedAction, UnsortedCreateForms, UnsortedSummary, UnsortedTriage,
};
use crate::core::error::AppError;
use crate::core::transport::Query;
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Map, Value};

/// Parent entities that carry notes.
pub const NOTE_PARENTS: [&str; 4] = ["leads", "contacts", "companies", "customers"];

macro_rules! fixed_endpoint {
    ($($name:ident => $path:literal),* $(,)?) => {
        $(
            fn $name(_params: &Value) -> Result<String, AppError> {
                Ok($path.to_string())
            }
        )*
    };
}

fixed_endpoint! {
    leads => "leads",
    contacts => "contacts",
    companies => "companies",
    tasks => "tasks",
    customers => "customers",
    transactions => "customers/transactions",
    catalogs => "catalogs",
    unsorted => "leads/unsorted",
}

pub fn notes_endpoint(params: &Value) -> Result<String, AppError> {
    let parent = required_str(params, "entity_type")?;
    if !NOTE_PARENTS.contains(&parent) {
        return Err(invalid(format!(
            "notes entity_type '{}' must be one of {}",
            parent,
            NOTE_PARENTS.join(", ")
        )));
    }
    Ok(format!("{}/notes", parent))
}

pub fn list_elements_endpoint(params: &Value) -> Result<String, AppError> {
    Ok(format!("catalogs/{}/elements", id_param(params, "list_id")?))
}

/// `customer_id` narrows transactions to one customer.
fn customer_filter(params: &Value, query: &mut Query) -> Result<(), AppError> {
    let Some(customer_id) = u64_param(params, "customer_id")? else {
        return Ok(());
    };
    match query
        .entry("filter".to_string())
        .or_insert_with(|| json!({}))
    {
        Value::Object(filter) => {
            filter.insert("customer_id".to_string(), json!([customer_id]));
            Ok(())
        }
        _ => Err(invalid("'filter' must be an object")),
    }
}

fn requires_customer(item: &Map<String, Value>, index: usize) -> Result<(), AppError> {
    match item.get("customer_id").and_then(Value::as_u64) {
        Some(id) if id > 0 => Ok(()),
        _ => Err(invalid(format!(
            "items[{}] requires a numeric 'customer_id'",
            index
        ))),
    }
}

fn list(
    resource: &'static str,
    operation: &'static str,
    endpoint: super::entities::EndpointFn,
    embedded_key: &'static str,
) -> ListEntities {
    ListEntities {
        resource,
        operation,
        endpoint,
        embedded_key,
        extra_query: None,
    }
}

/// `GET account`.
pub struct AccountInfo;

impl AccountInfo {
    fn query(params: &Value) -> Result<Query, AppError> {
        let mut query = Query::new();
        let with = match params.get("with") {
            None | Some(Value::Null) => None,
            Some(Value::String(with)) if with.trim().is_empty() => None,
            Some(Value::String(with)) => Some(with.trim().to_string()),
            Some(Value::Array(parts)) => {
                let parts = parts
                    .iter()
                    .map(|part| {
                        part.as_str()
                            .map(str::to_string)
                            .ok_or_else(|| invalid("'with' entries must be strings"))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                (!parts.is_empty()).then(|| parts.join(","))
            }
            Some(_) => return Err(invalid("'with' must be a string or an array")),
        };
        if let Some(with) = with {
            query.insert("with".to_string(), json!(with));
        }
        Ok(query)
    }
}

#[async_trait]
impl ResourceOperation for AccountInfo {
    fn resource(&self) -> &'static str {
        "account"
    }

    fn operation(&self) -> &'static str {
        "getInfo"
    }

    fn validate_params(&self, params: &Value) -> Result<(), AppError> {
        object(params)?;
        Self::query(params).map(|_| ())
    }

    async fn execute(&self, params: Value, ctx: OperationContext) -> Result<Vec<Value>, AppError> {
        let query = Self::query(&params)?;
        let response = ctx
            .transport
            .request(Method::GET, "account", None, &query)
            .await?;
        Ok(if response.is_null() {
            Vec::new()
        } else {
            vec![response]
        })
    }
}

/// `PATCH customers/mode`.
pub struct CustomersMode;

impl CustomersMode {
    fn body(params: &Value) -> Result<Value, AppError> {
        let mode = required_str(params, "mode")?;
        if mode != "segments" && mode != "periodicity" {
            return Err(invalid(format!(
                "customers mode '{}' must be 'segments' or 'periodicity'",
                mode
            )));
        }
        Ok(json!({
            "mode": mode,
            "is_enabled": bool_param(params, "is_enabled", true)?,
        }))
    }
}

#[async_trait]
impl ResourceOperation for CustomersMode {
    fn resource(&self) -> &'static str {
        "customers"
    }

    fn operation(&self) -> &'static str {
        "setCustomersMode"
    }

    fn validate_params(&self, params: &Value) -> Result<(), AppError> {
        object(params)?;
        Self::body(params).map(|_| ())
    }

    async fn execute(&self, params: Value, ctx: OperationContext) -> Result<Vec<Value>, AppError> {
        let body = Self::body(&params)?;
        let response = ctx
            .transport
            .request(Method::PATCH, "customers/mode", Some(&body), &Query::new())
            .await?;
        Ok(if response.is_null() {
            Vec::new()
        } else {
            vec![response]
        })
    }
}

/// Register every shipped `(resource, operation)` pair.
pub fn register_builtins(builder: &mut OperationRegistryBuilder) {
    builder.register(AccountInfo);

    builder
        .register(list("leads", "getLeads", leads, "leads"))
        .register(WriteEntities::create("leads", "createLeads", leads, "leads"))
        .register(WriteEntities::update("leads", "updateLeads", leads, "leads"));

    builder
        .register(list("contacts", "getContacts", contacts, "contacts"))
        .register(WriteEntities::create("contacts", "createContacts", contacts, "contacts"))
        .register(WriteEntities::update("contacts", "updateContacts", contacts, "contacts"));

    builder
        .register(list("companies", "getCompany", companies, "companies"))
        .register(WriteEntities::create("companies", "createCompany", companies, "companies"))
        .register(WriteEntities::update("companies", "updateCompany", companies, "companies"));

    builder
        .register(list("tasks", "getTasks", tasks, "tasks"))
        .register(
            WriteEntities::create("tasks", "createTasks", tasks, "tasks")
                .with_date_fields(&["complete_till"]),
        )
        .register(
            WriteEntities::update("tasks", "updateTasks", tasks, "tasks")
                .with_date_fields(&["complete_till"]),
        );

    builder
        .register(list("notes", "getNotes", notes_endpoint, "notes"))
        .register(WriteEntities::create("notes", "createNotes", notes_endpoint, "notes"))
        .register(WriteEntities::update("notes", "updateNotes", notes_endpoint, "notes"));

    builder
        .register(list("customers", "getCustomers", customers, "customers"))
        .register(
            WriteEntities::create("customers", "createCustomers", customers, "customers")
                .with_date_fields(&["next_date"]),
        )
        .register(
            WriteEntities::update("customers", "updateCustomers", customers, "customers")
                .with_date_fields(&["next_date"]),
        )
        .register(CustomersMode);

    builder
        .register(ListEntities {
            extra_query: Some(customer_filter),
            ..list("transactions", "getTransactions", transactions, "transactions")
        })
        .register(
            WriteEntities::create("transactions", "createTransactions", transactions, "transactions")
                .with_date_fields(&["created_at"])
                .with_item_check(requires_customer),
        )
        .register(
            WriteEntities::update("transactions", "updateTransactions", transactions, "transactions")
                .with_date_fields(&["created_at"])
                .with_item_check(requires_customer),
        );

    builder
        .register(list("lists", "getLists", catalogs, "catalogs"))
        .register(WriteEntities::create("lists", "addLists", catalogs, "catalogs"))
        .register(WriteEntities::update("lists", "updateLists", catalogs, "catalogs"))
        .register(list("lists", "getListElements", list_elements_endpoint, "elements"))
        .register(WriteEntities::create(
            "lists",
            "addListElements",
            list_elements_endpoint,
            "elements",
        ))
        .register(WriteEntities::update(
            "lists",
            "updateListElements",
            list_elements_endpoint,
            "elements",
        ));

    builder
        .register(list("purchases", "getPurchases", purchases_endpoint, "elements"))
        .register(WritePurchases::create())
        .register(WritePurchases::update());

    builder
        .register(ListEntities {
            extra_query: Some(category_filter),
            ..list("unsorted", "get", unsorted, "unsorted")
        })
        .register(UnsortedSummary)
        .register(UnsortedCreateForms)
        .register(UnsortedTriage(UnsortedAction::Accept))
        .register(UnsortedTriage(UnsortedAction::Reject))
        .register(UnsortedTriage(UnsortedAction::Link));
}
