#![allow(clippy::result_large_err)]

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Entity a webhook event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Company,
    Contact,
    Lead,
    Purchase,
    Task,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Company,
        EntityKind::Contact,
        EntityKind::Lead,
        EntityKind::Purchase,
        EntityKind::Task,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Company => "company",
            EntityKind::Contact => "contact",
            EntityKind::Lead => "lead",
            EntityKind::Purchase => "purchase",
            EntityKind::Task => "task",
        }
    }

    /// REST collection name, used as `entity_type` when the body carries none.
    pub fn collection(self) -> &'static str {
        match self {
            EntityKind::Company => "companies",
            EntityKind::Contact => "contacts",
            EntityKind::Lead => "leads",
            EntityKind::Purchase => "purchases",
            EntityKind::Task => "tasks",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    Added,
    Updated,
    Deleted,
}

impl EventAction {
    pub const ALL: [EventAction; 3] = [EventAction::Added, EventAction::Updated, EventAction::Deleted];

    pub fn as_str(self) -> &'static str {
        match self {
            EventAction::Added => "added",
            EventAction::Updated => "updated",
            EventAction::Deleted => "deleted",
        }
    }
}

/// One of the fifteen `{entity}_{action}` event types Kommo delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventType {
    pub entity: EntityKind,
    pub action: EventAction,
}

impl EventType {
    pub const fn new(entity: EntityKind, action: EventAction) -> Self {
        EventType { entity, action }
    }

    pub fn all() -> impl Iterator<Item = EventType> {
        EntityKind::ALL.into_iter().flat_map(|entity| {
            EventAction::ALL
                .into_iter()
                .map(move |action| EventType::new(entity, action))
        })
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.entity.as_str(), self.action.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event type '{0}'")]
pub struct UnknownEventType(pub String);

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        EventType::all()
            .find(|candidate| candidate.to_string() == raw)
            .ok_or_else(|| UnknownEventType(raw.to_string()))
    }
}

impl TryFrom<String> for EventType {
    type Error = UnknownEventType;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        value.to_string()
    }
}

/// A webhook delivery whose required fields have been checked.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub event_type: EventType,
    pub entity_type: String,
    pub entity_id: i64,
    /// Unix seconds.
    pub created_at: i64,
    pub raw: Value,
}

impl WebhookEvent {
    /// Duplicate-suppression key. Not a payload hash: two updates to one
    /// entity reported with the same timestamp collapse into one.
    pub fn fingerprint(&self) -> String {
        format!("{}:{}:{}", self.event_type, self.entity_id, self.created_at)
    }

    pub fn parse_bytes(body: &[u8]) -> Result<Self, AppError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|err| malformed(format!("body is not valid JSON: {}", err)))?;
        Self::parse(&value)
    }

    pub fn parse(body: &Value) -> Result<Self, AppError> {
        let object = body
            .as_object()
            .ok_or_else(|| malformed("body must be a JSON object"))?;

        let event_type = match object.get("event_type") {
            Some(Value::String(raw)) => raw
                .parse::<EventType>()
                .map_err(|err| malformed(err.to_string()))?,
            Some(_) => return Err(malformed("event_type must be a string")),
            None => return Err(malformed("missing event_type")),
        };

        let entity_id = integer_field(object.get("entity_id"), "entity_id")?;
        let created_at = integer_field(object.get("created_at"), "created_at")?;

        let entity_type = match object.get("entity_type") {
            Some(Value::String(raw)) if !raw.trim().is_empty() => raw.clone(),
            None | Some(Value::Null) => event_type.entity.collection().to_string(),
            Some(Value::String(_)) => event_type.entity.collection().to_string(),
            Some(_) => return Err(malformed("entity_type must be a string")),
        };

        Ok(WebhookEvent {
            event_type,
            entity_type,
            entity_id,
            created_at,
            raw: body.clone(),
        })
    }
}

fn integer_field(value: Option<&Value>, name: &str) -> Result<i64, AppError> {
    match value {
        None | Some(Value::Null) => Err(malformed(format!("missing {}", name))),
        Some(Value::Number(number)) => number
            .as_i64()
            .ok_or_else(|| malformed(format!("{} must be an integer", name))),
        Some(Value::String(text)) => text
            .trim()
            .parse::<i64>()
            .map_err(|_| malformed(format!("{} must be an integer", name))),
        Some(_) => Err(malformed(format!("{} must be an integer", name))),
    }
}

fn malformed<T: Into<String>>(message: T) -> AppError {
    AppError::new(ErrorCategory::MalformedEventError, message)
}

/// Flat record handed to the workflow, identical in shape for every event type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedEvent {
    pub event_type: EventType,
    pub entity_type: String,
    pub action: EventAction,
    pub entity_id: i64,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at_iso: Option<String>,
    pub fingerprint: String,
    pub payload: Value,
}

pub fn normalize(event: &WebhookEvent) -> NormalizedEvent {
    NormalizedEvent {
        event_type: event.event_type,
        entity_type: event.entity_type.clone(),
        action: event.event_type.action,
        entity_id: event.entity_id,
        created_at: event.created_at,
        created_at_iso: DateTime::<Utc>::from_timestamp(event.created_at, 0)
            .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true)),
        fingerprint: event.fingerprint(),
        payload: event.raw.clone(),
    }
}
