#![allow(clippy::result_large_err)] // Pipeline steps return AppError; process() folds them into responses.

use super::dedup::DuplicateCache;
use super::event::{normalize, EventType, WebhookEvent};
use super::signature::{signature_from_headers, verify_signature};
use super::timestamp::verify_timestamp;
use crate::core::config::{ResponseFormat, WebhookConfig};
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Wall clock used for freshness and duplicate checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A webhook delivery exactly as received.
#[derive(Debug, Clone, Default)]
pub struct RawDelivery {
    pub headers: HeaderMap,
    pub query: BTreeMap<String, String>,
    pub body: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Accepted,
    Duplicate,
    Filtered,
    Rejected,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WebhookResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Result of one delivery: the HTTP answer and, when accepted, the record to emit.
#[derive(Debug, Clone)]
pub struct WebhookOutcome {
    pub disposition: Disposition,
    pub response: WebhookResponse,
    pub record: Option<Value>,
    /// Fingerprint recorded in the duplicate cache by this delivery.
    pub fingerprint: Option<String>,
}

/// Guard settings resolved from [`WebhookConfig`].
#[derive(Debug, Clone)]
struct Settings {
    secret: Option<String>,
    validate_signature: bool,
    validate_timestamp: bool,
    prevent_duplicates: bool,
    max_event_age: Duration,
    allowed_events: HashSet<EventType>,
    include_headers: bool,
    include_query: bool,
    response_format: ResponseFormat,
    enable_logging: bool,
}

/// Runs a delivery through signature, parse, freshness, duplicate and
/// event-type checks, in that order, stopping at the first failure.
#[derive(Clone)]
pub struct WebhookProcessor {
    settings: Settings,
    cache: Arc<DuplicateCache>,
    clock: Arc<dyn Clock>,
}

impl WebhookProcessor {
    pub fn new(config: &WebhookConfig, cache: Arc<DuplicateCache>) -> Result<Self, AppError> {
        let allowed_events = config
            .events
            .iter()
            .map(|raw| {
                raw.parse::<EventType>().map_err(|err| {
                    AppError::new(
                        ErrorCategory::ConfigurationError,
                        format!("webhook.events: {}", err),
                    )
                })
            })
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(WebhookProcessor {
            settings: Settings {
                secret: config.resolve_secret(),
                validate_signature: config.validate_signature,
                validate_timestamp: config.validate_timestamp,
                prevent_duplicates: config.prevent_duplicates,
                max_event_age: config.max_event_age(),
                allowed_events,
                include_headers: config.include_headers,
                include_query: config.include_query,
                response_format: config.response_format,
                enable_logging: config.enable_logging,
            },
            cache,
            clock: Arc::new(SystemClock),
        })
    }

    /// Processor with its own duplicate cache sized from the configured window.
    pub fn from_config(config: &WebhookConfig) -> Result<Self, AppError> {
        Self::new(
            config,
            Arc::new(DuplicateCache::new(config.duplicate_window())),
        )
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Undo the duplicate-cache entry of an accepted delivery whose record
    /// could not be handed off, so Kommo's redelivery is processed again.
    pub fn release(&self, outcome: &WebhookOutcome) {
        if let Some(fingerprint) = outcome.fingerprint.as_deref() {
            if self.cache.forget(fingerprint) {
                tracing::debug!(fingerprint, "released duplicate cache entry");
            }
        }
    }

    pub fn cache(&self) -> &Arc<DuplicateCache> {
        &self.cache
    }

    /// Never fails: every error becomes a 400 or 500 response.
    pub fn process(&self, delivery: &RawDelivery) -> WebhookOutcome {
        let now = self.clock.now();
        match self.run(delivery, now) {
            Ok(outcome) => outcome,
            Err(err) if err.category.is_client_error() => {
                tracing::warn!(code = %err.code, "webhook rejected: {}", err.message);
                WebhookOutcome {
                    disposition: Disposition::Rejected,
                    response: WebhookResponse {
                        status: StatusCode::BAD_REQUEST,
                        body: json!({
                            "error": "Bad Request",
                            "message": err.message,
                            "timestamp": iso(now),
                        }),
                    },
                    record: None,
                    fingerprint: None,
                }
            }
            Err(err) => {
                tracing::error!("webhook processing failed: {}", err);
                internal_failure(now)
            }
        }
    }

    fn run(&self, delivery: &RawDelivery, now: DateTime<Utc>) -> Result<WebhookOutcome, AppError> {
        if delivery.body.iter().all(u8::is_ascii_whitespace) {
            return Err(AppError::new(
                ErrorCategory::MalformedEventError,
                "Webhook payload is empty",
            ));
        }

        if self.settings.validate_signature {
            self.check_signature(delivery)?;
        }

        let event = WebhookEvent::parse_bytes(&delivery.body).map_err(|err| {
            AppError::new(
                ErrorCategory::MalformedEventError,
                format!("Invalid webhook event: {}", err.message),
            )
        })?;

        if self.settings.validate_timestamp
            && !verify_timestamp(event.created_at, now.timestamp(), self.settings.max_event_age)
        {
            return Err(AppError::new(
                ErrorCategory::AuthenticityError,
                "Webhook timestamp is too old",
            )
            .with_context("created_at", event.created_at.to_string()));
        }

        if self.settings.prevent_duplicates
            && self.cache.is_duplicate(&event, now.timestamp_millis())
        {
            tracing::debug!(fingerprint = %event.fingerprint(), "duplicate webhook ignored");
            return Ok(status_only(Disposition::Duplicate, "duplicate_ignored"));
        }

        if !self.settings.allowed_events.is_empty()
            && !self.settings.allowed_events.contains(&event.event_type)
        {
            tracing::debug!(event_type = %event.event_type, "webhook event filtered");
            return Ok(status_only(Disposition::Filtered, "event_filtered"));
        }

        let record = self.build_record(&event, delivery, now)?;

        if self.settings.enable_logging {
            tracing::info!(
                "Received {} for {} ID {}",
                event.event_type,
                event.entity_type,
                event.entity_id
            );
        } else {
            tracing::debug!(event_type = %event.event_type, entity_id = event.entity_id, "webhook accepted");
        }

        Ok(WebhookOutcome {
            disposition: Disposition::Accepted,
            response: WebhookResponse {
                status: StatusCode::OK,
                body: self.success_body(&event, now),
            },
            record: Some(record),
            fingerprint: self
                .settings
                .prevent_duplicates
                .then(|| event.fingerprint()),
        })
    }

    fn check_signature(&self, delivery: &RawDelivery) -> Result<(), AppError> {
        let secret = self.settings.secret.as_deref().ok_or_else(|| {
            AppError::new(ErrorCategory::AuthenticityError, "Missing webhook secret")
        })?;
        let signature = signature_from_headers(&delivery.headers).ok_or_else(|| {
            AppError::new(ErrorCategory::AuthenticityError, "Missing webhook signature")
        })?;
        if !verify_signature(&delivery.body, signature, secret) {
            return Err(AppError::new(
                ErrorCategory::AuthenticityError,
                "Invalid webhook signature",
            ));
        }
        Ok(())
    }

    fn build_record(
        &self,
        event: &WebhookEvent,
        delivery: &RawDelivery,
        now: DateTime<Utc>,
    ) -> Result<Value, AppError> {
        let mut record = match serde_json::to_value(normalize(event))? {
            Value::Object(map) => map,
            other => {
                return Err(AppError::new(
                    ErrorCategory::InternalError,
                    format!("normalized event serialized to {}", other),
                ))
            }
        };
        record.insert("received_at".to_string(), Value::String(iso(now)));
        if self.settings.include_headers {
            let headers: Map<String, Value> = delivery
                .headers
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|value| (name.as_str().to_string(), Value::String(value.to_string())))
                })
                .collect();
            record.insert("headers".to_string(), Value::Object(headers));
        }
        if self.settings.include_query {
            record.insert("query".to_string(), json!(delivery.query));
        }
        Ok(Value::Object(record))
    }

    fn success_body(&self, event: &WebhookEvent, now: DateTime<Utc>) -> Value {
        let mut body = json!({
            "status": "success",
            "event_id": event.entity_id,
            "event_type": event.event_type,
            "processed_at": iso(now),
        });
        if self.settings.response_format == ResponseFormat::Detailed {
            let mut checks = Vec::new();
            if self.settings.validate_signature {
                checks.push("signature");
            }
            if self.settings.validate_timestamp {
                checks.push("timestamp");
            }
            if self.settings.prevent_duplicates {
                checks.push("duplicates");
            }
            if !self.settings.allowed_events.is_empty() {
                checks.push("event_filter");
            }
            body["entity_type"] = json!(event.entity_type);
            body["action"] = json!(event.event_type.action);
            body["created_at"] = json!(event.created_at);
            body["checks"] = json!(checks);
        }
        body
    }
}

/// Generic 500 answer; no internal detail leaves the process.
pub fn internal_failure(now: DateTime<Utc>) -> WebhookOutcome {
    WebhookOutcome {
        disposition: Disposition::Failed,
        response: WebhookResponse {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: json!({
                "error": "Internal Server Error",
                "message": "Failed to process webhook",
                "timestamp": iso(now),
            }),
        },
        record: None,
        fingerprint: None,
    }
}

fn status_only(disposition: Disposition, status: &str) -> WebhookOutcome {
    WebhookOutcome {
        disposition,
        response: WebhookResponse {
            status: StatusCode::OK,
            body: json!({ "status": status }),
        },
        record: None,
        fingerprint: None,
    }
}

fn iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
