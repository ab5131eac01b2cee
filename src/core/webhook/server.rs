#![allow(clippy::result_large_err)] // Listener helpers return AppError for consistent diagnostics.

use super::processor::{internal_failure, RawDelivery, WebhookProcessor};
use crate::core::config::WebhookConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Extension, RawQuery},
    http::{header, HeaderMap, HeaderValue, Response, StatusCode},
    response::{IntoResponse, Json},
    routing::post,
    Router,
};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tower::util::MapResponseLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::info;

/// Destination for accepted webhook records.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, record: Value) -> Result<(), AppError>;
}

/// Forwards records into a tokio channel.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Value>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Value>) -> Self {
        ChannelSink { tx }
    }

    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Value>) {
        let (tx, rx) = mpsc::channel(buffer);
        (ChannelSink::new(tx), rx)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn emit(&self, record: Value) -> Result<(), AppError> {
        self.tx.send(record).await.map_err(|_| {
            AppError::new(
                ErrorCategory::InternalError,
                "webhook record receiver has been dropped",
            )
        })
    }
}

/// Writes each record to stdout as one JSON line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl EventSink for LogSink {
    async fn emit(&self, record: Value) -> Result<(), AppError> {
        let line = serde_json::to_string(&record)?;
        write_line(&line)
    }
}

fn write_line(line: &str) -> Result<(), AppError> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", line)?;
    stdout.flush()?;
    Ok(())
}

/// State shared across webhook requests.
struct ListenerState {
    processor: WebhookProcessor,
    sink: Arc<dyn EventSink>,
}

/// Start the webhook listener and block until the service terminates.
pub async fn serve_webhook(
    config: &WebhookConfig,
    processor: WebhookProcessor,
    sink: Arc<dyn EventSink>,
) -> Result<(), AppError> {
    serve_webhook_internal(config, processor, sink, None).await
}

/// Start the webhook listener and notify once the bind address is known (test helper).
pub async fn serve_webhook_with_ready_notifier(
    config: &WebhookConfig,
    processor: WebhookProcessor,
    sink: Arc<dyn EventSink>,
    ready_notifier: oneshot::Sender<SocketAddr>,
) -> Result<(), AppError> {
    serve_webhook_internal(config, processor, sink, Some(ready_notifier)).await
}

async fn serve_webhook_internal(
    config: &WebhookConfig,
    processor: WebhookProcessor,
    sink: Arc<dyn EventSink>,
    ready_notifier: Option<oneshot::Sender<SocketAddr>>,
) -> Result<(), AppError> {
    let bind_addr: SocketAddr = config.bind.parse().map_err(|err| {
        AppError::new(
            ErrorCategory::ConfigurationError,
            format!("invalid webhook bind address {}: {}", config.bind, err),
        )
    })?;
    let sweep_every = config.sweep_every().map_err(|err| {
        AppError::new(
            ErrorCategory::ConfigurationError,
            format!("invalid webhook.sweep_interval: {}", err),
        )
    })?;
    let router = webhook_router(&config.path, config.max_body_bytes, processor.clone(), sink)?;
    let sweeper = sweep_every.and_then(|every| processor.cache().spawn_sweeper(every));

    let listener = TcpListener::bind(bind_addr).await.map_err(|err| {
        AppError::new(
            ErrorCategory::IoError,
            format!("failed to bind webhook listener {}: {}", bind_addr, err),
        )
    })?;
    let local_addr = listener.local_addr().map_err(|err| {
        AppError::new(
            ErrorCategory::IoError,
            format!("failed to determine webhook listener address: {}", err),
        )
    })?;
    if let Some(tx) = ready_notifier {
        let _ = tx.send(local_addr);
    }
    info!("webhook server listening on {}{}", local_addr, config.path);
    let served = axum::serve(listener, router.into_make_service())
        .await
        .map_err(|err| {
            AppError::new(
                ErrorCategory::IoError,
                format!("webhook server terminated: {}", err),
            )
        });
    if let Some(handle) = sweeper {
        handle.abort();
    }
    served
}

/// Router accepting deliveries with `POST {path}`; `path` must start with `/`.
pub fn webhook_router(
    path: &str,
    max_body_bytes: usize,
    processor: WebhookProcessor,
    sink: Arc<dyn EventSink>,
) -> Result<Router, AppError> {
    if !path.starts_with('/') {
        return Err(AppError::new(
            ErrorCategory::ConfigurationError,
            format!("webhook path '{}' must start with '/'", path),
        ));
    }
    let state = Arc::new(ListenerState { processor, sink });
    let router = Router::new()
        .route(path, post(handle_delivery))
        .layer(Extension(state))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(MapResponseLayer::new(|mut response: Response<Body>| {
            if response.status() == StatusCode::PAYLOAD_TOO_LARGE {
                let body = json!({
                    "error": "Payload Too Large",
                    "message": "webhook payload exceeds the configured size limit",
                    "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                })
                .to_string();
                *response.body_mut() = Body::from(body);
                response.headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
                response.headers_mut().remove(header::CONTENT_LENGTH);
            }
            response
        }));
    Ok(router)
}

async fn handle_delivery(
    Extension(state): Extension<Arc<ListenerState>>,
    headers: HeaderMap,
    RawQuery(raw_query): RawQuery,
    body: Bytes,
) -> impl IntoResponse {
    let delivery = RawDelivery {
        headers,
        query: parse_query(raw_query.as_deref()),
        body,
    };
    let mut outcome = state.processor.process(&delivery);
    if let Some(record) = outcome.record.take() {
        if let Err(err) = state.sink.emit(record).await {
            tracing::error!("failed to hand off webhook record: {}", err);
            state.processor.release(&outcome);
            outcome = internal_failure(Utc::now());
        }
    }
    (outcome.response.status, Json(outcome.response.body))
}

fn parse_query(raw: Option<&str>) -> BTreeMap<String, String> {
    raw.map(|raw| {
        url::form_urlencoded::parse(raw.as_bytes())
            .into_owned()
            .collect()
    })
    .unwrap_or_default()
}
