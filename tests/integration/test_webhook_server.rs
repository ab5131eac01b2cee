use async_trait::async_trait;
use chrono::Utc;
use kommo::core::config::WebhookConfig;
use kommo::core::error::AppError;
use kommo::core::types::ErrorCategory;
use kommo::core::webhook::{
    compute_signature, serve_webhook_with_ready_notifier, ChannelSink, EventSink,
    WebhookProcessor,
};
use std::sync::atomic::{AtomicBool, Ordering};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

const SECRET: &str = "listener-secret";

fn config(events: &[&str]) -> WebhookConfig {
    WebhookConfig {
        bind: "127.0.0.1:0".to_string(),
        secret_key: Some(SECRET.to_string()),
        events: events.iter().map(|e| e.to_string()).collect(),
        max_body_bytes: 4096,
        ..WebhookConfig::default()
    }
}

struct Listener {
    addr: SocketAddr,
    path: String,
    records: mpsc::Receiver<Value>,
    server: tokio::task::JoinHandle<()>,
}

impl Listener {
    fn url(&self) -> String {
        format!("http://{}{}", self.addr, self.path)
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn start(config: WebhookConfig) -> Listener {
    let (sink, records) = ChannelSink::channel(16);
    start_with_sink(config, Arc::new(sink), records).await
}

async fn start_with_sink(
    config: WebhookConfig,
    sink: Arc<dyn EventSink>,
    records: mpsc::Receiver<Value>,
) -> Listener {
    let processor = WebhookProcessor::from_config(&config).unwrap();
    let (ready_tx, ready_rx) = oneshot::channel();
    let path = config.path.clone();
    let server = tokio::spawn(async move {
        serve_webhook_with_ready_notifier(&config, processor, sink, ready_tx)
            .await
            .unwrap();
    });
    let addr = ready_rx.await.unwrap();
    Listener {
        addr,
        path,
        records,
        server,
    }
}

fn lead_added(entity_id: i64) -> String {
    json!({
        "event_type": "lead_added",
        "entity_id": entity_id,
        "created_at": Utc::now().timestamp(),
        "account_id": 1001
    })
    .to_string()
}

async fn post_signed(url: &str, body: &str) -> reqwest::Response {
    let signature = compute_signature(body.as_bytes(), SECRET).unwrap();
    reqwest::Client::new()
        .post(url)
        .header("x-kommo-signature", signature)
        .header("content-type", "application/json")
        .body(body.to_string())
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_accepted_event_is_emitted_once() {
    let mut listener = start(config(&["lead_added"])).await;
    let response = post_signed(&listener.url(), &lead_added(42)).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["event_type"], "lead_added");
    assert_eq!(body["event_id"], 42);

    let record = tokio::time::timeout(Duration::from_secs(2), listener.records.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record["event_type"], "lead_added");
    assert_eq!(record["entity_type"], "leads");
    assert_eq!(record["action"], "added");
    assert_eq!(record["entity_id"], 42);
    assert_eq!(record["payload"]["account_id"], 1001);
    assert!(listener.records.try_recv().is_err());
}

#[tokio::test]
async fn test_filtered_event_emits_nothing() {
    let mut listener = start(config(&["contact_added"])).await;
    let response = post_signed(&listener.url(), &lead_added(42)).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"status": "event_filtered"}));
    assert!(listener.records.try_recv().is_err());
}

#[tokio::test]
async fn test_redelivery_is_ignored() {
    let mut listener = start(config(&[])).await;
    let body = lead_added(7);
    let first: Value = post_signed(&listener.url(), &body).await.json().await.unwrap();
    let second: Value = post_signed(&listener.url(), &body).await.json().await.unwrap();
    assert_eq!(first["status"], "success");
    assert_eq!(second, json!({"status": "duplicate_ignored"}));
    assert!(listener.records.recv().await.is_some());
    assert!(listener.records.try_recv().is_err());
}

#[tokio::test]
async fn test_bad_signature_is_rejected() {
    let listener = start(config(&[])).await;
    let response = reqwest::Client::new()
        .post(listener.url())
        .header("x-signature", "00ff")
        .body(lead_added(1))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Bad Request");
    assert_eq!(body["message"], "Invalid webhook signature");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_stale_event_is_rejected() {
    let listener = start(config(&[])).await;
    let body = json!({
        "event_type": "task_updated",
        "entity_id": 3,
        "created_at": Utc::now().timestamp() - 301
    })
    .to_string();
    let response = post_signed(&listener.url(), &body).await;
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Webhook timestamp is too old");
}

#[tokio::test]
async fn test_oversize_body_gets_json_413() {
    let listener = start(config(&[])).await;
    let padding = "x".repeat(8192);
    let body = json!({
        "event_type": "lead_added",
        "entity_id": 1,
        "created_at": Utc::now().timestamp(),
        "padding": padding
    })
    .to_string();
    let response = post_signed(&listener.url(), &body).await;
    assert_eq!(response.status().as_u16(), 413);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Payload Too Large");
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let listener = start(config(&[])).await;
    let response = reqwest::Client::new()
        .post(format!("http://{}/elsewhere", listener.addr))
        .body(lead_added(1))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn test_concurrent_redeliveries_accept_exactly_one() {
    let mut listener = start(config(&[])).await;
    let body = lead_added(99);
    let url = listener.url();
    let responses = futures::future::join_all(
        (0..8).map(|_| post_signed(&url, &body)),
    )
    .await;

    let mut statuses = Vec::new();
    for response in responses {
        let body: Value = response.json().await.unwrap();
        statuses.push(body["status"].as_str().unwrap_or_default().to_string());
    }
    assert_eq!(statuses.iter().filter(|s| *s == "success").count(), 1);
    assert_eq!(statuses.iter().filter(|s| *s == "duplicate_ignored").count(), 7);
    assert!(listener.records.recv().await.is_some());
    assert!(listener.records.try_recv().is_err());
}

/// Fails its first hand-off, then forwards into a channel.
struct FailsOnce {
    failed: AtomicBool,
    inner: ChannelSink,
}

#[async_trait]
impl EventSink for FailsOnce {
    async fn emit(&self, record: Value) -> Result<(), AppError> {
        if !self.failed.swap(true, Ordering::SeqCst) {
            return Err(AppError::new(ErrorCategory::InternalError, "sink unavailable"));
        }
        self.inner.emit(record).await
    }
}

#[tokio::test]
async fn test_failed_hand_off_does_not_suppress_redelivery() {
    let (inner, records) = ChannelSink::channel(16);
    let sink = FailsOnce {
        failed: AtomicBool::new(false),
        inner,
    };
    let mut listener = start_with_sink(config(&[]), Arc::new(sink), records).await;
    let body = lead_added(55);

    let first = post_signed(&listener.url(), &body).await;
    assert_eq!(first.status().as_u16(), 500);
    let first: Value = first.json().await.unwrap();
    assert_eq!(first["message"], "Failed to process webhook");

    let second = post_signed(&listener.url(), &body).await;
    assert_eq!(second.status().as_u16(), 200);
    let second: Value = second.json().await.unwrap();
    assert_eq!(second["status"], "success");

    let record = listener.records.recv().await.unwrap();
    assert_eq!(record["entity_id"], 55);

    let third: Value = post_signed(&listener.url(), &body).await.json().await.unwrap();
    assert_eq!(third, json!({"status": "duplicate_ignored"}));
}
