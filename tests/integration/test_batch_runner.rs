use async_trait::async_trait;
use kommo::core::error::AppError;
use kommo::core::resources::{
    BatchItem, BatchRunner, ItemOutcome, OperationContext, OperationRegistry, ResourceOperation,
};
use kommo::core::transport::{ReqwestHttp, StaticToken, TenantCredentials, Transport};
use kommo::core::types::ErrorCategory;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn context(base_url: String) -> OperationContext {
    let http = ReqwestHttp::new(
        Arc::new(StaticToken::new("test-token")),
        Duration::from_secs(5),
    )
    .unwrap();
    OperationContext::new(Transport::new(
        Arc::new(TenantCredentials::with_base_url(base_url)),
        Arc::new(http),
    ))
}

/// Echoes `value` back, or fails when `fail` is set.
struct Stub {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ResourceOperation for Stub {
    fn resource(&self) -> &'static str {
        "stub"
    }

    fn operation(&self) -> &'static str {
        "echo"
    }

    fn validate_params(&self, params: &Value) -> Result<(), AppError> {
        if params.get("value").is_none() {
            return Err(AppError::new(ErrorCategory::ValidationError, "value is required"));
        }
        Ok(())
    }

    async fn execute(&self, params: Value, _ctx: OperationContext) -> Result<Vec<Value>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if params["fail"].as_bool().unwrap_or(false) {
            return Err(AppError::new(ErrorCategory::TransportError, "stub failed"));
        }
        Ok(vec![params["value"].clone()])
    }
}

fn stub_runner() -> (BatchRunner, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut builder = OperationRegistry::builder();
    builder.register(Stub {
        calls: calls.clone(),
    });
    let runner = BatchRunner::new(
        builder.build(),
        context("http://127.0.0.1:9/api/v4/".to_string()),
    );
    (runner, calls)
}

fn stub_item(params: Value) -> BatchItem {
    BatchItem::new("stub", Some("echo"), params)
}

#[tokio::test]
async fn test_failure_aborts_with_item_index() {
    let (runner, calls) = stub_runner();
    let items = vec![
        stub_item(json!({"value": 1})),
        stub_item(json!({"value": 2, "fail": true})),
        stub_item(json!({"value": 3})),
    ];

    let err = runner.run_batch(items, false).await.unwrap_err();
    assert_eq!(err.item_index, 1);
    assert_eq!(err.source.category, ErrorCategory::TransportError);
    assert!(err.to_string().starts_with("item 1 failed"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_continue_on_fail_records_error_and_keeps_going() {
    let (runner, calls) = stub_runner();
    let items = vec![
        stub_item(json!({"value": "a"})),
        stub_item(json!({"value": "b", "fail": true})),
        stub_item(json!({"value": "c"})),
    ];

    let results = runner.run_batch(items, true).await.unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(results[0].is_success());
    assert!(!results[1].is_success());
    assert!(results[2].is_success());

    match &results[1].outcome {
        ItemOutcome::Failed { input, error } => {
            assert_eq!(input, &json!({"value": "b", "fail": true}));
            assert_eq!(error.message, "stub failed");
        }
        other => panic!("expected a failure, got {:?}", other),
    }

    let records: Vec<Value> = results.iter().flat_map(|r| r.to_records()).collect();
    assert_eq!(records[0], json!({"item_index": 0, "json": "a"}));
    assert_eq!(records[1]["item_index"], 1);
    assert_eq!(records[1]["error"]["code"], "KOMMO-TRANSPORT");
    assert_eq!(records[1]["error"]["category"], "TransportError");
    assert_eq!(records[2], json!({"item_index": 2, "json": "c"}));
}

#[tokio::test]
async fn test_validation_runs_before_execution() {
    let (runner, calls) = stub_runner();
    let err = runner
        .run_batch(vec![stub_item(json!({}))], false)
        .await
        .unwrap_err();
    assert_eq!(err.item_index, 0);
    assert_eq!(err.source.category, ErrorCategory::ValidationError);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_operation_is_a_validation_error() {
    let (runner, _) = stub_runner();
    let items = vec![
        stub_item(json!({"value": 1})),
        BatchItem::new("stub", Some("missing"), json!({})),
    ];
    let err = runner.run_batch(items, false).await.unwrap_err();
    assert_eq!(err.item_index, 1);
    assert_eq!(err.source.category, ErrorCategory::ValidationError);
    assert!(err.source.message.contains("unknown operation 'missing'"));
}

#[tokio::test]
async fn test_builtin_batch_against_api() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/leads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_embedded": {"leads": [{"id": 1}, {"id": 2}]}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v4/contacts"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .expect(1)
        .mount(&server)
        .await;

    let runner = BatchRunner::new(
        OperationRegistry::with_builtins(),
        context(format!("{}/api/v4/", server.uri())),
    );
    let items: Vec<BatchItem> = serde_json::from_value(json!([
        {"resource": "leads"},
        {"resource": "contacts", "operation": "createContacts", "params": {"items": [{"name": "A"}]}}
    ]))
    .unwrap();

    let results = runner.run_batch(items, true).await.unwrap();
    assert_eq!(results[0].to_records().len(), 2);
    let failed = results[1].to_records();
    assert_eq!(failed[0]["error"]["category"], "TransportError");
    assert_eq!(failed[0]["json"], json!({"items": [{"name": "A"}]}));
}
