use kommo::core::resources::{OperationContext, OperationRegistry};
use kommo::core::transport::{ReqwestHttp, StaticToken, TenantCredentials, Transport};
use kommo::core::types::ErrorCategory;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn context_for(server: &MockServer) -> OperationContext {
    let http = ReqwestHttp::new(
        Arc::new(StaticToken::new("test-token")),
        Duration::from_secs(5),
    )
    .unwrap();
    OperationContext::new(Transport::new(
        Arc::new(TenantCredentials::with_base_url(format!(
            "{}/api/v4/",
            server.uri()
        ))),
        Arc::new(http),
    ))
}

async fn execute(
    server: &MockServer,
    resource: &str,
    operation: Option<&str>,
    params: Value,
) -> Result<Vec<Value>, kommo::core::AppError> {
    let registry = OperationRegistry::with_builtins();
    let handler = registry.resolve(resource, operation).unwrap();
    handler.validate_params(&params)?;
    handler.execute(params, context_for(server)).await
}

#[tokio::test]
async fn test_get_leads_single_page_defaults_to_fifty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/leads"))
        .and(query_param("limit", "50"))
        .and(query_param("with", "contacts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_page": 1,
            "_embedded": {"leads": [{"id": 1}, {"id": 2}]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let records = execute(&server, "leads", None, json!({"with": "contacts"}))
        .await
        .unwrap();
    assert_eq!(records, vec![json!({"id": 1}), json!({"id": 2})]);
}

#[tokio::test]
async fn test_get_leads_without_simplify_keeps_envelope() {
    let server = MockServer::start().await;
    let page = json!({"_page": 2, "_embedded": {"leads": [{"id": 9}]}});
    Mock::given(method("GET"))
        .and(path("/api/v4/leads"))
        .and(query_param("limit", "5"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page.clone()))
        .mount(&server)
        .await;

    let records = execute(
        &server,
        "leads",
        Some("getLeads"),
        json!({"simplify": false, "limit": 5, "page": 2}),
    )
    .await
    .unwrap();
    assert_eq!(records, vec![page]);
}

#[tokio::test]
async fn test_get_contacts_return_all_flattens_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/contacts"))
        .and(query_param("page", "1"))
        .and(query_param("limit", "250"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_embedded": {"contacts": [{"id": 1}, {"id": 2}]},
            "_links": {"next": {"href": "https://x/api/v4/contacts?page=2"}}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v4/contacts"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_embedded": {"contacts": [{"id": 3}]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let records = execute(&server, "contacts", None, json!({"returnAll": true}))
        .await
        .unwrap();
    let ids: Vec<u64> = records.iter().filter_map(|r| r["id"].as_u64()).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_create_tasks_converts_dates_and_custom_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v4/tasks"))
        .and(body_json(json!([{
            "text": "Call back",
            "complete_till": 1699920000,
            "custom_fields_values": [{"field_id": 12, "values": [{"value": true}]}]
        }])))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_embedded": {"tasks": [{"id": 501, "request_id": "0"}]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let records = execute(
        &server,
        "tasks",
        Some("createTasks"),
        json!({"items": [{
            "text": "Call back",
            "complete_till": "2023-11-14",
            "custom_fields": [{"field_id": 12, "field_type": "checkbox", "value": "yes"}]
        }]}),
    )
    .await
    .unwrap();
    assert_eq!(records[0]["id"], 501);
}

#[tokio::test]
async fn test_update_requires_ids_before_any_request() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = execute(
        &server,
        "leads",
        Some("updateLeads"),
        json!({"items": [{"name": "no id"}]}),
    )
    .await
    .unwrap_err();
    assert_eq!(err.category, ErrorCategory::ValidationError);
    assert!(err.message.contains("items[0]"));
}

#[tokio::test]
async fn test_notes_route_to_parent_entity() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v4/companies/notes"))
        .and(body_json(json!([{"entity_id": 4, "note_type": "common", "params": {"text": "hi"}}])))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_embedded": {"notes": [{"id": 70, "entity_id": 4}]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let records = execute(
        &server,
        "notes",
        Some("createNotes"),
        json!({
            "entity_type": "companies",
            "items": [{"entity_id": 4, "note_type": "common", "params": {"text": "hi"}}]
        }),
    )
    .await
    .unwrap();
    assert_eq!(records, vec![json!({"id": 70, "entity_id": 4})]);
}

#[tokio::test]
async fn test_account_info_joins_with() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/account"))
        .and(query_param("with", "amojo_id,version"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1, "name": "Acme"})))
        .expect(1)
        .mount(&server)
        .await;

    let records = execute(&server, "account", None, json!({"with": ["amojo_id", "version"]}))
        .await
        .unwrap();
    assert_eq!(records, vec![json!({"id": 1, "name": "Acme"})]);
}

#[tokio::test]
async fn test_purchases_reject_invoice_items_without_field_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = execute(
        &server,
        "purchases",
        Some("createPurchases"),
        json!({"catalog_id": 3, "items": [{"name": "Order", "invoice_items": [{"unit_price": 5}]}]}),
    )
    .await
    .unwrap_err();
    assert_eq!(err.category, ErrorCategory::ValidationError);
    assert!(err.message.contains("items_field_id"));
}

#[tokio::test]
async fn test_purchases_create_posts_catalog_elements() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v4/catalogs/3/elements"))
        .and(body_json(json!([{
            "name": "Order",
            "custom_fields_values": [{
                "field_id": 88,
                "values": [{"value": {"quantity": 2, "unit_price": 5, "unit_type": "pcs"}}]
            }]
        }])))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_embedded": {"elements": [{"id": 1200}]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let records = execute(
        &server,
        "purchases",
        Some("createPurchases"),
        json!({
            "catalog_id": 3,
            "items_field_id": 88,
            "items": [{"name": "Order", "invoice_items": [{"quantity": 2, "unit_price": 5}]}]
        }),
    )
    .await
    .unwrap();
    assert_eq!(records, vec![json!({"id": 1200})]);
}

#[tokio::test]
async fn test_unsorted_accept_posts_to_uid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v4/leads/unsorted/abc-123/accept"))
        .and(body_json(json!({"user_id": 9, "status_id": 142})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"uid": "abc-123"})))
        .expect(1)
        .mount(&server)
        .await;

    let records = execute(
        &server,
        "unsorted",
        Some("accept"),
        json!({"uid": "abc-123", "user_id": 9, "status_id": 142}),
    )
    .await
    .unwrap();
    assert_eq!(records, vec![json!({"uid": "abc-123"})]);
}

#[tokio::test]
async fn test_unsorted_list_filters_by_category() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/leads/unsorted"))
        .and(query_param("filter[category][]", "forms"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_embedded": {"unsorted": [{"uid": "u1"}]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let records = execute(&server, "unsorted", None, json!({"category": "forms"}))
        .await
        .unwrap();
    assert_eq!(records, vec![json!({"uid": "u1"})]);
}

#[tokio::test]
async fn test_validation_errors_surface_from_api() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v4/contacts"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "title": "Bad Request",
            "validation-errors": [{"request_id": "0", "errors": [{"path": "name", "detail": "required"}]}]
        })))
        .mount(&server)
        .await;

    let err = execute(&server, "contacts", Some("createContacts"), json!({"items": [{}]}))
        .await
        .unwrap_err();
    assert_eq!(err.category, ErrorCategory::ValidationError);
    assert_eq!(err.message, "Incorrect fields");
    assert!(err.description.as_deref().unwrap_or_default().contains("required"));
}
