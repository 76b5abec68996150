//! End-to-end router tests over SQLite control-plane and tenant databases.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode},
};
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use taxdesk::repositories::{DbAuditSink, NewTenantConnection};
use taxdesk::secret_box::{CryptoKey, SecretBox, SecretString};
use taxdesk::server::{AppState, create_app};
use tower::ServiceExt;
use uuid::Uuid;

#[path = "test_utils/mod.rs"]
mod test_utils;

use test_utils::{
    FakeConnector, OPERATOR_TOKEN, insert_affiliate, insert_client, insert_commission,
    insert_filing, setup_tenant_db, setup_test_db, test_config,
};

const SCHEMA: &str = "acme_tax";

fn new_tenant(tenant_id: &str) -> NewTenantConnection {
    NewTenantConnection {
        tenant_id: tenant_id.to_string(),
        name: "Acme Tax".to_string(),
        db_host: "db.acme.internal".to_string(),
        db_port: Some(5432),
        db_user: "acme_app".to_string(),
        db_password: SecretString::new("tenant-db-password"),
        db_name: "acme".to_string(),
        db_sslmode: None,
        schema_prefix: SCHEMA.to_string(),
        adapter_kind: None,
        storage_provider: None,
        storage_bucket: None,
        storage_credentials_secret: None,
        storage_credentials_path: None,
        signing_key_secret: None,
        signing_key_path: None,
        signing_integration_key: None,
        signing_account_id: None,
        signing_user_id: None,
        signing_api_base_url: None,
        notes: None,
    }
}

/// App with tenant `acme` registered and backed by a seeded tenant database.
async fn test_app() -> (Router, AppState) {
    let tenant_db = setup_tenant_db(SCHEMA).await.unwrap();
    let now = Utc::now();
    insert_affiliate(&tenant_db, SCHEMA, "aff-1").await.unwrap();
    insert_affiliate(&tenant_db, SCHEMA, "aff-2").await.unwrap();
    insert_client(&tenant_db, SCHEMA, "c1", ("Ada", "Lovelace"), Some("aff-1"), now)
        .await
        .unwrap();
    insert_client(&tenant_db, SCHEMA, "c2", ("Alan", "Turing"), None, now)
        .await
        .unwrap();
    insert_filing(&tenant_db, SCHEMA, "f1", "c1", 2024, now)
        .await
        .unwrap();
    insert_commission(&tenant_db, SCHEMA, "k1", "aff-1", 4200, "PENDING", now)
        .await
        .unwrap();

    let connector = Arc::new(FakeConnector::new().with_database("acme", tenant_db));
    let state = AppState::new(
        test_config(),
        setup_test_db().await.unwrap(),
        SecretBox::new(&CryptoKey::development()),
        connector,
    )
    .unwrap();
    state.registry.create(new_tenant("acme"), None).await.unwrap();

    (create_app(state.clone()), state)
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, HeaderMap, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header("Authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, json)
}

#[tokio::test]
async fn test_health_reports_ok() {
    let (app, _) = test_app().await;
    let (status, headers, body) = send(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(headers.contains_key("x-trace-id"));
}

#[tokio::test]
async fn test_protected_routes_need_a_valid_token() {
    let (app, _) = test_app().await;

    let (status, headers, body) =
        send(&app, "GET", "/api/v1/tenants/acme/clients", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
    assert_eq!(
        body["trace_id"].as_str(),
        headers.get("x-trace-id").and_then(|v| v.to_str().ok())
    );

    let (status, _, _) = send(
        &app,
        "GET",
        "/api/v1/tenants/acme/clients",
        Some("not-a-real-token"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_tenant_lifecycle() {
    let (app, _) = test_app().await;

    let mut request = json!({
        "tenant_id": "globex",
        "name": "Globex Tax",
        "db_host": "db.globex.internal",
        "db_user": "globex_app",
        "db_password": "globex-secret-password",
        "db_name": "globex",
        "schema_prefix": "globex"
    });
    let (status, _, created) = send(
        &app,
        "POST",
        "/api/v1/admin/tenants",
        Some(OPERATOR_TOKEN),
        Some(request.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["tenant_id"], "globex");
    assert_eq!(created["password_sealed"], true);
    assert_eq!(created["created_by"], "operator-1");
    assert!(!created.to_string().contains("globex-secret-password"));

    request["schema_prefix"] = json!("globex; DROP SCHEMA public");
    let (status, _, body) = send(
        &app,
        "POST",
        "/api/v1/admin/tenants",
        Some(OPERATOR_TOKEN),
        Some(request),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");

    let (status, _, listed) =
        send(&app, "GET", "/api/v1/admin/tenants", Some(OPERATOR_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["count"], 2);

    let (status, _, updated) = send(
        &app,
        "PUT",
        "/api/v1/admin/tenants/globex",
        Some(OPERATOR_TOKEN),
        Some(json!({ "name": "Globex Tax & Audit" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "Globex Tax & Audit");

    let (status, _, _) = send(
        &app,
        "DELETE",
        "/api/v1/admin/tenants/globex",
        Some(OPERATOR_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, fetched) = send(
        &app,
        "GET",
        "/api/v1/admin/tenants/globex",
        Some(OPERATOR_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["is_active"], false);

    let (status, _, body) = send(
        &app,
        "GET",
        "/api/v1/tenants/globex/clients",
        Some(OPERATOR_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "TENANT_INACTIVE");
}

#[tokio::test]
async fn test_admin_routes_reject_portal_users() {
    let (app, state) = test_app().await;
    let portal = state
        .auth
        .portal()
        .unwrap()
        .issue(Uuid::new_v4(), "acme", "c1", Duration::minutes(10))
        .unwrap();

    let (status, _, _) = send(&app, "GET", "/api/v1/admin/tenants", Some(&portal), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_staff_read_is_paged_and_audited() {
    let (app, state) = test_app().await;

    let (status, _, page) = send(
        &app,
        "GET",
        "/api/v1/tenants/acme/clients?page=1&perPage=1",
        Some(OPERATOR_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 2);
    assert_eq!(page["items"].as_array().unwrap().len(), 1);

    let (status, _, client) = send(
        &app,
        "GET",
        "/api/v1/tenants/acme/clients/c1/comprehensive",
        Some(OPERATOR_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(client["client"]["id"], "c1");
    assert_eq!(client["filings"].as_array().unwrap().len(), 1);
    assert!(!client.to_string().contains("ssn"));

    let entries = DbAuditSink::new(state.db.clone())
        .list_for_tenant("acme", 10)
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
    let detail_view = entries
        .iter()
        .find(|e| e.client_id.as_deref() == Some("c1"))
        .unwrap();
    assert_eq!(detail_view.action, "VIEW");
    assert_eq!(detail_view.resource_type, "CLIENT");
    assert!(detail_view.details.contains("/comprehensive"));
}

#[tokio::test]
async fn test_page_past_the_bound_is_a_validation_error() {
    let (app, _) = test_app().await;

    let (status, headers, body) = send(
        &app,
        "GET",
        "/api/v1/tenants/acme/clients?page=18446744073709551615&perPage=200",
        Some(OPERATOR_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(headers["content-type"], "application/problem+json");
    assert_eq!(body["code"], "VALIDATION_FAILED");
}

#[tokio::test]
async fn test_bad_request_bodies_are_problem_json() {
    let (app, _) = test_app().await;

    let (status, headers, body) = send(
        &app,
        "POST",
        "/api/v1/admin/tenants",
        Some(OPERATOR_TOKEN),
        Some(json!({ "tenant_id": "globex" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(headers["content-type"], "application/problem+json");
    assert_eq!(body["code"], "VALIDATION_FAILED");
    assert!(body["details"]["body"].as_str().unwrap().contains("missing field"));

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/admin/tenants")
        .header("Authorization", format!("Bearer {OPERATOR_TOKEN}"))
        .header("content-type", "application/json")
        .body(Body::from("{\"tenant_id\": "))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.headers()["content-type"],
        "application/problem+json"
    );
}

#[tokio::test]
async fn test_portal_users_only_see_their_own_record() {
    let (app, state) = test_app().await;
    let codec = state.auth.portal().unwrap();

    let own = codec
        .issue(Uuid::new_v4(), "acme", "c1", Duration::minutes(10))
        .unwrap();
    let (status, _, body) =
        send(&app, "GET", "/api/v1/tenants/acme/clients/c1", Some(&own), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "c1");

    let (status, _, _) =
        send(&app, "GET", "/api/v1/tenants/acme/clients/c2", Some(&own), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, _) = send(&app, "GET", "/api/v1/tenants/acme/clients", Some(&own), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let foreign = codec
        .issue(Uuid::new_v4(), "globex", "c1", Duration::minutes(10))
        .unwrap();
    let (status, _, body) = send(
        &app,
        "GET",
        "/api/v1/tenants/acme/clients/c1",
        Some(&foreign),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_affiliate_dashboard_requires_a_matching_token() {
    let (app, _) = test_app().await;

    let (status, _, issued) = send(
        &app,
        "POST",
        "/api/v1/tenants/acme/affiliates/aff-1/tokens",
        Some(OPERATOR_TOKEN),
        Some(json!({ "notes": "dashboard link" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let token = issued["token"].as_str().unwrap().to_string();
    let token_id = issued["record"]["id"].as_str().unwrap().to_string();

    let (status, _, dashboard) = send(
        &app,
        "GET",
        &format!("/api/v1/tenants/acme/affiliates/aff-1/dashboard?token={token}"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dashboard["affiliate"]["id"], "aff-1");
    assert_eq!(dashboard["stats"]["referredClients"], 1);
    assert_eq!(dashboard["recentCommissions"].as_array().unwrap().len(), 1);

    let (status, _, body) = send(
        &app,
        "GET",
        &format!("/api/v1/tenants/acme/affiliates/aff-2/dashboard?token={token}"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Token does not belong to this affiliate");

    let (status, _, _) = send(
        &app,
        "DELETE",
        &format!("/api/v1/tenants/acme/affiliate-tokens/{token_id}"),
        Some(OPERATOR_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, body) = send(
        &app,
        "GET",
        &format!("/api/v1/tenants/acme/affiliates/aff-1/stats?token={token}"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_OR_EXPIRED_TOKEN");
}

#[tokio::test]
async fn test_commission_transitions_over_http() {
    let (app, _) = test_app().await;
    let approve = "/api/v1/tenants/acme/commissions/k1/approve";

    let (status, _, body) = send(&app, "POST", approve, Some(OPERATOR_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "APPROVED");
    assert_eq!(body["amount"], "42.00");

    let (status, _, body) = send(&app, "POST", approve, Some(OPERATOR_TOKEN), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "ILLEGAL_STATE_TRANSITION");

    let (status, _, listed) = send(
        &app,
        "GET",
        "/api/v1/tenants/acme/commissions?status=APPROVED",
        Some(OPERATOR_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["count"], 1);
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let (app, _) = test_app().await;
    let (status, _, doc) = send(&app, "GET", "/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/api/v1/admin/tenants"].is_object());
}
