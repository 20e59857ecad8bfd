use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use beacon_core::{HealthCheck, HealthStatus, Node, Service};
use beacon_server::{create_router, AppState, Config};

/// Create a test app with an in-memory store.
fn create_test_app() -> axum::Router {
    let (state, _expired) = AppState::new(&Config::for_testing()).unwrap();
    create_router(state)
}

/// Helper to get response body as string.
async fn body_string(body: Body) -> String {
    let bytes = body.collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(body: Body) -> Value {
    serde_json::from_str(&body_string(body).await).unwrap()
}

async fn send(app: &axum::Router, method: &str, uri: &str, body: Body) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(body)
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn put_json(app: &axum::Router, uri: &str, value: Value) -> axum::response::Response {
    send(app, "PUT", uri, Body::from(value.to_string())).await
}

async fn get(app: &axum::Router, uri: &str) -> axum::response::Response {
    send(app, "GET", uri, Body::empty()).await
}

// ============================================================================
// Health endpoint tests
// ============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app();

    let response = get(&app, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_ready_when_gc_enabled() {
    let app = create_test_app();

    let response = get(&app, "/ready").await;
    assert_eq!(response.status(), StatusCode::OK);
}

// ============================================================================
// Catalog and service health tests
// ============================================================================

#[tokio::test]
async fn test_register_then_snapshot() {
    let app = create_test_app();

    let response = put_json(
        &app,
        "/v1/catalog/register",
        json!({
            "node": Node::new("node1", "10.0.0.1"),
            "service": Service::new("node1", "web1", "web").with_port(8080),
            "checks": [HealthCheck::service_check("node1", "web-alive", "web1")
                .with_status(HealthStatus::Passing)],
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response.into_body()).await["index"], 1);

    let response = get(&app, "/v1/health/service/web").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-beacon-index"], "1");

    let body = body_json(response.into_body()).await;
    assert_eq!(body["index"], 1);
    let events = body["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["topic"], "service-health");
    assert_eq!(events[0]["payload"]["op"], "register");
    assert_eq!(events[0]["payload"]["value"]["service"]["id"], "web1");
    assert_eq!(events[0]["payload"]["value"]["checks"][0]["status"], "passing");
}

#[tokio::test]
async fn test_connect_snapshot_routes_proxies_by_destination() {
    let app = create_test_app();

    put_json(
        &app,
        "/v1/catalog/register",
        json!({
            "node": Node::new("node1", "10.0.0.1"),
            "service": Service::new("node1", "web1", "web"),
        }),
    )
    .await;
    put_json(
        &app,
        "/v1/catalog/register",
        json!({
            "node": Node::new("node1", "10.0.0.1"),
            "service": Service::proxy("node1", "web-proxy", "web-proxy", "web"),
        }),
    )
    .await;

    let body = body_json(
        get(&app, "/v1/health/service/web?connect=true")
            .await
            .into_body(),
    )
    .await;
    let events = body["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["topic"], "service-health-connect");
    assert_eq!(events[0]["payload"]["override_key"], "web");
    assert_eq!(events[0]["payload"]["value"]["service"]["id"], "web-proxy");
}

#[tokio::test]
async fn test_deregister_node_cascades() {
    let app = create_test_app();

    put_json(
        &app,
        "/v1/catalog/register",
        json!({
            "node": Node::new("node1", "10.0.0.1"),
            "service": Service::new("node1", "web1", "web"),
        }),
    )
    .await;

    let response = put_json(&app, "/v1/catalog/deregister", json!({ "node": "node1" })).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response.into_body()).await["index"], 2);

    let body = body_json(get(&app, "/v1/health/service/web").await.into_body()).await;
    assert_eq!(body["index"], 2);
    assert!(body["events"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_register_service_without_node_is_rejected() {
    let app = create_test_app();

    let response = put_json(
        &app,
        "/v1/catalog/register",
        json!({
            "node": Node::new("", "10.0.0.1"),
            "service": Service::new("", "web1", "web"),
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ============================================================================
// KV tests
// ============================================================================

#[tokio::test]
async fn test_kv_put_get_delete() {
    let app = create_test_app();

    let response = send(&app, "PUT", "/v1/kv/foo/bar", Body::from("baz")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-beacon-index"], "1");
    assert_eq!(body_string(response.into_body()).await, "true");

    let response = get(&app, "/v1/kv/foo/bar").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response.into_body()).await;
    assert_eq!(body[0]["key"], "foo/bar");
    assert_eq!(body[0]["value"], json!(b"baz".to_vec()));

    let response = send(&app, "DELETE", "/v1/kv/foo/bar", Body::empty()).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get(&app, "/v1/kv/foo/bar").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    // the tombstone keeps the index from going backwards
    assert_eq!(response.headers()["x-beacon-index"], "2");

    let body = body_json(get(&app, "/v1/internal/tombstones").await.into_body()).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["max_index"], 2);
    assert_eq!(body["gc_enabled"], true);
    assert_eq!(body["pending_expiration"], true);
}

#[tokio::test]
async fn test_kv_recursive_list_uses_graveyard_index() {
    let app = create_test_app();

    send(&app, "PUT", "/v1/kv/foo/a", Body::from("1")).await;
    send(&app, "PUT", "/v1/kv/foo/b", Body::from("2")).await;
    send(&app, "DELETE", "/v1/kv/foo/b", Body::empty()).await;

    let response = get(&app, "/v1/kv/foo/?recurse=true").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-beacon-index"], "3");
    let body = body_json(response.into_body()).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_kv_cas() {
    let app = create_test_app();

    let response = send(&app, "PUT", "/v1/kv/lock?cas=0", Body::from("a")).await;
    assert_eq!(body_string(response.into_body()).await, "true");

    let response = send(&app, "PUT", "/v1/kv/lock?cas=0", Body::from("b")).await;
    assert_eq!(body_string(response.into_body()).await, "false");

    let response = send(&app, "DELETE", "/v1/kv/lock?cas=7", Body::empty()).await;
    assert_eq!(body_string(response.into_body()).await, "false");

    let response = send(&app, "DELETE", "/v1/kv/lock?cas=1", Body::empty()).await;
    assert_eq!(body_string(response.into_body()).await, "true");
}
