//! Integration tests for API endpoints
//!
//! These tests verify that:
//! - Agent reports are accepted, attributed and rejected by token
//! - Agents receive their enabled service lists
//! - Read endpoints return hosts, check history and alerts
//! - Error handling maps to the documented status codes

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use service_sentinel::{
    api::{ApiConfig, ApiState, router, spawn_api_server},
    models::{NewServiceCheck, ServiceStatus},
    storage::{StorageBackend, Store},
};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use crate::helpers::*;

fn app(store: &Store) -> Router {
    router(ApiState::new(store.clone()))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_agent_report_is_accepted() {
    let store = memory_store();
    let host = push_host(&store, "edge-1", "tok-1").await;

    let (status, body) = send(
        app(&store),
        post_json(
            "/api/agent/report",
            json!({
                "token": "tok-1",
                "services": [
                    { "name": "nginx", "status": "running", "pid": 812, "memory_kb": 10240 },
                    { "name": "redis", "status": "failed", "error_message": "exit code 1" }
                ]
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "Report received" }));

    let services = store.list_services(host.id).await.unwrap();
    assert_eq!(services.len(), 2);
}

#[tokio::test]
async fn test_agent_report_with_unknown_token_is_unauthorized() {
    let store = memory_store();
    let host = push_host(&store, "edge-1", "tok-1").await;

    let (status, body) = send(
        app(&store),
        post_json(
            "/api/agent/report",
            json!({ "token": "nope", "services": [{ "name": "nginx", "status": "running" }] }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "Invalid token" }));
    assert!(store.list_services(host.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_agent_report_with_unknown_status_is_rejected() {
    let store = memory_store();
    let host = push_host(&store, "edge-1", "tok-1").await;

    let (status, _) = send(
        app(&store),
        post_json(
            "/api/agent/report",
            json!({ "token": "tok-1", "services": [{ "name": "nginx", "status": "sleeping" }] }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(store.list_services(host.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_agent_service_list() {
    let store = memory_store();
    let host = push_host(&store, "edge-1", "tok-1").await;
    service(&store, &host, "nginx").await;

    let (status, body) = send(app(&store), get("/api/agent/services?token=tok-1")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["server_id"], json!(host.id));
    assert_eq!(body["services"][0]["name"], "nginx");

    let (status, _) = send(app(&store), get("/api/agent/services")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_hosts_hide_agent_tokens() {
    let store = memory_store();
    push_host(&store, "edge-1", "secret-token").await;
    pull_host(&store, "web-1", "10.0.0.1").await;

    let (status, body) = send(app(&store), get("/api/v1/hosts")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    assert_eq!(body["hosts"][0]["connection_status"], "not_connected");
    assert!(!body.to_string().contains("secret-token"));
}

#[tokio::test]
async fn test_service_check_history() {
    let store = memory_store();
    let host = pull_host(&store, "web-1", "10.0.0.1").await;
    let nginx = service(&store, &host, "nginx").await;

    let now = chrono::Utc::now();
    for (offset, status) in [(2, ServiceStatus::Running), (1, ServiceStatus::Stopped)] {
        store
            .insert_check(NewServiceCheck::new(
                nginx.id,
                status,
                now - chrono::Duration::seconds(offset),
            ))
            .await
            .unwrap();
    }

    let uri = format!("/api/v1/services/{}/checks?limit=1", nginx.id);
    let (status, body) = send(app(&store), get(&uri)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["checks"][0]["status"], "stopped");

    let uri = format!("/api/v1/services/{}/checks?limit=0", nginx.id);
    let (status, body) = send(app(&store), get(&uri)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_health_and_alerts() {
    let store = memory_store();

    let (status, body) = send(app(&store), get("/api/v1/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send(app(&store), get("/api/v1/alerts")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn test_server_serves_over_tcp_and_stops() {
    let store = memory_store();
    let cancel = CancellationToken::new();

    let addr = spawn_api_server(
        ApiConfig::new("127.0.0.1:0".parse().unwrap()),
        ApiState::new(store.clone()),
        cancel.clone(),
    )
    .await
    .unwrap();

    let response = reqwest::get(format!("http://{addr}/api/v1/health"))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    cancel.cancel();
}
