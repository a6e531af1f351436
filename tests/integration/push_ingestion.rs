//! Integration tests for agent report ingestion
//!
//! These tests verify that:
//! - Reports are attributed by token and unknown tokens write nothing
//! - Unseen service names are registered on first report
//! - Ingestion marks the host connected and never alerts
//! - Fresh reports keep the scheduler's staleness pass quiet

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::Utc;
use pretty_assertions::assert_eq;
use service_sentinel::{
    ingest::{AgentReport, IngestError, PushIngestor, ServiceReport},
    models::{ConnectionStatus, ServiceStatus},
    remote::mock::ScriptedExecutor,
    storage::StorageBackend,
};

use crate::helpers::*;

fn report(token: &str, services: Vec<ServiceReport>) -> AgentReport {
    AgentReport {
        token: token.to_string(),
        services,
    }
}

#[tokio::test]
async fn test_report_registers_services_and_connects_host() {
    let store = memory_store();
    let host = push_host(&store, "edge-1", "tok-1").await;
    service(&store, &host, "nginx").await;

    let mut nginx = ServiceReport::new("nginx", ServiceStatus::Running);
    nginx.pid = Some(812);
    nginx.memory_kb = Some(10_240);
    let mut redis = ServiceReport::new("redis", ServiceStatus::Failed);
    redis.error_message = Some("exit code 1".to_string());

    let ingestor = PushIngestor::new(store.clone());
    let receipt = ingestor
        .ingest(report("tok-1", vec![nginx, redis]))
        .await
        .unwrap();

    assert_eq!(receipt.host_id, host.id);
    assert_eq!(receipt.checks_written, 2);
    assert_eq!(receipt.services_created, 1);

    let redis = store.find_service(host.id, "redis").await.unwrap().unwrap();
    assert!(redis.enabled);
    assert_eq!(redis.display_name, "redis");

    let check = store.latest_check(redis.id).await.unwrap().unwrap();
    assert_eq!(check.status, ServiceStatus::Failed);
    assert_eq!(check.error_message.as_deref(), Some("exit code 1"));

    let host = store.get_host(host.id).await.unwrap().unwrap();
    assert_eq!(host.connection_status, ConnectionStatus::Connected);
    assert!(host.last_seen.is_some());

    // ingestion alone never alerts
    assert!(store.recent_alerts(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_token_writes_nothing() {
    let store = memory_store();
    let host = push_host(&store, "edge-2", "tok-2").await;

    let ingestor = PushIngestor::new(store.clone());
    let result = ingestor
        .ingest(report(
            "wrong",
            vec![ServiceReport::new("nginx", ServiceStatus::Running)],
        ))
        .await;

    assert_matches!(result, Err(IngestError::Unauthorized));
    assert!(store.list_services(host.id).await.unwrap().is_empty());
    assert_eq!(
        store.get_host(host.id).await.unwrap().unwrap().connection_status,
        ConnectionStatus::NotConnected
    );

    assert_matches!(
        ingestor.ingest(report("", vec![])).await,
        Err(IngestError::Unauthorized)
    );
}

#[tokio::test]
async fn test_empty_report_still_marks_host_seen() {
    let store = memory_store();
    let host = push_host(&store, "edge-3", "tok-3").await;

    let receipt = PushIngestor::new(store.clone())
        .ingest(report("tok-3", vec![]))
        .await
        .unwrap();

    assert_eq!(receipt.checks_written, 0);
    assert_eq!(
        store.get_host(host.id).await.unwrap().unwrap().connection_status,
        ConnectionStatus::Connected
    );
}

#[tokio::test]
async fn test_reported_host_is_not_flagged_stale() {
    let store = memory_store();
    let host = push_host(&store, "edge-4", "tok-4").await;
    let nginx = service(&store, &host, "nginx").await;

    PushIngestor::new(store.clone())
        .ingest(report(
            "tok-4",
            vec![ServiceReport::new("nginx", ServiceStatus::Running)],
        ))
        .await
        .unwrap();

    let services = store.list_services(host.id).await.unwrap();
    let outcome = worker(&store, Arc::new(ScriptedExecutor::new()))
        .check_push(&host, &services, Utc::now())
        .await;

    assert_eq!(outcome.checks_written, 0);
    assert_eq!(outcome.alerts_created, 0);
    assert_eq!(store.check_history(nginx.id, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_reports_register_service_once() {
    let store = memory_store();
    let host = push_host(&store, "edge-5", "tok-5").await;
    let ingestor = PushIngestor::new(store.clone());

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let ingestor = ingestor.clone();
        tasks.push(tokio::spawn(async move {
            ingestor
                .ingest(report(
                    "tok-5",
                    vec![ServiceReport::new("worker", ServiceStatus::Running)],
                ))
                .await
                .unwrap()
        }));
    }

    let mut written = 0;
    for task in tasks {
        written += task.await.unwrap().checks_written;
    }

    assert_eq!(written, 8);
    let services = store.list_services(host.id).await.unwrap();
    assert_eq!(services.len(), 1);
    assert_eq!(store.check_history(services[0].id, 20).await.unwrap().len(), 8);
}

#[tokio::test]
async fn test_enabled_services_for_agent() {
    let store = memory_store();
    let host = push_host(&store, "edge-6", "tok-6").await;
    service(&store, &host, "nginx").await;
    store
        .create_service(service_sentinel::models::NewService::named(host.id, "old").disabled())
        .await
        .unwrap();

    let list = PushIngestor::new(store.clone())
        .enabled_services("tok-6")
        .await
        .unwrap();

    assert_eq!(list.server_id, host.id);
    let names: Vec<_> = list.services.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["nginx"]);
}
