//! Integration tests for scheduled host checks
//!
//! These tests verify that:
//! - Pull hosts are checked over the executor and every result is stored
//! - Unreachable hosts produce `unknown` checks and alerts without blocking others
//! - Concurrency stays within the worker bound
//! - Push hosts are judged by report staleness and go idle when silent

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pretty_assertions::assert_eq;
use service_sentinel::{
    models::{ConnectionStatus, NewService, NewServiceCheck, ServiceStatus},
    remote::mock::ScriptedExecutor,
    scheduler::SchedulerHandle,
    storage::StorageBackend,
};

use crate::helpers::*;

#[tokio::test]
async fn test_tick_checks_every_enabled_pull_service() {
    let store = memory_store();
    let host = pull_host(&store, "web-1", "10.0.0.1").await;
    let nginx = service(&store, &host, "nginx.service").await;
    let cron = store
        .create_service(NewService::named(host.id, "cron.service").disabled())
        .await
        .unwrap();

    let executor = Arc::new(healthy_linux());
    let summary = scheduler(&store, executor.clone(), 4).tick().await;

    assert_eq!(summary.hosts_checked, 1);
    assert_eq!(summary.checks_written, 1);
    assert_eq!(summary.alerts_created, 0);

    let check = store.latest_check(nginx.id).await.unwrap().unwrap();
    assert_eq!(check.status, ServiceStatus::Running);
    assert_eq!(check.pid, Some(1234));
    assert_eq!(check.memory_kb, Some(20480));
    assert_eq!(check.cpu_percent, Some(1.5));
    assert!(check.response_time_ms.is_some());

    assert!(store.latest_check(cron.id).await.unwrap().is_none());
    assert!(
        executor
            .calls()
            .iter()
            .all(|(_, command)| !command.contains("cron.service"))
    );

    let host = store.get_host(host.id).await.unwrap().unwrap();
    assert!(host.last_seen.is_some());
}

#[tokio::test]
async fn test_unreachable_host_yields_unknown_check_and_alert() {
    let store = memory_store();
    let host = pull_host(&store, "db-1", "10.0.0.2").await;
    let postgres = service(&store, &host, "postgresql").await;

    let executor = Arc::new(healthy_linux().unreachable("10.0.0.2"));
    let summary = scheduler(&store, executor, 4).tick().await;

    assert_eq!(summary.checks_written, 1);
    assert_eq!(summary.alerts_created, 1);

    let check = store.latest_check(postgres.id).await.unwrap().unwrap();
    assert_eq!(check.status, ServiceStatus::Unknown);
    assert!(
        check
            .error_message
            .as_deref()
            .unwrap()
            .starts_with("failed to check service:")
    );

    let alerts = store.recent_alerts(10).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].host_id, host.id);
    assert_eq!(alerts[0].status, ServiceStatus::Unknown);
    assert_eq!(alerts[0].sent_via, "telegram");
    assert!(
        alerts[0]
            .message
            .starts_with("🚨 Service 'postgresql' on host 'db-1' is unknown\nError: ")
    );
}

#[tokio::test]
async fn test_failing_host_does_not_block_others() {
    let store = memory_store();
    let down = pull_host(&store, "down", "10.0.0.3").await;
    let up = pull_host(&store, "up", "10.0.0.4").await;
    let down_svc = service(&store, &down, "nginx").await;
    let up_svc = service(&store, &up, "nginx").await;

    let executor = Arc::new(healthy_linux().unreachable("10.0.0.3"));
    let summary = scheduler(&store, executor, 1).tick().await;

    assert_eq!(summary.hosts_checked, 2);
    assert_eq!(
        store.latest_check(down_svc.id).await.unwrap().unwrap().status,
        ServiceStatus::Unknown
    );
    assert_eq!(
        store.latest_check(up_svc.id).await.unwrap().unwrap().status,
        ServiceStatus::Running
    );
}

#[tokio::test]
async fn test_worker_bound_limits_parallel_hosts() {
    let store = memory_store();
    for i in 0..6 {
        let host = pull_host(&store, &format!("host-{i}"), &format!("10.0.1.{i}")).await;
        service(&store, &host, "sshd").await;
    }

    let executor = Arc::new(healthy_linux().with_delay(Duration::from_millis(30)));
    let summary = scheduler(&store, executor.clone(), 2).tick().await;

    assert_eq!(summary.hosts_checked, 6);
    assert_eq!(summary.checks_written, 6);
    assert!(executor.max_in_flight() <= 2);
    for i in 0..6 {
        assert!(executor.calls_for(&format!("10.0.1.{i}")) > 0);
    }
}

#[tokio::test]
async fn test_stopped_service_alerts_once_per_cooldown() {
    let store = memory_store();
    let host = pull_host(&store, "web-2", "10.0.0.5").await;
    let nginx = service(&store, &host, "nginx").await;

    let executor = Arc::new(ScriptedExecutor::new().respond("is-active", "inactive\n"));
    let scheduler = scheduler(&store, executor, 4);

    let first = scheduler.tick().await;
    let second = scheduler.tick().await;

    assert_eq!(first.alerts_created, 1);
    assert_eq!(second.alerts_created, 0);
    assert_eq!(store.check_history(nginx.id, 10).await.unwrap().len(), 2);

    let alerts = store.recent_alerts(10).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].message, "🚨 Service 'nginx' on host 'web-2' is stopped");
}

#[tokio::test]
async fn test_push_host_without_reports_alerts() {
    let store = memory_store();
    let host = push_host(&store, "edge-1", "tok-edge").await;
    let svc = service(&store, &host, "nginx").await;

    let executor = Arc::new(ScriptedExecutor::new());
    let summary = scheduler(&store, executor.clone(), 4).tick().await;

    assert_eq!(summary.alerts_created, 1);
    assert_eq!(executor.call_count(), 0);

    let check = store.latest_check(svc.id).await.unwrap().unwrap();
    assert_eq!(check.status, ServiceStatus::Unknown);
    assert_eq!(
        check.error_message.as_deref(),
        Some("No data received from agent")
    );
}

#[tokio::test]
async fn test_push_host_fresh_and_stale_reports() {
    let store = memory_store();
    let host = push_host(&store, "edge-2", "tok-edge-2").await;
    let fresh = service(&store, &host, "fresh").await;
    let stale = service(&store, &host, "stale").await;

    let now = Utc::now();
    store
        .insert_check(NewServiceCheck::new(
            fresh.id,
            ServiceStatus::Running,
            now - chrono::Duration::seconds(10),
        ))
        .await
        .unwrap();
    let old = now - chrono::Duration::hours(2);
    store
        .insert_check(NewServiceCheck::new(stale.id, ServiceStatus::Running, old))
        .await
        .unwrap();

    let executor = Arc::new(ScriptedExecutor::new());
    let report = worker(&store, executor)
        .check_push(&host, &store.list_services(host.id).await.unwrap(), now)
        .await;

    assert_eq!(report.checks_written, 1);
    assert_eq!(report.alerts_created, 1);
    assert_eq!(store.check_history(fresh.id, 10).await.unwrap().len(), 1);

    let latest = store.latest_check(stale.id).await.unwrap().unwrap();
    assert_eq!(latest.status, ServiceStatus::Unknown);
    assert_eq!(
        latest.error_message.unwrap(),
        format!(
            "Agent not reporting (last seen: {})",
            old.format("%Y-%m-%d %H:%M:%S UTC")
        )
    );
}

#[tokio::test]
async fn test_silent_push_host_goes_idle() {
    let store = memory_store();
    let silent = push_host(&store, "silent", "tok-silent").await;
    let chatty = push_host(&store, "chatty", "tok-chatty").await;

    let now = Utc::now();
    store
        .record_report(silent.id, now - chrono::Duration::minutes(10))
        .await
        .unwrap();
    store.record_report(chatty.id, now).await.unwrap();

    let summary = scheduler(&store, Arc::new(ScriptedExecutor::new()), 4)
        .tick()
        .await;

    assert_eq!(summary.hosts_idled, 1);
    assert_eq!(
        store.get_host(silent.id).await.unwrap().unwrap().connection_status,
        ConnectionStatus::Idle
    );
    assert_eq!(
        store.get_host(chatty.id).await.unwrap().unwrap().connection_status,
        ConnectionStatus::Connected
    );
}

#[tokio::test]
async fn test_running_scheduler_ticks_on_demand_and_shuts_down() {
    let store = memory_store();
    let host = pull_host(&store, "web-3", "10.0.0.6").await;
    let svc = service(&store, &host, "nginx").await;

    let handle = SchedulerHandle::spawn(scheduler(&store, Arc::new(healthy_linux()), 2));

    let summary = handle.tick_now().await.unwrap();
    assert_eq!(summary.hosts_checked, 1);
    assert_eq!(summary.checks_written, 1);

    handle.shutdown().await.unwrap();
    assert!(handle.tick_now().await.is_err());
    assert!(!store.check_history(svc.id, 10).await.unwrap().is_empty());
}
