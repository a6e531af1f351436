//! Integration tests for alert cooldowns across host checks
//!
//! These tests verify that:
//! - Cooldowns are shared by every worker using the same tracker
//! - Concurrent failures of one pair produce a single alert
//! - Recovery does not reset the cooldown

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pretty_assertions::assert_eq;
use service_sentinel::{
    alerts::{AlertGenerator, CooldownTracker},
    models::{NewServiceCheck, ServiceStatus},
    remote::mock::ScriptedExecutor,
    storage::StorageBackend,
};
use tokio_test::assert_ok;

use crate::helpers::*;

#[tokio::test]
async fn test_concurrent_host_checks_share_one_cooldown() {
    let store = memory_store();
    let host = pull_host(&store, "web-1", "10.0.0.1").await;
    service(&store, &host, "nginx").await;

    let cooldowns = Arc::new(CooldownTracker::default());
    let executor = Arc::new(ScriptedExecutor::new().respond("is-active", "failed\n"));

    let mut tasks = Vec::new();
    for _ in 0..6 {
        let worker = worker_with_cooldowns(&store, executor.clone(), cooldowns.clone());
        let host = host.clone();
        tasks.push(tokio::spawn(async move { worker.check_host(&host).await }));
    }

    let mut alerts_created = 0;
    for task in tasks {
        alerts_created += task.await.unwrap().alerts_created;
    }

    assert_eq!(alerts_created, 1);
    assert_eq!(store.recent_alerts(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_alert_spacing_follows_window() {
    let store = memory_store();
    let host = pull_host(&store, "web-2", "10.0.0.2").await;
    let nginx = service(&store, &host, "nginx").await;

    let generator = AlertGenerator::new(
        store.clone(),
        Arc::new(CooldownTracker::new(Duration::from_secs(60))),
    );
    let start = Utc::now();

    let mut created = Vec::new();
    for offset in [0, 20, 59, 60, 90, 121] {
        let at = start + chrono::Duration::seconds(offset);
        let check = assert_ok!(
            store
                .insert_check(NewServiceCheck::new(nginx.id, ServiceStatus::Stopped, at))
                .await
        );
        if let Some(alert) = assert_ok!(generator.evaluate_at(&host, &nginx, &check, at).await) {
            created.push(alert.created_at);
        }
    }

    assert_eq!(
        created,
        vec![
            start,
            start + chrono::Duration::seconds(60),
            start + chrono::Duration::seconds(121),
        ]
    );
}

#[tokio::test]
async fn test_recovery_keeps_cooldown() {
    let store = memory_store();
    let host = pull_host(&store, "web-3", "10.0.0.3").await;
    let nginx = service(&store, &host, "nginx").await;

    let generator = AlertGenerator::new(store.clone(), Arc::new(CooldownTracker::default()));
    let now = Utc::now();

    let down = NewServiceCheck::new(nginx.id, ServiceStatus::Stopped, now).into_check(1);
    let up = NewServiceCheck::new(nginx.id, ServiceStatus::Running, now).into_check(2);

    assert!(generator.evaluate_at(&host, &nginx, &down, now).await.unwrap().is_some());
    assert!(generator.evaluate_at(&host, &nginx, &up, now).await.unwrap().is_none());

    let later = now + chrono::Duration::seconds(30);
    assert!(
        generator
            .evaluate_at(&host, &nginx, &down, later)
            .await
            .unwrap()
            .is_none()
    );
    assert_eq!(
        generator.cooldowns().last_alert(host.id, nginx.id).await,
        Some(now)
    );
}
