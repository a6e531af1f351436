//! Helper functions for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use service_sentinel::{
    alerts::{AlertGenerator, CooldownTracker},
    models::{Host, MonitoringMode, NewHost, NewService, Service},
    remote::{PullChecker, mock::ScriptedExecutor},
    scheduler::{DEFAULT_CHECK_INTERVAL, HostWorker, Scheduler},
    storage::{MemoryBackend, StorageBackend, Store},
};
use tokio_util::sync::CancellationToken;

pub fn memory_store() -> Store {
    Arc::new(MemoryBackend::new())
}

/// Executor for a healthy Linux host running every service
pub fn healthy_linux() -> ScriptedExecutor {
    ScriptedExecutor::new()
        .respond("is-active", "active\n")
        .respond("MainPID", "1234\n")
        .respond("ps -p", "  20480  1.5\n")
        .respond("ActiveEnterTimestamp", "@0\n")
}

pub async fn pull_host(store: &Store, name: &str, address: &str) -> Host {
    store
        .create_host(
            NewHost::new(name, address, "linux", MonitoringMode::Pull)
                .with_ssh("monitor", Some("/keys/id_ed25519".to_string())),
        )
        .await
        .unwrap()
}

pub async fn push_host(store: &Store, name: &str, token: &str) -> Host {
    store
        .create_host(NewHost::new(name, "10.0.0.50", "linux", MonitoringMode::Push).with_token(token))
        .await
        .unwrap()
}

pub async fn service(store: &Store, host: &Host, name: &str) -> Service {
    store
        .create_service(NewService::named(host.id, name))
        .await
        .unwrap()
}

pub fn worker(store: &Store, executor: Arc<ScriptedExecutor>) -> HostWorker {
    worker_with_cooldowns(store, executor, Arc::new(CooldownTracker::default()))
}

pub fn worker_with_cooldowns(
    store: &Store,
    executor: Arc<ScriptedExecutor>,
    cooldowns: Arc<CooldownTracker>,
) -> HostWorker {
    HostWorker::new(
        store.clone(),
        PullChecker::new(executor),
        AlertGenerator::new(store.clone(), cooldowns),
        DEFAULT_CHECK_INTERVAL,
    )
}

pub fn scheduler(store: &Store, executor: Arc<ScriptedExecutor>, max_workers: usize) -> Scheduler {
    Scheduler::new(
        store.clone(),
        worker(store, executor),
        max_workers,
        Duration::from_secs(3600),
        CancellationToken::new(),
    )
}
