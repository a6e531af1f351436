//! In-memory storage backend (no persistence)
//!
//! Keeps every entity in process memory behind a single `RwLock`.
//! It's useful for:
//! - Testing without database dependencies
//! - Running the hub with `"backend": "none"`
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart
//! - **Unbounded history**: checks are only removed by `prune_checks`

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::models::{
    Alert, ConnectionStatus, Host, HostId, NewAlert, NewHost, NewService, NewServiceCheck,
    Service, ServiceCheck, ServiceId,
};

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};

#[derive(Debug, Default)]
struct MemoryState {
    hosts: Vec<Host>,
    services: Vec<Service>,
    checks: Vec<ServiceCheck>,
    alerts: Vec<Alert>,
    next_host_id: i64,
    next_service_id: i64,
    next_check_id: i64,
    next_alert_id: i64,
}

impl MemoryState {
    fn host_mut(&mut self, id: HostId) -> StorageResult<&mut Host> {
        self.hosts
            .iter_mut()
            .find(|host| host.id == id)
            .ok_or_else(|| StorageError::NotFound(format!("host {id}")))
    }

    fn next_id(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }
}

/// In-memory storage backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: RwLock<MemoryState>,
}

impl MemoryBackend {
    /// Create a new in-memory backend
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn create_host(&self, host: NewHost) -> StorageResult<Host> {
        let mut state = self.state.write().await;

        if state.hosts.iter().any(|existing| existing.name == host.name) {
            return Err(StorageError::Conflict(format!(
                "host '{}' already exists",
                host.name
            )));
        }
        if host.agent_token.is_some()
            && state
                .hosts
                .iter()
                .any(|existing| existing.agent_token == host.agent_token)
        {
            return Err(StorageError::Conflict(format!(
                "agent token of host '{}' is already in use",
                host.name
            )));
        }

        let id = MemoryState::next_id(&mut state.next_host_id);
        let host = Host {
            id,
            name: host.name,
            address: host.address,
            port: host.port,
            os: host.os,
            mode: host.mode,
            ssh_user: host.ssh_user,
            ssh_key_path: host.ssh_key_path,
            jump_hosts: host.jump_hosts,
            agent_token: host.agent_token,
            check_interval_secs: host.check_interval_secs,
            connection_status: ConnectionStatus::NotConnected,
            enabled: host.enabled,
            last_seen: None,
            created_at: Utc::now(),
        };

        state.hosts.push(host.clone());
        Ok(host)
    }

    async fn get_host(&self, id: HostId) -> StorageResult<Option<Host>> {
        let state = self.state.read().await;
        Ok(state.hosts.iter().find(|host| host.id == id).cloned())
    }

    async fn find_host_by_name(&self, name: &str) -> StorageResult<Option<Host>> {
        let state = self.state.read().await;
        Ok(state.hosts.iter().find(|host| host.name == name).cloned())
    }

    async fn find_host_by_token(&self, token: &str) -> StorageResult<Option<Host>> {
        let state = self.state.read().await;
        Ok(state
            .hosts
            .iter()
            .find(|host| host.agent_token.as_deref() == Some(token))
            .cloned())
    }

    async fn list_hosts(&self) -> StorageResult<Vec<Host>> {
        Ok(self.state.read().await.hosts.clone())
    }

    async fn touch_host(&self, id: HostId, at: DateTime<Utc>) -> StorageResult<()> {
        let mut state = self.state.write().await;
        state.host_mut(id)?.last_seen = Some(at);
        Ok(())
    }

    async fn record_report(&self, id: HostId, at: DateTime<Utc>) -> StorageResult<()> {
        let mut state = self.state.write().await;
        let host = state.host_mut(id)?;
        host.last_seen = Some(at);
        host.connection_status = ConnectionStatus::Connected;
        Ok(())
    }

    async fn set_connection_status(
        &self,
        id: HostId,
        status: ConnectionStatus,
    ) -> StorageResult<()> {
        let mut state = self.state.write().await;
        state.host_mut(id)?.connection_status = status;
        Ok(())
    }

    async fn mark_idle_if_stale(&self, id: HostId, cutoff: DateTime<Utc>) -> StorageResult<bool> {
        let mut state = self.state.write().await;
        let host = state.host_mut(id)?;

        let stale = host.connection_status == ConnectionStatus::Connected
            && host.last_seen.is_some_and(|seen| seen < cutoff);
        if stale {
            host.connection_status = ConnectionStatus::Idle;
        }
        Ok(stale)
    }

    async fn delete_host(&self, id: HostId) -> StorageResult<()> {
        let mut state = self.state.write().await;

        let service_ids: Vec<ServiceId> = state
            .services
            .iter()
            .filter(|service| service.host_id == id)
            .map(|service| service.id)
            .collect();

        state.hosts.retain(|host| host.id != id);
        state.services.retain(|service| service.host_id != id);
        state
            .checks
            .retain(|check| !service_ids.contains(&check.service_id));
        state.alerts.retain(|alert| alert.host_id != id);

        debug!("deleted host {id} with {} services", service_ids.len());
        Ok(())
    }

    async fn create_service(&self, service: NewService) -> StorageResult<Service> {
        let mut state = self.state.write().await;

        if !state.hosts.iter().any(|host| host.id == service.host_id) {
            return Err(StorageError::NotFound(format!("host {}", service.host_id)));
        }
        if state
            .services
            .iter()
            .any(|existing| existing.host_id == service.host_id && existing.name == service.name)
        {
            return Err(StorageError::Conflict(format!(
                "service '{}' already exists on host {}",
                service.name, service.host_id
            )));
        }

        let id = MemoryState::next_id(&mut state.next_service_id);
        let service = Service {
            id,
            host_id: service.host_id,
            name: service.name,
            display_name: service.display_name,
            description: service.description,
            enabled: service.enabled,
            created_at: Utc::now(),
        };

        state.services.push(service.clone());
        Ok(service)
    }

    async fn list_services(&self, host_id: HostId) -> StorageResult<Vec<Service>> {
        let state = self.state.read().await;
        Ok(state
            .services
            .iter()
            .filter(|service| service.host_id == host_id)
            .cloned()
            .collect())
    }

    async fn find_service(&self, host_id: HostId, name: &str) -> StorageResult<Option<Service>> {
        let state = self.state.read().await;
        Ok(state
            .services
            .iter()
            .find(|service| service.host_id == host_id && service.name == name)
            .cloned())
    }

    async fn insert_check(&self, check: NewServiceCheck) -> StorageResult<ServiceCheck> {
        let mut state = self.state.write().await;

        if !state
            .services
            .iter()
            .any(|service| service.id == check.service_id)
        {
            return Err(StorageError::NotFound(format!(
                "service {}",
                check.service_id
            )));
        }

        let id = MemoryState::next_id(&mut state.next_check_id);
        let check = check.into_check(id);
        state.checks.push(check.clone());
        Ok(check)
    }

    async fn latest_check(&self, service_id: ServiceId) -> StorageResult<Option<ServiceCheck>> {
        let state = self.state.read().await;
        Ok(state
            .checks
            .iter()
            .filter(|check| check.service_id == service_id)
            .max_by_key(|check| (check.checked_at, check.id))
            .cloned())
    }

    async fn check_history(
        &self,
        service_id: ServiceId,
        limit: usize,
    ) -> StorageResult<Vec<ServiceCheck>> {
        let state = self.state.read().await;
        let mut history: Vec<ServiceCheck> = state
            .checks
            .iter()
            .filter(|check| check.service_id == service_id)
            .cloned()
            .collect();

        history.sort_by(|a, b| (b.checked_at, b.id).cmp(&(a.checked_at, a.id)));
        history.truncate(limit);
        Ok(history)
    }

    async fn prune_checks(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let mut state = self.state.write().await;
        let count = state.checks.len();
        state.checks.retain(|check| check.checked_at >= before);
        Ok(count - state.checks.len())
    }

    async fn create_alert(&self, alert: NewAlert) -> StorageResult<Alert> {
        let mut state = self.state.write().await;

        if !state
            .services
            .iter()
            .any(|s| s.id == alert.service_id && s.host_id == alert.host_id)
        {
            return Err(StorageError::NotFound(format!(
                "service {} on host {}",
                alert.service_id, alert.host_id
            )));
        }

        let id = MemoryState::next_id(&mut state.next_alert_id);
        let alert = alert.into_alert(id);
        state.alerts.push(alert.clone());
        Ok(alert)
    }

    async fn recent_alerts(&self, limit: usize) -> StorageResult<Vec<Alert>> {
        let state = self.state.read().await;
        Ok(state.alerts.iter().rev().take(limit).cloned().collect())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let state = self.state.read().await;
        Ok(HealthStatus {
            healthy: true,
            message: "In-memory storage operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("hosts".to_string(), state.hosts.len().to_string()),
                ("checks".to_string(), state.checks.len().to_string()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend (no-op)");
        Ok(())
    }
}
