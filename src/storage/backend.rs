//! Storage backend trait definition
//!
//! This module defines the core `StorageBackend` trait that all
//! storage implementations must implement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    Alert, ConnectionStatus, Host, HostId, NewAlert, NewHost, NewService, NewServiceCheck,
    Service, ServiceCheck, ServiceId,
};

use super::error::StorageResult;

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: std::collections::HashMap<String, String>,
}

/// Trait for persistent storage backends
///
/// The monitoring core owns no entity state across ticks; every host,
/// service, check and alert is read from and written through this trait.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync` as they are shared by the
/// scheduler's concurrent host checks and the HTTP handlers.
///
/// ## Identity
///
/// All `create_*`/`insert_*` methods assign the id atomically and return
/// the stored entity.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    // ========================================================================
    // Hosts
    // ========================================================================

    /// Create a host. Fails with `Conflict` if the name or agent token is taken.
    ///
    /// New hosts start as `not_connected` with no `last_seen`.
    async fn create_host(&self, host: NewHost) -> StorageResult<Host>;

    async fn get_host(&self, id: HostId) -> StorageResult<Option<Host>>;

    async fn find_host_by_name(&self, name: &str) -> StorageResult<Option<Host>>;

    /// Resolve an agent token to its host
    async fn find_host_by_token(&self, token: &str) -> StorageResult<Option<Host>>;

    /// All hosts, enabled or not, ordered by id
    async fn list_hosts(&self) -> StorageResult<Vec<Host>>;

    /// Set `last_seen` without touching the connection status
    async fn touch_host(&self, id: HostId, at: DateTime<Utc>) -> StorageResult<()>;

    /// Set `last_seen` and move the host to `connected` in one write
    async fn record_report(&self, id: HostId, at: DateTime<Utc>) -> StorageResult<()>;

    async fn set_connection_status(
        &self,
        id: HostId,
        status: ConnectionStatus,
    ) -> StorageResult<()>;

    /// Move a `connected` host to `idle` if its `last_seen` is before `cutoff`
    ///
    /// The condition and the write happen atomically so a report arriving
    /// concurrently is never overwritten. Returns whether the host moved.
    async fn mark_idle_if_stale(&self, id: HostId, cutoff: DateTime<Utc>) -> StorageResult<bool>;

    /// Delete a host together with its services, checks and alerts
    async fn delete_host(&self, id: HostId) -> StorageResult<()>;

    // ========================================================================
    // Services
    // ========================================================================

    /// Create a service. Fails with `Conflict` if `(host_id, name)` exists.
    async fn create_service(&self, service: NewService) -> StorageResult<Service>;

    /// All services of a host, ordered by id
    async fn list_services(&self, host_id: HostId) -> StorageResult<Vec<Service>>;

    async fn find_service(&self, host_id: HostId, name: &str) -> StorageResult<Option<Service>>;

    // ========================================================================
    // Service checks
    // ========================================================================

    /// Append one check to a service's history
    async fn insert_check(&self, check: NewServiceCheck) -> StorageResult<ServiceCheck>;

    /// The check with the newest `checked_at` for a service
    async fn latest_check(&self, service_id: ServiceId) -> StorageResult<Option<ServiceCheck>>;

    /// Up to `limit` checks for a service, newest first
    async fn check_history(
        &self,
        service_id: ServiceId,
        limit: usize,
    ) -> StorageResult<Vec<ServiceCheck>>;

    /// Delete checks older than `before`. Returns the number deleted.
    async fn prune_checks(&self, before: DateTime<Utc>) -> StorageResult<usize>;

    // ========================================================================
    // Alerts
    // ========================================================================

    async fn create_alert(&self, alert: NewAlert) -> StorageResult<Alert>;

    /// Up to `limit` alerts, newest first
    async fn recent_alerts(&self, limit: usize) -> StorageResult<Vec<Alert>>;

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Check backend health
    ///
    /// Performs a lightweight operation to verify the backend
    /// is operational (e.g., ping database, check file access).
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
