//! Push-mode report ingestion
//!
//! Agents post batches of service states with their host token. The
//! ingestor resolves the token, registers service names it has never seen,
//! writes one check per entry and marks the host `connected`. It never
//! alerts; the scheduler's staleness pass owns alerting for push hosts.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::models::{
    Host, HostId, MonitoringMode, NewService, NewServiceCheck, Service, ServiceStatus,
};
use crate::storage::{StorageError, Store};

/// Batch report sent by an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentReport {
    pub token: String,
    #[serde(default)]
    pub services: Vec<ServiceReport>,
}

/// One service entry of an [`AgentReport`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceReport {
    pub name: String,
    pub status: ServiceStatus,

    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_kb: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime_seconds: Option<u64>,
}

impl ServiceReport {
    pub fn new(name: impl Into<String>, status: ServiceStatus) -> Self {
        Self {
            name: name.into(),
            status,
            error_message: None,
            pid: None,
            memory_kb: None,
            cpu_percent: None,
            uptime_seconds: None,
        }
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

/// Enabled services of a host, as served to its agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceList {
    pub server_id: HostId,
    pub services: Vec<Service>,
}

/// What one accepted report changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReceipt {
    pub host_id: HostId,
    pub checks_written: usize,
    pub services_created: usize,
}

#[derive(Debug)]
pub enum IngestError {
    /// No host owns the presented token
    Unauthorized,

    /// Storage failed before the report could be attributed to a host
    Storage(StorageError),
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::Unauthorized => write!(f, "invalid token"),
            IngestError::Storage(err) => write!(f, "storage error: {}", err),
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IngestError::Storage(err) => Some(err),
            IngestError::Unauthorized => None,
        }
    }
}

impl From<StorageError> for IngestError {
    fn from(err: StorageError) -> Self {
        IngestError::Storage(err)
    }
}

/// Accepts agent reports and serves agent service lists
#[derive(Clone)]
pub struct PushIngestor {
    store: Store,
}

impl PushIngestor {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Resolve a token to its push-mode host; nothing is written on failure
    pub async fn authenticate(&self, token: &str) -> Result<Host, IngestError> {
        if token.is_empty() {
            return Err(IngestError::Unauthorized);
        }

        match self.store.find_host_by_token(token).await? {
            Some(host) if host.mode == MonitoringMode::Push => Ok(host),
            Some(host) => {
                warn!("rejecting agent token of {} host {}", host.mode, host.name);
                Err(IngestError::Unauthorized)
            }
            None => Err(IngestError::Unauthorized),
        }
    }

    /// Store one agent report
    ///
    /// Per-entry failures are logged and skipped; the host is still marked
    /// as seen.
    #[instrument(skip_all, fields(services = report.services.len()))]
    pub async fn ingest(&self, report: AgentReport) -> Result<IngestReceipt, IngestError> {
        let host = self.authenticate(&report.token).await?;
        let now = Utc::now();

        let mut receipt = IngestReceipt {
            host_id: host.id,
            checks_written: 0,
            services_created: 0,
        };

        for entry in report.services {
            let (service, created) = match self.resolve_service(&host, &entry.name).await {
                Ok(resolved) => resolved,
                Err(e) => {
                    warn!("failed to resolve service {}: {}", entry.name, e);
                    continue;
                }
            };
            if created {
                receipt.services_created += 1;
            }

            let check = NewServiceCheck {
                service_id: service.id,
                status: entry.status,
                response_time_ms: None,
                error_message: entry.error_message,
                pid: entry.pid,
                memory_kb: entry.memory_kb,
                cpu_percent: entry.cpu_percent,
                uptime_seconds: entry.uptime_seconds,
                checked_at: now,
            };

            match self.store.insert_check(check).await {
                Ok(_) => receipt.checks_written += 1,
                Err(e) => warn!("failed to save check for {}: {}", entry.name, e),
            }
        }

        if let Err(e) = self.store.record_report(host.id, now).await {
            warn!("failed to update host {}: {}", host.name, e);
        }

        debug!(
            "report from {}: {} checks, {} new services",
            host.name, receipt.checks_written, receipt.services_created
        );
        Ok(receipt)
    }

    /// Find `(host, name)` or create it enabled, display name = name
    async fn resolve_service(
        &self,
        host: &Host,
        name: &str,
    ) -> Result<(Service, bool), StorageError> {
        if let Some(service) = self.store.find_service(host.id, name).await? {
            return Ok((service, false));
        }

        match self
            .store
            .create_service(NewService::named(host.id, name))
            .await
        {
            Ok(service) => {
                info!("auto-registered service {} on {}", name, host.name);
                Ok((service, true))
            }
            // a concurrent report created it first
            Err(StorageError::Conflict(_)) => self
                .store
                .find_service(host.id, name)
                .await?
                .map(|service| (service, false))
                .ok_or_else(|| StorageError::NotFound(format!("service {name}"))),
            Err(e) => Err(e),
        }
    }

    /// Enabled services the agent with `token` should probe
    pub async fn enabled_services(&self, token: &str) -> Result<ServiceList, IngestError> {
        let host = self.authenticate(token).await?;
        let services = self
            .store
            .list_services(host.id)
            .await?
            .into_iter()
            .filter(|s| s.enabled)
            .collect();

        Ok(ServiceList {
            server_id: host.id,
            services,
        })
    }
}
