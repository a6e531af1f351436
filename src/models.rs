//! Domain entities shared by the scheduler, the ingestion path and storage
//!
//! ## Entities
//!
//! - **Host**: a monitored machine, checked either by SSH (pull/hybrid) or by
//!   its own agent reports (push)
//! - **Service**: one OS-level unit on one host, unique by `(host_id, name)`
//! - **ServiceCheck**: one immutable point-in-time observation of a service
//! - **Alert**: one notification event created by the alert generator
//!
//! `New*` structs are the insert shapes; storage assigns ids and returns the
//! full entity.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type HostId = i64;
pub type ServiceId = i64;
pub type CheckId = i64;
pub type AlertId = i64;

/// How a host's services are observed. Chosen at creation, never changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitoringMode {
    /// The hub runs commands on the host over SSH
    Pull,

    /// The host's agent reports to the hub
    Push,

    /// Currently checked exactly like `Pull`
    Hybrid,
}

impl MonitoringMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitoringMode::Pull => "pull",
            MonitoringMode::Push => "push",
            MonitoringMode::Hybrid => "hybrid",
        }
    }
}

/// Normalized service status. This is the whole vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Running,
    Stopped,
    Failed,
    Degraded,
    Unknown,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Running => "running",
            ServiceStatus::Stopped => "stopped",
            ServiceStatus::Failed => "failed",
            ServiceStatus::Degraded => "degraded",
            ServiceStatus::Unknown => "unknown",
        }
    }
}

/// Liveness of a host, independent of any single service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Never reported
    NotConnected,

    /// Reported recently
    Connected,

    /// Push host that stopped reporting for longer than the idle threshold
    Idle,

    /// Disconnected by an operator
    Disconnected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::NotConnected => "not_connected",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Idle => "idle",
            ConnectionStatus::Disconnected => "disconnected",
        }
    }
}

/// Error returned when a stored enum label is not recognized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLabel {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownLabel {}

macro_rules! label_enum {
    ($ty:ident, $kind:literal, { $($label:literal => $variant:ident),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = UnknownLabel;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok($ty::$variant),)+
                    other => Err(UnknownLabel {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

label_enum!(MonitoringMode, "monitoring mode", {
    "pull" => Pull,
    "push" => Push,
    "hybrid" => Hybrid,
});

label_enum!(ServiceStatus, "service status", {
    "running" => Running,
    "stopped" => Stopped,
    "failed" => Failed,
    "degraded" => Degraded,
    "unknown" => Unknown,
});

label_enum!(ConnectionStatus, "connection status", {
    "not_connected" => NotConnected,
    "connected" => Connected,
    "idle" => Idle,
    "disconnected" => Disconnected,
});

/// One hop of an SSH jump chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JumpHost {
    pub host: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<String>,
}

impl JumpHost {
    /// `[user@]host[:port]`, the form ssh's `-J` expects
    pub fn spec(&self) -> String {
        let mut spec = match &self.user {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        };
        if let Some(port) = self.port {
            spec.push_str(&format!(":{port}"));
        }
        spec
    }
}

/// A monitored machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub id: HostId,
    pub name: String,
    pub address: String,
    pub port: u16,

    /// Operating-system family label (`linux`, `windows`, ...)
    pub os: String,
    pub mode: MonitoringMode,

    pub ssh_user: Option<String>,
    pub ssh_key_path: Option<String>,
    pub jump_hosts: Vec<JumpHost>,

    /// Bearer token the host's agent presents in push mode
    #[serde(skip_serializing)]
    pub agent_token: Option<String>,

    /// Per-host check interval override in seconds
    pub check_interval_secs: Option<u64>,

    pub connection_status: ConnectionStatus,
    pub enabled: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Host {
    /// The interval this host is expected to be checked or report at
    pub fn effective_interval(&self, default: std::time::Duration) -> std::time::Duration {
        self.check_interval_secs
            .filter(|secs| *secs > 0)
            .map(std::time::Duration::from_secs)
            .unwrap_or(default)
    }
}

/// Insert shape for [`Host`]
#[derive(Debug, Clone, PartialEq)]
pub struct NewHost {
    pub name: String,
    pub address: String,
    pub port: u16,
    pub os: String,
    pub mode: MonitoringMode,
    pub ssh_user: Option<String>,
    pub ssh_key_path: Option<String>,
    pub jump_hosts: Vec<JumpHost>,
    pub agent_token: Option<String>,
    pub check_interval_secs: Option<u64>,
    pub enabled: bool,
}

impl NewHost {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        os: impl Into<String>,
        mode: MonitoringMode,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port: 22,
            os: os.into(),
            mode,
            ssh_user: None,
            ssh_key_path: None,
            jump_hosts: Vec::new(),
            agent_token: None,
            check_interval_secs: None,
            enabled: true,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.agent_token = Some(token.into());
        self
    }

    pub fn with_ssh(mut self, user: impl Into<String>, key_path: Option<String>) -> Self {
        self.ssh_user = Some(user.into());
        self.ssh_key_path = key_path;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// One named OS-level unit on one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    #[serde(rename = "server_id")]
    pub host_id: HostId,
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// Insert shape for [`Service`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewService {
    pub host_id: HostId,
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub enabled: bool,
}

impl NewService {
    /// Enabled service whose display name is its OS name
    pub fn named(host_id: HostId, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            host_id,
            display_name: name.clone(),
            name,
            description: None,
            enabled: true,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// One immutable observation of a service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCheck {
    pub id: CheckId,
    pub service_id: ServiceId,
    pub status: ServiceStatus,
    pub response_time_ms: Option<u64>,
    pub error_message: Option<String>,
    pub pid: Option<u32>,
    pub memory_kb: Option<u64>,
    pub cpu_percent: Option<f64>,
    pub uptime_seconds: Option<u64>,
    pub checked_at: DateTime<Utc>,
}

/// Insert shape for [`ServiceCheck`]
#[derive(Debug, Clone, PartialEq)]
pub struct NewServiceCheck {
    pub service_id: ServiceId,
    pub status: ServiceStatus,
    pub response_time_ms: Option<u64>,
    pub error_message: Option<String>,
    pub pid: Option<u32>,
    pub memory_kb: Option<u64>,
    pub cpu_percent: Option<f64>,
    pub uptime_seconds: Option<u64>,
    pub checked_at: DateTime<Utc>,
}

impl NewServiceCheck {
    pub fn new(service_id: ServiceId, status: ServiceStatus, checked_at: DateTime<Utc>) -> Self {
        Self {
            service_id,
            status,
            response_time_ms: None,
            error_message: None,
            pid: None,
            memory_kb: None,
            cpu_percent: None,
            uptime_seconds: None,
            checked_at,
        }
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn into_check(self, id: CheckId) -> ServiceCheck {
        ServiceCheck {
            id,
            service_id: self.service_id,
            status: self.status,
            response_time_ms: self.response_time_ms,
            error_message: self.error_message,
            pid: self.pid,
            memory_kb: self.memory_kb,
            cpu_percent: self.cpu_percent,
            uptime_seconds: self.uptime_seconds,
            checked_at: self.checked_at,
        }
    }
}

/// One notification event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub service_id: ServiceId,
    #[serde(rename = "server_id")]
    pub host_id: HostId,
    pub status: ServiceStatus,
    pub message: String,
    pub sent_via: String,
    pub acknowledged: bool,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
}

/// Insert shape for [`Alert`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAlert {
    pub service_id: ServiceId,
    pub host_id: HostId,
    pub status: ServiceStatus,
    pub message: String,
    pub sent_via: String,
    pub created_at: DateTime<Utc>,
}

impl NewAlert {
    pub fn into_alert(self, id: AlertId) -> Alert {
        Alert {
            id,
            service_id: self.service_id,
            host_id: self.host_id,
            status: self.status,
            message: self.message,
            sent_via: self.sent_via,
            acknowledged: false,
            archived: false,
            created_at: self.created_at,
            acknowledged_at: None,
            archived_at: None,
        }
    }
}
