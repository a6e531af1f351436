use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::trace;

use crate::models::{JumpHost, MonitoringMode};

/// Storage backend configuration
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./sentinel.db")
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct HubConfig {
    #[serde(default)]
    pub monitoring: MonitoringConfig,

    /// Storage configuration (defaults to SQLite at `./sentinel.db`)
    pub storage: Option<StorageConfig>,

    #[serde(default)]
    pub api: ApiConfig,

    /// Hosts created on start-up when missing
    #[serde(default)]
    pub hosts: Vec<HostDefinition>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct MonitoringConfig {
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    #[serde(default = "default_alert_cooldown")]
    pub alert_cooldown_secs: u64,

    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Checks older than this are deleted once a day
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            alert_cooldown_secs: default_alert_cooldown(),
            max_workers: default_max_workers(),
            command_timeout_secs: default_command_timeout(),
            retention_days: default_retention_days(),
        }
    }
}

impl MonitoringConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(1))
    }

    pub fn alert_cooldown(&self) -> Duration {
        Duration::from_secs(self.alert_cooldown_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs.max(1))
    }

    /// Checks recorded before this instant are pruned. `None` when the
    /// retention window reaches past the earliest representable time.
    pub fn retention_cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        chrono::Duration::try_days(i64::from(self.retention_days))
            .and_then(|window| now.checked_sub_signed(window))
    }
}

fn default_check_interval() -> u64 {
    30
}

fn default_alert_cooldown() -> u64 {
    300
}

fn default_max_workers() -> usize {
    10
}

fn default_command_timeout() -> u64 {
    30
}

fn default_retention_days() -> u32 {
    30
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct ApiConfig {
    #[serde(default = "crate::util::get_default_bind")]
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: crate::util::get_default_bind(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct HostDefinition {
    pub name: String,
    pub address: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default = "default_os")]
    pub os: String,
    #[serde(default = "default_mode")]
    pub mode: MonitoringMode,
    pub ssh_user: Option<String>,
    pub ssh_key_path: Option<String>,
    #[serde(default)]
    pub jump_hosts: Vec<JumpHost>,
    pub agent_token: Option<String>,
    pub check_interval_secs: Option<u64>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub services: Vec<ServiceDefinition>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct ServiceDefinition {
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_os() -> String {
    String::from("linux")
}

fn default_mode() -> MonitoringMode {
    MonitoringMode::Pull
}

fn default_enabled() -> bool {
    true
}

pub fn parse_config(content: &str) -> anyhow::Result<HubConfig> {
    serde_json::from_str(content)
        .context("Invalid configuration file provided!")
        .inspect(|config| trace!("loaded config: {config:?}"))
}

pub fn read_config_file(path: &str) -> anyhow::Result<HubConfig> {
    let file_content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    parse_config(&file_content)
}
