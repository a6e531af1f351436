//! Configuration for the remote collector

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Agent configuration, read from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Hub base URL, e.g. `http://hub:8080`
    pub server_url: String,

    /// Token of the host this agent runs on
    pub token: String,

    /// Seconds between two reports (default: 30)
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// Seconds between two service list refreshes (default: 300)
    #[serde(default = "default_service_refresh")]
    pub service_refresh_secs: u64,

    /// HTTP timeout for hub requests (default: 10)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Local command timeout (default: 30)
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Services to probe when the first list fetch fails
    #[serde(default)]
    pub services: Vec<String>,
}

fn default_check_interval() -> u64 {
    30
}

fn default_service_refresh() -> u64 {
    300
}

fn default_request_timeout() -> u64 {
    10
}

fn default_command_timeout() -> u64 {
    30
}

impl AgentConfig {
    /// Default location: `<config dir>/sentinel/agent.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sentinel").join("agent.toml"))
    }

    /// Load from `path`, or from [`AgentConfig::default_path`]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path().context("no config path given and no config dir")?,
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content)?;
        config.server_url = config.server_url.trim_end_matches('/').to_string();
        Ok(config)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(1))
    }

    pub fn service_refresh(&self) -> Duration {
        Duration::from_secs(self.service_refresh_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs.max(1))
    }
}
