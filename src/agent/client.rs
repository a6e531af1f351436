//! HTTP client for the hub's agent endpoints

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::ingest::AgentReport;

#[derive(Debug, Deserialize)]
struct ServiceListResponse {
    services: Vec<ServiceEntry>,
}

#[derive(Debug, Deserialize)]
struct ServiceEntry {
    name: String,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct HubClient {
    client: Client,
    base_url: String,
    token: String,
}

impl HubClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Names of the services the hub wants this agent to probe
    #[instrument(skip(self))]
    pub async fn fetch_services(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/agent/services", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("token", self.token.as_str())])
            .send()
            .await
            .with_context(|| format!("{url}: request failed"))?
            .error_for_status()
            .with_context(|| format!("{url}: hub rejected request"))?;

        let list: ServiceListResponse = response
            .json()
            .await
            .with_context(|| format!("{url}: invalid service list"))?;

        let names: Vec<String> = list
            .services
            .into_iter()
            .filter(|s| s.enabled)
            .map(|s| s.name)
            .collect();
        debug!("hub lists {} services", names.len());
        Ok(names)
    }

    /// Post one batch report
    #[instrument(skip_all, fields(services = report.services.len()))]
    pub async fn send_report(&self, report: &AgentReport) -> Result<()> {
        let url = format!("{}/api/agent/report", self.base_url);

        self.client
            .post(&url)
            .json(report)
            .send()
            .await
            .with_context(|| format!("{url}: request failed"))?
            .error_for_status()
            .with_context(|| format!("{url}: hub rejected report"))?;

        Ok(())
    }
}
