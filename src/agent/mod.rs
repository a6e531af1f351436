//! Remote collector for push-mode hosts
//!
//! ## Loop
//!
//! ```text
//! start ─► fetch service list (fallback: configured list) ─► report
//!   ├── every check interval:   probe each service ─► POST /api/agent/report
//!   └── every refresh interval: GET /api/agent/services (keep last list on failure)
//! ```

pub mod client;
pub mod config;
pub mod probe;

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::ingest::AgentReport;
use crate::remote::interpreter::CommandRunner;

pub use client::HubClient;
pub use config::AgentConfig;
pub use probe::{LocalProbe, LocalShell};

pub struct Collector<R = LocalShell> {
    config: AgentConfig,
    client: HubClient,
    probe: LocalProbe<R>,
    services: Vec<String>,
}

impl Collector<LocalShell> {
    pub fn from_config(config: AgentConfig) -> anyhow::Result<Self> {
        let client = HubClient::new(&config.server_url, &config.token, config.request_timeout())?;
        let probe = LocalProbe::new(config.command_timeout());
        Ok(Self::new(config, client, probe))
    }
}

impl<R: CommandRunner> Collector<R> {
    pub fn new(config: AgentConfig, client: HubClient, probe: LocalProbe<R>) -> Self {
        Self {
            config,
            client,
            probe,
            services: Vec::new(),
        }
    }

    /// Services probed on the next report
    pub fn services(&self) -> &[String] {
        &self.services
    }

    /// Replace the service list with the hub's; keeps the old list on failure
    pub async fn refresh_services(&mut self) -> anyhow::Result<()> {
        let services = self.client.fetch_services().await?;
        if services != self.services {
            info!("service list updated: {} services", services.len());
        }
        self.services = services;
        Ok(())
    }

    /// First refresh; falls back to the configured list when it fails
    pub async fn initial_refresh(&mut self) {
        if let Err(e) = self.refresh_services().await {
            warn!("failed to fetch service list: {:#}", e);
            if self.config.services.is_empty() {
                warn!("no services to monitor, add them on the hub or in the config file");
            } else {
                info!(
                    "using {} services from config file",
                    self.config.services.len()
                );
                self.services = self.config.services.clone();
            }
        }
    }

    /// Probe every listed service and post one report
    #[instrument(skip(self), fields(services = self.services.len()))]
    pub async fn check_and_report(&self) -> anyhow::Result<usize> {
        if self.services.is_empty() {
            debug!("nothing to report");
            return Ok(0);
        }

        let mut report = AgentReport {
            token: self.client.token().to_string(),
            services: Vec::with_capacity(self.services.len()),
        };
        for name in &self.services {
            report.services.push(self.probe.probe(name).await);
        }

        self.client.send_report(&report).await?;
        debug!("reported {} services", report.services.len());
        Ok(report.services.len())
    }

    /// Run until `cancel` fires
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            "agent starting, hub {} (check every {:?}, refresh every {:?})",
            self.config.server_url,
            self.config.check_interval(),
            self.config.service_refresh()
        );

        self.initial_refresh().await;

        let mut check_ticker = interval(self.config.check_interval());
        check_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut refresh_ticker = interval(self.config.service_refresh());
        refresh_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the initial refresh already happened
        refresh_ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                _ = check_ticker.tick() => {
                    if let Err(e) = self.check_and_report().await {
                        error!("check failed: {:#}", e);
                    }
                }

                _ = refresh_ticker.tick() => {
                    if let Err(e) = self.refresh_services().await {
                        warn!("failed to refresh service list: {:#}", e);
                    }
                }
            }
        }

        info!("agent stopped");
    }
}
