//! Fixed-interval scheduler driving every host check
//!
//! ## Tick
//!
//! ```text
//! ticker ─► list hosts ─► idle sweep (all push hosts)
//!                     └─► per enabled host: acquire slot ─► spawn HostWorker::check_host
//!                                                                 │
//!                               pull/hybrid: ssh check ─► insert ─► alert
//!                               push:        staleness ─► insert ─► alert
//! ```
//!
//! Slots come from a semaphore sized by `max_workers`. Dispatch waits for a
//! free slot, so excess hosts are delayed, never dropped, and a slow tick
//! may overlap the next one. Cancelling the token stops dispatch; running
//! host checks finish on their own command timeouts.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::alerts::AlertGenerator;
use crate::models::{
    ConnectionStatus, Host, MonitoringMode, NewServiceCheck, Service, ServiceCheck, ServiceStatus,
};
use crate::remote::PullChecker;
use crate::storage::Store;

/// How long a connected push host may stay silent before it is `idle`
pub const IDLE_THRESHOLD: Duration = Duration::from_secs(5 * 60);

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

pub const DEFAULT_MAX_WORKERS: usize = 10;

/// What one host check wrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostReport {
    pub checks_written: usize,
    pub alerts_created: usize,
}

impl std::ops::AddAssign for HostReport {
    fn add_assign(&mut self, other: Self) {
        self.checks_written += other.checks_written;
        self.alerts_created += other.alerts_created;
    }
}

/// Totals for one complete tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub hosts_checked: usize,
    pub hosts_idled: usize,
    pub checks_written: usize,
    pub alerts_created: usize,
}

// ============================================================================
// Host worker
// ============================================================================

/// Checks all enabled services of one host
#[derive(Clone)]
pub struct HostWorker {
    store: Store,
    checker: PullChecker,
    alerts: AlertGenerator,
    interval: Duration,
}

impl HostWorker {
    pub fn new(
        store: Store,
        checker: PullChecker,
        alerts: AlertGenerator,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            checker,
            alerts,
            interval,
        }
    }

    /// Run the check path selected by the host's monitoring mode
    ///
    /// Never fails; every storage or transport error is logged and the
    /// remaining services are still checked.
    #[instrument(skip_all, fields(host = %host.name, mode = %host.mode))]
    pub async fn check_host(&self, host: &Host) -> HostReport {
        let services = match self.store.list_services(host.id).await {
            Ok(services) => services,
            Err(e) => {
                error!("failed to list services: {}", e);
                return HostReport::default();
            }
        };

        let services: Vec<Service> = services.into_iter().filter(|s| s.enabled).collect();

        let report = match host.mode {
            MonitoringMode::Pull | MonitoringMode::Hybrid => self.check_pull(host, &services).await,
            MonitoringMode::Push => self.check_push(host, &services, Utc::now()).await,
        };

        debug!(
            "host check done: {} checks, {} alerts",
            report.checks_written, report.alerts_created
        );
        report
    }

    async fn check_pull(&self, host: &Host, services: &[Service]) -> HostReport {
        let mut report = HostReport::default();

        for service in services {
            let check = self.checker.check(host, service).await;
            report += self.record(host, service, check).await;
        }

        if let Err(e) = self.store.touch_host(host.id, Utc::now()).await {
            warn!("failed to update last seen: {}", e);
        }

        report
    }

    /// Alert on services whose agent data is missing or stale
    ///
    /// Fresh reports are left alone; the host is never contacted.
    pub async fn check_push(
        &self,
        host: &Host,
        services: &[Service],
        now: DateTime<Utc>,
    ) -> HostReport {
        let mut report = HostReport::default();
        let stale_after = chrono::Duration::from_std(host.effective_interval(self.interval) * 2)
            .unwrap_or(chrono::Duration::MAX);

        for service in services {
            let latest = match self.store.latest_check(service.id).await {
                Ok(latest) => latest,
                Err(e) => {
                    warn!("failed to read latest check for {}: {}", service.name, e);
                    continue;
                }
            };

            let synthesized = match latest {
                None => NewServiceCheck::new(service.id, ServiceStatus::Unknown, now)
                    .with_error("No data received from agent"),
                Some(last) if now.signed_duration_since(last.checked_at) > stale_after => {
                    NewServiceCheck::new(service.id, ServiceStatus::Unknown, now).with_error(
                        format!(
                            "Agent not reporting (last seen: {})",
                            last.checked_at.format("%Y-%m-%d %H:%M:%S UTC")
                        ),
                    )
                }
                Some(_) => {
                    trace!("{} has a fresh report", service.name);
                    continue;
                }
            };

            report += self.record(host, service, synthesized).await;
        }

        report
    }

    /// Persist `check` and hand it to the alert generator
    async fn record(&self, host: &Host, service: &Service, check: NewServiceCheck) -> HostReport {
        let mut report = HostReport::default();

        let stored: ServiceCheck = match self.store.insert_check(check.clone()).await {
            Ok(stored) => {
                report.checks_written += 1;
                stored
            }
            Err(e) => {
                error!("failed to save check for {}: {}", service.name, e);
                check.into_check(0)
            }
        };

        match self.alerts.evaluate(host, service, &stored).await {
            Ok(Some(_)) => report.alerts_created += 1,
            Ok(None) => {}
            Err(e) => error!("failed to evaluate alert for {}: {}", service.name, e),
        }

        report
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Commands accepted by a running [`Scheduler`]
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Run a full tick now and report when every host check finished
    TickNow {
        respond_to: oneshot::Sender<TickSummary>,
    },

    /// Stop dispatching, wait for running checks, then acknowledge
    Shutdown { respond_to: oneshot::Sender<()> },
}

/// Hosts dispatched by one tick
pub struct Dispatch {
    pub handles: Vec<JoinHandle<HostReport>>,
    pub hosts_idled: usize,
}

pub struct Scheduler {
    store: Store,
    worker: Arc<HostWorker>,
    slots: Arc<Semaphore>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    interval: Duration,
}

impl Scheduler {
    pub fn new(
        store: Store,
        worker: HostWorker,
        max_workers: usize,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            worker: Arc::new(worker),
            slots: Arc::new(Semaphore::new(max_workers.max(1))),
            tracker: TaskTracker::new(),
            cancel,
            interval,
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Move connected push hosts silent for longer than [`IDLE_THRESHOLD`]
    /// to `idle`. Runs for disabled hosts too.
    pub async fn sweep_idle(&self, hosts: &[Host], now: DateTime<Utc>) -> usize {
        let cutoff = now - chrono::Duration::from_std(IDLE_THRESHOLD).unwrap_or_default();
        let mut idled = 0;

        for host in hosts {
            let candidate = host.mode == MonitoringMode::Push
                && host.connection_status == ConnectionStatus::Connected
                && host.last_seen.is_some_and(|seen| seen < cutoff);
            if !candidate {
                continue;
            }

            match self.store.mark_idle_if_stale(host.id, cutoff).await {
                Ok(true) => {
                    info!("host {} marked as idle", host.name);
                    idled += 1;
                }
                Ok(false) => trace!("host {} reported in the meantime", host.name),
                Err(e) => warn!("failed to mark host {} idle: {}", host.name, e),
            }
        }

        idled
    }

    /// Start one check task per enabled host
    ///
    /// Returns once every host holds a slot or cancellation stopped
    /// dispatch. The returned handles resolve when the checks finish.
    #[instrument(skip(self))]
    pub async fn dispatch(&self) -> Dispatch {
        let hosts = match self.store.list_hosts().await {
            Ok(hosts) => hosts,
            Err(e) => {
                error!("failed to list hosts: {}", e);
                return Dispatch {
                    handles: Vec::new(),
                    hosts_idled: 0,
                };
            }
        };

        let hosts_idled = self.sweep_idle(&hosts, Utc::now()).await;
        let mut handles = Vec::new();

        for host in hosts.into_iter().filter(|h| h.enabled) {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("cancelled, not dispatching remaining hosts");
                    break;
                }
                permit = self.slots.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let worker = self.worker.clone();
            handles.push(self.tracker.spawn(async move {
                let _permit = permit;
                worker.check_host(&host).await
            }));
        }

        Dispatch {
            handles,
            hosts_idled,
        }
    }

    /// Dispatch and wait for every host check of one tick
    pub async fn tick(&self) -> TickSummary {
        let Dispatch {
            handles,
            hosts_idled,
        } = self.dispatch().await;

        let mut summary = TickSummary {
            hosts_idled,
            ..Default::default()
        };

        for result in join_all(handles).await {
            match result {
                Ok(report) => {
                    summary.hosts_checked += 1;
                    summary.checks_written += report.checks_written;
                    summary.alerts_created += report.alerts_created;
                }
                Err(e) => error!("host check task failed: {}", e),
            }
        }

        summary
    }

    /// Run until cancelled or told to shut down
    ///
    /// The first tick starts immediately. Ticks do not wait for the
    /// previous tick's host checks to finish.
    #[instrument(skip_all)]
    pub async fn run(self, mut commands: mpsc::Receiver<SchedulerCommand>) {
        info!("starting scheduler with {:?} interval", self.interval);

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown_ack = None;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("scheduler cancelled");
                    break;
                }

                _ = ticker.tick() => {
                    let dispatch = self.dispatch().await;
                    trace!("dispatched {} hosts", dispatch.handles.len());
                }

                Some(cmd) = commands.recv() => {
                    match cmd {
                        SchedulerCommand::TickNow { respond_to } => {
                            debug!("received TickNow command");
                            let summary = self.tick().await;
                            let _ = respond_to.send(summary);
                        }

                        SchedulerCommand::Shutdown { respond_to } => {
                            debug!("received shutdown command");
                            shutdown_ack = Some(respond_to);
                            break;
                        }
                    }
                }
            }
        }

        self.tracker.close();
        self.tracker.wait().await;
        info!("scheduler stopped");

        if let Some(ack) = shutdown_ack {
            let _ = ack.send(());
        }
    }
}

/// Handle for controlling a running [`Scheduler`]
#[derive(Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<SchedulerCommand>,
    cancel: CancellationToken,
}

impl SchedulerHandle {
    /// Spawn the scheduler loop as a tokio task
    pub fn spawn(scheduler: Scheduler) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let cancel = scheduler.cancellation_token();

        tokio::spawn(scheduler.run(cmd_rx));

        Self {
            sender: cmd_tx,
            cancel,
        }
    }

    /// Run a tick immediately and wait for all of its host checks
    pub async fn tick_now(&self) -> Result<TickSummary> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::TickNow { respond_to: tx })
            .await
            .context("failed to send TickNow command")?;

        rx.await.context("failed to receive tick summary")
    }

    /// Stop the scheduler and wait until running host checks finished
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::Shutdown { respond_to: tx })
            .await
            .context("failed to send Shutdown command")?;

        rx.await.context("scheduler stopped without acknowledging")
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
