use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use service_sentinel::{
    alerts::{AlertGenerator, CooldownTracker},
    api::{ApiConfig, ApiState, spawn_api_server},
    config::{HubConfig, MonitoringConfig, StorageConfig, read_config_file},
    inventory,
    remote::{PullChecker, SshExecutor},
    scheduler::{HostWorker, Scheduler, SchedulerHandle},
    storage::{MemoryBackend, StorageBackend, Store, sqlite::SqliteBackend},
    util,
};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,

    /// Log everything down to trace level
    #[arg(short, long)]
    verbose: bool,
}

fn init(verbose: bool) {
    let level = if verbose {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };
    let filter = filter::Targets::new().with_targets(vec![
        ("service_sentinel", level),
        ("sentinel_hub", level),
        ("tower_http", LevelFilter::DEBUG),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;
    let store = open_store(&config).await?;

    let synced = inventory::sync(&store, &config.hosts)
        .await
        .context("failed to sync configured hosts")?;
    debug!(
        "inventory synced: {} hosts and {} services created",
        synced.hosts_created, synced.services_created
    );

    let monitoring = &config.monitoring;
    let cancel = CancellationToken::new();

    let executor = Arc::new(SshExecutor::new(monitoring.command_timeout()));
    let cooldowns = Arc::new(CooldownTracker::new(monitoring.alert_cooldown()));
    let worker = HostWorker::new(
        store.clone(),
        PullChecker::new(executor),
        AlertGenerator::new(store.clone(), cooldowns),
        monitoring.check_interval(),
    );
    let scheduler = SchedulerHandle::spawn(Scheduler::new(
        store.clone(),
        worker,
        monitoring.max_workers,
        monitoring.check_interval(),
        cancel.child_token(),
    ));

    let bind: SocketAddr = util::get_bind(&config.api.bind)
        .parse()
        .context("invalid API bind address")?;
    spawn_api_server(
        ApiConfig::new(bind),
        ApiState::new(store.clone()),
        cancel.child_token(),
    )
    .await?;

    let retention = tokio::spawn(prune_old_checks(
        store.clone(),
        monitoring.clone(),
        cancel.child_token(),
    ));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down");

    if let Err(e) = scheduler.shutdown().await {
        warn!("scheduler did not shut down cleanly: {e:#}");
    }
    cancel.cancel();
    if let Err(e) = retention.await {
        error!("retention task failed: {e}");
    }

    store.close().await.context("failed to close storage")?;
    info!("hub stopped");

    Ok(())
}

async fn open_store(config: &HubConfig) -> anyhow::Result<Store> {
    let storage = config.storage.clone().unwrap_or_default();

    let store: Store = match storage {
        StorageConfig::None => {
            warn!("using in-memory storage, nothing survives a restart");
            Arc::new(MemoryBackend::new())
        }
        StorageConfig::Sqlite { path } => {
            let path = util::get_db_path().unwrap_or(path);
            info!("using sqlite storage at {}", path.display());
            Arc::new(
                SqliteBackend::new(&path)
                    .await
                    .with_context(|| format!("failed to open {}", path.display()))?,
            )
        }
    };

    Ok(store)
}

#[instrument(skip_all, fields(retention_days = monitoring.retention_days))]
async fn prune_old_checks(store: Store, monitoring: MonitoringConfig, cancel: CancellationToken) {
    let retention_days = monitoring.retention_days;
    let mut ticker = interval(RETENTION_SWEEP_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            _ = ticker.tick() => {
                let Some(before) = monitoring.retention_cutoff(Utc::now()) else {
                    warn!("retention of {retention_days} days reaches past the earliest date, skipping prune");
                    continue;
                };
                match store.prune_checks(before).await {
                    Ok(0) => trace!("no checks to prune"),
                    Ok(deleted) => info!("pruned {deleted} checks older than {retention_days} days"),
                    Err(e) => error!("failed to prune checks: {e}"),
                }
            }
        }
    }

    debug!("retention task stopped");
}
