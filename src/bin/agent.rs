use std::path::PathBuf;

use clap::Parser;
use service_sentinel::{
    agent::{AgentConfig, Collector},
    util::get_agent_token,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (default: <config dir>/sentinel/agent.toml)
    #[arg(short)]
    config: Option<PathBuf>,
}

fn init() {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new().with_targets(vec![
        ("service_sentinel", LevelFilter::DEBUG),
        ("sentinel_agent", LevelFilter::DEBUG),
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
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let mut config = AgentConfig::load(args.config.as_deref())?;
    if let Some(token) = get_agent_token() {
        config.token = token;
    }

    let collector = Collector::from_config(config)?;
    let cancel = CancellationToken::new();

    let agent = tokio::spawn(collector.run(cancel.clone()));

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for ctrl-c: {e}");
    }
    info!("shutting down");
    cancel.cancel();

    agent.await?;
    Ok(())
}
