use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::Result;
use tokio::{signal, time};
use tracing::{error, info};
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

use tipstream_agents::{
    chain::RpcClient,
    config::{Args, Command, Config},
    manager::{Intervals, WorkerManager},
    store::CursorStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let args = Args::parse();
    let config = Config::read_from(&args.config)?;

    let client = RpcClient::connect(&config.chain.rpc_url, &config.chain.private_key()?).await?;
    let store = match &config.store {
        Some(store) => Some(CursorStore::open(&store.path).await?),
        None => None,
    };

    let status_interval = config.status_interval();
    let intervals = Intervals::from_config(&config);
    let mut manager = WorkerManager::new(config, Arc::new(client), store);

    if let Err(e) = manager.initialize().await {
        error!("failed to start agents: {}", e);
        manager.stop_all().await;
        return Err(e.into());
    }

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(&manager, &intervals, status_interval).await?,
        Command::ResolveName { name } => match manager.resolve_name(&name).await? {
            Some(address) => println!("{:?}", address),
            None => println!("{} is not registered", name),
        },
        Command::ResolveAddress { address } => match manager.resolve_address(address).await? {
            Some(name) => println!("{}", name),
            None => println!("{:?} has no registered name", address),
        },
    }

    manager.shutdown().await;
    info!("graceful shutdown achieved. Closing");

    Ok(())
}

/// Runs every agent, reporting status and pending notifications until a termination signal
async fn run(
    manager: &WorkerManager,
    intervals: &Intervals,
    status_interval: time::Duration,
) -> Result<()> {
    manager.start_all(intervals).await?;
    info!("agents running. Press Ctrl+C to stop");

    let mut status = time::interval_at(time::Instant::now() + status_interval, status_interval);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            res = &mut shutdown => {
                res?;
                info!("received termination signal");
                return Ok(());
            }
            _ = status.tick() => {
                let snapshot = manager.status().await;
                info!("status: {}", serde_json::to_string_pretty(&snapshot)?);

                let notifications = manager.take_tip_notifications().await?;
                if !notifications.is_empty() {
                    info!(
                        count = notifications.len(),
                        "notifications: {}",
                        serde_json::to_string_pretty(&notifications)?
                    );
                }
            }
        }
    }
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            res = signal::ctrl_c() => res?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    signal::ctrl_c().await?;

    Ok(())
}

fn setup() -> Result<()> {
    color_eyre::install()?;

    let filter = EnvFilter::from_default_env();

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::NEW)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}
