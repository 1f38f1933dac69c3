/*
[INPUT]:  CLI arguments, YAML configuration file, OS shutdown signals
[OUTPUT]: Running stream subscriptions with graceful shutdown
[POS]:    Binary entry point
[UPDATE]: When changing CLI flags, startup flow, or shutdown handling
*/

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use dexstream_watch::{StreamWatcher, WatchConfig};

#[derive(Parser, Debug)]
#[command(name = "dexstream-watch", version, about = "Multiplexed DEX stream watcher")]
struct Cli {
    #[arg(long = "config", value_name = "PATH")]
    config_path: PathBuf,
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: String,
    #[arg(long = "dry-run")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(&args.log_level)?;

    info!(
        config_path = %args.config_path.display(),
        dry_run = args.dry_run,
        "starting dexstream-watch"
    );

    let config = load_config(&args.config_path)?;
    info!(
        url = %config.url,
        subscription_count = config.subscriptions.len(),
        "configuration loaded"
    );

    if args.dry_run {
        for descriptor in config.descriptors() {
            info!(key = %descriptor.key(), stream = %descriptor, "would subscribe");
        }
        info!("dry-run requested; configuration validated");
        return Ok(());
    }

    let watcher = StreamWatcher::new(config).context("build stream watcher")?;
    let shutdown = CancellationToken::new();
    setup_signal_handlers(shutdown.clone());

    watcher.start().await.context("start stream watcher")?;
    info!("stream watcher started");

    let outcome = watcher.run(shutdown).await;
    watcher.shutdown();
    match &outcome {
        Ok(()) => info!("shutdown complete"),
        Err(err) => error!(error = %err, "stream watcher stopped"),
    }
    outcome
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(log_level).context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| anyhow!(err))
        .context("initialize tracing subscriber")?;
    Ok(())
}

fn load_config(path: &PathBuf) -> Result<WatchConfig> {
    let path_str = path
        .to_str()
        .context("config path must be valid utf-8")?;
    WatchConfig::from_file(path_str).context("load config")
}

fn setup_signal_handlers(shutdown: CancellationToken) {
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install SIGINT handler");
            return;
        }
        info!("received SIGINT");
        shutdown_clone.cancel();
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let shutdown_clone = shutdown.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                    info!("received SIGTERM");
                    shutdown_clone.cancel();
                }
                Err(err) => {
                    warn!(error = %err, "failed to install SIGTERM handler");
                }
            }
        });
    }
}
