//! Wallet Connect bridge daemon.

mod config;

use std::path::PathBuf;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use wallet_bridge::Bridge;

use crate::config::Settings;

#[derive(Debug, Parser)]
#[command(name = "zapbridged")]
#[command(about = "Serve Nostr Wallet Connect requests against Lightning node backends")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, short, default_value = "zapbridge.toml")]
    config: PathBuf,

    /// Override the data directory from the config file
    #[arg(long)]
    datadir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut settings = Settings::load(&args.config)?;
    if let Some(datadir) = args.datadir {
        settings.datadir = datadir;
    }
    std::fs::create_dir_all(&settings.datadir)?;

    let bridge = Bridge::new(settings.bridge_config()?)?;
    info!(pubkey = %bridge.service_pubkey(), "service identity");

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    bridge.run(shutdown).await?;
    Ok(())
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(err) => {
                error!(error = %err, "could not install SIGTERM handler");
                return;
            }
        };
        #[cfg(unix)]
        let sigterm_future = sigterm.recv();
        #[cfg(not(unix))]
        let sigterm_future = std::future::pending::<Option<()>>();

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    error!(error = %err, "could not listen for ctrl-c");
                    return;
                }
                info!("received ctrl-c shutdown signal");
            }
            _ = sigterm_future => {
                info!("received SIGTERM shutdown signal");
            }
        }

        shutdown.cancel();
    });
}
