//! Umbra helper - isolated process serving crypto requests over stdio
//!
//! Reads newline-delimited JSON requests on stdin and writes replies on
//! stdout. Logs go to stderr only.

use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use umbra_core::bridge::BridgeServer;
use umbra_core::config::UmbraConfig;
use umbra_core::domain::crypto::LocalCryptoEngine;

#[derive(Parser, Debug)]
#[command(name = "umbra-helper")]
#[command(author, version, about = "Isolated Umbra security helper", long_about = None)]
struct Cli {
    /// Config file (defaults to config.toml in the Umbra config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter directive; overrides RUST_LOG and the config file
    #[arg(long)]
    log_filter: Option<String>,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<UmbraConfig> {
    match path {
        Some(path) => UmbraConfig::load_from(path),
        None => UmbraConfig::load(),
    }
}

/// Precedence: `--log-filter`, then `RUST_LOG`, then `logging.filter`
fn env_filter(cli_filter: Option<&str>, config: &UmbraConfig) -> anyhow::Result<EnvFilter> {
    if let Some(directive) = cli_filter {
        return Ok(EnvFilter::try_new(directive)?);
    }
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => Ok(EnvFilter::try_new(&config.logging.filter)?),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    // stdout carries the protocol
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(cli.log_filter.as_deref(), &config)?)
        .with_writer(std::io::stderr)
        .init();

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, stopping helper");
                on_signal.cancel();
            }
            Err(e) => warn!(error = %e, "Could not install interrupt handler"),
        }
    });

    info!(pid = std::process::id(), "Umbra helper starting");
    let server = BridgeServer::new(LocalCryptoEngine::default());
    server
        .serve(tokio::io::stdin(), tokio::io::stdout(), shutdown)
        .await?;
    info!("Umbra helper stopped");
    Ok(())
}
