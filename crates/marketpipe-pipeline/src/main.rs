//! marketpipe entry point.

use anyhow::Result;
use clap::Parser;
use marketpipe_pipeline::{Pipeline, PipelineConfig};
use marketpipe_telemetry::init_logging;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "marketpipe", about = "Real-time market data pipeline")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base log level (overridable via RUST_LOG).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::load()?,
    };
    let log_level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    init_logging(log_level)?;

    info!(backend = ?config.backend, "Starting marketpipe");
    let pipeline = Arc::new(Pipeline::connect(config).await?);
    pipeline.start()?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    pipeline.stop().await;
    Ok(())
}
