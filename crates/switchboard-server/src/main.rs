//! # Switchboard Server
//!
//! Message relay: issues connection credentials and fans chat messages out
//! to topic channels on a realtime broker.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! switchboard
//!
//! # Run with custom config
//! switchboard --config /path/to/switchboard.toml
//!
//! # Run with environment variables
//! PORT=8080 SWITCHBOARD_BROKER_URL=http://broker:8000 switchboard
//!
//! # Override nested settings
//! SWITCHBOARD__BROKER__PUBLISH_TIMEOUT_MS=5000 switchboard
//! ```

mod broker;
mod config;
mod handlers;
mod metrics;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "switchboard", version, about = "Switchboard message relay")]
struct Args {
    /// Configuration file; skips the default search paths.
    #[arg(short, long, env = "SWITCHBOARD_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "switchboard=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    // Load configuration
    let config = match args.config {
        Some(path) => config::Config::from_file(path)?,
        None => config::Config::load()?,
    };

    tracing::info!(
        "Starting switchboard relay on {}:{}",
        config.host,
        config.port
    );

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
