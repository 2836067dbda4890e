//! PawHub Connect - Main Entry Point
//!
//! Headless companion that keeps the PawHub API awake while running.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use pawhub_connect::{logging, ApiClient, ClientConfig, ForegroundState, SecureStorage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init(None);
    info!("PawHub Connect starting...");

    let config = ClientConfig::from_env().context("Invalid configuration")?;
    info!(base_url = %config.base_url, "Using API");

    let storage = SecureStorage::open_default().context("Failed to open token storage")?;
    let foreground = Arc::new(ForegroundState::new(true));
    let client = ApiClient::new(config, Arc::new(storage), foreground)
        .context("Failed to create API client")?;

    if let Err(e) = client.ensure_server_awake().await {
        warn!(error = %e, "Continuing without a confirmed server");
    }

    client.start_server_monitoring();
    client.start_keep_alive();
    info!(status = ?client.server_status(), "Monitoring server, press Ctrl-C to exit");

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;

    client.shutdown();
    info!("PawHub Connect stopped");
    Ok(())
}
