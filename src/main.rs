mod api;
mod config;
mod consistency;
mod db;
mod error;
mod etherscan;
mod loader;
mod models;
mod rows;
mod transform;
mod validator;

use std::{sync::Arc, time::Duration};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::db::SqliteGraphStore;
use crate::etherscan::EtherscanClient;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // RUST_LOG overrides the default level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .with_target(false)
        .init();

    info!("Wallet graph service starting...");

    let cfg = config::load()?;

    // Opens the database and runs migrations once at startup
    let store = SqliteGraphStore::open(&cfg.db_path)?;
    info!("Graph store ready at {}", cfg.db_path);

    let provider = EtherscanClient::new(
        &cfg.etherscan_api_url,
        cfg.etherscan_api_key.clone(),
        Duration::from_secs(cfg.provider_timeout_secs),
    )?;
    if cfg.etherscan_api_key.is_none() {
        info!("ETHERSCAN_API_KEY not set; live address endpoints will report it");
    }

    let state = AppState {
        store,
        provider: Arc::new(provider),
    };

    let api_handle = tokio::spawn({
        let cfg = cfg.clone();
        async move { api::serve(cfg, state).await }
    });

    // Graceful shutdown
    tokio::select! {
        res = api_handle => match res {
            Ok(Ok(_)) => info!("API exited cleanly"),
            Ok(Err(e)) => error!("API error: {:?}", e),
            Err(e) => error!("API task panicked: {:?}", e),
        },
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received, stopping...");
        }
    }

    info!("Wallet graph service stopped.");
    Ok(())
}
