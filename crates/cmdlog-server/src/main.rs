use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use cmdlog_logging::SubscriberBuilder;
use cmdlog_server::{AppState, ServerArgs, ServerConfig, serve};
use cmdlog_store::OrderedStore;
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::from(ServerArgs::parse());
    let _log_guard = SubscriberBuilder::new()
        .with_config(config.log.clone())
        .try_init()?;

    info!(
        listen_addr = %config.listen_addr,
        db = %config.store.db_path.display(),
        "starting cmdlog server"
    );

    run(config).await
}

async fn run(config: ServerConfig) -> Result<()> {
    let store = tokio::task::spawn_blocking(move || OrderedStore::open(config.store))
        .await?
        .context("failed to open history database")?;
    let state = AppState::new(Arc::new(store));

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .context("failed to bind listener")?;

    serve(listener, state, shutdown_signal())
        .await
        .context("server shutdown with error")?;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
}
