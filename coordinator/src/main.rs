//! TwoPhase Coordinator Binary
//!
//! Runs a coordinator over an in-memory ledger seeded from configuration.
//! The RPC transport is wired by the embedding server; this binary keeps the
//! coordinator and its expiry sweep alive until interrupted.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use twophase_coordinator::{Coordinator, CoordinatorConfig};
use twophase_ledger::InMemoryLedger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = CoordinatorConfig::from_env().context("Configuration error")?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting TwoPhase Coordinator");

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    // Generate node ID if not provided
    let node_id = config
        .node_id
        .clone()
        .unwrap_or_else(|| format!("coordinator-{}", uuid::Uuid::new_v4()));

    info!(node_id = %node_id, "Node ID assigned");

    let ledger = Arc::new(InMemoryLedger::with_accounts(
        config.seed_accounts.iter().copied(),
    ));

    let coordinator = Arc::new(Coordinator::new(config.clone(), node_id.clone(), ledger));

    coordinator.start().await?;

    info!(
        node_id = %node_id,
        listen_addr = %config.listen_addr,
        listen_port = %config.listen_port,
        accounts = config.seed_accounts.len(),
        "Coordinator running"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    if let Err(e) = coordinator.stop().await {
        error!(error = %e, "Error during shutdown");
    }

    let snapshot = serde_json::to_string(&coordinator.metrics().snapshot())?;
    info!(metrics = %snapshot, "Coordinator shutdown complete");
    Ok(())
}
