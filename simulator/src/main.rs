//! TwoPhase Simulator
//!
//! Drives a coordinator over an in-memory ledger, either through a scripted
//! scenario or with random concurrent transfers.

use std::time::Duration;

use anyhow::ensure;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod accounts;
mod controller;
mod metrics;
mod scenario;

use accounts::AccountFactory;
use controller::SimulationController;
use scenario::Scenario;

/// TwoPhase Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(about = "Scenario and load driver for the two-phase commit coordinator")]
struct Args {
    /// Number of accounts for random traffic
    #[arg(short, long, default_value = "8")]
    accounts: usize,

    /// Starting balance of every account
    #[arg(long, default_value = "10000")]
    initial_balance: i64,

    /// Built-in scenario to run
    #[arg(short, long, conflicts_with = "scenario_file")]
    scenario: Option<String>,

    /// Scenario to run, as a JSON file
    #[arg(long)]
    scenario_file: Option<std::path::PathBuf>,

    /// Concurrent clients for random traffic
    #[arg(short, long, default_value = "4")]
    concurrency: usize,

    /// Simulated ledger round-trip in milliseconds
    #[arg(long, default_value = "1")]
    ledger_latency_ms: u64,

    /// Simulation speed multiplier
    #[arg(long, default_value = "1.0")]
    speed: f64,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Run duration in seconds (0 = infinite)
    #[arg(long, default_value = "0")]
    duration: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    ensure!(
        args.speed.is_finite() && args.speed > 0.0,
        "speed must be a positive number"
    );

    info!("Starting TwoPhase Simulator");
    info!("Speed: {}x", args.speed);

    let scenario = match (&args.scenario, &args.scenario_file) {
        (Some(name), _) => Some(Scenario::load(name)?),
        (None, Some(path)) => Some(Scenario::from_json(&std::fs::read_to_string(path)?)?),
        (None, None) => None,
    };

    let controller = match &scenario {
        Some(scenario) => SimulationController::for_scenario(scenario, args.speed),
        None => {
            info!("Accounts: {}", args.accounts);
            SimulationController::new(
                AccountFactory::create_accounts(args.accounts, args.initial_balance),
                args.speed,
                args.seed,
                Duration::from_millis(args.ledger_latency_ms),
            )
        }
    };

    controller.initialize().await?;

    if let Some(scenario) = &scenario {
        controller.run_scenario(scenario).await?;
    } else {
        info!("Running random traffic");
        info!("Press Ctrl+C to stop");

        let duration = if args.duration > 0 {
            Some(Duration::from_secs(args.duration))
        } else {
            None
        };

        controller.run(duration, args.concurrency).await?;
        controller.verify_invariants()?;
    }

    controller.shutdown().await?;

    // Print metrics
    let metrics = controller.metrics().await;
    info!("Simulation complete");
    info!("Total transfers: {}", metrics.total_transfers);
    info!(
        "Committed: {} (amount {})",
        metrics.committed, metrics.committed_amount
    );
    info!("Aborted: {}", metrics.aborted);
    info!("Lock conflicts: {}", metrics.conflicts);
    info!("Failed: {}", metrics.failed);
    info!("Success rate: {:.1}%", metrics.success_rate() * 100.0);
    info!(
        "Latency: avg {}ms, p99 {}ms",
        metrics.average_latency_ms(),
        metrics.p99_latency_ms()
    );
    info!(
        "Coordinator metrics:\n{}",
        controller.coordinator().metrics().to_prometheus()
    );

    Ok(())
}
