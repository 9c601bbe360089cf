//! # Fabric Bench - Main Entry Point
//!
//! Wires the harness together:
//!
//! 1. **Initialize logging** with tracing (`RUST_LOG` controls verbosity).
//! 2. **Parse arguments** into the internal harness configuration.
//! 3. **Spawn the background harness loop** (pool reconciliation, transport
//!    polling, stats servicing) on its own task.
//! 4. **Run the interactive control loop** on the foreground task until the
//!    operator quits.
//! 5. **Tear down**: the control loop closes publisher connections and
//!    signals the background loop, which reaps every subscriber worker
//!    before the process exits.

use anyhow::Result;
use clap::Parser;
use fabric_bench::{
    aggregator::LatencyAggregator,
    cli::{Args, HarnessConfiguration},
    control::ControlLoop,
    fabric::StompConnectionFactory,
    frame::SyntheticTelemetryFrame,
    harness::Harness,
    logging::OperatorFormatter,
    pool::WorkerPoolManager,
    publisher::PublisherDriver,
    results::ResultsSink,
    state::SharedState,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .event_format(OperatorFormatter)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = HarnessConfiguration::from(&args);
    info!(
        broker = %format!("{}:{}", config.fabric.address, config.fabric.port),
        topic = %config.topic,
        "starting fabric bench"
    );

    let shared = Arc::new(SharedState::new(config.initial_settings.clone()));
    let aggregator = Arc::new(LatencyAggregator::new());

    let sink = match &config.results_file {
        Some(path) => Some(ResultsSink::new(path)?),
        None => None,
    };

    let pool = WorkerPoolManager::new(config.worker_config());
    let harness = Harness::new(
        shared.clone(),
        pool,
        aggregator.clone(),
        sink,
        config.tick_interval,
    );
    let background = tokio::spawn(harness.run());

    let driver = PublisherDriver::new(
        Box::new(StompConnectionFactory::new(config.fabric.clone())),
        Box::new(SyntheticTelemetryFrame::new()),
        config.topic.clone(),
        config.fanout_delay,
    );
    let mut control = ControlLoop::new(shared.clone(), driver);
    let control_result = control.run().await;

    // Wait for worker teardown whether the control loop quit normally or
    // errored out before reaching its own shutdown path.
    shared.shutdown();
    background.await?;
    control_result?;
    info!("fabric bench exited cleanly");
    Ok(())
}
