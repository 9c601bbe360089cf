//! Subscriber worker process.
//!
//! Spawned by the harness pool manager, one per desired subscriber. The
//! worker connects to the fabric, subscribes to the topic, and then speaks a
//! line-oriented protocol on stdout:
//!
//! - exactly one readiness sentinel line, `Starting Subscription`, once the
//!   subscription is live;
//! - thereafter one CSV record per received message:
//!   `<subscriber_id>,<sent>,<received>,<latency>` with timestamps as
//!   decimal seconds since epoch.
//!
//! Diagnostics go to stderr so they never corrupt the record stream. The
//! worker runs until killed by the harness.

use anyhow::{Context, Result};
use clap::Parser;
use fabric_bench::fabric::{Envelope, FabricConfig, StompConnection};
use fabric_bench::pool::READY_SENTINEL;
use fabric_bench::utils::epoch_seconds;
use std::io::Write;
use tracing::warn;

#[derive(Parser, Debug)]
#[clap(version, about = "Fabric latency subscriber worker", long_about = None)]
struct WorkerArgs {
    /// Subscriber identifier, echoed in every CSV record
    subscriber: String,

    #[clap(long, default_value = fabric_bench::defaults::FABRIC_ADDRESS)]
    fabric_address: String,

    #[clap(long, default_value_t = fabric_bench::defaults::FABRIC_PORT)]
    fabric_port: u16,

    #[clap(long, default_value = "system")]
    username: String,

    #[clap(long, default_value = "manager")]
    password: String,

    #[clap(long, default_value = fabric_bench::defaults::TOPIC)]
    subscription_topic: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = WorkerArgs::parse();
    let config = FabricConfig {
        address: args.fabric_address.clone(),
        port: args.fabric_port,
        username: args.username.clone(),
        password: args.password.clone(),
    };

    let mut connection = StompConnection::connect(&config)
        .await
        .with_context(|| format!("connecting to fabric at {}:{}", config.address, config.port))?;
    connection
        .subscribe(&args.subscription_topic)
        .await
        .context("subscribing to topic")?;

    // Readiness handshake: the pool manager waits for this exact line.
    let stdout = std::io::stdout();
    {
        let mut out = stdout.lock();
        writeln!(out, "{}", READY_SENTINEL)?;
        out.flush()?;
    }

    loop {
        let frame = connection.next_message().await?;
        let received = epoch_seconds();
        match serde_json::from_slice::<Envelope>(&frame.body) {
            Ok(envelope) => {
                let latency = received - envelope.start;
                let mut out = stdout.lock();
                writeln!(
                    out,
                    "{},{},{},{}",
                    args.subscriber, envelope.start, received, latency
                )?;
                out.flush()?;
            }
            Err(e) => {
                warn!("discarding message with unreadable envelope: {}", e);
            }
        }
    }
}
