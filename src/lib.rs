//! # Fabric Bench Library
//!
//! A load-testing harness for publish/subscribe messaging fabrics carrying
//! timestamped telemetry frames. The harness measures end-to-end delivery
//! latency across dynamically resizable pools of publisher connections and
//! subscriber worker processes while an operator issues live commands during
//! an active run.
//!
//! ## Architecture Overview
//!
//! Two concurrent loops share a single context object:
//!
//! - A **foreground control loop** blocks only on interactive command input
//!   and mutates the shared run settings. Publish bursts execute inline, so
//!   no new commands are serviced while a burst is in flight.
//! - A **background harness loop** runs on a fixed-interval timer. Each tick
//!   performs, in order: worker-pool reconciliation, non-blocking transport
//!   polling, and stats servicing (results display, aggregator reset).
//!
//! Subscriber workers are external processes supervised by the pool manager.
//! Each worker performs a readiness handshake (a single sentinel line on its
//! captured stdout) and then emits one CSV latency record per received
//! message, which the transport reader parses and feeds to the aggregator.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fabric_bench::aggregator::LatencyAggregator;
//! use fabric_bench::state::{Settings, SharedState};
//!
//! let shared = Arc::new(SharedState::new(Settings::default()));
//! let aggregator = Arc::new(LatencyAggregator::new());
//!
//! shared.update_settings(|s| s.num_subscribers = 4);
//! assert_eq!(shared.settings().num_subscribers, 4);
//! # drop(aggregator);
//! ```

/// Per-subscriber latency accumulation and summarization
///
/// Buckets latency samples by subscriber id, backed by HDR histograms for
/// percentile figures. `reset` is atomic with respect to concurrent
/// `record`/`summarize` calls.
pub mod aggregator;

/// Command-line interface and configuration
///
/// Argument parsing using clap and conversion into the internal
/// `HarnessConfiguration`, including human-readable duration parsing
/// (e.g. "100ms", "5s") and positive-float validation.
pub mod cli;

/// Interactive control loop
///
/// Parses operator commands, mutates shared run state, and drives publish
/// bursts. Unrecognized input is echoed as invalid without any state change.
pub mod control;

/// Fabric transport abstractions and the STOMP implementation
///
/// The `FabricConnection`/`ConnectionFactory` traits are the seam to the
/// underlying pub/sub client; `fabric::stomp` provides a minimal STOMP 1.2
/// session sufficient for the harness and its subscriber workers.
pub mod fabric;

/// Opaque telemetry frame production
pub mod frame;

/// Background tick loop tying pool, reader, and aggregator together
pub mod harness;

/// Colorized tracing event formatting for operator-facing output
pub mod logging;

/// Subscriber worker pool management
///
/// Spawns and supervises external subscriber processes, reconciling the live
/// worker count toward the desired count one step per tick. Includes the
/// readiness handshake over each worker's captured stdout.
pub mod pool;

/// Publisher connection management and timed send bursts
pub mod publisher;

/// Non-blocking CSV line reader over worker output streams
pub mod reader;

/// Result sink for JSON snapshot output
pub mod results;

/// Shared run settings and run-state flags
pub mod state;

/// Formatting and clock utilities
pub mod utils;

pub use aggregator::{LatencyAggregator, LatencySample, SubscriberSummary};
pub use cli::{Args, HarnessConfiguration};
pub use fabric::{ConnectionFactory, Envelope, FabricConnection};
pub use pool::WorkerPoolManager;
pub use publisher::{BurstReport, PublisherDriver};
pub use state::{AppState, Settings, SharedState};

/// The current version of the harness
///
/// Populated from Cargo.toml and embedded in result-sink snapshots for
/// reproducibility.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    /// Default fabric broker address
    pub const FABRIC_ADDRESS: &str = "localhost";

    /// Default fabric broker STOMP port
    pub const FABRIC_PORT: u16 = 61613;

    /// Default publish/subscription topic
    pub const TOPIC: &str = "pmu.data";

    /// Default number of subscriber workers
    pub const NUM_SUBSCRIBERS: usize = 1;

    /// Default number of publisher connections
    pub const NUM_PUBLISHERS: usize = 1;

    /// Default messages per burst
    pub const NUM_MESSAGES: usize = 10;

    /// Default inter-message publish interval in seconds
    ///
    /// One sixtieth of a second matches the nominal reporting rate of the
    /// synchrophasor streams this harness was built to exercise.
    pub const SECONDS_BETWEEN_PUBLISHES: f64 = 1.0 / 60.0;

    /// Default background tick interval
    pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

    /// Default deadline for the worker readiness handshake
    pub const READINESS_TIMEOUT: Duration = Duration::from_secs(5);
}
