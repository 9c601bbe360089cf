//! Background harness loop.
//!
//! One fixed-interval tick loop executing, in order: worker-pool
//! reconciliation, transport polling, stats servicing. Every I/O attempt is
//! non-blocking; the tick interval is the sole wait. The loop observes the
//! cooperative shutdown flag at each tick boundary and tears the worker pool
//! down on exit.

use crate::aggregator::LatencyAggregator;
use crate::pool::WorkerPoolManager;
use crate::reader::TransportReader;
use crate::results::{ResultsSink, ResultsSnapshot};
use crate::state::SharedState;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Owns the background-side components and runs the tick loop.
pub struct Harness {
    shared: Arc<SharedState>,
    pool: WorkerPoolManager,
    reader: TransportReader,
    aggregator: Arc<LatencyAggregator>,
    sink: Option<ResultsSink>,
    tick_interval: Duration,
}

impl Harness {
    pub fn new(
        shared: Arc<SharedState>,
        pool: WorkerPoolManager,
        aggregator: Arc<LatencyAggregator>,
        sink: Option<ResultsSink>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            shared,
            pool,
            reader: TransportReader::new(),
            aggregator,
            sink,
            tick_interval,
        }
    }

    /// Run until the shared `running` flag clears, then tear down workers.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        // A slow tick (e.g. reaping a terminated worker) should not be
        // followed by a compensating flurry of ticks.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.shared.is_running() {
            ticker.tick().await;
            self.tick().await;
        }

        self.pool.shutdown().await;
        info!("background harness stopped, all workers torn down");
    }

    /// One tick: reconcile, poll, service stats.
    async fn tick(&mut self) {
        let desired = self.shared.settings().num_subscribers;
        self.pool.reconcile(desired).await;

        self.reader
            .poll(self.pool.workers_mut(), &self.aggregator);

        self.service_stats();
    }

    /// Service pending `results`/`reset` requests.
    fn service_stats(&mut self) {
        if self.shared.take_show_request() {
            let summaries = self.aggregator.summarize();
            if summaries.is_empty() {
                println!("No subscribers have reported yet");
            }
            for summary in &summaries {
                println!("{}", summary.display_line());
            }
            if let Some(sink) = &mut self.sink {
                let snapshot = ResultsSnapshot::new(summaries, self.reader.parse_failures());
                if let Err(e) = sink.write_snapshot(&snapshot) {
                    warn!("failed to write results snapshot: {:#}", e);
                }
            }
        }

        if self.shared.take_reset_request() {
            self.aggregator.reset();
            info!("latency buckets reset");
        }
    }
}
