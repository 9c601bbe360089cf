//! Publisher connection management and timed send bursts.
//!
//! The driver holds a pool of live fabric connections that persist across
//! bursts. Connections are opened lazily up to the requested count and never
//! proactively closed mid-run; connection setup is amortized and churn is
//! rare, so the only teardown happens at shutdown.

use crate::fabric::{ConnectionFactory, Envelope, FabricConnection};
use crate::frame::FrameSource;
use crate::utils::{epoch_seconds, hex_encode};
use anyhow::Result;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Outcome of one [`PublisherDriver::publish_burst`] invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct BurstReport {
    /// Messages in the burst
    pub messages: usize,
    /// Send attempts across all connections (`messages * live connections`)
    pub attempted: usize,
    /// Attempts that failed; failures never abort the burst
    pub failed: usize,
    pub elapsed: Duration,
}

/// Drives timed publish bursts over a pool of live fabric connections.
pub struct PublisherDriver {
    factory: Box<dyn ConnectionFactory>,
    frames: Box<dyn FrameSource>,
    connections: Vec<Box<dyn FabricConnection>>,
    topic: String,
    /// Optional pause between per-connection sends within one message's
    /// fan-out. Not a timing contract; defaults to zero.
    fanout_delay: Duration,
}

impl PublisherDriver {
    pub fn new(
        factory: Box<dyn ConnectionFactory>,
        frames: Box<dyn FrameSource>,
        topic: String,
        fanout_delay: Duration,
    ) -> Self {
        Self {
            factory,
            frames,
            connections: Vec::new(),
            topic,
            fanout_delay,
        }
    }

    pub fn live_connections(&self) -> usize {
        self.connections.len()
    }

    /// Lazily open connections until the live count reaches `count`.
    ///
    /// An existing surplus is left alone; connections only close at shutdown.
    pub async fn ensure(&mut self, count: usize) -> Result<()> {
        while self.connections.len() < count {
            let conn = self.factory.connect().await?;
            self.connections.push(conn);
            debug!(live = self.connections.len(), "publisher connection opened");
        }
        Ok(())
    }

    /// Send `message_count` messages, fanning each out to every live
    /// connection before advancing to the next message.
    ///
    /// The sleep is between messages, not between per-connection sends, so
    /// burst wall-clock duration is about `message_count * interval`
    /// regardless of publisher count. Each send carries a timestamp captured
    /// immediately before transmission on that specific connection. A send
    /// failure is reported for that connection only and the burst continues.
    pub async fn publish_burst(&mut self, message_count: usize, interval: Duration) -> BurstReport {
        let started = Instant::now();
        let mut attempted = 0;
        let mut failed = 0;

        for message_index in 0..message_count {
            let payload = hex_encode(&self.frames.next_frame());
            for (conn_index, conn) in self.connections.iter_mut().enumerate() {
                let envelope = Envelope {
                    start: epoch_seconds(),
                    payload: payload.clone(),
                };
                attempted += 1;
                if let Err(e) = conn.send_envelope(&self.topic, &envelope).await {
                    failed += 1;
                    warn!(
                        connection = conn_index,
                        message = message_index,
                        "publish failed: {}",
                        e
                    );
                }
                if !self.fanout_delay.is_zero() {
                    tokio::time::sleep(self.fanout_delay).await;
                }
            }
            if message_index + 1 < message_count && !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
        }

        let report = BurstReport {
            messages: message_count,
            attempted,
            failed,
            elapsed: started.elapsed(),
        };
        info!(
            messages = report.messages,
            attempted = report.attempted,
            failed = report.failed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "burst complete"
        );
        report
    }

    /// Tear down every connection. Called once at shutdown.
    pub async fn close_all(&mut self) {
        for mut conn in self.connections.drain(..) {
            if let Err(e) = conn.close().await {
                debug!("connection close failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fabric::FabricError;
    use crate::frame::SyntheticTelemetryFrame;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;

    type SendLog = Arc<Mutex<Vec<(usize, f64)>>>;

    struct RecordingConnection {
        index: usize,
        log: SendLog,
        fail: bool,
    }

    #[async_trait]
    impl FabricConnection for RecordingConnection {
        async fn send_envelope(
            &mut self,
            _topic: &str,
            envelope: &Envelope,
        ) -> Result<(), FabricError> {
            if self.fail {
                return Err(FabricError::Protocol("injected failure".to_string()));
            }
            self.log.lock().push((self.index, envelope.start));
            Ok(())
        }

        async fn close(&mut self) -> Result<(), FabricError> {
            Ok(())
        }
    }

    struct RecordingFactory {
        log: SendLog,
        next_index: Mutex<usize>,
        fail_index: Option<usize>,
    }

    #[async_trait]
    impl ConnectionFactory for RecordingFactory {
        async fn connect(&self) -> Result<Box<dyn FabricConnection>, FabricError> {
            let mut next = self.next_index.lock();
            let index = *next;
            *next += 1;
            Ok(Box::new(RecordingConnection {
                index,
                log: self.log.clone(),
                fail: self.fail_index == Some(index),
            }))
        }
    }

    fn driver_with_log(fail_index: Option<usize>) -> (PublisherDriver, SendLog) {
        let log: SendLog = Arc::new(Mutex::new(Vec::new()));
        let factory = RecordingFactory {
            log: log.clone(),
            next_index: Mutex::new(0),
            fail_index,
        };
        let driver = PublisherDriver::new(
            Box::new(factory),
            Box::new(SyntheticTelemetryFrame::new()),
            "pmu.data".to_string(),
            Duration::ZERO,
        );
        (driver, log)
    }

    #[tokio::test]
    async fn test_burst_fans_out_to_every_connection() {
        let (mut driver, log) = driver_with_log(None);
        driver.ensure(3).await.unwrap();

        let report = driver.publish_burst(5, Duration::ZERO).await;
        assert_eq!(report.messages, 5);
        assert_eq!(report.attempted, 15);
        assert_eq!(report.failed, 0);

        let log = log.lock();
        assert_eq!(log.len(), 15);
        // Each connection sees 5 sends with non-decreasing timestamps.
        for conn in 0..3 {
            let stamps: Vec<f64> = log
                .iter()
                .filter(|(c, _)| *c == conn)
                .map(|(_, ts)| *ts)
                .collect();
            assert_eq!(stamps.len(), 5);
            for pair in stamps.windows(2) {
                assert!(pair[1] >= pair[0]);
            }
        }
    }

    #[tokio::test]
    async fn test_ensure_is_lazy_and_never_shrinks() {
        let (mut driver, _log) = driver_with_log(None);
        driver.ensure(2).await.unwrap();
        assert_eq!(driver.live_connections(), 2);

        // Lower request leaves the surplus alone.
        driver.ensure(1).await.unwrap();
        assert_eq!(driver.live_connections(), 2);

        driver.ensure(4).await.unwrap();
        assert_eq!(driver.live_connections(), 4);
    }

    #[tokio::test]
    async fn test_send_failure_does_not_abort_burst() {
        let (mut driver, log) = driver_with_log(Some(1));
        driver.ensure(3).await.unwrap();

        let report = driver.publish_burst(4, Duration::ZERO).await;
        assert_eq!(report.attempted, 12);
        assert_eq!(report.failed, 4);
        // The two healthy connections still received every message.
        assert_eq!(log.lock().len(), 8);
    }

    #[tokio::test]
    async fn test_close_all_drains_connections() {
        let (mut driver, _log) = driver_with_log(None);
        driver.ensure(2).await.unwrap();
        driver.close_all().await;
        assert_eq!(driver.live_connections(), 0);
    }
}
