//! Non-blocking line reader over subscriber worker output streams.
//!
//! Worker stdout is captured by a per-process reader task (see [`crate::pool`])
//! that forwards complete lines over an unbounded channel. Each harness tick
//! attempts exactly one channel read per live worker; absence of data is not
//! an error. Because the workers write asynchronously, malformed or partial
//! records can occur; each is reported once as a diagnostic and discarded
//! without aborting the poll loop.

use crate::aggregator::{LatencyAggregator, LatencySample};
use crate::pool::WorkerHandle;
use thiserror::Error;
use tracing::{trace, warn};

/// Expected line grammar: `subscriber_id,sent,received,latency`
/// with timestamps as decimal seconds since epoch.
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("expected 4 comma-separated fields, got {0}")]
    FieldCount(usize),
    #[error("invalid decimal value {0:?}")]
    Number(String),
    #[error("empty subscriber id")]
    EmptyId,
}

/// Parse one CSV latency record.
pub fn parse_line(line: &str) -> Result<LatencySample, ParseError> {
    let fields: Vec<&str> = line.trim().split(',').collect();
    if fields.len() != 4 {
        return Err(ParseError::FieldCount(fields.len()));
    }
    let subscriber_id = fields[0].trim();
    if subscriber_id.is_empty() {
        return Err(ParseError::EmptyId);
    }
    let number = |s: &str| -> Result<f64, ParseError> {
        s.trim()
            .parse::<f64>()
            .map_err(|_| ParseError::Number(s.trim().to_string()))
    };
    Ok(LatencySample {
        subscriber_id: subscriber_id.to_string(),
        sent: number(fields[1])?,
        received: number(fields[2])?,
        latency: number(fields[3])?,
    })
}

/// Polls worker output channels and forwards samples to the aggregator.
pub struct TransportReader {
    parse_failures: u64,
}

impl TransportReader {
    pub fn new() -> Self {
        Self { parse_failures: 0 }
    }

    /// One non-blocking read attempt per live worker.
    ///
    /// Returns the number of samples forwarded this tick.
    pub fn poll(&mut self, workers: &mut [WorkerHandle], aggregator: &LatencyAggregator) -> usize {
        let mut forwarded = 0;
        for worker in workers.iter_mut() {
            let Some(line) = worker.try_next_line() else {
                continue;
            };
            if line.trim().is_empty() {
                continue;
            }
            match parse_line(&line) {
                Ok(sample) => {
                    trace!(worker = %worker.id(), latency = sample.latency, "latency sample");
                    if let Err(e) = aggregator.record(sample) {
                        warn!(worker = %worker.id(), "failed to record sample: {}", e);
                    } else {
                        forwarded += 1;
                    }
                }
                Err(e) => {
                    self.parse_failures += 1;
                    warn!(worker = %worker.id(), line = %line.trim(), "discarding malformed record: {}", e);
                }
            }
        }
        forwarded
    }

    /// Running count of discarded malformed records.
    pub fn parse_failures(&self) -> u64 {
        self.parse_failures
    }
}

impl Default for TransportReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_well_formed_line() {
        let sample = parse_line("sub1,100.0,100.05,0.05\n").unwrap();
        assert_eq!(sample.subscriber_id, "sub1");
        assert_eq!(sample.sent, 100.0);
        assert_eq!(sample.received, 100.05);
        assert_eq!(sample.latency, 0.05);
    }

    #[test]
    fn test_parse_garbage() {
        assert_eq!(parse_line("garbage\n"), Err(ParseError::FieldCount(1)));
    }

    #[test]
    fn test_parse_fragment() {
        // A partial line cut mid-record by the non-blocking stream
        assert_eq!(
            parse_line("sub1,100.0,100."),
            Err(ParseError::FieldCount(3))
        );
        assert_eq!(
            parse_line("sub1,100.0,100.05,0.0x"),
            Err(ParseError::Number("0.0x".to_string()))
        );
    }

    #[test]
    fn test_parse_rejects_empty_id() {
        assert_eq!(parse_line(",1.0,2.0,1.0"), Err(ParseError::EmptyId));
    }

    #[test]
    fn test_parse_tolerates_whitespace() {
        let sample = parse_line(" sub2 , 1.5 , 2.0 , 0.5 \n").unwrap();
        assert_eq!(sample.subscriber_id, "sub2");
        assert_eq!(sample.latency, 0.5);
    }
}
