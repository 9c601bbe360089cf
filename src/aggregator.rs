//! Latency sample accumulation and summarization.
//!
//! Samples are bucketed per subscriber id. Each bucket keeps the raw arrival
//! sequence (for the exact arithmetic mean) plus an HDR histogram for
//! percentile figures. All buckets live behind a single mutex, so `reset` is
//! atomic with respect to concurrent `record`/`summarize`: a reader observes
//! either the full pre-reset or the full post-reset state, never a partially
//! cleared one.

use anyhow::Result;
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One end-to-end delivery measurement reported by a subscriber worker.
#[derive(Debug, Clone, PartialEq)]
pub struct LatencySample {
    pub subscriber_id: String,
    /// Publish timestamp, decimal seconds since epoch
    pub sent: f64,
    /// Receive timestamp, decimal seconds since epoch
    pub received: f64,
    /// `received - sent`, seconds
    pub latency: f64,
}

/// Per-subscriber summary produced by [`LatencyAggregator::summarize`].
///
/// Latency figures are `None` for a bucket with zero samples so callers can
/// report "no messages received" explicitly instead of a degenerate mean.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberSummary {
    pub subscriber_id: String,
    pub count: usize,
    pub mean_latency: Option<f64>,
    pub min_latency: Option<f64>,
    pub max_latency: Option<f64>,
    pub p95_latency: Option<f64>,
}

impl SubscriberSummary {
    /// Render the summary the way the operator sees it after `results`.
    pub fn display_line(&self) -> String {
        match self.mean_latency {
            Some(mean) => format!(
                "{} received: {} messages, average: {} (min {}, max {}, p95 {})",
                self.subscriber_id,
                self.count,
                crate::utils::format_latency(mean),
                crate::utils::format_latency(self.min_latency.unwrap_or(0.0)),
                crate::utils::format_latency(self.max_latency.unwrap_or(0.0)),
                crate::utils::format_latency(self.p95_latency.unwrap_or(0.0)),
            ),
            None => format!("No messages received for subscriber: {}", self.subscriber_id),
        }
    }
}

struct Bucket {
    /// Arrival-ordered latencies in seconds
    samples: Vec<f64>,
    /// Microsecond-resolution histogram backing the percentile figures
    histogram: Histogram<u64>,
}

impl Bucket {
    fn new() -> Result<Self> {
        Ok(Self {
            samples: Vec::new(),
            histogram: Histogram::<u64>::new(3)?,
        })
    }

    fn record(&mut self, latency: f64) -> Result<()> {
        self.samples.push(latency);
        let micros = (latency.max(0.0) * 1_000_000.0).round() as u64;
        self.histogram.record(micros)?;
        Ok(())
    }

    fn clear(&mut self) {
        self.samples.clear();
        self.histogram.reset();
    }
}

/// Accumulates latency samples per subscriber id.
pub struct LatencyAggregator {
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl LatencyAggregator {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Append a sample to its subscriber's bucket, preserving arrival order.
    pub fn record(&self, sample: LatencySample) -> Result<()> {
        let mut buckets = self.buckets.lock();
        if !buckets.contains_key(&sample.subscriber_id) {
            buckets.insert(sample.subscriber_id.clone(), Bucket::new()?);
        }
        let bucket = buckets
            .get_mut(&sample.subscriber_id)
            .expect("bucket inserted above");
        bucket.record(sample.latency)
    }

    /// Summarize every bucket, sorted by subscriber id.
    pub fn summarize(&self) -> Vec<SubscriberSummary> {
        let buckets = self.buckets.lock();
        let mut summaries: Vec<SubscriberSummary> = buckets
            .iter()
            .map(|(id, bucket)| {
                let count = bucket.samples.len();
                if count == 0 {
                    SubscriberSummary {
                        subscriber_id: id.clone(),
                        count: 0,
                        mean_latency: None,
                        min_latency: None,
                        max_latency: None,
                        p95_latency: None,
                    }
                } else {
                    let mean = bucket.samples.iter().sum::<f64>() / count as f64;
                    SubscriberSummary {
                        subscriber_id: id.clone(),
                        count,
                        mean_latency: Some(mean),
                        min_latency: Some(bucket.histogram.min() as f64 / 1_000_000.0),
                        max_latency: Some(bucket.histogram.max() as f64 / 1_000_000.0),
                        p95_latency: Some(
                            bucket.histogram.value_at_percentile(95.0) as f64 / 1_000_000.0,
                        ),
                    }
                }
            })
            .collect();
        summaries.sort_by(|a, b| a.subscriber_id.cmp(&b.subscriber_id));
        summaries
    }

    /// Clear every bucket under one lock acquisition.
    ///
    /// Bucket keys survive the reset, so a subsequent `summarize` still lists
    /// every previously seen subscriber with a count of zero.
    pub fn reset(&self) {
        let mut buckets = self.buckets.lock();
        for bucket in buckets.values_mut() {
            bucket.clear();
        }
    }

    /// Total samples currently held across all buckets.
    pub fn total_samples(&self) -> usize {
        self.buckets.lock().values().map(|b| b.samples.len()).sum()
    }
}

impl Default for LatencyAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str, latency: f64) -> LatencySample {
        LatencySample {
            subscriber_id: id.to_string(),
            sent: 100.0,
            received: 100.0 + latency,
            latency,
        }
    }

    #[test]
    fn test_mean_and_count() {
        let agg = LatencyAggregator::new();
        for latency in [0.010, 0.020, 0.030] {
            agg.record(sample("sub1", latency)).unwrap();
        }

        let summaries = agg.summarize();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].count, 3);
        let mean = summaries[0].mean_latency.unwrap();
        assert!((mean - 0.020).abs() < 1e-9, "mean was {}", mean);
    }

    #[test]
    fn test_reset_reports_zero_for_known_subscribers() {
        let agg = LatencyAggregator::new();
        agg.record(sample("sub1", 0.05)).unwrap();
        agg.record(sample("sub2", 0.07)).unwrap();

        agg.reset();

        let summaries = agg.summarize();
        assert_eq!(summaries.len(), 2);
        for summary in summaries {
            assert_eq!(summary.count, 0);
            assert!(summary.mean_latency.is_none());
        }
        assert_eq!(agg.total_samples(), 0);
    }

    #[test]
    fn test_buckets_are_independent() {
        let agg = LatencyAggregator::new();
        agg.record(sample("sub1", 0.01)).unwrap();
        agg.record(sample("sub2", 0.02)).unwrap();
        agg.record(sample("sub2", 0.04)).unwrap();

        let summaries = agg.summarize();
        assert_eq!(summaries[0].subscriber_id, "sub1");
        assert_eq!(summaries[0].count, 1);
        assert_eq!(summaries[1].subscriber_id, "sub2");
        assert_eq!(summaries[1].count, 2);
    }

    #[test]
    fn test_empty_bucket_display() {
        let agg = LatencyAggregator::new();
        agg.record(sample("sub1", 0.01)).unwrap();
        agg.reset();
        let summaries = agg.summarize();
        assert!(summaries[0].display_line().contains("No messages received"));
    }

    #[test]
    fn test_percentiles_present() {
        let agg = LatencyAggregator::new();
        for i in 1..=100 {
            agg.record(sample("sub1", i as f64 / 1000.0)).unwrap();
        }
        let summary = &agg.summarize()[0];
        let p95 = summary.p95_latency.unwrap();
        // 95th of 1..100 ms, allowing for histogram resolution
        assert!(p95 > 0.090 && p95 < 0.101, "p95 was {}", p95);
        assert!(summary.min_latency.unwrap() <= 0.0011);
        assert!(summary.max_latency.unwrap() >= 0.099);
    }
}
