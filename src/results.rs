//! Optional result sink.
//!
//! When enabled via `--results-file`, every serviced `results` request
//! appends one JSON snapshot line to the file, capturing the per-subscriber
//! summaries and the running parse-failure count at that moment. JSON-lines
//! keeps the file valid after an unclean exit; no finalization pass is
//! required.

use crate::aggregator::SubscriberSummary;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One snapshot of the run, written per serviced `results` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsSnapshot {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub harness_version: String,
    pub subscribers: Vec<SubscriberSummary>,
    pub parse_failures: u64,
}

impl ResultsSnapshot {
    pub fn new(subscribers: Vec<SubscriberSummary>, parse_failures: u64) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            harness_version: crate::VERSION.to_string(),
            subscribers,
            parse_failures,
        }
    }
}

/// Appends snapshots to a JSON-lines file.
pub struct ResultsSink {
    path: PathBuf,
    snapshots_written: usize,
}

impl ResultsSink {
    /// Create the sink, truncating any previous file at the path.
    pub fn new(path: &Path) -> Result<Self> {
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("creating results file {:?}", path))?;
        debug!("results sink enabled: {:?}", path);
        Ok(Self {
            path: path.to_path_buf(),
            snapshots_written: 0,
        })
    }

    /// Append one snapshot line.
    pub fn write_snapshot(&mut self, snapshot: &ResultsSnapshot) -> Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening results file {:?}", self.path))?;
        let json = serde_json::to_string(snapshot)?;
        writeln!(file, "{}", json)?;
        file.flush()?;
        self.snapshots_written += 1;
        Ok(())
    }

    pub fn snapshots_written(&self) -> usize {
        self.snapshots_written
    }
}
