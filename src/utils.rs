//! Clock and formatting utilities shared across the harness.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as decimal seconds since the Unix epoch.
///
/// This is the timestamp format carried in message envelopes and worker CSV
/// records. Latency math assumes publisher and subscriber clocks are
/// synchronized.
pub fn epoch_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Encode bytes as a lowercase hex string.
pub fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// Format a latency in seconds for human-readable output.
pub fn format_latency(seconds: f64) -> String {
    if seconds < 0.001 {
        format!("{:.2}\u{3bc}s", seconds * 1_000_000.0)
    } else if seconds < 1.0 {
        format!("{:.2}ms", seconds * 1_000.0)
    } else {
        format!("{:.3}s", seconds)
    }
}
