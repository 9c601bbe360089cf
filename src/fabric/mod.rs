//! Fabric transport abstraction layer.
//!
//! The harness never talks to the broker directly; it goes through the
//! [`FabricConnection`] trait so that tests can substitute recording
//! connections and alternative brokers can be slotted in behind the same
//! seam. [`stomp`] provides the production implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod stomp;

pub use stomp::{StompConnection, StompConnectionFactory};

/// Errors raised at the fabric transport boundary.
#[derive(Debug, Error)]
pub enum FabricError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("broker refused connection: {0}")]
    Handshake(String),
    #[error("protocol violation: {0}")]
    Protocol(String),
    #[error("envelope serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The message envelope carried on the fabric.
///
/// `start` is the publish timestamp in decimal seconds since epoch, captured
/// immediately before transmission; `payload` is the opaque telemetry frame,
/// hex encoded. Subscribers compute latency as receive time minus `start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub start: f64,
    pub payload: String,
}

/// Broker endpoint and credentials.
#[derive(Debug, Clone)]
pub struct FabricConfig {
    pub address: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

/// One live publish session on the fabric.
#[async_trait]
pub trait FabricConnection: Send {
    /// Publish an envelope to a topic.
    async fn send_envelope(&mut self, topic: &str, envelope: &Envelope) -> Result<(), FabricError>;

    /// Tear the session down. Called only at shutdown.
    async fn close(&mut self) -> Result<(), FabricError>;
}

/// Opens fabric connections on demand for the publisher driver.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn FabricConnection>, FabricError>;
}

/// Map a bare topic name to a broker destination.
///
/// Topics already expressed as full destinations pass through unchanged.
pub fn topic_destination(topic: &str) -> String {
    if topic.starts_with('/') {
        topic.to_string()
    } else {
        format!("/topic/{}", topic)
    }
}
