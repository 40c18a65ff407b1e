//! Sink system capability
//!
//! Writer construction returns an explicit `Result`: a failed build is never
//! represented as an absent handle indistinguishable from "not yet
//! attempted". No half-open writer is ever handed to a connector.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::ConnectorConfig;
use crate::error::Result;

/// One record produced to the sink
#[derive(Debug, Clone)]
pub struct SinkRecord {
    /// Destination topic
    pub topic: String,
    /// Optional partition key
    pub key: Option<Bytes>,
    /// Opaque payload
    pub payload: Bytes,
}

impl SinkRecord {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            key: None,
            payload: payload.into(),
        }
    }

    pub fn with_key(mut self, key: impl Into<Bytes>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// Writer handle bound to one sink topic
#[async_trait]
pub trait SinkWriter: Send + Sync {
    /// Write one record. Failures are retried by the forwarder per policy.
    async fn write(&self, record: SinkRecord) -> Result<()>;

    /// Flush and release the writer. Called exactly once per activation,
    /// after the drain protocol has completed.
    async fn close(&self) -> Result<()>;
}

/// Builds sink writers from connector configuration
#[async_trait]
pub trait SinkFactory: Send + Sync {
    /// Construct a writer for the config's topic, brokers and batching
    /// options. Returns a usable handle or an error, nothing in between.
    async fn connect_writer(&self, config: &ConnectorConfig) -> Result<Arc<dyn SinkWriter>>;
}
