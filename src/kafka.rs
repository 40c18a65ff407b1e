//! Kafka sink implementation
//!
//! Pure Rust Kafka producer via [rskafka](https://crates.io/crates/rskafka),
//! no C dependencies. Concurrent writes coalesce into produce batches of up
//! to `batch_max_records`, bounded by a `linger_ms` window, but a write only
//! reports success once the broker accepted the batch containing its record.
//! The caller's write-then-ack ordering therefore holds across batching: a
//! record is never acknowledged while it exists only in process memory.
//!
//! Enabled with the `kafka` feature.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rskafka::client::partition::{PartitionClient, UnknownTopicHandling};
use rskafka::client::ClientBuilder;
use rskafka::record::Record;
use tokio::sync::{oneshot, Mutex, Notify};
use tracing::debug;

use crate::config::{Compression, ConnectorConfig};
use crate::error::{ConnectorError, Result};
use crate::sink::{SinkFactory, SinkRecord, SinkWriter};

impl From<Compression> for rskafka::client::partition::Compression {
    fn from(codec: Compression) -> Self {
        match codec {
            Compression::None => rskafka::client::partition::Compression::NoCompression,
            Compression::Gzip => rskafka::client::partition::Compression::Gzip,
            Compression::Snappy => rskafka::client::partition::Compression::Snappy,
            Compression::Lz4 => rskafka::client::partition::Compression::Lz4,
            Compression::Zstd => rskafka::client::partition::Compression::Zstd,
        }
    }
}

/// Builds Kafka writers from connector configuration
#[derive(Debug, Default)]
pub struct KafkaSinkFactory;

impl KafkaSinkFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SinkFactory for KafkaSinkFactory {
    async fn connect_writer(&self, config: &ConnectorConfig) -> Result<Arc<dyn SinkWriter>> {
        let timeout = Duration::from_millis(config.connect_timeout_ms);

        let client = tokio::time::timeout(
            timeout,
            ClientBuilder::new(config.brokers.clone()).build(),
        )
        .await
        .map_err(|_| {
            ConnectorError::timeout(format!(
                "connecting to brokers {:?} exceeded {}ms",
                config.brokers, config.connect_timeout_ms
            ))
        })?
        .map_err(|e| {
            ConnectorError::internal(format!(
                "failed to connect to brokers {:?}: {}",
                config.brokers, e
            ))
        })?;

        let partition = client
            .partition_client(&config.topic, 0, UnknownTopicHandling::Retry)
            .await
            .map_err(|e| {
                ConnectorError::internal(format!(
                    "failed to create partition client for topic {}: {}",
                    config.topic, e
                ))
            })?;

        debug!(
            topic = %config.topic,
            brokers = ?config.brokers,
            "kafka writer connected"
        );

        Ok(Arc::new(KafkaSinkWriter {
            partition,
            compression: config.compression.into(),
            batcher: WriteBatcher::new(
                config.batch_max_records,
                Duration::from_millis(config.linger_ms),
            ),
        }))
    }
}

/// Outcome of one produce call, fanned out to every write in the batch
type ProduceOutcome = std::result::Result<(), String>;

/// Records and completion channels accumulated for the next produce call
#[derive(Default)]
struct BatchState {
    records: Vec<Record>,
    waiters: Vec<oneshot::Sender<ProduceOutcome>>,
}

/// Coalesces concurrent writes into shared produce batches.
///
/// The write that opens a batch owns its flush, after a linger window that
/// ends early once the batch is full. A write that fills the batch also
/// flushes, so a cancelled owner cannot strand a full batch. Every write
/// receives the outcome of exactly the produce call that carried its record.
struct WriteBatcher {
    state: Mutex<BatchState>,
    full: Notify,
    max_records: usize,
    linger: Duration,
}

impl WriteBatcher {
    fn new(max_records: usize, linger: Duration) -> Self {
        Self {
            state: Mutex::new(BatchState::default()),
            full: Notify::new(),
            max_records,
            linger,
        }
    }

    /// Add a record to the open batch. Returns the completion receiver and
    /// whether the caller must flush.
    async fn join(&self, record: Record) -> (oneshot::Receiver<ProduceOutcome>, bool) {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock().await;
        state.records.push(record);
        state.waiters.push(tx);
        let len = state.records.len();
        if len >= self.max_records {
            self.full.notify_one();
        }
        (rx, len == 1 || len >= self.max_records)
    }

    /// Wait out the linger window, ending early once the batch fills
    async fn wait_fill(&self) {
        let _ = tokio::time::timeout(self.linger, self.full.notified()).await;
    }

    /// Take the open batch, leaving an empty one behind
    async fn take(&self) -> BatchState {
        let mut state = self.state.lock().await;
        std::mem::take(&mut *state)
    }

    fn complete(waiters: Vec<oneshot::Sender<ProduceOutcome>>, outcome: &ProduceOutcome) {
        for tx in waiters {
            let _ = tx.send(outcome.clone());
        }
    }
}

/// Writer producing to a single Kafka topic partition
pub struct KafkaSinkWriter {
    partition: PartitionClient,
    compression: rskafka::client::partition::Compression,
    batcher: WriteBatcher,
}

impl KafkaSinkWriter {
    /// Produce the open batch and fan its outcome out to the waiting writes
    async fn flush(&self) -> ProduceOutcome {
        let batch = self.batcher.take().await;
        if batch.records.is_empty() {
            return Ok(());
        }

        let count = batch.records.len();
        let outcome = self
            .partition
            .produce(batch.records, self.compression)
            .await
            .map(|_| ())
            .map_err(|e| format!("produce of {count} records failed: {e}"));
        if outcome.is_ok() {
            debug!(records = count, "produced batch");
        }
        WriteBatcher::complete(batch.waiters, &outcome);
        outcome
    }
}

#[async_trait]
impl SinkWriter for KafkaSinkWriter {
    async fn write(&self, record: SinkRecord) -> Result<()> {
        let record = Record {
            key: record.key.map(|k| k.to_vec()),
            value: Some(record.payload.to_vec()),
            headers: BTreeMap::new(),
            timestamp: chrono::Utc::now(),
        };

        let (outcome, flush) = self.batcher.join(record).await;
        if flush {
            self.batcher.wait_fill().await;
            // the caller learns the result through its own receiver; a write
            // racing us to an already-taken batch flushes nothing
            let _ = self.flush().await;
        }

        match outcome.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => Err(ConnectorError::write(message)),
            Err(_) => Err(ConnectorError::write(
                "writer closed before the batch was produced",
            )),
        }
    }

    async fn close(&self) -> Result<()> {
        self.flush().await.map_err(ConnectorError::write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(value: &[u8]) -> Record {
        Record {
            key: None,
            value: Some(value.to_vec()),
            headers: BTreeMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_compression_conversion() {
        use rskafka::client::partition::Compression as RsCompression;

        assert!(matches!(
            RsCompression::from(Compression::None),
            RsCompression::NoCompression
        ));
        assert!(matches!(
            RsCompression::from(Compression::Lz4),
            RsCompression::Lz4
        ));
        assert!(matches!(
            RsCompression::from(Compression::Zstd),
            RsCompression::Zstd
        ));
    }

    #[tokio::test]
    async fn test_first_join_owns_the_flush() {
        let batcher = WriteBatcher::new(10, Duration::from_millis(5));
        let (_rx_a, flush_a) = batcher.join(record(b"a")).await;
        let (_rx_b, flush_b) = batcher.join(record(b"b")).await;
        assert!(flush_a);
        assert!(!flush_b);

        let batch = batcher.take().await;
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.waiters.len(), 2);
        assert!(batcher.take().await.records.is_empty());
    }

    #[tokio::test]
    async fn test_filling_join_flushes_without_lingering() {
        let batcher = WriteBatcher::new(2, Duration::from_secs(60));
        let (_rx_a, _) = batcher.join(record(b"a")).await;
        let (_rx_b, flush_b) = batcher.join(record(b"b")).await;
        // the write that filled the batch must not wait out the linger
        assert!(flush_b);
        tokio::time::timeout(Duration::from_millis(100), batcher.wait_fill())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_every_waiter_observes_its_batch_outcome() {
        let batcher = WriteBatcher::new(10, Duration::from_millis(5));
        let (rx_a, _) = batcher.join(record(b"a")).await;
        let (rx_b, _) = batcher.join(record(b"b")).await;

        let batch = batcher.take().await;
        WriteBatcher::complete(batch.waiters, &Err("broker gone".to_string()));

        assert_eq!(rx_a.await.unwrap(), Err("broker gone".to_string()));
        assert_eq!(rx_b.await.unwrap(), Err("broker gone".to_string()));

        // the next batch is independent of the failed one
        let (rx_c, flush_c) = batcher.join(record(b"c")).await;
        assert!(flush_c);
        let batch = batcher.take().await;
        assert_eq!(batch.records.len(), 1);
        WriteBatcher::complete(batch.waiters, &Ok(()));
        assert_eq!(rx_c.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn test_dropped_batch_reports_an_error_to_waiters() {
        let batcher = WriteBatcher::new(10, Duration::from_millis(5));
        let (rx, _) = batcher.join(record(b"a")).await;
        drop(batcher.take().await);
        // sender dropped without an outcome: the write must not report Ok
        assert!(rx.await.is_err());
    }
}
