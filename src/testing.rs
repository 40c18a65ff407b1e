//! Testing utilities
//!
//! Mock source and sink implementations for exercising connector lifecycle
//! behavior without external systems. Deliveries are injected manually so
//! tests control exactly when the forwarder runs relative to administrative
//! calls.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::config::ConnectorConfig;
use crate::error::{ConnectorError, Result};
use crate::sink::{SinkFactory, SinkRecord, SinkWriter};
use crate::source::{Acker, Delivery, DeliveryHandler, SourceClient, Subscription};

// ============================================================================
// Mock Source
// ============================================================================

/// A scriptable source client. Inject deliveries with [`deliver`], inspect
/// acks and unsubscribes afterwards.
///
/// [`deliver`]: MockSourceClient::deliver
pub struct MockSourceClient {
    connected: AtomicBool,
    subscribe_error: Mutex<Option<String>>,
    unsubscribe_error: Mutex<Option<String>>,
    handler: Arc<Mutex<Option<DeliveryHandler>>>,
    channel: Mutex<Option<String>>,
    last_durable_name: Mutex<Option<String>>,
    subscribes: AtomicU64,
    unsubscribes: Arc<AtomicU64>,
    next_sequence: AtomicU64,
    acked: Arc<Mutex<Vec<u64>>>,
}

impl Default for MockSourceClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSourceClient {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            subscribe_error: Mutex::new(None),
            unsubscribe_error: Mutex::new(None),
            handler: Arc::new(Mutex::new(None)),
            channel: Mutex::new(None),
            last_durable_name: Mutex::new(None),
            subscribes: AtomicU64::new(0),
            unsubscribes: Arc::new(AtomicU64::new(0)),
            next_sequence: AtomicU64::new(0),
            acked: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Script the reachability probe
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    /// Make the next subscribe call fail
    pub fn fail_subscribe_with(&self, message: impl Into<String>) {
        *self.subscribe_error.lock() = Some(message.into());
    }

    /// Make unsubscribe calls fail
    pub fn fail_unsubscribe_with(&self, message: impl Into<String>) {
        *self.unsubscribe_error.lock() = Some(message.into());
    }

    /// Deliver one message to the registered handler, awaiting the forwarder.
    /// Returns `false` when no handler is registered.
    pub async fn deliver(&self, payload: impl Into<Bytes>) -> bool {
        let handler = { self.handler.lock().clone() };
        let Some(handler) = handler else {
            return false;
        };

        let sequence = self.next_sequence.fetch_add(1, Ordering::AcqRel) + 1;
        let channel = self.channel.lock().clone().unwrap_or_default();
        let acker = Arc::new(MockAcker {
            sequence,
            acked: Arc::clone(&self.acked),
        });

        handler(Delivery::new(channel, sequence, payload.into(), acker)).await;
        true
    }

    /// Sequences acknowledged so far
    pub fn acked(&self) -> Vec<u64> {
        self.acked.lock().clone()
    }

    pub fn subscribe_count(&self) -> u64 {
        self.subscribes.load(Ordering::Acquire)
    }

    pub fn unsubscribe_count(&self) -> u64 {
        self.unsubscribes.load(Ordering::Acquire)
    }

    /// Durable name passed to the most recent subscribe call
    pub fn last_durable_name(&self) -> Option<String> {
        self.last_durable_name.lock().clone()
    }

    /// Whether a delivery handler is currently registered
    pub fn has_handler(&self) -> bool {
        self.handler.lock().is_some()
    }
}

#[async_trait]
impl SourceClient for MockSourceClient {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn subscribe(
        &self,
        channel: &str,
        durable_name: Option<&str>,
        handler: DeliveryHandler,
    ) -> Result<Box<dyn Subscription>> {
        if let Some(message) = self.subscribe_error.lock().take() {
            return Err(ConnectorError::internal(message));
        }

        self.subscribes.fetch_add(1, Ordering::AcqRel);
        *self.channel.lock() = Some(channel.to_string());
        *self.last_durable_name.lock() = durable_name.map(str::to_string);
        *self.handler.lock() = Some(handler);

        Ok(Box::new(MockSubscription {
            handler: Arc::clone(&self.handler),
            unsubscribes: Arc::clone(&self.unsubscribes),
            fail_with: self.unsubscribe_error.lock().clone(),
        }))
    }
}

struct MockSubscription {
    handler: Arc<Mutex<Option<DeliveryHandler>>>,
    unsubscribes: Arc<AtomicU64>,
    fail_with: Option<String>,
}

#[async_trait]
impl Subscription for MockSubscription {
    async fn unsubscribe(&self) -> Result<()> {
        self.unsubscribes.fetch_add(1, Ordering::AcqRel);
        *self.handler.lock() = None;
        match &self.fail_with {
            Some(message) => Err(ConnectorError::internal(message.clone())),
            None => Ok(()),
        }
    }
}

struct MockAcker {
    sequence: u64,
    acked: Arc<Mutex<Vec<u64>>>,
}

#[async_trait]
impl Acker for MockAcker {
    async fn ack(&self) -> Result<()> {
        self.acked.lock().push(self.sequence);
        Ok(())
    }
}

// ============================================================================
// Mock Sink
// ============================================================================

/// A scriptable sink writer recording everything written to it
pub struct MockSinkWriter {
    written: Mutex<Vec<SinkRecord>>,
    closes: AtomicU64,
    write_delay: Mutex<Option<Duration>>,
    // None = never fail, Some(u32::MAX) = always fail
    fail_writes_remaining: Mutex<Option<u32>>,
    fail_close: Mutex<Option<String>>,
}

impl Default for MockSinkWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSinkWriter {
    pub fn new() -> Self {
        Self {
            written: Mutex::new(Vec::new()),
            closes: AtomicU64::new(0),
            write_delay: Mutex::new(None),
            fail_writes_remaining: Mutex::new(None),
            fail_close: Mutex::new(None),
        }
    }

    /// Records written so far
    pub fn written(&self) -> Vec<SinkRecord> {
        self.written.lock().clone()
    }

    pub fn write_count(&self) -> usize {
        self.written.lock().len()
    }

    pub fn close_count(&self) -> u64 {
        self.closes.load(Ordering::Acquire)
    }

    /// Delay every write, for exercising the drain protocol
    pub fn set_write_delay(&self, delay: Duration) {
        *self.write_delay.lock() = Some(delay);
    }

    /// Fail the next `n` writes with a retryable error
    pub fn fail_next_writes(&self, n: u32) {
        *self.fail_writes_remaining.lock() = Some(n);
    }

    /// Fail every write from now on
    pub fn fail_all_writes(&self) {
        *self.fail_writes_remaining.lock() = Some(u32::MAX);
    }

    /// Make close fail
    pub fn fail_close_with(&self, message: impl Into<String>) {
        *self.fail_close.lock() = Some(message.into());
    }
}

#[async_trait]
impl SinkWriter for MockSinkWriter {
    async fn write(&self, record: SinkRecord) -> Result<()> {
        let delay = *self.write_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let should_fail = {
            let mut remaining = self.fail_writes_remaining.lock();
            match *remaining {
                Some(0) | None => false,
                Some(n) => {
                    if n != u32::MAX {
                        *remaining = Some(n - 1);
                    }
                    true
                }
            }
        };
        if should_fail {
            return Err(ConnectorError::write("scripted write failure"));
        }

        self.written.lock().push(record);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::AcqRel);
        match self.fail_close.lock().clone() {
            Some(message) => Err(ConnectorError::internal(message)),
            None => Ok(()),
        }
    }
}

/// A sink factory handing out one shared mock writer
pub struct MockSinkFactory {
    writer: Arc<MockSinkWriter>,
    fail_with: Mutex<Option<String>>,
    connects: AtomicU64,
}

impl Default for MockSinkFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSinkFactory {
    pub fn new() -> Self {
        Self {
            writer: Arc::new(MockSinkWriter::new()),
            fail_with: Mutex::new(None),
            connects: AtomicU64::new(0),
        }
    }

    /// The writer every connect receives
    pub fn writer(&self) -> Arc<MockSinkWriter> {
        Arc::clone(&self.writer)
    }

    /// Make connect_writer fail
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.fail_with.lock() = Some(message.into());
    }

    /// Total connect_writer attempts, including failed ones
    pub fn connect_count(&self) -> u64 {
        self.connects.load(Ordering::Acquire)
    }
}

#[async_trait]
impl SinkFactory for MockSinkFactory {
    async fn connect_writer(&self, _config: &ConnectorConfig) -> Result<Arc<dyn SinkWriter>> {
        self.connects.fetch_add(1, Ordering::AcqRel);
        if let Some(message) = self.fail_with.lock().clone() {
            return Err(ConnectorError::internal(message));
        }
        Ok(self.writer() as Arc<dyn SinkWriter>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deliver_without_handler() {
        let client = MockSourceClient::new();
        assert!(!client.deliver("hello").await);
    }

    #[tokio::test]
    async fn test_subscribe_records_durable_name() {
        let client = MockSourceClient::new();
        let handler: DeliveryHandler = Arc::new(|_| Box::pin(async {}));
        client
            .subscribe("orders", Some("dur1"), handler)
            .await
            .unwrap();
        assert_eq!(client.subscribe_count(), 1);
        assert_eq!(client.last_durable_name().as_deref(), Some("dur1"));
        assert!(client.has_handler());
    }

    #[tokio::test]
    async fn test_unsubscribe_clears_handler() {
        let client = MockSourceClient::new();
        let handler: DeliveryHandler = Arc::new(|_| Box::pin(async {}));
        let sub = client.subscribe("orders", None, handler).await.unwrap();
        sub.unsubscribe().await.unwrap();
        assert_eq!(client.unsubscribe_count(), 1);
        assert!(!client.has_handler());
        assert!(!client.deliver("late").await);
    }

    #[tokio::test]
    async fn test_writer_scripted_failures() {
        let writer = MockSinkWriter::new();
        writer.fail_next_writes(1);
        assert!(writer.write(SinkRecord::new("t", "a")).await.is_err());
        assert!(writer.write(SinkRecord::new("t", "b")).await.is_ok());
        assert_eq!(writer.write_count(), 1);
    }
}
