//! Message forwarder and drain protocol
//!
//! The forwarder runs on the source client's delivery tasks, concurrently
//! with administrative calls. Shutdown must not close the writer while a
//! forwarder invocation is using it, so every invocation holds an in-flight
//! permit: shutdown first flips the draining flag (new deliveries bail out
//! without touching the writer), then waits for outstanding permits, then
//! closes the writer.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{error, trace, warn};

use crate::policy::RetryPolicy;
use crate::sink::{SinkRecord, SinkWriter};
use crate::source::{Delivery, DeliveryHandler};
use crate::stats::ConnectorStats;

/// Coordinates in-flight forwarder invocations with shutdown
#[derive(Debug, Default)]
pub struct DrainGuard {
    in_flight: AtomicUsize,
    draining: AtomicBool,
    drained: Notify,
}

impl DrainGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take an in-flight permit, or `None` once draining has begun.
    ///
    /// The count is incremented before the draining flag is checked, so a
    /// permit taken concurrently with `begin_drain` is either observed by
    /// the waiter or released immediately.
    pub fn enter(self: &Arc<Self>) -> Option<InFlightPermit> {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        let permit = InFlightPermit(Arc::clone(self));
        if self.draining.load(Ordering::Acquire) {
            drop(permit);
            return None;
        }
        Some(permit)
    }

    /// Disable further delivery. Idempotent.
    pub fn begin_drain(&self) {
        self.draining.store(true, Ordering::Release);
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Current in-flight invocation count
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Wait until no invocation is in flight, bounded by `timeout`.
    /// Returns `false` if the bound expired with work still outstanding.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            // register as a waiter before reading the counter, so a permit
            // dropped between the read and the await still wakes us
            notified.as_mut().enable();
            if self.in_flight.load(Ordering::Acquire) == 0 {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.in_flight.load(Ordering::Acquire) == 0;
            }
        }
    }
}

/// RAII permit for one forwarder invocation
pub struct InFlightPermit(Arc<DrainGuard>);

impl Drop for InFlightPermit {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.drained.notify_waiters();
        }
    }
}

/// Relays one delivery to the sink and acknowledges it on success
pub struct Forwarder {
    name: String,
    topic: String,
    partition_key: Option<Bytes>,
    writer: Arc<dyn SinkWriter>,
    stats: Arc<ConnectorStats>,
    retry: RetryPolicy,
    drain: Arc<DrainGuard>,
    failed: Arc<AtomicBool>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl Forwarder {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        topic: String,
        partition_key: Option<Bytes>,
        writer: Arc<dyn SinkWriter>,
        stats: Arc<ConnectorStats>,
        retry: RetryPolicy,
        drain: Arc<DrainGuard>,
        failed: Arc<AtomicBool>,
        last_error: Arc<Mutex<Option<String>>>,
    ) -> Self {
        Self {
            name,
            topic,
            partition_key,
            writer,
            stats,
            retry,
            drain,
            failed,
            last_error,
        }
    }

    /// Wrap this forwarder as a subscription delivery callback
    pub fn handler(self: Arc<Self>) -> DeliveryHandler {
        Arc::new(move |delivery| {
            let forwarder = Arc::clone(&self);
            Box::pin(async move { forwarder.forward(delivery).await })
        })
    }

    /// Write one delivery to the sink, then acknowledge it.
    ///
    /// At-least-once contract: the ack only happens after the write
    /// succeeded. If the retry policy is exhausted the message is left
    /// unacknowledged (the source redelivers) and the connector is flipped
    /// to a failed state the supervisor can observe.
    async fn forward(&self, delivery: Delivery) {
        let Some(_permit) = self.drain.enter() else {
            trace!(
                connector = %self.name,
                sequence = delivery.sequence,
                "dropping delivery received while draining"
            );
            return;
        };

        self.stats.record_message_in();

        let mut record = SinkRecord::new(&self.topic, delivery.payload.clone());
        if let Some(key) = &self.partition_key {
            record = record.with_key(key.clone());
        }
        let bytes = delivery.len() as u64;

        let mut attempts = 0u32;
        let outcome = self
            .retry
            .run(|| {
                attempts += 1;
                let record = record.clone();
                async move { self.writer.write(record).await }
            })
            .await;
        if attempts > 1 {
            self.stats.record_write_retries(attempts as u64 - 1);
        }

        match outcome {
            Ok(()) => {
                if let Err(e) = delivery.ack().await {
                    // the write landed; redelivery is the worst case here
                    warn!(
                        connector = %self.name,
                        sequence = delivery.sequence,
                        "failed to ack delivery: {e}"
                    );
                }
                self.stats.record_forwarded(bytes);
            }
            Err(e) => {
                self.stats.record_write_error();
                *self.last_error.lock() = Some(e.to_string());
                self.failed.store(true, Ordering::Release);
                error!(
                    connector = %self.name,
                    sequence = delivery.sequence,
                    attempts,
                    "sink write exhausted retry policy, connector marked failed: {e}"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_permit_released_on_drop() {
        let guard = Arc::new(DrainGuard::new());
        let permit = guard.enter().unwrap();
        assert_eq!(guard.in_flight(), 1);
        drop(permit);
        assert_eq!(guard.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_enter_refused_while_draining() {
        let guard = Arc::new(DrainGuard::new());
        guard.begin_drain();
        assert!(guard.enter().is_none());
        assert_eq!(guard.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_wait_idle_returns_immediately_when_idle() {
        let guard = Arc::new(DrainGuard::new());
        guard.begin_drain();
        assert!(guard.wait_idle(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_wait_idle_observes_completion() {
        let guard = Arc::new(DrainGuard::new());
        let permit = guard.enter().unwrap();
        guard.begin_drain();

        let waiter = {
            let guard = guard.clone();
            tokio::spawn(async move { guard.wait_idle(Duration::from_secs(1)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(permit);

        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_idle_wakes_promptly_not_at_the_deadline() {
        let guard = Arc::new(DrainGuard::new());
        let permit = guard.enter().unwrap();
        guard.begin_drain();

        let waiter = {
            let guard = guard.clone();
            tokio::spawn(async move {
                let started = std::time::Instant::now();
                let idle = guard.wait_idle(Duration::from_secs(30)).await;
                (idle, started.elapsed())
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(permit);

        let (idle, elapsed) = waiter.await.unwrap();
        assert!(idle);
        // the permit drop must wake the waiter, not the 30s deadline
        assert!(elapsed < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_wait_idle_times_out_with_work_outstanding() {
        let guard = Arc::new(DrainGuard::new());
        let _permit = guard.enter().unwrap();
        guard.begin_drain();
        assert!(!guard.wait_idle(Duration::from_millis(20)).await);
    }
}
