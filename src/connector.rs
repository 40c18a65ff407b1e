//! Connector lifecycle core
//!
//! A connector is a two-state machine, Stopped and Running. Start acquires
//! the sink writer and the source subscription under a single administrative
//! lock; a failed Start leaves nothing behind. Shutdown is idempotent,
//! drains in-flight deliveries before closing the writer, and never
//! unsubscribes a durable subscription.
//!
//! The shared `LifecycleCore` is composed into each connector variant; the
//! supervisor addresses variants only through the `Connector` trait.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::{info, trace, warn};

use crate::config::ConnectorConfig;
use crate::error::{ConnectorError, Result};
use crate::forwarder::{DrainGuard, Forwarder};
use crate::health::{ConnectorHealth, ConnectorStatus};
use crate::sink::{SinkFactory, SinkWriter};
use crate::source::{SourceClient, Subscription};
use crate::stats::{BridgeStats, ConnectorStats};

/// Shared services the supervisor hands every connector at construction.
/// Explicit dependency injection; no ambient globals.
#[derive(Clone)]
pub struct BridgeHandle {
    /// Client for the source pub/sub system
    pub source: Arc<dyn SourceClient>,
    /// Factory for sink writers
    pub sinks: Arc<dyn SinkFactory>,
    /// Shared statistics sink, owned by the bridge
    pub stats: Arc<BridgeStats>,
}

impl BridgeHandle {
    pub fn new(source: Arc<dyn SourceClient>, sinks: Arc<dyn SinkFactory>) -> Self {
        Self {
            source,
            sinks,
            stats: Arc::new(BridgeStats::new()),
        }
    }
}

/// Capability interface the supervisor addresses connectors through
#[async_trait]
pub trait Connector: Send + Sync {
    /// Human-readable label derived from the channel and topic names
    fn name(&self) -> &str;

    /// Acquire external resources and begin relaying. Atomic with respect
    /// to concurrent Start/Shutdown on the same connector; a failure leaves
    /// the connector Stopped with no resources held.
    async fn start(&self) -> Result<()>;

    /// Release external resources. Idempotent; records a disconnect
    /// statistic on every invocation. Unsubscribe/close failures are
    /// returned but the connector is fully stopped regardless.
    async fn shutdown(&self) -> Result<()>;

    /// Verify the source system is reachable. Read-only: never touches the
    /// writer or subscription handles and never takes the admin lock.
    fn check_connections(&self) -> Result<()>;

    /// Current observable state
    fn status(&self) -> ConnectorStatus;

    /// Health snapshot for the supervisor's monitoring loop
    fn health(&self) -> ConnectorHealth;
}

/// Resources held only while Running. Both handles live and die together:
/// no state ever has one without the other.
struct ActiveResources {
    writer: Arc<dyn SinkWriter>,
    subscription: Box<dyn Subscription>,
    drain: Arc<DrainGuard>,
}

/// Shared lifecycle state composed into every connector variant
pub struct LifecycleCore {
    name: String,
    /// Admin lock serializing Start/Shutdown and guarding the handles
    active: Mutex<Option<ActiveResources>>,
    stats: Arc<ConnectorStats>,
    /// Set by the forwarder when a write exhausts its retry policy
    failed: Arc<AtomicBool>,
    /// Mirror of `active.is_some()` readable without the lock
    running: AtomicBool,
    last_error: Arc<parking_lot::Mutex<Option<String>>>,
}

impl LifecycleCore {
    pub fn new(name: String, stats: Arc<ConnectorStats>) -> Self {
        Self {
            name,
            active: Mutex::new(None),
            stats,
            failed: Arc::new(AtomicBool::new(false)),
            running: AtomicBool::new(false),
            last_error: Arc::new(parking_lot::Mutex::new(None)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> ConnectorStatus {
        if self.failed.load(Ordering::Acquire) {
            ConnectorStatus::Failed
        } else if self.running.load(Ordering::Acquire) {
            ConnectorStatus::Running
        } else {
            ConnectorStatus::Stopped
        }
    }

    pub fn health(&self) -> ConnectorHealth {
        let snap = self.stats.snapshot();
        ConnectorHealth {
            name: self.name.clone(),
            status: self.status(),
            messages_out: snap.messages_out,
            write_errors: snap.write_errors,
            last_error: self.last_error.lock().clone(),
        }
    }
}

/// Relays one source channel to one sink topic
pub struct ChannelRelay {
    config: ConnectorConfig,
    bridge: BridgeHandle,
    core: LifecycleCore,
}

impl ChannelRelay {
    pub fn new(config: ConnectorConfig, bridge: BridgeHandle) -> Self {
        let name = config.connector_name();
        let stats = bridge.stats.connector(&name);
        Self {
            config,
            bridge,
            core: LifecycleCore::new(name, stats),
        }
    }
}

#[async_trait]
impl Connector for ChannelRelay {
    fn name(&self) -> &str {
        self.core.name()
    }

    async fn start(&self) -> Result<()> {
        let mut active = self.core.active.lock().await;

        if active.is_some() {
            return Err(ConnectorError::AlreadyRunning(self.core.name.clone()));
        }

        if !self.bridge.source.is_connected() {
            return Err(ConnectorError::source_unavailable(&self.core.name));
        }

        trace!(connector = %self.core.name, "starting connection");

        let writer = self
            .bridge
            .sinks
            .connect_writer(&self.config)
            .await
            .map_err(|e| ConnectorError::sink_connect(&self.core.name, e.to_string()))?;

        let drain = Arc::new(DrainGuard::new());
        let forwarder = Arc::new(Forwarder::new(
            self.core.name.clone(),
            self.config.topic.clone(),
            self.config
                .partition_key
                .as_deref()
                .map(|k| Bytes::copy_from_slice(k.as_bytes())),
            Arc::clone(&writer),
            Arc::clone(&self.core.stats),
            self.config.retry.clone(),
            Arc::clone(&drain),
            Arc::clone(&self.core.failed),
            Arc::clone(&self.core.last_error),
        ));

        let subscription = match self
            .bridge
            .source
            .subscribe(
                &self.config.channel,
                self.config.durable_name.as_deref(),
                forwarder.handler(),
            )
            .await
        {
            Ok(sub) => sub,
            Err(e) => {
                // close the writer acquired above so a failed Start holds
                // no resources
                if let Err(close_err) = writer.close().await {
                    warn!(
                        connector = %self.core.name,
                        "failed to close writer after subscribe failure: {close_err}"
                    );
                }
                return Err(ConnectorError::source_subscribe(
                    &self.core.name,
                    e.to_string(),
                ));
            }
        };

        // a prior Failed status is cleared only once this Start has actually
        // succeeded; a failed Start leaves the supervisor's restart signal
        // intact
        self.core.failed.store(false, Ordering::Release);
        *self.core.last_error.lock() = None;

        *active = Some(ActiveResources {
            writer,
            subscription,
            drain,
        });
        self.core.running.store(true, Ordering::Release);
        self.core.stats.add_connect();

        trace!(connector = %self.core.name, channel = %self.config.channel, "opened and reading");
        info!(connector = %self.core.name, "started connection");

        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        let mut active = self.core.active.lock().await;

        // recorded on every invocation to keep supervisor-side counting
        // simple, even when nothing was running
        self.core.stats.add_disconnect();
        info!(connector = %self.core.name, "shutting down connection");

        self.core.running.store(false, Ordering::Release);

        let Some(resources) = active.take() else {
            return Ok(());
        };

        let mut failures: Vec<String> = Vec::new();

        // no new deliveries may touch the writer from here on
        resources.drain.begin_drain();

        if self.config.is_durable() {
            // durable subscriptions keep their replay cursor; the handle is
            // dropped without unsubscribing and a later Start resumes from it
            trace!(
                connector = %self.core.name,
                durable = self.config.durable_name.as_deref().unwrap_or_default(),
                "retaining durable subscription"
            );
        } else {
            trace!(connector = %self.core.name, channel = %self.config.channel, "unsubscribing");
            if let Err(e) = resources.subscription.unsubscribe().await {
                failures.push(format!("unsubscribe: {e}"));
            }
        }

        let drain_timeout = Duration::from_millis(self.config.drain_timeout_ms);
        if !resources.drain.wait_idle(drain_timeout).await {
            warn!(
                connector = %self.core.name,
                in_flight = resources.drain.in_flight(),
                timeout_ms = self.config.drain_timeout_ms,
                "drain timed out, forcing writer close"
            );
        }

        // handle already cleared from `active`; close happens after the
        // drain so no delivery task can be mid-write
        if let Err(e) = resources.writer.close().await {
            failures.push(format!("close: {e}"));
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ConnectorError::shutdown(
                &self.core.name,
                failures.join("; "),
            ))
        }
    }

    fn check_connections(&self) -> Result<()> {
        if self.bridge.source.is_connected() {
            Ok(())
        } else {
            Err(ConnectorError::source_unavailable(&self.core.name))
        }
    }

    fn status(&self) -> ConnectorStatus {
        self.core.status()
    }

    fn health(&self) -> ConnectorHealth {
        self.core.health()
    }
}
