//! Source system capability
//!
//! The persistent pub/sub service is reached through these seams; the wire
//! protocol belongs to the client library behind them. Deliveries are pushed
//! by the client library's own tasks, concurrently with administrative calls
//! on the connector.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;

use crate::error::Result;

/// Async callback invoked once per delivered message
pub type DeliveryHandler = Arc<dyn Fn(Delivery) -> BoxFuture<'static, ()> + Send + Sync>;

/// Client handle to the source pub/sub system
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Reachability probe. Cheap and side-effect free; used as the Start
    /// precondition and by CheckConnections.
    fn is_connected(&self) -> bool;

    /// Create a subscription on `channel`, delivering each message to
    /// `handler`. A durable name makes the delivery cursor survive process
    /// restarts.
    async fn subscribe(
        &self,
        channel: &str,
        durable_name: Option<&str>,
        handler: DeliveryHandler,
    ) -> Result<Box<dyn Subscription>>;
}

/// Handle to an active subscription
#[async_trait]
pub trait Subscription: Send + Sync {
    /// Destroy the subscription. Never called for durable subscriptions:
    /// that would lose the source-side replay position.
    async fn unsubscribe(&self) -> Result<()>;
}

/// Acknowledges one delivery back to the source, advancing its cursor
#[async_trait]
pub trait Acker: Send + Sync {
    async fn ack(&self) -> Result<()>;
}

/// One message delivered by the source
pub struct Delivery {
    /// Channel the message arrived on
    pub channel: String,
    /// Source-assigned sequence number
    pub sequence: u64,
    /// Opaque payload, relayed without reinterpretation
    pub payload: Bytes,
    acker: Arc<dyn Acker>,
}

impl Delivery {
    pub fn new(
        channel: impl Into<String>,
        sequence: u64,
        payload: impl Into<Bytes>,
        acker: Arc<dyn Acker>,
    ) -> Self {
        Self {
            channel: channel.into(),
            sequence,
            payload: payload.into(),
            acker,
        }
    }

    /// Acknowledge this delivery. Called only after the sink write succeeds,
    /// so a crash in between causes redelivery rather than loss.
    pub async fn ack(&self) -> Result<()> {
        self.acker.ack().await
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("channel", &self.channel)
            .field("sequence", &self.sequence)
            .field("len", &self.payload.len())
            .finish()
    }
}
