//! # streambridge
//!
//! Bridge connector runtime relaying persistent pub/sub channels to
//! partitioned log topics with at-least-once delivery.
//!
//! Each connector owns exactly one source subscription and one sink writer.
//! The two are acquired together during `start` and released together during
//! `shutdown`; there is never a state with one present and the other absent.
//! Deliveries are acknowledged only after the sink write succeeds, so a crash
//! between write and ack redelivers rather than loses.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use streambridge::prelude::*;
//! use streambridge::testing::{MockSinkFactory, MockSourceClient};
//!
//! # async fn run() -> streambridge::Result<()> {
//! let bridge = BridgeHandle::new(
//!     Arc::new(MockSourceClient::new()),
//!     Arc::new(MockSinkFactory::new()),
//! );
//!
//! let config = ConnectorConfig::relay("orders", "orders-topic");
//! let connector = build_connector(config, bridge);
//!
//! connector.start().await?;
//! connector.check_connections()?;
//! connector.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `kafka` | Kafka sink writer via the pure Rust rskafka client |

pub mod config;
pub mod connector;
pub mod error;
pub mod forwarder;
pub mod health;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod policy;
pub mod registry;
pub mod sink;
pub mod source;
pub mod stats;
pub mod telemetry;
pub mod testing;

pub use config::{BridgeConfig, Compression, ConnectorConfig, ConnectorOptions};
pub use connector::{BridgeHandle, Connector};
pub use error::{ConnectorError, Result};
pub use forwarder::DrainGuard;
pub use health::{ConnectorHealth, ConnectorStatus};
pub use policy::RetryPolicy;
pub use registry::{build_connector, ConnectorKind};
pub use sink::{SinkFactory, SinkRecord, SinkWriter};
pub use source::{Acker, Delivery, DeliveryHandler, SourceClient, Subscription};
pub use stats::{BridgeStats, ConnectorStats, StatsSnapshot};

/// Commonly used types, importable in one line
pub mod prelude {
    pub use crate::config::{BridgeConfig, Compression, ConnectorConfig};
    pub use crate::connector::{BridgeHandle, Connector};
    pub use crate::error::{ConnectorError, Result};
    pub use crate::health::{ConnectorHealth, ConnectorStatus};
    pub use crate::policy::RetryPolicy;
    pub use crate::registry::{build_connector, ConnectorKind};
    pub use crate::sink::{SinkFactory, SinkRecord, SinkWriter};
    pub use crate::source::{Delivery, SourceClient, Subscription};
    pub use crate::stats::BridgeStats;
}
