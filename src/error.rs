//! Error types for streambridge
//!
//! Start failures propagate synchronously with no partial state left behind.
//! Shutdown failures are reported but never block completion. Per-message
//! write failures are handled by the forwarder and surfaced as connector
//! health, never as errors crossing into the administrative path.

use thiserror::Error;

/// Result type alias for connector operations
pub type Result<T> = std::result::Result<T, ConnectorError>;

/// Errors produced by connector lifecycle and delivery operations
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Source system unreachable. Fatal to Start, informational to
    /// CheckConnections.
    #[error("{connector}: source system is not available")]
    SourceUnavailable { connector: String },

    /// Sink writer construction failed. No resources are held afterward.
    #[error("{connector}: failed to connect sink writer: {message}")]
    SinkConnect { connector: String, message: String },

    /// Subscription creation failed after a writer was acquired. Start
    /// closes the writer before returning this.
    #[error("{connector}: failed to subscribe to source channel: {message}")]
    SourceSubscribe { connector: String, message: String },

    /// A single sink write failed. Retried per policy by the forwarder.
    #[error("sink write failed: {0}")]
    Write(String),

    /// Unsubscribe/close failures aggregated during shutdown. The connector
    /// is fully stopped when this is returned.
    #[error("{connector}: shutdown completed with errors: {message}")]
    Shutdown { connector: String, message: String },

    /// Start was called on a connector that is already running.
    #[error("{0}: connector is already running")]
    AlreadyRunning(String),

    /// Configuration parsing or validation failed
    #[error("configuration error: {0}")]
    Config(String),

    /// Timeout waiting on an external system
    #[error("timeout: {0}")]
    Timeout(String),

    /// Internal invariant violation
    #[error("internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML error
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ConnectorError {
    /// Check if this error is worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Write(_) | Self::Timeout(_))
    }

    /// Create a source-unavailable error
    pub fn source_unavailable(connector: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            connector: connector.into(),
        }
    }

    /// Create a sink-connect error
    pub fn sink_connect(connector: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::SinkConnect {
            connector: connector.into(),
            message: msg.into(),
        }
    }

    /// Create a source-subscribe error
    pub fn source_subscribe(connector: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::SourceSubscribe {
            connector: connector.into(),
            message: msg.into(),
        }
    }

    /// Create a write error
    pub fn write(msg: impl Into<String>) -> Self {
        Self::Write(msg.into())
    }

    /// Create a shutdown error
    pub fn shutdown(connector: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Shutdown {
            connector: connector.into(),
            message: msg.into(),
        }
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConnectorError::source_unavailable("channel:orders to topic:orders-topic");
        assert_eq!(
            err.to_string(),
            "channel:orders to topic:orders-topic: source system is not available"
        );

        let err = ConnectorError::sink_connect("c", "broker refused");
        assert_eq!(
            err.to_string(),
            "c: failed to connect sink writer: broker refused"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ConnectorError::write("broker flapping").is_retryable());
        assert!(ConnectorError::Timeout("5s".into()).is_retryable());
        assert!(!ConnectorError::config("bad yaml").is_retryable());
        assert!(!ConnectorError::source_unavailable("c").is_retryable());
        assert!(!ConnectorError::AlreadyRunning("c".into()).is_retryable());
    }
}
