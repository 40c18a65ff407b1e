//! Configuration types for streambridge
//!
//! Architecture:
//!   Source channels → relayed by → Connectors → Sink topics
//!
//! Configuration is read-only after construction: the supervisor parses it
//! once and hands each connector its own record.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{ConnectorError, Result};
use crate::policy::RetryPolicy;
use crate::registry::ConnectorKind;

/// Pre-compiled regex for environment variable expansion
/// Pattern: ${VAR} or ${VAR:-default}
static ENV_VAR_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*)(?::-([^}]*))?\}")
        .expect("env var regex pattern is invalid - this is a bug")
});

/// Root configuration for a bridge process
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct BridgeConfig {
    /// Configuration version
    #[serde(default = "default_version")]
    pub version: String,

    /// Connector definitions
    #[validate(nested)]
    #[serde(default)]
    pub connectors: Vec<ConnectorConfig>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl BridgeConfig {
    /// Load a bridge configuration from a YAML file, expanding `${VAR}` and
    /// `${VAR:-default}` references against the process environment.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    /// Parse a bridge configuration from a YAML string
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let expanded = expand_env_vars(raw);
        let config: Self = serde_yaml::from_str(&expanded)?;
        config
            .validate()
            .map_err(|e| ConnectorError::config(e.to_string()))?;
        Ok(config)
    }
}

/// Expand `${VAR}` and `${VAR:-default}` in a configuration string
fn expand_env_vars(raw: &str) -> String {
    ENV_VAR_REGEX
        .replace_all(raw, |caps: &regex::Captures<'_>| {
            let var = &caps[1];
            match std::env::var(var) {
                Ok(value) => value,
                Err(_) => caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
            }
        })
        .into_owned()
}

/// Compression codec applied to sink writes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// No compression
    #[default]
    None,
    /// Gzip compression
    Gzip,
    /// Snappy compression
    Snappy,
    /// LZ4 compression
    Lz4,
    /// Zstd compression
    Zstd,
}

/// Configuration for a single connector
#[derive(Debug, Clone, Deserialize, Serialize, Validate, JsonSchema)]
pub struct ConnectorConfig {
    /// Connector kind, used by the supervisor's registry lookup
    #[serde(default)]
    pub kind: ConnectorKind,

    /// Source channel to subscribe to
    #[validate(length(min = 1))]
    pub channel: String,

    /// Sink topic to produce to
    #[validate(length(min = 1, max = 249))]
    pub topic: String,

    /// Durable subscription name. When set, the subscription's delivery
    /// cursor survives restarts and shutdown never unsubscribes it.
    #[serde(default)]
    pub durable_name: Option<String>,

    /// Sink broker addresses
    #[validate(length(min = 1))]
    pub brokers: Vec<String>,

    /// Maximum records buffered per sink produce batch
    #[serde(default = "default_batch_max_records")]
    #[validate(range(min = 1, max = 10_000))]
    pub batch_max_records: usize,

    /// Linger time in milliseconds for sink batching
    #[serde(default = "default_linger_ms")]
    #[validate(range(max = 60_000))]
    pub linger_ms: u64,

    /// Fixed partition key applied to every sink record
    #[serde(default)]
    pub partition_key: Option<String>,

    /// Compression codec for sink writes
    #[serde(default)]
    pub compression: Compression,

    /// Sink connection timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    #[validate(range(min = 1000, max = 300_000))]
    pub connect_timeout_ms: u64,

    /// Bound on the shutdown wait for in-flight deliveries, in milliseconds.
    /// On expiry the writer is force-closed.
    #[serde(default = "default_drain_timeout_ms")]
    #[validate(range(min = 1, max = 600_000))]
    pub drain_timeout_ms: u64,

    /// Retry policy for per-message sink writes
    #[validate(nested)]
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_batch_max_records() -> usize {
    100
}
fn default_linger_ms() -> u64 {
    5
}
fn default_connect_timeout_ms() -> u64 {
    30_000
}
fn default_drain_timeout_ms() -> u64 {
    5_000
}

impl ConnectorConfig {
    /// Minimal config for a channel-to-topic relay; used by tests and by
    /// supervisors that build configs programmatically.
    pub fn relay(channel: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            kind: ConnectorKind::default(),
            channel: channel.into(),
            topic: topic.into(),
            durable_name: None,
            brokers: vec!["localhost:9092".to_string()],
            batch_max_records: default_batch_max_records(),
            linger_ms: default_linger_ms(),
            partition_key: None,
            compression: Compression::default(),
            connect_timeout_ms: default_connect_timeout_ms(),
            drain_timeout_ms: default_drain_timeout_ms(),
            retry: RetryPolicy::default(),
        }
    }

    /// Human-readable connector label used in logs and errors
    pub fn connector_name(&self) -> String {
        format!("channel:{} to topic:{}", self.channel, self.topic)
    }

    /// Whether this connector uses a durable subscription
    pub fn is_durable(&self) -> bool {
        self.durable_name.is_some()
    }
}

/// Convenience alias for ad-hoc key/value connector options
pub type ConnectorOptions = HashMap<String, String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_yaml() {
        let yaml = r#"
connectors:
  - channel: orders
    topic: orders-topic
    brokers: ["kafka1:9092", "kafka2:9092"]
"#;
        let config = BridgeConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.connectors.len(), 1);

        let conn = &config.connectors[0];
        assert_eq!(conn.channel, "orders");
        assert_eq!(conn.topic, "orders-topic");
        assert_eq!(conn.brokers.len(), 2);
        assert!(conn.durable_name.is_none());
        assert_eq!(conn.batch_max_records, 100);
        assert_eq!(conn.drain_timeout_ms, 5000);
        assert_eq!(conn.retry.max_retries, 3);
    }

    #[test]
    fn test_parse_durable_with_options() {
        let yaml = r#"
connectors:
  - channel: audit
    topic: audit-log
    durable_name: dur1
    brokers: ["kafka:9092"]
    compression: lz4
    partition_key: audit
    retry:
      max_retries: 10
      initial_delay_ms: 50
"#;
        let config = BridgeConfig::from_yaml(yaml).unwrap();
        let conn = &config.connectors[0];
        assert!(conn.is_durable());
        assert_eq!(conn.durable_name.as_deref(), Some("dur1"));
        assert_eq!(conn.compression, Compression::Lz4);
        assert_eq!(conn.partition_key.as_deref(), Some("audit"));
        assert_eq!(conn.retry.max_retries, 10);
        assert_eq!(conn.retry.initial_delay_ms, 50);
    }

    #[test]
    fn test_validation_rejects_empty_brokers() {
        let yaml = r#"
connectors:
  - channel: orders
    topic: orders-topic
    brokers: []
"#;
        assert!(BridgeConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_env_var_expansion() {
        std::env::set_var("STREAMBRIDGE_TEST_CHANNEL", "expanded");
        let yaml = r#"
connectors:
  - channel: ${STREAMBRIDGE_TEST_CHANNEL}
    topic: ${STREAMBRIDGE_TEST_MISSING:-fallback}
    brokers: ["kafka:9092"]
"#;
        let config = BridgeConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.connectors[0].channel, "expanded");
        assert_eq!(config.connectors[0].topic, "fallback");
    }

    #[test]
    fn test_connector_name() {
        let config = ConnectorConfig::relay("orders", "orders-topic");
        assert_eq!(config.connector_name(), "channel:orders to topic:orders-topic");
    }
}
