//! Shared delivery statistics
//!
//! The bridge owns one `BridgeStats`; every connector gets an
//! `Arc<ConnectorStats>` keyed by its name. Counters are accumulate-only
//! atomics so delivery tasks and administrative calls can increment them
//! concurrently without any connector-local locking.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Lock-free counters for a single connector
#[derive(Debug, Default)]
pub struct ConnectorStats {
    name: String,
    /// Successful Start transitions
    connects: AtomicU64,
    /// Shutdown invocations (recorded on every call)
    disconnects: AtomicU64,
    /// Messages delivered by the source
    messages_in: AtomicU64,
    /// Messages written to the sink and acknowledged
    messages_out: AtomicU64,
    /// Payload bytes written to the sink
    bytes_out: AtomicU64,
    /// Writes that exhausted the retry policy
    write_errors: AtomicU64,
    /// Individual write retries
    write_retries: AtomicU64,
}

impl ConnectorStats {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Connector name these counters belong to
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_connect(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message_in(&self) {
        self.messages_in.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forwarded(&self, bytes: u64) {
        self.messages_out.fetch_add(1, Ordering::Relaxed);
        self.bytes_out.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_retries(&self, count: u64) {
        self.write_retries.fetch_add(count, Ordering::Relaxed);
    }

    /// Capture a point-in-time snapshot of all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            name: self.name.clone(),
            connects: self.connects.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            messages_in: self.messages_in.load(Ordering::Relaxed),
            messages_out: self.messages_out.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            write_retries: self.write_retries.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of connector counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub name: String,
    pub connects: u64,
    pub disconnects: u64,
    pub messages_in: u64,
    pub messages_out: u64,
    pub bytes_out: u64,
    pub write_errors: u64,
    pub write_retries: u64,
}

impl StatsSnapshot {
    /// Serialize for the supervisor's stats surface
    pub fn to_json(&self) -> crate::error::Result<String> {
        serde_json::to_string(self)
            .map_err(|e| crate::error::ConnectorError::internal(e.to_string()))
    }

    /// Export counters in Prometheus text format
    pub fn to_prometheus_format(&self, prefix: &str) -> String {
        let label = &self.name;
        let mut output = String::with_capacity(1024);

        for (metric, help, value) in [
            ("connects_total", "Successful connector starts", self.connects),
            ("disconnects_total", "Connector shutdowns", self.disconnects),
            ("messages_in_total", "Messages delivered by the source", self.messages_in),
            ("messages_out_total", "Messages written to the sink", self.messages_out),
            ("bytes_out_total", "Payload bytes written to the sink", self.bytes_out),
            ("write_errors_total", "Writes that exhausted the retry policy", self.write_errors),
            ("write_retries_total", "Individual write retries", self.write_retries),
        ] {
            output.push_str(&format!(
                "# HELP {prefix}_connector_{metric} {help}\n\
                 # TYPE {prefix}_connector_{metric} counter\n\
                 {prefix}_connector_{metric}{{connector=\"{label}\"}} {value}\n"
            ));
        }

        output
    }
}

/// Bridge-wide statistics sink shared across all connectors
#[derive(Debug, Default)]
pub struct BridgeStats {
    connectors: Mutex<HashMap<String, Arc<ConnectorStats>>>,
}

impl BridgeStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the counters for a connector name
    pub fn connector(&self, name: &str) -> Arc<ConnectorStats> {
        self.connectors
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(ConnectorStats::new(name)))
            .clone()
    }

    /// Snapshot every registered connector
    pub fn snapshot(&self) -> Vec<StatsSnapshot> {
        let mut snapshots: Vec<StatsSnapshot> = self
            .connectors
            .lock()
            .values()
            .map(|s| s.snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = ConnectorStats::new("c1");
        stats.add_connect();
        stats.record_message_in();
        stats.record_forwarded(128);
        stats.record_forwarded(64);
        stats.add_disconnect();
        stats.add_disconnect();

        let snap = stats.snapshot();
        assert_eq!(snap.connects, 1);
        assert_eq!(snap.disconnects, 2);
        assert_eq!(snap.messages_in, 1);
        assert_eq!(snap.messages_out, 2);
        assert_eq!(snap.bytes_out, 192);
        assert_eq!(snap.write_errors, 0);
    }

    #[test]
    fn test_bridge_stats_shared_handle() {
        let bridge = BridgeStats::new();
        let a = bridge.connector("c1");
        let b = bridge.connector("c1");
        a.add_connect();
        b.add_connect();
        assert_eq!(bridge.connector("c1").snapshot().connects, 2);
        assert_eq!(bridge.snapshot().len(), 1);
    }

    #[test]
    fn test_prometheus_format() {
        let stats = ConnectorStats::new("channel:orders to topic:orders-topic");
        stats.record_forwarded(10);
        let out = stats.snapshot().to_prometheus_format("streambridge");
        assert!(out.contains("streambridge_connector_messages_out_total"));
        assert!(out.contains("connector=\"channel:orders to topic:orders-topic\"} 1"));
        assert!(out.contains("# TYPE streambridge_connector_bytes_out_total counter"));
    }

    #[test]
    fn test_json_export() {
        let stats = ConnectorStats::new("c1");
        stats.record_forwarded(10);
        let json = stats.snapshot().to_json().unwrap();
        assert!(json.contains("\"name\":\"c1\""));
        assert!(json.contains("\"messages_out\":1"));
        assert!(json.contains("\"bytes_out\":10"));
    }
}
