//! Connector health reporting
//!
//! The supervisor's monitoring loop reads these snapshots to decide whether
//! to restart a connector. The HTTP surface that serves them belongs to the
//! supervisor.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Observable connector state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorStatus {
    /// Not started, or cleanly shut down
    Stopped,
    /// Resources acquired, delivering messages
    Running,
    /// A write exhausted its retry policy; supervisor intervention required
    Failed,
}

impl fmt::Display for ConnectorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Running => write!(f, "running"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Health snapshot for a single connector
#[derive(Debug, Clone, Serialize)]
pub struct ConnectorHealth {
    pub name: String,
    pub status: ConnectorStatus,
    pub messages_out: u64,
    pub write_errors: u64,
    pub last_error: Option<String>,
}

impl ConnectorHealth {
    /// Whether the supervisor should consider restarting this connector
    pub fn needs_restart(&self) -> bool {
        self.status == ConnectorStatus::Failed
    }

    /// Serialize for the supervisor's health surface
    pub fn to_json(&self) -> crate::error::Result<String> {
        serde_json::to_string(self)
            .map_err(|e| crate::error::ConnectorError::internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(ConnectorStatus::Stopped.to_string(), "stopped");
        assert_eq!(ConnectorStatus::Running.to_string(), "running");
        assert_eq!(ConnectorStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn test_needs_restart() {
        let health = ConnectorHealth {
            name: "c".into(),
            status: ConnectorStatus::Failed,
            messages_out: 10,
            write_errors: 3,
            last_error: Some("sink write failed: broker gone".into()),
        };
        assert!(health.needs_restart());

        let health = ConnectorHealth {
            status: ConnectorStatus::Running,
            ..health
        };
        assert!(!health.needs_restart());
    }

    #[test]
    fn test_json_export() {
        let health = ConnectorHealth {
            name: "channel:orders to topic:orders-topic".into(),
            status: ConnectorStatus::Running,
            messages_out: 42,
            write_errors: 0,
            last_error: None,
        };
        let json = health.to_json().unwrap();
        assert!(json.contains("\"status\":\"running\""));
        assert!(json.contains("\"messages_out\":42"));
    }
}
