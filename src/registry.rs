//! Connector kind registry
//!
//! Variant selection is a tagged lookup keyed by the configured kind, not a
//! type hierarchy: the supervisor resolves a kind to a boxed `Connector`
//! and addresses it only through that trait.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::ConnectorConfig;
use crate::connector::{BridgeHandle, ChannelRelay, Connector};

/// Configured connector kinds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectorKind {
    /// Relay a source channel to a sink topic
    #[default]
    ChannelRelay,
}

impl std::fmt::Display for ConnectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChannelRelay => write!(f, "channel-relay"),
        }
    }
}

/// Build the connector for a configuration record
pub fn build_connector(config: ConnectorConfig, bridge: BridgeHandle) -> Box<dyn Connector> {
    match config.kind {
        ConnectorKind::ChannelRelay => Box::new(ChannelRelay::new(config, bridge)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serde_round_trip() {
        let yaml = serde_yaml::to_string(&ConnectorKind::ChannelRelay).unwrap();
        assert_eq!(yaml.trim(), "channel-relay");
        let kind: ConnectorKind = serde_yaml::from_str("channel-relay").unwrap();
        assert_eq!(kind, ConnectorKind::ChannelRelay);
    }
}
