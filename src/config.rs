use crate::chord::{MaintenanceConfig, Ring};
use crate::error::ChordError;
use serde::Serialize;
use std::time::Duration;

pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Everything needed to start one overlay node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeConfig {
    /// `host:port` to listen on. Also hashed into the node identifier.
    pub address: String,
    /// Identifier width m; the ring holds 2^m identifiers.
    pub ring_bits: u32,
    /// Member of an existing ring to join through. None starts a new ring.
    pub contact: Option<String>,
    pub maintenance: MaintenanceConfig,
    pub rpc_timeout: Duration,
    pub connect_timeout: Duration,
}

impl NodeConfig {
    pub fn new(address: impl Into<String>, ring_bits: u32) -> Self {
        Self {
            address: address.into(),
            ring_bits,
            contact: None,
            maintenance: MaintenanceConfig::default(),
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = Some(contact.into());
        self
    }

    pub fn with_maintenance(mut self, maintenance: MaintenanceConfig) -> Self {
        self.maintenance = maintenance;
        self
    }

    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Builds the ring geometry, failing on an unsupported bit width.
    pub fn ring(&self) -> Result<Ring, ChordError> {
        Ring::new(self.ring_bits)
    }

    pub fn validate(&self) -> Result<(), ChordError> {
        self.ring()?;
        if self.maintenance.period.is_zero() {
            return Err(ChordError::InvalidRequest(
                "maintenance period must be positive".into(),
            ));
        }
        if self.contact.as_deref() == Some(self.address.as_str()) {
            return Err(ChordError::InvalidRequest(format!(
                "node {} cannot join through itself",
                self.address
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NodeConfig::new("127.0.0.1:8081", 16);
        assert_eq!(config.maintenance.period, Duration::from_secs(10));
        assert_eq!(config.maintenance.max_retries, 3);
        assert_eq!(config.rpc_timeout, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert!(config.contact.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            NodeConfig::new("127.0.0.1:8081", 0).validate(),
            Err(ChordError::InvalidCapacity(0))
        ));
        assert!(NodeConfig::new("127.0.0.1:8081", 65).validate().is_err());
        assert!(NodeConfig::new("127.0.0.1:8081", 64).validate().is_ok());

        let looped = NodeConfig::new("127.0.0.1:8081", 8).with_contact("127.0.0.1:8081");
        assert!(looped.validate().is_err());

        let stalled = NodeConfig::new("127.0.0.1:8081", 8).with_maintenance(MaintenanceConfig {
            period: Duration::ZERO,
            max_retries: 3,
        });
        assert!(stalled.validate().is_err());
    }
}
