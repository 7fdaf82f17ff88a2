//! Connector configuration plumbing.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ConnectorError, ConnectorResult};
use crate::types::ConnectorType;

/// Settings a connector is constructed from.
pub trait ConnectorConfig: DeserializeOwned + Clone + Send + Sync {
    fn connector_type() -> ConnectorType;

    /// Reject settings the connector cannot run with.
    fn validate(&self) -> ConnectorResult<()>;

    /// Copy with every secret replaced by a placeholder, safe to log.
    fn redacted(&self) -> Self;

    /// Validate and hand the settings back.
    fn validated(self) -> ConnectorResult<Self> {
        self.validate()?;
        Ok(self)
    }
}

/// HTTP timeouts shared by connectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    #[serde(default = "default_connect_timeout_secs")]
    pub connection_timeout_secs: u64,

    /// Whole-request timeout, including reading the body.
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_read_timeout_secs() -> u64 {
    60
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connection_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

impl ConnectionSettings {
    pub fn with_connection_timeout(mut self, secs: u64) -> Self {
        self.connection_timeout_secs = secs;
        self
    }

    pub fn with_read_timeout(mut self, secs: u64) -> Self {
        self.read_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Zero timeouts would fail every request immediately.
    pub fn validate(&self) -> ConnectorResult<()> {
        if self.connection_timeout_secs == 0 {
            return Err(ConnectorError::invalid_configuration(
                "connection_timeout_secs must be positive",
            ));
        }
        if self.read_timeout_secs == 0 {
            return Err(ConnectorError::invalid_configuration(
                "read_timeout_secs must be positive",
            ));
        }
        Ok(())
    }
}
