//! Provider capability declarations and health check reports.

use std::time::Duration;

use crate::models::{AssetType, DataType, Market};

/// Describes what a data provider can serve.
///
/// Used by the registry to build the capability index and by the router
/// to score context match.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Capabilities {
    /// Asset types this provider supports.
    pub asset_types: Vec<AssetType>,

    /// Data types this provider supports.
    pub data_types: Vec<DataType>,

    /// Markets this provider covers. Empty means global coverage.
    pub markets: Vec<Market>,
}

impl Capabilities {
    /// Whether the provider declared nothing at all.
    pub fn is_empty(&self) -> bool {
        self.asset_types.is_empty() && self.data_types.is_empty() && self.markets.is_empty()
    }

    /// Whether this capability set covers the given request shape.
    pub fn supports(&self, data_type: DataType, asset_type: AssetType, market: Option<Market>) -> bool {
        if !self.data_types.contains(&data_type) {
            return false;
        }
        if !self.asset_types.contains(&asset_type) {
            return false;
        }
        match market {
            // An empty market list means no restriction.
            Some(m) => {
                self.markets.is_empty()
                    || self.markets.contains(&m)
                    || self.markets.contains(&Market::Global)
            }
            None => true,
        }
    }
}

/// Result of a provider health probe.
#[derive(Clone, Debug)]
pub struct HealthCheck {
    /// Whether the provider considers itself usable.
    pub healthy: bool,
    /// Free-form status detail.
    pub message: String,
    /// Probe round-trip time.
    pub latency: Duration,
}

impl HealthCheck {
    /// A passing health check.
    pub fn healthy(latency: Duration) -> Self {
        Self {
            healthy: true,
            message: "ok".to_string(),
            latency,
        }
    }

    /// A failing health check with a reason.
    pub fn unhealthy(message: impl Into<String>, latency: Duration) -> Self {
        Self {
            healthy: false,
            message: message.into(),
            latency,
        }
    }
}
