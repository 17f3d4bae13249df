//! Data provider trait definition.
//!
//! This module defines the core `DataProvider` trait that all data source
//! plugins must implement, plus the provider-agnostic request handed to them.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::errors::ExtractError;
use crate::models::{AssetType, DataTable, DataType, Market, Period, QueryPriority, StandardQuery};

use super::capabilities::{Capabilities, HealthCheck};

/// The provider-agnostic request handed to a provider's `extract` call.
///
/// Derived from a [`StandardQuery`] by the pipeline's transform-query stage;
/// timeout, retry budget, priority, and free-form parameters are propagated.
#[derive(Clone, Debug)]
pub struct ExtractRequest {
    /// Instrument symbol.
    pub symbol: String,
    /// Asset classification of the symbol.
    pub asset_type: AssetType,
    /// Kind of data requested.
    pub data_type: DataType,
    /// Market hint.
    pub market: Option<Market>,
    /// Start of the requested range (inclusive).
    pub start: Option<DateTime<Utc>>,
    /// End of the requested range (inclusive).
    pub end: Option<DateTime<Utc>>,
    /// Sampling period.
    pub period: Option<Period>,
    /// Caller-declared urgency.
    pub priority: QueryPriority,
    /// Per-attempt timeout the provider should honor internally.
    pub timeout: Duration,
    /// Free-form extra parameters, forwarded untouched.
    pub params: BTreeMap<String, Value>,
}

impl ExtractRequest {
    /// Build a request from a standard query.
    pub fn from_query(query: &StandardQuery) -> Self {
        Self {
            symbol: query.symbol.clone(),
            asset_type: query.asset_type,
            data_type: query.data_type,
            market: query.market,
            start: query.start,
            end: query.end,
            period: query.period,
            priority: query.priority,
            timeout: query.timeout,
            params: query.params.clone(),
        }
    }
}

/// Trait for data source providers.
///
/// Implement this trait to plug a new backend into the routing core.
/// The registry uses the declared capabilities to build its index; the
/// pipeline calls `extract` under a timeout and records the outcome in
/// the provider's circuit breaker and metrics.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use marketroute_core::provider::{Capabilities, DataProvider, ExtractRequest, HealthCheck};
///
/// struct MyProvider;
///
/// #[async_trait]
/// impl DataProvider for MyProvider {
///     fn id(&self) -> &'static str {
///         "MY_PROVIDER"
///     }
///
///     fn capabilities(&self) -> Capabilities {
///         Capabilities {
///             asset_types: vec![AssetType::Stock],
///             data_types: vec![DataType::Kline],
///             markets: vec![Market::Cn],
///         }
///     }
///
///     // ... implement extract and health_check
/// }
/// ```
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Unique identifier for this provider.
    ///
    /// Should be a constant string like "EASTMONEY", "YAHOO", etc.
    /// Used for logging, circuit breaker tracking, and routing.
    fn id(&self) -> &'static str;

    /// Provider priority for ordering.
    ///
    /// Lower values = higher priority. Default is 10.
    fn priority(&self) -> u8 {
        10
    }

    /// Describes what this provider can serve.
    fn capabilities(&self) -> Capabilities;

    /// Fetch raw data for the request.
    ///
    /// The returned table carries the provider's native column names; the
    /// pipeline's transform stage reconciles them into the canonical schema.
    async fn extract(&self, request: &ExtractRequest) -> Result<DataTable, ExtractError>;

    /// Probe the provider's health.
    async fn health_check(&self) -> HealthCheck;

    /// Establish any long-lived connection the provider needs.
    ///
    /// Default implementation is a no-op for stateless HTTP providers.
    async fn connect(&self) -> Result<(), ExtractError> {
        Ok(())
    }

    /// Tear down any long-lived connection.
    ///
    /// Default implementation is a no-op.
    async fn disconnect(&self) -> Result<(), ExtractError> {
        Ok(())
    }
}
