//! The standard query submitted by callers.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::errors::ExtractError;

use super::types::{AssetType, DataType, Market, Period, ProviderId, QueryPriority};

/// Default per-request timeout budget.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of provider attempts allowed per request.
const DEFAULT_RETRY_BUDGET: u32 = 3;

/// A provider-agnostic data request.
///
/// Immutable once built; construct via [`StandardQuery::builder`].
#[derive(Clone, Debug)]
pub struct StandardQuery {
    /// Instrument symbol (e.g., "600519", "AAPL").
    pub symbol: String,
    /// Asset classification of the symbol.
    pub asset_type: AssetType,
    /// Kind of data requested.
    pub data_type: DataType,
    /// Market hint, if the caller knows it.
    pub market: Option<Market>,
    /// Start of the requested range (inclusive).
    pub start: Option<DateTime<Utc>>,
    /// End of the requested range (inclusive).
    pub end: Option<DateTime<Utc>>,
    /// Sampling period for time series data.
    pub period: Option<Period>,
    /// Pin the request to one specific provider, bypassing routing.
    pub provider: Option<ProviderId>,
    /// Caller-declared urgency.
    pub priority: QueryPriority,
    /// Total timeout budget across all failover attempts.
    pub timeout: Duration,
    /// Maximum number of provider attempts.
    pub retry_budget: u32,
    /// Free-form extra parameters, forwarded to the provider untouched.
    /// Ordered map so the query signature is deterministic.
    pub params: BTreeMap<String, Value>,
}

impl StandardQuery {
    /// Start building a query for the given symbol.
    pub fn builder(
        symbol: impl Into<String>,
        asset_type: AssetType,
        data_type: DataType,
    ) -> StandardQueryBuilder {
        StandardQueryBuilder {
            symbol: symbol.into(),
            asset_type,
            data_type,
            market: None,
            start: None,
            end: None,
            period: None,
            provider: None,
            priority: QueryPriority::Normal,
            timeout: DEFAULT_TIMEOUT,
            retry_budget: DEFAULT_RETRY_BUDGET,
            params: BTreeMap::new(),
        }
    }

    /// Deterministic signature used as the result cache key.
    ///
    /// Covers every field that affects the returned data. Priority, timeout
    /// and retry budget are deliberately excluded - they change how the data
    /// is fetched, not what is fetched.
    pub fn signature(&self) -> String {
        let mut sig = format!(
            "{}|{:?}|{:?}|{:?}|{:?}|{:?}|{:?}|{:?}",
            self.symbol,
            self.asset_type,
            self.data_type,
            self.market,
            self.start.map(|t| t.timestamp()),
            self.end.map(|t| t.timestamp()),
            self.period,
            self.provider,
        );
        for (key, value) in &self.params {
            sig.push('|');
            sig.push_str(key);
            sig.push('=');
            sig.push_str(&value.to_string());
        }
        sig
    }
}

/// Builder for [`StandardQuery`].
#[derive(Clone, Debug)]
pub struct StandardQueryBuilder {
    symbol: String,
    asset_type: AssetType,
    data_type: DataType,
    market: Option<Market>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    period: Option<Period>,
    provider: Option<ProviderId>,
    priority: QueryPriority,
    timeout: Duration,
    retry_budget: u32,
    params: BTreeMap<String, Value>,
}

impl StandardQueryBuilder {
    /// Set the market hint.
    pub fn market(mut self, market: Market) -> Self {
        self.market = Some(market);
        self
    }

    /// Set the requested time range.
    pub fn range(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    /// Set the sampling period.
    pub fn period(mut self, period: Period) -> Self {
        self.period = Some(period);
        self
    }

    /// Pin the request to one provider, bypassing routing.
    pub fn provider(mut self, provider: impl Into<ProviderId>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Set the request priority.
    pub fn priority(mut self, priority: QueryPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the total timeout budget across failover attempts.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the maximum number of provider attempts.
    pub fn retry_budget(mut self, retry_budget: u32) -> Self {
        self.retry_budget = retry_budget;
        self
    }

    /// Attach a free-form extra parameter.
    pub fn param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Finalize the query.
    ///
    /// Fails fast with a configuration error if the symbol is empty.
    pub fn build(self) -> Result<StandardQuery, ExtractError> {
        if self.symbol.trim().is_empty() {
            return Err(ExtractError::MissingQueryField { field: "symbol" });
        }

        Ok(StandardQuery {
            symbol: self.symbol,
            asset_type: self.asset_type,
            data_type: self.data_type,
            market: self.market,
            start: self.start,
            end: self.end,
            period: self.period,
            provider: self.provider,
            priority: self.priority,
            timeout: self.timeout,
            retry_budget: self.retry_budget,
            params: self.params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_symbol_is_rejected() {
        let result = StandardQuery::builder("  ", AssetType::Stock, DataType::Kline).build();
        assert!(matches!(
            result,
            Err(ExtractError::MissingQueryField { field: "symbol" })
        ));
    }

    #[test]
    fn test_signature_is_stable_across_param_insert_order() {
        let a = StandardQuery::builder("600519", AssetType::Stock, DataType::Kline)
            .param("adjust", json!("qfq"))
            .param("limit", json!(100))
            .build()
            .unwrap();
        let b = StandardQuery::builder("600519", AssetType::Stock, DataType::Kline)
            .param("limit", json!(100))
            .param("adjust", json!("qfq"))
            .build()
            .unwrap();

        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn test_signature_ignores_priority_and_timeout() {
        let a = StandardQuery::builder("AAPL", AssetType::Stock, DataType::Quote)
            .priority(QueryPriority::High)
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        let b = StandardQuery::builder("AAPL", AssetType::Stock, DataType::Quote)
            .build()
            .unwrap();

        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn test_signature_differs_by_provider_pin() {
        let a = StandardQuery::builder("AAPL", AssetType::Stock, DataType::Quote)
            .provider("YAHOO")
            .build()
            .unwrap();
        let b = StandardQuery::builder("AAPL", AssetType::Stock, DataType::Quote)
            .build()
            .unwrap();

        assert_ne!(a.signature(), b.signature());
    }
}
