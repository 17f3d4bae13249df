//! Core classification types shared across the routing core.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Type alias for provider identifier (e.g., "EASTMONEY", "YAHOO").
pub type ProviderId = Cow<'static, str>;

/// Classification of asset types a provider can serve.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    /// Listed equities.
    Stock,
    /// Market indices.
    Index,
    /// Mutual funds and ETFs.
    Fund,
    /// Fixed income instruments.
    Bond,
    /// Futures contracts.
    Futures,
    /// Cryptocurrencies.
    Crypto,
    /// Currency pairs.
    Forex,
}

impl AssetType {
    /// All known asset types, used for best-effort capability defaults.
    pub const ALL: &'static [AssetType] = &[
        AssetType::Stock,
        AssetType::Index,
        AssetType::Fund,
        AssetType::Bond,
        AssetType::Futures,
        AssetType::Crypto,
        AssetType::Forex,
    ];
}

/// Kind of data a query asks for.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// OHLCV candles (K-line data).
    Kline,
    /// Point-in-time quote snapshot.
    Quote,
    /// Company/instrument profile.
    Profile,
    /// Financial statement rows.
    Financials,
    /// News items.
    News,
}

/// Market a provider covers.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Market {
    /// Mainland China exchanges.
    Cn,
    /// US exchanges.
    Us,
    /// Hong Kong exchange.
    Hk,
    /// Everything else / no market restriction.
    Global,
}

/// Sampling period for time series data.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    /// One-minute bars.
    Minute,
    /// Five-minute bars.
    FiveMinutes,
    /// Hourly bars.
    Hour,
    /// Daily bars.
    Day,
    /// Weekly bars.
    Week,
    /// Monthly bars.
    Month,
}

/// Caller-declared urgency of a request.
///
/// High-priority requests steer the router toward health-based selection;
/// low-priority bulk requests are spread with round-robin.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryPriority {
    /// Background/bulk work.
    Low,
    /// Default.
    Normal,
    /// Interactive request.
    High,
    /// Must succeed if at all possible.
    Critical,
}

impl Default for QueryPriority {
    fn default() -> Self {
        Self::Normal
    }
}
