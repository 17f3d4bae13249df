//! Built-in field mapping tables and caller-supplied rules.
//!
//! The built-in tables translate the column names real providers actually
//! emit, including Chinese-language variants, into canonical field names.
//! Lookup keys are normalized (trimmed, lowercased) before matching.

use std::collections::{HashMap, HashSet};

use lazy_static::lazy_static;
use regex::Regex;

use crate::errors::ExtractError;
use crate::models::DataType;

/// Semantic class of a column, used by content inference and validation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FieldType {
    /// Monetary price level.
    Price,
    /// Traded quantity.
    Volume,
    /// Percentage change or rate.
    Percentage,
    /// Currency code.
    Currency,
    /// Calendar date or timestamp.
    Date,
    /// Dimensionless ratio in roughly `[-1, 1]`.
    Ratio,
    /// Boolean flag.
    Boolean,
    /// Free-form text.
    Text,
}

impl FieldType {
    /// Whether values of this class should parse as numbers.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Price | Self::Volume | Self::Percentage | Self::Ratio
        )
    }

    /// Canonical fallback target when only the semantic class is known.
    pub fn default_target(&self) -> Option<&'static str> {
        match self {
            Self::Price => Some("price"),
            Self::Volume => Some("volume"),
            Self::Percentage => Some("change_percent"),
            Self::Currency => Some("currency"),
            Self::Date => Some("date"),
            Self::Ratio => Some("ratio"),
            Self::Boolean => Some("flag"),
            Self::Text => None,
        }
    }
}

lazy_static! {
    /// Synonyms shared by every data type.
    static ref COMMON_SYNONYMS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("symbol", "symbol");
        m.insert("code", "symbol");
        m.insert("ticker", "symbol");
        m.insert("股票代码", "symbol");
        m.insert("代码", "symbol");
        m.insert("name", "name");
        m.insert("名称", "name");
        m.insert("股票名称", "name");
        m.insert("date", "date");
        m.insert("datetime", "date");
        m.insert("timestamp", "date");
        m.insert("trade_date", "date");
        m.insert("日期", "date");
        m.insert("时间", "date");
        m.insert("currency", "currency");
        m.insert("币种", "currency");
        m
    };

    /// K-line (OHLCV) column synonyms.
    static ref KLINE_SYNONYMS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("open", "open");
        m.insert("open_price", "open");
        m.insert("开盘", "open");
        m.insert("开盘价", "open");
        m.insert("high", "high");
        m.insert("high_price", "high");
        m.insert("最高", "high");
        m.insert("最高价", "high");
        m.insert("low", "low");
        m.insert("low_price", "low");
        m.insert("最低", "low");
        m.insert("最低价", "low");
        m.insert("close", "close");
        m.insert("close_price", "close");
        m.insert("adj_close", "adj_close");
        m.insert("adjclose", "adj_close");
        m.insert("收盘", "close");
        m.insert("收盘价", "close");
        m.insert("volume", "volume");
        m.insert("vol", "volume");
        m.insert("成交量", "volume");
        m.insert("amount", "amount");
        m.insert("turnover", "amount");
        m.insert("成交额", "amount");
        m.insert("change", "change");
        m.insert("涨跌额", "change");
        m.insert("pct_change", "change_percent");
        m.insert("change_percent", "change_percent");
        m.insert("涨跌幅", "change_percent");
        m.insert("turnover_rate", "turnover_rate");
        m.insert("换手率", "turnover_rate");
        m
    };

    /// Real-time quote column synonyms.
    static ref QUOTE_SYNONYMS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("price", "price");
        m.insert("last", "price");
        m.insert("last_price", "price");
        m.insert("latest", "price");
        m.insert("最新价", "price");
        m.insert("现价", "price");
        m.insert("prev_close", "prev_close");
        m.insert("pre_close", "prev_close");
        m.insert("昨收", "prev_close");
        m.insert("昨收价", "prev_close");
        m.insert("bid", "bid");
        m.insert("买一", "bid");
        m.insert("ask", "ask");
        m.insert("卖一", "ask");
        m.insert("volume", "volume");
        m.insert("成交量", "volume");
        m.insert("change", "change");
        m.insert("涨跌额", "change");
        m.insert("change_percent", "change_percent");
        m.insert("涨跌幅", "change_percent");
        m
    };

    /// Company profile column synonyms.
    static ref PROFILE_SYNONYMS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("industry", "industry");
        m.insert("行业", "industry");
        m.insert("sector", "sector");
        m.insert("板块", "sector");
        m.insert("market_cap", "market_cap");
        m.insert("总市值", "market_cap");
        m.insert("list_date", "list_date");
        m.insert("上市日期", "list_date");
        m
    };

    /// Financial statement column synonyms.
    static ref FINANCIALS_SYNONYMS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("revenue", "revenue");
        m.insert("营业收入", "revenue");
        m.insert("net_income", "net_income");
        m.insert("净利润", "net_income");
        m.insert("eps", "eps");
        m.insert("每股收益", "eps");
        m.insert("roe", "roe");
        m.insert("净资产收益率", "roe");
        m
    };

    /// News column synonyms.
    static ref NEWS_SYNONYMS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("title", "title");
        m.insert("标题", "title");
        m.insert("content", "content");
        m.insert("内容", "content");
        m.insert("source", "source");
        m.insert("来源", "source");
        m.insert("url", "url");
        m.insert("链接", "url");
        m.insert("publish_time", "date");
        m.insert("发布时间", "date");
        m
    };

    /// Canonical field name → semantic class.
    static ref FIELD_TYPES: HashMap<&'static str, FieldType> = {
        let mut m = HashMap::new();
        for price in ["open", "high", "low", "close", "adj_close", "price",
                      "prev_close", "bid", "ask", "amount", "change",
                      "market_cap", "revenue", "net_income", "eps"] {
            m.insert(price, FieldType::Price);
        }
        m.insert("volume", FieldType::Volume);
        for pct in ["change_percent", "turnover_rate", "roe"] {
            m.insert(pct, FieldType::Percentage);
        }
        m.insert("currency", FieldType::Currency);
        for date in ["date", "list_date"] {
            m.insert(date, FieldType::Date);
        }
        m.insert("ratio", FieldType::Ratio);
        m.insert("flag", FieldType::Boolean);
        for text in ["symbol", "name", "industry", "sector", "title",
                     "content", "source", "url"] {
            m.insert(text, FieldType::Text);
        }
        m
    };
}

fn table_for(data_type: DataType) -> &'static HashMap<&'static str, &'static str> {
    match data_type {
        DataType::Kline => &KLINE_SYNONYMS,
        DataType::Quote => &QUOTE_SYNONYMS,
        DataType::Profile => &PROFILE_SYNONYMS,
        DataType::Financials => &FINANCIALS_SYNONYMS,
        DataType::News => &NEWS_SYNONYMS,
    }
}

/// Normalize a column name for table lookup.
pub fn normalize(column: &str) -> String {
    column.trim().to_lowercase()
}

/// Look up the canonical target for a column via the built-in tables.
pub fn builtin_target(data_type: DataType, column: &str) -> Option<&'static str> {
    let key = normalize(column);
    table_for(data_type)
        .get(key.as_str())
        .or_else(|| COMMON_SYNONYMS.get(key.as_str()))
        .copied()
}

/// Known source names for a data type, the corpus the fuzzy matcher
/// searches.
pub fn known_source_names(data_type: DataType) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = table_for(data_type)
        .keys()
        .chain(COMMON_SYNONYMS.keys())
        .copied()
        .collect();
    names.sort_unstable();
    names.dedup();
    names
}

/// Whether `name` already is a canonical target for the data type.
pub fn is_canonical(data_type: DataType, name: &str) -> bool {
    let targets: HashSet<&str> = table_for(data_type)
        .values()
        .chain(COMMON_SYNONYMS.values())
        .copied()
        .collect();
    targets.contains(name)
}

/// Semantic class of a canonical field, if known.
pub fn canonical_field_type(target: &str) -> Option<FieldType> {
    FIELD_TYPES.get(target).copied()
}

/// Fields a result of the given data type must contain to be considered
/// well-formed.
pub fn required_fields(data_type: DataType) -> &'static [&'static str] {
    match data_type {
        DataType::Kline => &["date", "open", "high", "low", "close"],
        DataType::Quote => &["symbol", "price"],
        DataType::Profile => &["symbol"],
        DataType::Financials => &["symbol"],
        DataType::News => &["title"],
    }
}

/// A caller-supplied mapping rule.
///
/// Rules are tried in ascending `priority` order (lower value first)
/// before the fuzzy and inference stages.
#[derive(Clone, Debug)]
pub struct MappingRule {
    /// Pattern matched against the normalized column name.
    pub pattern: Regex,
    /// Canonical target field.
    pub target: String,
    /// Declared semantic class of the target.
    pub field_type: FieldType,
    /// Evaluation order; lower runs first.
    pub priority: i32,
}

impl MappingRule {
    /// Compile a rule from a regex pattern.
    pub fn new(
        pattern: &str,
        target: impl Into<String>,
        field_type: FieldType,
        priority: i32,
    ) -> Result<Self, ExtractError> {
        let pattern = Regex::new(pattern).map_err(|e| ExtractError::MappingFailed {
            message: format!("invalid rule pattern '{}': {}", pattern, e),
        })?;
        Ok(Self {
            pattern,
            target: target.into(),
            field_type,
            priority,
        })
    }

    /// Whether the rule matches a normalized column name.
    pub fn matches(&self, normalized_column: &str) -> bool {
        self.pattern.is_match(normalized_column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chinese_close_maps_to_close() {
        assert_eq!(builtin_target(DataType::Kline, "收盘价"), Some("close"));
        assert_eq!(builtin_target(DataType::Kline, "收盘"), Some("close"));
    }

    #[test]
    fn test_lookup_is_case_and_whitespace_insensitive() {
        assert_eq!(builtin_target(DataType::Kline, "  CLOSE "), Some("close"));
        assert_eq!(builtin_target(DataType::Quote, "Last_Price"), Some("price"));
    }

    #[test]
    fn test_common_synonyms_apply_to_every_data_type() {
        assert_eq!(builtin_target(DataType::Kline, "ticker"), Some("symbol"));
        assert_eq!(builtin_target(DataType::News, "ticker"), Some("symbol"));
    }

    #[test]
    fn test_unknown_column_has_no_builtin_target() {
        assert_eq!(builtin_target(DataType::Kline, "frobnicator"), None);
    }

    #[test]
    fn test_canonical_targets_recognized() {
        assert!(is_canonical(DataType::Kline, "close"));
        assert!(is_canonical(DataType::Quote, "price"));
        assert!(!is_canonical(DataType::Kline, "收盘价"));
    }

    #[test]
    fn test_field_types() {
        assert_eq!(canonical_field_type("close"), Some(FieldType::Price));
        assert_eq!(canonical_field_type("volume"), Some(FieldType::Volume));
        assert_eq!(
            canonical_field_type("change_percent"),
            Some(FieldType::Percentage)
        );
        assert!(canonical_field_type("close").map(|t| t.is_numeric()).unwrap_or(false));
        assert!(!FieldType::Text.is_numeric());
    }

    #[test]
    fn test_required_fields_per_data_type() {
        assert!(required_fields(DataType::Kline).contains(&"close"));
        assert!(required_fields(DataType::Quote).contains(&"price"));
    }

    #[test]
    fn test_rule_compiles_and_matches() {
        let rule = MappingRule::new(r"^px_", "price", FieldType::Price, 0).unwrap();
        assert!(rule.matches("px_last"));
        assert!(!rule.matches("last_px"));
    }

    #[test]
    fn test_invalid_rule_pattern_is_an_error() {
        assert!(MappingRule::new("(unclosed", "price", FieldType::Price, 0).is_err());
    }
}
