//! Field mapping engine.
//!
//! Resolves provider column names to canonical field names through a
//! fixed precedence:
//!
//! 1. exact built-in synonym match (confidence 1.0);
//! 2. caller-registered regex rules (0.9);
//! 3. fuzzy match against known source names: edit-distance ratio first,
//!    then token-Jaccard and substring containment (confidence = the
//!    computed similarity);
//! 4. content inference over a bounded value sample (0.6);
//! 5. unmapped, the name passes through unchanged.
//!
//! Resolutions are cached per (column, data type, sample size). A
//! post-mapping validation pass checks required fields and value shape;
//! failure downgrades to rename-only mapping instead of aborting.

use std::collections::HashMap;
use std::sync::Mutex;

use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use serde_json::Value;

use crate::mapping::rules::{
    builtin_target, canonical_field_type, is_canonical, known_source_names, normalize,
    required_fields, FieldType, MappingRule,
};
use crate::models::{DataTable, DataType};

/// How a column's mapping was resolved.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MapMethod {
    /// Built-in synonym table hit.
    Exact,
    /// Caller-registered rule hit.
    Custom,
    /// Name-similarity hit.
    Fuzzy,
    /// Content-based semantic inference.
    Inferred,
    /// No resolution; the source name passes through.
    Unmapped,
}

/// One resolved column mapping.
#[derive(Clone, Debug)]
pub struct FieldMapping {
    /// Original column name.
    pub source: String,
    /// Resolved canonical name (equals `source` when unmapped).
    pub target: String,
    /// Resolution confidence in `[0, 1]`.
    pub confidence: f64,
    /// Which stage resolved it.
    pub method: MapMethod,
    /// Semantic class, when known.
    pub field_type: Option<FieldType>,
}

/// Mapping result for a whole table.
#[derive(Clone, Debug)]
pub struct TableMapping {
    /// Per-column resolutions, in table column order.
    pub mappings: Vec<FieldMapping>,
    /// Whether the validation pass succeeded. When false, the mappings
    /// have been downgraded to rename-only.
    pub validated: bool,
}

impl TableMapping {
    /// Original → resolved column name pairs.
    pub fn column_mapping(&self) -> HashMap<String, String> {
        self.mappings
            .iter()
            .map(|m| (m.source.clone(), m.target.clone()))
            .collect()
    }
}

/// Mapper tuning knobs.
#[derive(Clone, Debug)]
pub struct MapperConfig {
    /// Minimum edit-distance similarity for a fuzzy hit.
    pub fuzzy_cutoff: f64,
    /// Minimum token-Jaccard similarity for a secondary fuzzy hit.
    pub jaccard_min: f64,
    /// Minimum containment ratio for a secondary fuzzy hit.
    pub containment_min: f64,
    /// Maximum non-null values sampled for content inference.
    pub inference_samples: usize,
    /// Confidence assigned to inferred mappings.
    pub inference_confidence: f64,
    /// Minimum non-null fraction a resolved column must have to validate.
    pub min_non_null: f64,
    /// Cached resolutions before the cache is dropped wholesale.
    pub cache_capacity: usize,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            fuzzy_cutoff: 0.6,
            jaccard_min: 0.3,
            containment_min: 0.5,
            inference_samples: 100,
            inference_confidence: 0.6,
            min_non_null: 0.8,
            cache_capacity: 4096,
        }
    }
}

type CacheKey = (String, DataType, usize);

/// Resolves provider column names to canonical field names.
pub struct FieldMapper {
    config: MapperConfig,
    rules: Vec<MappingRule>,
    cache: Mutex<HashMap<CacheKey, FieldMapping>>,
}

impl Default for FieldMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldMapper {
    /// Create a mapper with default configuration and no custom rules.
    pub fn new() -> Self {
        Self::with_config(MapperConfig::default())
    }

    /// Create a mapper with explicit configuration.
    pub fn with_config(config: MapperConfig) -> Self {
        Self {
            config,
            rules: Vec::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Register a custom rule. Rules run in ascending priority order.
    pub fn add_rule(&mut self, rule: MappingRule) {
        self.rules.push(rule);
        self.rules.sort_by_key(|r| r.priority);
        self.lock_cache().clear();
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, FieldMapping>> {
        self.cache.lock().unwrap_or_else(|poisoned| {
            warn!("Mapping cache lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Resolve one column name against a value sample.
    pub fn map_column(&self, column: &str, data_type: DataType, samples: &[Value]) -> FieldMapping {
        let key = (column.to_string(), data_type, samples.len());
        if let Some(hit) = self.lock_cache().get(&key) {
            return hit.clone();
        }

        let mapping = self.resolve(column, data_type, samples);

        let mut cache = self.lock_cache();
        if cache.len() >= self.config.cache_capacity {
            cache.clear();
        }
        cache.insert(key, mapping.clone());
        mapping
    }

    /// Resolve every column of a table, then validate the result.
    pub fn map_table(&self, table: &DataTable, data_type: DataType) -> TableMapping {
        let mappings: Vec<FieldMapping> = table
            .columns
            .iter()
            .enumerate()
            .map(|(idx, column)| {
                let samples: Vec<Value> = table
                    .column_values(idx)
                    .filter(|v| !v.is_null())
                    .take(self.config.inference_samples)
                    .cloned()
                    .collect();
                self.map_column(column, data_type, &samples)
            })
            .collect();

        if self.validate(table, data_type, &mappings) {
            return TableMapping {
                mappings,
                validated: true,
            };
        }

        warn!(
            "Field mapping validation failed for {:?} table, falling back to rename-only",
            data_type
        );
        let renamed = mappings
            .into_iter()
            .map(|m| {
                if m.method == MapMethod::Exact {
                    m
                } else {
                    FieldMapping {
                        target: m.source.clone(),
                        confidence: 0.0,
                        method: MapMethod::Unmapped,
                        field_type: None,
                        source: m.source,
                    }
                }
            })
            .collect();
        TableMapping {
            mappings: renamed,
            validated: false,
        }
    }

    fn resolve(&self, column: &str, data_type: DataType, samples: &[Value]) -> FieldMapping {
        let normalized = normalize(column);

        // Canonical names map to themselves.
        if is_canonical(data_type, &normalized) {
            return FieldMapping {
                source: column.to_string(),
                target: normalized.clone(),
                confidence: 1.0,
                method: MapMethod::Exact,
                field_type: canonical_field_type(&normalized),
            };
        }

        if let Some(target) = builtin_target(data_type, column) {
            return FieldMapping {
                source: column.to_string(),
                target: target.to_string(),
                confidence: 1.0,
                method: MapMethod::Exact,
                field_type: canonical_field_type(target),
            };
        }

        for rule in &self.rules {
            if rule.matches(&normalized) {
                debug!("Column '{}' matched custom rule -> {}", column, rule.target);
                return FieldMapping {
                    source: column.to_string(),
                    target: rule.target.clone(),
                    confidence: 0.9,
                    method: MapMethod::Custom,
                    field_type: Some(rule.field_type),
                };
            }
        }

        if let Some((target, similarity)) = self.fuzzy_match(&normalized, data_type) {
            debug!(
                "Column '{}' fuzzy-matched -> {} ({:.2})",
                column, target, similarity
            );
            return FieldMapping {
                source: column.to_string(),
                target: target.to_string(),
                confidence: similarity,
                method: MapMethod::Fuzzy,
                field_type: canonical_field_type(target),
            };
        }

        if let Some(field_type) = infer_field_type(&normalized, samples) {
            if let Some(target) = field_type.default_target() {
                debug!(
                    "Column '{}' inferred as {:?} -> {}",
                    column, field_type, target
                );
                return FieldMapping {
                    source: column.to_string(),
                    target: target.to_string(),
                    confidence: self.config.inference_confidence,
                    method: MapMethod::Inferred,
                    field_type: Some(field_type),
                };
            }
        }

        FieldMapping {
            source: column.to_string(),
            target: column.to_string(),
            confidence: 0.0,
            method: MapMethod::Unmapped,
            field_type: None,
        }
    }

    /// Best fuzzy hit among the known source names, or `None`.
    fn fuzzy_match(&self, normalized: &str, data_type: DataType) -> Option<(&'static str, f64)> {
        let corpus = known_source_names(data_type);

        let mut best: Option<(&'static str, f64)> = None;
        for candidate in corpus {
            let ratio = edit_similarity(normalized, candidate);
            let score = if ratio >= self.config.fuzzy_cutoff {
                Some(ratio)
            } else {
                let jaccard = token_jaccard(normalized, candidate);
                let containment = containment(normalized, candidate);
                if jaccard >= self.config.jaccard_min {
                    Some(jaccard)
                } else if containment >= self.config.containment_min {
                    Some(containment)
                } else {
                    None
                }
            };

            if let Some(score) = score {
                let better = best.map(|(_, b)| score > b).unwrap_or(true);
                if better {
                    // The matched source name resolves through the table.
                    if let Some(target) = builtin_target(data_type, candidate) {
                        best = Some((target, score));
                    }
                }
            }
        }
        best
    }

    /// Check that the mapped table is shaped like its data type claims.
    fn validate(&self, table: &DataTable, data_type: DataType, mappings: &[FieldMapping]) -> bool {
        if table.is_empty() {
            // Nothing to judge values on; only require the fields.
            return required_fields(data_type)
                .iter()
                .all(|req| mappings.iter().any(|m| m.target == *req));
        }

        for required in required_fields(data_type) {
            if !mappings.iter().any(|m| m.target == *required) {
                debug!("Validation: required field '{}' missing", required);
                return false;
            }
        }

        for (idx, mapping) in mappings.iter().enumerate() {
            if mapping.method == MapMethod::Unmapped {
                continue;
            }

            let non_null = table.non_null_count(idx);
            let fraction = non_null as f64 / table.len() as f64;
            if fraction < self.config.min_non_null {
                debug!(
                    "Validation: column '{}' only {:.0}% non-null",
                    mapping.source,
                    fraction * 100.0
                );
                return false;
            }

            let numeric = mapping.field_type.map(|t| t.is_numeric()).unwrap_or(false);
            if numeric {
                let parseable = table
                    .column_values(idx)
                    .any(|v| numeric_value(v).is_some());
                if !parseable {
                    debug!(
                        "Validation: numeric column '{}' has no parseable sample",
                        mapping.source
                    );
                    return false;
                }
            }
        }
        true
    }
}

/// Edit-distance similarity ratio in `[0, 1]`.
fn edit_similarity(a: &str, b: &str) -> f64 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let longest = a_chars.len().max(b_chars.len());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a_chars, &b_chars) as f64 / longest as f64
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(prev[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b.len()]
}

fn tokens(name: &str) -> Vec<String> {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity of the token sets of two names.
fn token_jaccard(a: &str, b: &str) -> f64 {
    let ta = tokens(a);
    let tb = tokens(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let intersection = ta.iter().filter(|t| tb.contains(t)).count();
    let union = ta.len() + tb.len() - intersection;
    intersection as f64 / union as f64
}

/// Length ratio when one name contains the other, else 0.
fn containment(a: &str, b: &str) -> f64 {
    let (shorter, longer) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    if shorter.is_empty() || !longer.contains(shorter) {
        return 0.0;
    }
    shorter.chars().count() as f64 / longer.chars().count() as f64
}

lazy_static! {
    static ref NAME_DATE: Regex =
        Regex::new(r"(?i)date|time|day|日期|时间").expect("static regex");
    static ref NAME_VOLUME: Regex =
        Regex::new(r"(?i)vol|qty|quantity|量").expect("static regex");
    static ref NAME_PERCENT: Regex =
        Regex::new(r"(?i)pct|percent|rate|chg|率|幅").expect("static regex");
    static ref NAME_PRICE: Regex =
        Regex::new(r"(?i)price|px|价").expect("static regex");
    static ref NAME_CURRENCY: Regex =
        Regex::new(r"(?i)currency|ccy|币").expect("static regex");
    static ref NAME_RATIO: Regex = Regex::new(r"(?i)ratio").expect("static regex");
    static ref NAME_BOOLEAN: Regex =
        Regex::new(r"(?i)^is_|^has_|flag|enabled|active").expect("static regex");
    static ref DATE_SHAPE: Regex =
        Regex::new(r"^\d{4}[-/.]\d{1,2}[-/.]\d{1,2}([ T].*)?$").expect("static regex");
}

/// Classify a column's semantic type from its name, then its values.
fn infer_field_type(normalized: &str, samples: &[Value]) -> Option<FieldType> {
    // Name heuristics first; they are cheap and usually decisive.
    if NAME_DATE.is_match(normalized) {
        return Some(FieldType::Date);
    }
    if NAME_VOLUME.is_match(normalized) {
        return Some(FieldType::Volume);
    }
    if NAME_PERCENT.is_match(normalized) {
        return Some(FieldType::Percentage);
    }
    if NAME_CURRENCY.is_match(normalized) {
        return Some(FieldType::Currency);
    }
    if NAME_RATIO.is_match(normalized) {
        return Some(FieldType::Ratio);
    }
    if NAME_PRICE.is_match(normalized) {
        return Some(FieldType::Price);
    }
    if NAME_BOOLEAN.is_match(normalized) {
        return Some(FieldType::Boolean);
    }

    if samples.is_empty() {
        return None;
    }

    // Value-shape heuristics over the sample.
    if samples.iter().all(is_boolean_like) {
        return Some(FieldType::Boolean);
    }
    if samples.iter().all(is_date_like) {
        return Some(FieldType::Date);
    }

    let numbers: Vec<f64> = samples.iter().filter_map(numeric_value).collect();
    if numbers.len() == samples.len() {
        if numbers.iter().all(|n| n.abs() <= 1.0) {
            return Some(FieldType::Ratio);
        }
        if numbers.iter().all(|n| n.abs() <= 100.0) {
            return Some(FieldType::Percentage);
        }
        if numbers.iter().all(|n| n.fract() == 0.0 && n.abs() >= 1000.0) {
            return Some(FieldType::Volume);
        }
        return Some(FieldType::Price);
    }

    None
}

fn is_boolean_like(value: &Value) -> bool {
    match value {
        Value::Bool(_) => true,
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "false" | "yes" | "no"
        ),
        _ => false,
    }
}

fn is_date_like(value: &Value) -> bool {
    match value {
        Value::String(s) => DATE_SHAPE.is_match(s.trim()),
        _ => false,
    }
}

/// Parse a cell as a number, tolerating thousands separators and percent
/// signs in string cells.
pub fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned = s.trim().trim_end_matches('%').replace(',', "");
            cleaned.parse::<f64>().ok()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mapper() -> FieldMapper {
        FieldMapper::new()
    }

    #[test]
    fn test_exact_match_chinese_close() {
        let m = mapper().map_column("收盘价", DataType::Kline, &[]);
        assert_eq!(m.target, "close");
        assert_eq!(m.confidence, 1.0);
        assert_eq!(m.method, MapMethod::Exact);
    }

    #[test]
    fn test_canonical_name_is_idempotent() {
        let m = mapper().map_column("close", DataType::Kline, &[]);
        assert_eq!(m.target, "close");
        assert_eq!(m.confidence, 1.0);
        assert_eq!(m.method, MapMethod::Exact);
    }

    #[test]
    fn test_custom_rule_beats_fuzzy() {
        let mut mapper = mapper();
        mapper.add_rule(
            MappingRule::new(r"^px_", "price", FieldType::Price, 0).unwrap(),
        );
        let m = mapper.map_column("px_settle", DataType::Quote, &[]);
        assert_eq!(m.target, "price");
        assert_eq!(m.method, MapMethod::Custom);
        assert!((m.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_fuzzy_match_close_typo() {
        let m = mapper().map_column("closee", DataType::Kline, &[]);
        assert_eq!(m.target, "close");
        assert_eq!(m.method, MapMethod::Fuzzy);
        assert!(m.confidence >= 0.6);
    }

    #[test]
    fn test_fuzzy_token_overlap() {
        // "close price" shares a token with "close_price".
        let m = mapper().map_column("the close price", DataType::Kline, &[]);
        assert_eq!(m.target, "close");
        assert!(m.confidence > 0.0);
    }

    #[test]
    fn test_inference_from_name() {
        let m = mapper().map_column("qty_traded", DataType::Kline, &[]);
        assert_eq!(m.method, MapMethod::Inferred);
        assert_eq!(m.field_type, Some(FieldType::Volume));
        assert_eq!(m.target, "volume");
    }

    #[test]
    fn test_inference_from_date_values() {
        let samples = vec![json!("2024-01-02"), json!("2024/01/03")];
        let m = mapper().map_column("zzz", DataType::Kline, &samples);
        assert_eq!(m.method, MapMethod::Inferred);
        assert_eq!(m.field_type, Some(FieldType::Date));
    }

    #[test]
    fn test_unmappable_column_passes_through() {
        let samples = vec![json!("hello"), json!("world")];
        let m = mapper().map_column("zzz", DataType::Kline, &samples);
        assert_eq!(m.method, MapMethod::Unmapped);
        assert_eq!(m.target, "zzz");
        assert_eq!(m.confidence, 0.0);
    }

    #[test]
    fn test_resolution_is_cached() {
        let mapper = mapper();
        mapper.map_column("收盘价", DataType::Kline, &[]);
        assert_eq!(mapper.lock_cache().len(), 1);
        mapper.map_column("收盘价", DataType::Kline, &[]);
        assert_eq!(mapper.lock_cache().len(), 1);
    }

    fn kline_table() -> DataTable {
        let mut table = DataTable::new(vec![
            "日期".into(),
            "开盘价".into(),
            "最高价".into(),
            "最低价".into(),
            "收盘价".into(),
            "成交量".into(),
        ]);
        table.push_row(vec![
            json!("2024-01-02"),
            json!(10.0),
            json!(10.5),
            json!(9.8),
            json!(10.2),
            json!(120000),
        ]);
        table
    }

    #[test]
    fn test_map_table_validates_kline() {
        let outcome = mapper().map_table(&kline_table(), DataType::Kline);
        assert!(outcome.validated);
        let columns = outcome.column_mapping();
        assert_eq!(columns.get("收盘价"), Some(&"close".to_string()));
        assert_eq!(columns.get("日期"), Some(&"date".to_string()));
    }

    #[test]
    fn test_map_table_missing_required_falls_back() {
        let mut table = DataTable::new(vec!["日期".into(), "成交量".into()]);
        table.push_row(vec![json!("2024-01-02"), json!(1000)]);

        let outcome = mapper().map_table(&table, DataType::Kline);
        assert!(!outcome.validated);
        // Exact renames survive the fallback.
        assert_eq!(
            outcome.column_mapping().get("日期"),
            Some(&"date".to_string())
        );
    }

    #[test]
    fn test_mostly_null_column_fails_validation() {
        let mut table = kline_table();
        for _ in 0..9 {
            table.push_row(vec![
                json!("2024-01-03"),
                Value::Null,
                json!(10.5),
                json!(9.8),
                json!(10.2),
                json!(120000),
            ]);
        }
        let outcome = mapper().map_table(&table, DataType::Kline);
        assert!(!outcome.validated);
    }

    #[test]
    fn test_numeric_value_parsing() {
        assert_eq!(numeric_value(&json!(3.5)), Some(3.5));
        assert_eq!(numeric_value(&json!("1,234.5")), Some(1234.5));
        assert_eq!(numeric_value(&json!("12%")), Some(12.0));
        assert_eq!(numeric_value(&json!("abc")), None);
        assert_eq!(numeric_value(&Value::Null), None);
    }

    #[test]
    fn test_similarity_helpers() {
        assert!((edit_similarity("close", "close") - 1.0).abs() < 1e-9);
        assert!(edit_similarity("close", "closee") > 0.8);
        assert!(token_jaccard("close_price", "price") > 0.0);
        assert!(containment("close", "pre_close") > 0.5);
    }
}
