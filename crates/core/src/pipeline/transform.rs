//! Transform-data stage: field mapping, type coercion, quality scoring.
//!
//! Raw provider tables arrive with native column names and loosely typed
//! cells (numbers as strings, assorted null sentinels, mixed date
//! formats). This stage renames columns through the field mapper, coerces
//! cells toward their mapped semantic type, and scores the result:
//!
//! `quality = 0.6 x completeness + 0.4 x type_consistency`, clamped to
//! `[0, 1]`. An all-null table scores 0.0; a complete, fully typed table
//! scores 1.0.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use log::debug;
use serde_json::Value;

use crate::mapping::{numeric_value, FieldMapper, FieldType, MapMethod};
use crate::models::{DataTable, DataType};

/// Quality penalty applied when mapping validation failed and the table
/// fell back to rename-only columns.
const VALIDATION_PENALTY: f64 = 0.8;

/// String cells treated as null.
const NULL_SENTINELS: &[&str] = &["", "null", "N/A", "-", "--", "None"];

/// Output of the transform stage.
#[derive(Clone, Debug)]
pub(crate) struct TransformOutcome {
    /// Table with canonical column names and coerced cells.
    pub table: DataTable,
    /// Original -> canonical column names.
    pub column_mapping: HashMap<String, String>,
    /// Composite quality score in `[0, 1]`.
    pub quality: f64,
}

/// Map, coerce, and score a raw provider table.
pub(crate) fn transform(
    mapper: &FieldMapper,
    mut table: DataTable,
    data_type: DataType,
) -> TransformOutcome {
    let mapping = mapper.map_table(&table, data_type);
    let column_mapping = mapping.column_mapping();

    // Rename columns in place.
    for (column, resolved) in table.columns.iter_mut().zip(mapping.mappings.iter()) {
        *column = resolved.target.clone();
    }

    let field_types: Vec<Option<FieldType>> =
        mapping.mappings.iter().map(|m| m.field_type).collect();

    for row in table.rows.iter_mut() {
        for (idx, cell) in row.iter_mut().enumerate() {
            normalize_null(cell);
            if cell.is_null() {
                continue;
            }
            if let Some(Some(field_type)) = field_types.get(idx) {
                coerce(cell, *field_type);
            }
        }
    }

    let mut quality = score(&table, &field_types);
    if !mapping.validated {
        quality *= VALIDATION_PENALTY;
    }
    let unmapped = mapping
        .mappings
        .iter()
        .filter(|m| m.method == MapMethod::Unmapped)
        .count();
    if unmapped > 0 {
        debug!(
            "Transform: {} of {} columns left unmapped",
            unmapped,
            table.columns.len()
        );
    }

    TransformOutcome {
        table,
        column_mapping,
        quality,
    }
}

/// Replace known null sentinels with a real null.
fn normalize_null(cell: &mut Value) {
    if let Value::String(s) = cell {
        let trimmed = s.trim();
        if NULL_SENTINELS
            .iter()
            .any(|sentinel| trimmed.eq_ignore_ascii_case(sentinel))
        {
            *cell = Value::Null;
        }
    }
}

/// Coerce a non-null cell toward its semantic type. Cells that cannot be
/// coerced are left untouched and count against type consistency.
fn coerce(cell: &mut Value, field_type: FieldType) {
    match field_type {
        FieldType::Price | FieldType::Volume | FieldType::Percentage | FieldType::Ratio => {
            if !cell.is_number() {
                if let Some(n) = numeric_value(cell) {
                    if let Some(number) = serde_json::Number::from_f64(n) {
                        *cell = Value::Number(number);
                    }
                }
            }
        }
        FieldType::Date => {
            if let Value::String(s) = cell {
                if let Some(canonical) = canonical_date(s) {
                    *cell = Value::String(canonical);
                }
            }
        }
        FieldType::Boolean => {
            if let Value::String(s) = cell {
                match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "yes" => *cell = Value::Bool(true),
                    "false" | "no" => *cell = Value::Bool(false),
                    _ => {}
                }
            }
        }
        FieldType::Currency | FieldType::Text => {}
    }
}

/// Parse common date shapes into `YYYY-MM-DD` (or a `T`-separated
/// datetime when a time component is present).
fn canonical_date(raw: &str) -> Option<String> {
    let trimmed = raw.trim();

    for format in ["%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt.format("%Y-%m-%dT%H:%M:%S").to_string());
        }
    }
    for format in ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%Y%m%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }
    None
}

/// Whether a non-null cell matches its column's semantic type.
fn type_consistent(cell: &Value, field_type: FieldType) -> bool {
    match field_type {
        FieldType::Price | FieldType::Volume | FieldType::Percentage | FieldType::Ratio => {
            cell.is_number()
        }
        FieldType::Date => matches!(cell, Value::String(_)),
        FieldType::Boolean => cell.is_boolean(),
        FieldType::Currency | FieldType::Text => matches!(cell, Value::String(_)),
    }
}

fn score(table: &DataTable, field_types: &[Option<FieldType>]) -> f64 {
    let total_cells = table.cell_count();
    if total_cells == 0 {
        return 0.0;
    }

    let mut non_null = 0usize;
    let mut typed_cells = 0usize;
    let mut consistent = 0usize;

    for row in &table.rows {
        for (idx, cell) in row.iter().enumerate() {
            if cell.is_null() {
                continue;
            }
            non_null += 1;
            if let Some(Some(field_type)) = field_types.get(idx) {
                typed_cells += 1;
                if type_consistent(cell, *field_type) {
                    consistent += 1;
                }
            }
        }
    }

    if non_null == 0 {
        return 0.0;
    }

    let completeness = non_null as f64 / total_cells as f64;
    let consistency = if typed_cells == 0 {
        // Nothing claims a type; don't punish the table for it.
        1.0
    } else {
        consistent as f64 / typed_cells as f64
    };

    (0.6 * completeness + 0.4 * consistency).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mapper() -> FieldMapper {
        FieldMapper::new()
    }

    fn raw_kline() -> DataTable {
        let mut table = DataTable::new(vec![
            "日期".into(),
            "开盘价".into(),
            "最高价".into(),
            "最低价".into(),
            "收盘价".into(),
            "成交量".into(),
        ]);
        table.push_row(vec![
            json!("2024/01/02"),
            json!("10.00"),
            json!(10.5),
            json!(9.8),
            json!("10.20"),
            json!("1,200,000"),
        ]);
        table.push_row(vec![
            json!("2024/01/03"),
            json!(10.2),
            json!(10.8),
            json!(10.0),
            json!(10.6),
            json!(900000),
        ]);
        table
    }

    #[test]
    fn test_columns_renamed_to_canonical() {
        let outcome = transform(&mapper(), raw_kline(), DataType::Kline);
        assert_eq!(
            outcome.table.columns,
            vec!["date", "open", "high", "low", "close", "volume"]
        );
        assert_eq!(
            outcome.column_mapping.get("收盘价"),
            Some(&"close".to_string())
        );
    }

    #[test]
    fn test_string_numbers_coerced() {
        let outcome = transform(&mapper(), raw_kline(), DataType::Kline);
        let close_idx = outcome.table.column_index("close").unwrap();
        assert_eq!(outcome.table.rows[0][close_idx], json!(10.2));
        let vol_idx = outcome.table.column_index("volume").unwrap();
        assert_eq!(outcome.table.rows[0][vol_idx], json!(1_200_000.0));
    }

    #[test]
    fn test_dates_canonicalized() {
        let outcome = transform(&mapper(), raw_kline(), DataType::Kline);
        let date_idx = outcome.table.column_index("date").unwrap();
        assert_eq!(outcome.table.rows[0][date_idx], json!("2024-01-02"));
    }

    #[test]
    fn test_clean_table_scores_one() {
        let outcome = transform(&mapper(), raw_kline(), DataType::Kline);
        assert!((outcome.quality - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_null_sentinels_normalized_and_depress_quality() {
        let mut table = raw_kline();
        table.push_row(vec![
            json!("2024/01/04"),
            json!("N/A"),
            json!("--"),
            json!(""),
            json!("null"),
            json!("None"),
        ]);

        let outcome = transform(&mapper(), table, DataType::Kline);
        let open_idx = outcome.table.column_index("open").unwrap();
        assert!(outcome.table.rows[2][open_idx].is_null());
        assert!(outcome.quality < 1.0);
        assert!(outcome.quality > 0.0);
    }

    #[test]
    fn test_empty_table_scores_zero() {
        let table = DataTable::new(vec!["收盘价".into()]);
        let outcome = transform(&mapper(), table, DataType::Kline);
        assert_eq!(outcome.quality, 0.0);
    }

    #[test]
    fn test_all_null_table_scores_zero() {
        let mut table = raw_kline();
        table.rows.clear();
        table.push_row(vec![Value::Null; 6]);
        let outcome = transform(&mapper(), table, DataType::Kline);
        // Validation fails on the all-null columns, and completeness is 0.
        assert_eq!(outcome.quality, 0.0);
    }

    #[test]
    fn test_unparseable_numeric_counts_against_consistency() {
        let mut table = raw_kline();
        table.push_row(vec![
            json!("2024/01/04"),
            json!(10.0),
            json!(10.5),
            json!(9.9),
            json!("n o t a n u m b e r"),
            json!(500000),
        ]);
        let outcome = transform(&mapper(), table, DataType::Kline);
        assert!(outcome.quality < 1.0);
    }

    #[test]
    fn test_canonical_date_formats() {
        assert_eq!(canonical_date("2024-01-02"), Some("2024-01-02".into()));
        assert_eq!(canonical_date("2024/1/2"), Some("2024-01-02".into()));
        assert_eq!(canonical_date("20240102"), Some("2024-01-02".into()));
        assert_eq!(
            canonical_date("2024-01-02 09:30:00"),
            Some("2024-01-02T09:30:00".into())
        );
        assert_eq!(canonical_date("not a date"), None);
    }
}
