//! Tabular payload exchanged between providers and the pipeline.
//!
//! Providers return wildly inconsistent schemas, so cells are kept as
//! [`serde_json::Value`] until the transform stage coerces them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A column-ordered table of raw or transformed data.
///
/// Every row has exactly `columns.len()` cells. Missing cells are
/// represented as [`Value::Null`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DataTable {
    /// Ordered column names.
    pub columns: Vec<String>,
    /// Row-major cell data; each row is aligned with `columns`.
    pub rows: Vec<Vec<Value>>,
}

impl DataTable {
    /// Create an empty table with the given column names.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from rows of JSON objects.
    ///
    /// Column order is the order keys are first seen across the rows.
    /// Keys absent from a row become [`Value::Null`].
    pub fn from_records(records: Vec<serde_json::Map<String, Value>>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in &records {
            for key in record.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }

        let rows = records
            .into_iter()
            .map(|mut record| {
                columns
                    .iter()
                    .map(|c| record.remove(c).unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    /// Append a row, padding or truncating it to the column count.
    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All cell values of one column, in row order.
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &Value> {
        self.rows.iter().filter_map(move |row| row.get(index))
    }

    /// Count of non-null cells in one column.
    pub fn non_null_count(&self, index: usize) -> usize {
        self.column_values(index)
            .filter(|v| !v.is_null())
            .count()
    }

    /// Total cell count (rows x columns).
    pub fn cell_count(&self) -> usize {
        self.rows.len() * self.columns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(pairs: &[(&str, Value)]) -> serde_json::Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_from_records_aligns_missing_keys() {
        let table = DataTable::from_records(vec![
            record(&[("open", json!(10.0)), ("close", json!(11.0))]),
            record(&[("close", json!(12.0)), ("volume", json!(500))]),
        ]);

        assert_eq!(table.columns, vec!["open", "close", "volume"]);
        assert_eq!(table.rows[0], vec![json!(10.0), json!(11.0), Value::Null]);
        assert_eq!(table.rows[1], vec![Value::Null, json!(12.0), json!(500)]);
    }

    #[test]
    fn test_non_null_count() {
        let mut table = DataTable::new(vec!["close".to_string()]);
        table.push_row(vec![json!(1.0)]);
        table.push_row(vec![Value::Null]);
        table.push_row(vec![json!(3.0)]);

        assert_eq!(table.non_null_count(0), 2);
        assert_eq!(table.cell_count(), 3);
    }

    #[test]
    fn test_push_row_pads_to_width() {
        let mut table = DataTable::new(vec!["a".to_string(), "b".to_string()]);
        table.push_row(vec![json!(1)]);

        assert_eq!(table.rows[0], vec![json!(1), Value::Null]);
    }
}
