//! Tabular data model shared by every pipeline stage.
//!
//! A [`RecordSet`] is an ordered list of unique column names plus rows of
//! optional cells. `None` means the value is missing: either the source had
//! an NA marker in that cell, or the row came from a source that did not have
//! the column at all.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single cell. `None` = missing.
pub type Cell = Option<String>;

/// In-memory table with ordered, unique column names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSet {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

/// Rows of one source file, columns as the source named them.
pub type RawRecordSet = RecordSet;

/// Row-wise concatenation of every raw table of a run.
pub type UnifiedRecordSet = RecordSet;

/// Table after rename, default injection and projection.
pub type CanonicalRecordSet = RecordSet;

impl RecordSet {
    /// Create an empty table with the given columns.
    ///
    /// Repeated names are made unique with `.1`, `.2`, ... suffixes.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns: dedupe_columns(columns),
            rows: Vec::new(),
        }
    }

    /// Build a table from string literals, mostly for tests and fixtures.
    /// Empty strings become missing cells.
    pub fn from_rows(columns: &[&str], rows: &[&[&str]]) -> Self {
        let mut table = Self::new(columns.iter().map(|c| c.to_string()).collect());
        for row in rows {
            table.push_row(
                row.iter()
                    .map(|v| if v.is_empty() { None } else { Some(v.to_string()) })
                    .collect(),
            );
        }
        table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Append a row. Short rows are padded with missing cells, long rows truncated.
    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.columns.len(), None);
        self.rows.push(row);
    }

    /// Value at (row, column name), `None` when missing or the column is absent.
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)?.as_deref()
    }

    /// All values of one column, in row order.
    pub fn column_values<'a>(&'a self, column: &str) -> Option<impl Iterator<Item = Option<&'a str>> + 'a> {
        let idx = self.column_index(column)?;
        Some(self.rows.iter().map(move |row| row[idx].as_deref()))
    }

    /// Add a column holding the same value in every row. No-op if it already exists.
    pub fn add_constant_column(&mut self, name: &str, value: Cell) -> bool {
        if self.has_column(name) {
            return false;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(value.clone());
        }
        true
    }

    /// Apply `f` to every cell of a column. Returns false if the column is absent.
    pub fn map_column(&mut self, column: &str, mut f: impl FnMut(Cell) -> Cell) -> bool {
        let Some(idx) = self.column_index(column) else {
            return false;
        };
        for row in &mut self.rows {
            let cell = row[idx].take();
            row[idx] = f(cell);
        }
        true
    }

    /// Keep only the listed columns, in the listed order. Unknown names are skipped.
    pub fn select(&self, columns: &[String]) -> RecordSet {
        let picked: Vec<(String, usize)> = columns
            .iter()
            .filter_map(|c| self.column_index(c).map(|idx| (c.clone(), idx)))
            .collect();
        let mut out = RecordSet::new(picked.iter().map(|(c, _)| c.clone()).collect());
        out.rows = self
            .rows
            .iter()
            .map(|row| picked.iter().map(|(_, idx)| row[*idx].clone()).collect())
            .collect();
        out
    }

    /// Keep the rows for which `keep` returns true.
    pub fn filter_rows(&self, mut keep: impl FnMut(&RecordSet, usize) -> bool) -> RecordSet {
        let rows = (0..self.rows.len())
            .filter(|&i| keep(self, i))
            .map(|i| self.rows[i].clone())
            .collect();
        RecordSet {
            columns: self.columns.clone(),
            rows,
        }
    }

    /// Replace the header and rows in one go. Callers guarantee unique names.
    pub(crate) fn from_parts(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let mut table = Self::new(columns);
        for row in rows {
            table.push_row(row);
        }
        table
    }

    /// Rows as JSON objects (missing cells become `null`).
    pub fn to_json_records(&self) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| {
                let obj: Map<String, Value> = self
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(c, v)| {
                        let value = v.as_ref().map_or(Value::Null, |s| Value::String(s.clone()));
                        (c.clone(), value)
                    })
                    .collect();
                Value::Object(obj)
            })
            .collect()
    }
}

/// Make header names unique the same way spreadsheet exports are usually
/// read back: the second `X` becomes `X.1`, the third `X.2`.
fn dedupe_columns(columns: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(columns.len());
    for col in columns {
        if !out.contains(&col) {
            out.push(col);
            continue;
        }
        let mut n = 1;
        loop {
            let candidate = format!("{}.{}", col, n);
            if !out.contains(&candidate) {
                out.push(candidate);
                break;
            }
            n += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_headers_made_unique() {
        let table = RecordSet::new(vec!["A".into(), "B".into(), "A".into(), "A".into()]);
        assert_eq!(table.columns(), &["A", "B", "A.1", "A.2"]);
    }

    #[test]
    fn test_short_rows_padded() {
        let mut table = RecordSet::new(vec!["A".into(), "B".into()]);
        table.push_row(vec![Some("1".into())]);
        assert_eq!(table.get(0, "A"), Some("1"));
        assert_eq!(table.get(0, "B"), None);
    }

    #[test]
    fn test_add_constant_column_is_noop_when_present() {
        let mut table = RecordSet::from_rows(&["A"], &[&["x"], &["y"]]);
        assert!(table.add_constant_column("B", Some("k".into())));
        assert!(!table.add_constant_column("A", Some("k".into())));
        assert_eq!(table.get(1, "B"), Some("k"));
        assert_eq!(table.get(1, "A"), Some("y"));
    }

    #[test]
    fn test_select_reorders_and_skips_unknown() {
        let table = RecordSet::from_rows(&["A", "B", "C"], &[&["1", "2", "3"]]);
        let out = table.select(&["C".into(), "Z".into(), "A".into()]);
        assert_eq!(out.columns(), &["C", "A"]);
        assert_eq!(out.rows()[0], vec![Some("3".into()), Some("1".into())]);
    }

    #[test]
    fn test_json_records() {
        let table = RecordSet::from_rows(&["MUNICIPIO", "ANO"], &[&["SAO LUIS", ""]]);
        let json = table.to_json_records();
        assert_eq!(json[0]["MUNICIPIO"], "SAO LUIS");
        assert!(json[0]["ANO"].is_null());
    }
}
