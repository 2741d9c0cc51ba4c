//! Unifier: row-wise concatenation of several raw tables.
//!
//! Columns are not aligned or renamed here. The result carries the union of
//! all column sets (first appearance order), and rows from a source that
//! lacked a column hold a missing cell there.

use crate::models::{Cell, RawRecordSet, UnifiedRecordSet};

/// Concatenate `tables` in input order. A single table is returned as is.
pub fn unify(mut tables: Vec<RawRecordSet>) -> UnifiedRecordSet {
    if tables.len() == 1 {
        return tables.remove(0);
    }

    let mut columns: Vec<String> = Vec::new();
    for table in &tables {
        for column in table.columns() {
            if !columns.contains(column) {
                columns.push(column.clone());
            }
        }
    }

    let mut rows: Vec<Vec<Cell>> = Vec::with_capacity(tables.iter().map(|t| t.len()).sum());
    for table in &tables {
        let positions: Vec<Option<usize>> = columns.iter().map(|c| table.column_index(c)).collect();
        for row in table.rows() {
            rows.push(
                positions
                    .iter()
                    .map(|pos| pos.and_then(|idx| row[idx].clone()))
                    .collect(),
            );
        }
    }

    UnifiedRecordSet::from_parts(columns, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_count_and_order() {
        let first = RawRecordSet::from_rows(&["MUNICIPIO"], &[&["SAO LUIS"], &["CAXIAS"]]);
        let second = RawRecordSet::from_rows(&["MUNICIPIO"], &[&["IMPERATRIZ"]]);

        let unified = unify(vec![first, second]);
        assert_eq!(unified.len(), 3);
        assert_eq!(unified.get(0, "MUNICIPIO"), Some("SAO LUIS"));
        assert_eq!(unified.get(1, "MUNICIPIO"), Some("CAXIAS"));
        assert_eq!(unified.get(2, "MUNICIPIO"), Some("IMPERATRIZ"));
    }

    #[test]
    fn test_column_union_leaves_holes() {
        let first = RawRecordSet::from_rows(&["MUNICIPIO", "FASE"], &[&["SAO LUIS", "1º Quadrimestre"]]);
        let second = RawRecordSet::from_rows(&["EXERCICIO", "MUNICIPIO"], &[&["2024", "CAXIAS"]]);

        let unified = unify(vec![first, second]);
        assert_eq!(unified.columns(), &["MUNICIPIO", "FASE", "EXERCICIO"]);
        assert_eq!(unified.get(0, "EXERCICIO"), None);
        assert_eq!(unified.get(1, "FASE"), None);
        assert_eq!(unified.get(1, "MUNICIPIO"), Some("CAXIAS"));
        assert_eq!(unified.get(1, "EXERCICIO"), Some("2024"));
    }

    #[test]
    fn test_single_table_is_identity() {
        let table = RawRecordSet::from_rows(&["B", "A"], &[&["1", "2"]]);
        assert_eq!(unify(vec![table.clone()]), table);
    }

    #[test]
    fn test_overlapping_rows_are_kept() {
        let first = RawRecordSet::from_rows(&["MUNICIPIO", "SITUACAO"], &[&["SAO LUIS", "Aprovado"]]);
        let second = RawRecordSet::from_rows(&["MUNICIPIO", "SITUACAO"], &[&["SAO LUIS", "Em análise"]]);

        let unified = unify(vec![first, second]);
        assert_eq!(unified.len(), 2);
    }
}
