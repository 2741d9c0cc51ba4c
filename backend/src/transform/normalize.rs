//! Transformer: reshape a raw or unified table into the canonical schema.
//!
//! 1. Rename mapped columns (simultaneously, last declared rule wins on collisions)
//! 2. Inject derived columns that are still absent
//! 3. Normalize the year column to an integral string or `""`
//! 4. Project to the canonical columns that exist, in declaration order
//!
//! The reshape is row-preserving: output row `i` is input row `i`.

use crate::api::logs::{log_info, log_warning};
use crate::error::{TransformError, TransformResult};
use crate::models::{CanonicalRecordSet, Cell, RecordSet};
use crate::schema::{ColumnMapping, RunContext, SchemaMapping};

/// Transform `table` with `schema`. `None` means the previous stage produced nothing.
pub fn transform(
    table: Option<RecordSet>,
    schema: &SchemaMapping,
    ctx: &RunContext,
) -> TransformResult<CanonicalRecordSet> {
    schema.validate()?;
    let table = table.ok_or(TransformError::MissingInput)?;

    let mut renamed = rename_columns(&table, &schema.columns);

    for derived in &schema.derived {
        let value = derived.default.resolve(ctx);
        if renamed.add_constant_column(&derived.name, Some(value.clone())) {
            log_info(format!("Added column '{}' with default '{}'", derived.name, value));
        }
    }

    if let Some(ref year) = schema.year_column {
        renamed.map_column(year, |cell| Some(normalize_year(cell.as_deref())));
    }

    let columns = projected_columns(schema, &renamed);
    Ok(renamed.select(&columns))
}

/// Render a year cell as an integral string.
///
/// Missing and `nan` become `""`; trailing `.0` is stripped. Applying it to
/// its own output returns the same string.
pub fn normalize_year(value: Option<&str>) -> String {
    let Some(mut year) = value else {
        return String::new();
    };
    while let Some(stripped) = year.strip_suffix(".0") {
        year = stripped;
    }
    if year == "nan" {
        String::new()
    } else {
        year.to_string()
    }
}

/// Rename every mapped column at once.
///
/// When several columns end up with the same name, the column renamed by the
/// rule declared last is kept; renamed columns beat columns that already had
/// the name. Losers are dropped.
fn rename_columns(table: &RecordSet, mappings: &[ColumnMapping]) -> RecordSet {
    // (new name, priority); priority 0 = unmapped, rule i = i + 1
    let renames: Vec<(String, usize)> = table
        .columns()
        .iter()
        .map(|column| {
            mappings
                .iter()
                .enumerate()
                .rev()
                .find(|(_, m)| &m.source == column)
                .map_or((column.clone(), 0), |(i, m)| (m.target.clone(), i + 1))
        })
        .collect();

    let keep: Vec<usize> = (0..renames.len())
        .filter(|&i| {
            let (name, priority) = &renames[i];
            let beaten = renames
                .iter()
                .any(|(other, other_priority)| other == name && other_priority > priority);
            if beaten {
                log_warning(format!(
                    "Column '{}' dropped: another column is renamed to '{}'",
                    table.columns()[i],
                    name
                ));
            }
            !beaten
        })
        .collect();

    let columns = keep.iter().map(|&i| renames[i].0.clone()).collect();
    let rows: Vec<Vec<Cell>> = table
        .rows()
        .iter()
        .map(|row| keep.iter().map(|&i| row[i].clone()).collect())
        .collect();

    RecordSet::from_parts(columns, rows)
}

/// Rename targets present in `table` (declaration order, no repeats),
/// then derived columns not already listed.
fn projected_columns(schema: &SchemaMapping, table: &RecordSet) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for mapping in &schema.columns {
        if table.has_column(&mapping.target) && !columns.contains(&mapping.target) {
            columns.push(mapping.target.clone());
        }
    }
    for derived in &schema.derived {
        if table.has_column(&derived.name) && !columns.contains(&derived.name) {
            columns.push(derived.name.clone());
        }
    }
    columns
}
