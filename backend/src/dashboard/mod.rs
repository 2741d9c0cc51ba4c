//! Data side of the monitoring dashboard.
//!
//! The dashboard itself (layout, widgets) lives elsewhere; this module is the
//! contract it consumes: make sure the canonical file exists, read it fresh,
//! filter it, and shape the per-instrument status board.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::api::logs::{log_info, log_warning};
use crate::error::PipelineResult;
use crate::models::RecordSet;
use crate::parser::extract_file;
use crate::schema::{SourceFormat, PROCESSING_DATE_COLUMN, YEAR_COLUMN};
use crate::transform::pipeline::{run_pipeline, PipelineOptions};

/// Instrument shown on its own at the top of the board, by phase.
pub const HEALTH_PLAN: &str = "Plano de Saúde";

/// Read the canonical file, running the pipeline first if it does not exist.
pub fn load_or_build(options: &PipelineOptions) -> PipelineResult<RecordSet> {
    if !options.output.exists() {
        log_info(format!(
            "{} not found, running the pipeline first",
            options.output.display()
        ));
        run_pipeline(options)?;
    }

    // The canonical file is already normalized: only empty cells are missing.
    let format = SourceFormat {
        na_values: vec![String::new()],
        ..SourceFormat::default()
    };
    Ok(extract_file(&options.output, &format)?.table)
}

/// A loaded dataset, or an empty one plus the reason it could not be loaded.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub table: RecordSet,
    pub error: Option<String>,
}

impl Dataset {
    /// Never fails: on error the table is empty and `error` says why.
    pub fn load(options: &PipelineOptions) -> Self {
        match load_or_build(options) {
            Ok(table) => Self { table, error: None },
            Err(e) => {
                log_warning(format!("No data available: {}", e));
                Self {
                    table: RecordSet::default(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// True when there is nothing to display.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Row filter. Unset fields match everything; set fields match exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub municipio: Option<String>,
    pub macrorregiao: Option<String>,
    pub regiao: Option<String>,
    pub fase: Option<String>,
    pub ano: Option<String>,
    pub instrumento: Option<String>,
}

impl Filter {
    /// (candidate columns, expected value) per set field. Macro-region is
    /// named differently depending on the schema that produced the file.
    fn criteria(&self) -> Vec<(&'static [&'static str], &str)> {
        let fields: [(&'static [&'static str], &Option<String>); 6] = [
            (&["MUNICIPIO"], &self.municipio),
            (&["NO_MACROREGIONAL", "MACRORREGIAO"], &self.macrorregiao),
            (&["REGIAO"], &self.regiao),
            (&["FASE"], &self.fase),
            (&[YEAR_COLUMN], &self.ano),
            (&["INSTRUMENTO"], &self.instrumento),
        ];
        fields
            .into_iter()
            .filter_map(|(columns, value)| value.as_deref().map(|v| (columns, v)))
            .collect()
    }

    /// Rows matching every set field. A field whose column is absent matches nothing.
    pub fn apply(&self, table: &RecordSet) -> RecordSet {
        let criteria: Vec<(Option<&str>, &str)> = self
            .criteria()
            .into_iter()
            .map(|(candidates, value)| {
                let column = candidates.iter().copied().find(|c| table.has_column(c));
                (column, value)
            })
            .collect();

        table.filter_rows(|t, row| {
            criteria.iter().all(|(column, expected)| match column {
                Some(column) => t.get(row, column) == Some(*expected),
                None => false,
            })
        })
    }
}

/// Sorted, unique, non-empty values of a column (filter dropdown contents).
pub fn distinct_values(table: &RecordSet, column: &str) -> Vec<String> {
    let mut values: Vec<String> = table
        .column_values(column)
        .map(|values| values.flatten().filter(|v| !v.is_empty()).map(str::to_string).collect())
        .unwrap_or_default();
    values.sort();
    values.dedup();
    values
}

/// One line of the status board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    pub instrumento: String,
    pub periodo: String,
    pub status: String,
}

/// Instruments of one year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearGroup {
    pub ano: i64,
    pub entries: Vec<StatusEntry>,
}

/// Status of every instrument in a (filtered) table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBoard {
    /// The health plan, periodized by phase
    pub health_plan: Option<StatusEntry>,
    /// Other instruments, by year ascending
    pub years: Vec<YearGroup>,
    /// Latest processing date, `dd/mm/YYYY`
    pub last_update: Option<String>,
}

impl StatusBoard {
    pub fn build(table: &RecordSet) -> Self {
        let text = |row: usize, column: &str| table.get(row, column).unwrap_or("").to_string();

        let health_plan = (0..table.len())
            .find(|&row| table.get(row, "INSTRUMENTO") == Some(HEALTH_PLAN))
            .map(|row| StatusEntry {
                instrumento: HEALTH_PLAN.to_string(),
                periodo: text(row, "FASE"),
                status: text(row, "STATUS"),
            });

        let mut by_year: BTreeMap<i64, Vec<StatusEntry>> = BTreeMap::new();
        for row in 0..table.len() {
            if table.get(row, "INSTRUMENTO") == Some(HEALTH_PLAN) {
                continue;
            }
            let Some(ano) = table.get(row, YEAR_COLUMN).and_then(parse_year) else {
                continue;
            };
            by_year.entry(ano).or_default().push(StatusEntry {
                instrumento: text(row, "INSTRUMENTO"),
                periodo: ano.to_string(),
                status: text(row, "STATUS"),
            });
        }

        let years = by_year
            .into_iter()
            .map(|(ano, mut entries)| {
                entries.sort_by(|a, b| a.instrumento.cmp(&b.instrumento));
                YearGroup { ano, entries }
            })
            .collect();

        let last_update = table
            .column_values(PROCESSING_DATE_COLUMN)
            .and_then(|values| {
                values
                    .flatten()
                    .filter_map(|v| NaiveDate::parse_from_str(v, "%Y-%m-%d").ok())
                    .max()
            })
            .map(|d| d.format("%d/%m/%Y").to_string());

        Self {
            health_plan,
            years,
            last_update,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.health_plan.is_none() && self.years.is_empty()
    }

    /// Plain-text rendering: instrument, period and status columns.
    pub fn render_text(&self) -> String {
        let mut lines = vec![format!("{:<40} {:<20} {}", "INSTRUMENTO", "ANO", "STATUS")];
        let mut push = |entry: &StatusEntry| {
            lines.push(format!("{:<40} {:<20} {}", entry.instrumento, entry.periodo, entry.status));
        };

        if let Some(ref plan) = self.health_plan {
            push(plan);
        }
        for group in &self.years {
            for entry in &group.entries {
                push(entry);
            }
        }
        if let Some(ref date) = self.last_update {
            lines.push(String::new());
            lines.push(format!("Última atualização: {}", date));
        }
        lines.join("\n")
    }
}

/// Integral year of a cell such as `2024` or `2024.0`.
fn parse_year(value: &str) -> Option<i64> {
    let year: f64 = value.trim().parse().ok()?;
    year.is_finite().then_some(year.trunc() as i64)
}
