//! Schema mapping tables.
//!
//! A [`SchemaMapping`] declares which source columns map to which canonical
//! columns, which derived columns get injected with a default value, which
//! column holds the year, and how the source files are encoded. Mappings are
//! plain immutable values: every pipeline call receives one explicitly, so
//! several extract layouts can live side by side as named configurations.

use std::collections::HashSet;
use std::fmt::Write as _;

use chrono::format::{Item, StrftimeItems};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{TransformError, TransformResult};

/// Name of the single-extract configuration.
pub const SINGLE_SOURCE: &str = "single-source";

/// Name of the two-extract configuration producing the full canonical schema.
pub const DUAL_SOURCE: &str = "dual-source";

/// Canonical year column.
pub const YEAR_COLUMN: &str = "ANO";

/// Canonical processing-date column.
pub const PROCESSING_DATE_COLUMN: &str = "DATA_PROCESSAMENTO";

/// Missing-value markers recognized by default.
pub const DEFAULT_NA_VALUES: &[&str] = &[
    "", "nan", "NaN", "NULL", "null", "NA", "N/A", "n/a", "#N/A", "None", "<NA>",
];

/// One source → canonical correspondence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub source: String,
    pub target: String,
}

impl ColumnMapping {
    pub fn new(source: &str, target: &str) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
        }
    }
}

/// Default value of a derived column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DefaultValue {
    /// Fixed text.
    Literal { value: String },
    /// The run's processing date, rendered with a chrono format string.
    ProcessingDate {
        #[serde(default = "default_date_format")]
        format: String,
    },
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

impl DefaultValue {
    /// Resolve against a run. Computed once per run so every row agrees.
    ///
    /// An invalid date format (rejected by [`SchemaMapping::validate`]) falls
    /// back to `%Y-%m-%d`.
    pub fn resolve(&self, ctx: &RunContext) -> String {
        match self {
            DefaultValue::Literal { value } => value.clone(),
            DefaultValue::ProcessingDate { format } => {
                let mut out = String::new();
                if write!(out, "{}", ctx.processing_date.format(format)).is_err() {
                    out = ctx.processing_date.format("%Y-%m-%d").to_string();
                }
                out
            }
        }
    }
}

/// True when chrono can render every specifier of `format`.
fn is_valid_date_format(format: &str) -> bool {
    !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}

/// A column injected when the renamed table does not already have it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedColumn {
    pub name: String,
    pub default: DefaultValue,
}

/// How a source file is encoded on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceEncoding {
    /// Strict UTF-8 (BOM optional).
    #[default]
    Utf8,
    /// Detect the charset and decode with it.
    Auto,
}

/// Metadata about the source CSV format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFormat {
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    #[serde(default)]
    pub encoding: SourceEncoding,

    /// Cell values read as missing.
    #[serde(default = "default_na_values")]
    pub na_values: Vec<String>,
}

fn default_delimiter() -> char {
    ';'
}

fn default_na_values() -> Vec<String> {
    DEFAULT_NA_VALUES.iter().map(|s| s.to_string()).collect()
}

impl Default for SourceFormat {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            encoding: SourceEncoding::default(),
            na_values: default_na_values(),
        }
    }
}

impl SourceFormat {
    pub fn is_na(&self, value: &str) -> bool {
        self.na_values.iter().any(|na| na == value)
    }
}

/// Per-run values shared by every row of that run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunContext {
    pub processing_date: NaiveDate,
}

impl RunContext {
    /// Context for a run starting now (local date).
    pub fn now() -> Self {
        Self {
            processing_date: chrono::Local::now().date_naive(),
        }
    }

    pub fn with_date(processing_date: NaiveDate) -> Self {
        Self { processing_date }
    }
}

/// A complete schema mapping configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaMapping {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Rename rules, in declaration order. Order decides the output column
    /// order and which rule wins when two rules target the same name.
    pub columns: Vec<ColumnMapping>,

    #[serde(default)]
    pub derived: Vec<DerivedColumn>,

    /// Column normalized as a year string, if present after renaming.
    #[serde(default = "default_year_column")]
    pub year_column: Option<String>,

    #[serde(default)]
    pub source_format: SourceFormat,
}

fn default_year_column() -> Option<String> {
    Some(YEAR_COLUMN.to_string())
}

impl SchemaMapping {
    /// Mapping used with a single extract file.
    pub fn single_source() -> Self {
        Self {
            name: SINGLE_SOURCE.to_string(),
            description: "Single extract: instrument, region, status, phase and year".to_string(),
            columns: vec![
                ColumnMapping::new("TIPO_INSTRUMENTO", "INSTRUMENTO"),
                ColumnMapping::new("MACRORREGIAO", "MACRORREGIAO"),
                ColumnMapping::new("REGIAO", "REGIAO"),
                ColumnMapping::new("MUNICIPIO", "MUNICIPIO"),
                ColumnMapping::new("SITUACAO", "STATUS"),
                ColumnMapping::new("FASE", "FASE"),
                ColumnMapping::new("EXERCICIO", YEAR_COLUMN),
            ],
            derived: vec![processing_date_column()],
            year_column: default_year_column(),
            source_format: SourceFormat::default(),
        }
    }

    /// Mapping used when two extracts are unified into the full canonical schema.
    pub fn dual_source() -> Self {
        Self {
            name: DUAL_SOURCE.to_string(),
            description: "Two unified extracts: state, instrument, macro-region, region, \
                          municipality, status, phase and year"
                .to_string(),
            columns: vec![
                ColumnMapping::new("UF", "ESTADO"),
                ColumnMapping::new("TIPO_INSTRUMENTO", "INSTRUMENTO"),
                ColumnMapping::new("MACRORREGIAO", "NO_MACROREGIONAL"),
                ColumnMapping::new("REGIAO", "REGIAO"),
                ColumnMapping::new("MUNICIPIO", "MUNICIPIO"),
                ColumnMapping::new("SITUACAO", "STATUS"),
                ColumnMapping::new("FASE", "FASE"),
                ColumnMapping::new("EXERCICIO", YEAR_COLUMN),
            ],
            derived: vec![processing_date_column()],
            year_column: default_year_column(),
            source_format: SourceFormat::default(),
        }
    }

    /// Built-in configurations, in display order.
    pub fn builtins() -> Vec<SchemaMapping> {
        vec![Self::single_source(), Self::dual_source()]
    }

    /// Parse a mapping from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self, crate::error::RegistryError> {
        let schema: SchemaMapping = serde_json::from_str(json)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Source columns referenced by the rename rules, in declaration order.
    pub fn source_columns(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.source.clone()).collect()
    }

    /// Canonical names in output order: rename targets (first occurrence)
    /// followed by derived names not already listed.
    pub fn canonical_columns(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let targets = self.columns.iter().map(|c| &c.target);
        let derived = self.derived.iter().map(|d| &d.name);
        for name in targets.chain(derived) {
            if !out.contains(name) {
                out.push(name.clone());
            }
        }
        out
    }

    /// Reject mappings the transformer cannot apply deterministically.
    pub fn validate(&self) -> TransformResult<()> {
        let invalid = |message: String| TransformError::InvalidSchema {
            name: self.name.clone(),
            message,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name is empty".to_string()));
        }
        if self.columns.is_empty() {
            return Err(invalid("no column mappings declared".to_string()));
        }

        let mut sources = HashSet::new();
        for mapping in &self.columns {
            if mapping.source.is_empty() || mapping.target.is_empty() {
                return Err(invalid("column mapping with empty name".to_string()));
            }
            if !sources.insert(mapping.source.as_str()) {
                return Err(invalid(format!("source column '{}' mapped twice", mapping.source)));
            }
        }

        let mut derived = HashSet::new();
        for column in &self.derived {
            if !derived.insert(column.name.as_str()) {
                return Err(invalid(format!("derived column '{}' declared twice", column.name)));
            }
            if let DefaultValue::ProcessingDate { ref format } = column.default {
                if !is_valid_date_format(format) {
                    return Err(invalid(format!(
                        "derived column '{}' has an invalid date format '{}'",
                        column.name, format
                    )));
                }
            }
        }

        Ok(())
    }
}

fn processing_date_column() -> DerivedColumn {
    DerivedColumn {
        name: PROCESSING_DATE_COLUMN.to_string(),
        default: DefaultValue::ProcessingDate {
            format: default_date_format(),
        },
    }
}
