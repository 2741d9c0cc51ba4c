//! Pipeline orchestrator: Extract → (Unify) → Transform → Load.
//!
//! This is the only entry point external collaborators call. A run is
//! synchronous and either completes or stops at the first failing stage;
//! nothing is written unless every earlier stage succeeded.
//!
//! # Example
//!
//! ```rust,ignore
//! use instrumentos::{run, SchemaMapping};
//! use std::path::Path;
//!
//! let output = run(
//!     &[Path::new("raw_data/extracao_2025-10-31.csv")],
//!     Path::new("script/dados_final.csv"),
//!     &SchemaMapping::single_source(),
//! )?;
//! println!("Canonical file at {}", output.display());
//! ```
//!
//! Concurrent runs against the same output are not coordinated here; callers
//! that may trigger runs in parallel must serialize them.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use super::normalize::transform;
use super::unify::unify;
use crate::api::logs::{log_error, log_info, log_success, log_warning};
use crate::cache::{rank, SchemaRegistry, DEFAULT_REGISTRY_DIR};
use crate::error::{PipelineError, PipelineResult, Stage};
use crate::loader::{load, LoadOutcome};
use crate::models::RecordSet;
use crate::parser::{extract, ParseResult};
use crate::schema::{RunContext, SchemaMapping, SourceFormat};

/// Which schema mapping a run uses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaSelection {
    /// An explicit mapping value
    Mapping(Box<SchemaMapping>),
    /// A schema registered under this name
    Named(String),
    /// The best registered schema for the extracted headers
    Auto,
}

impl SchemaSelection {
    /// `"auto"` selects automatically, anything else is a schema name.
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("auto") {
            SchemaSelection::Auto
        } else {
            SchemaSelection::Named(value.to_string())
        }
    }
}

/// Options for a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Source extracts, unified in this order
    pub inputs: Vec<PathBuf>,

    /// Canonical CSV destination
    pub output: PathBuf,

    /// Schema to apply
    pub schema: SchemaSelection,

    /// Directory of user schemas for `Named` / `Auto`
    pub schema_dir: PathBuf,

    /// Override the processing date (defaults to today)
    pub processing_date: Option<NaiveDate>,
}

impl PipelineOptions {
    pub fn new(inputs: Vec<PathBuf>, output: PathBuf) -> Self {
        Self {
            inputs,
            output,
            schema: SchemaSelection::Auto,
            schema_dir: PathBuf::from(DEFAULT_REGISTRY_DIR),
            processing_date: None,
        }
    }

    pub fn with_schema(mut self, schema: SchemaMapping) -> Self {
        self.schema = SchemaSelection::Mapping(Box::new(schema));
        self
    }
}

/// Summary of a successful run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub output: PathBuf,
    pub schema: String,
    /// Data rows per input, in input order
    pub input_rows: Vec<usize>,
    pub output_rows: usize,
    pub columns: Vec<String>,
    pub processing_date: NaiveDate,
}

/// Run the pipeline with an explicit schema and return the output path.
pub fn run<P: AsRef<Path>>(inputs: &[P], output: &Path, schema: &SchemaMapping) -> PipelineResult<PathBuf> {
    let options = PipelineOptions::new(
        inputs.iter().map(|p| p.as_ref().to_path_buf()).collect(),
        output.to_path_buf(),
    )
    .with_schema(schema.clone());

    run_pipeline(&options).map(|report| report.output)
}

/// Run the pipeline and report what it did.
pub fn run_pipeline(options: &PipelineOptions) -> PipelineResult<PipelineReport> {
    let run_id = Uuid::new_v4();
    let ctx = options
        .processing_date
        .map(RunContext::with_date)
        .unwrap_or_else(RunContext::now);

    log_info(format!("🚀 Starting ETL pipeline (run {})", run_id));

    let result = execute(options, &ctx, run_id);
    match &result {
        Ok(report) => log_success(format!(
            "ETL pipeline finished: {} rows written to {}",
            report.output_rows,
            report.output.display()
        )),
        Err(e) => log_error(format!("ETL pipeline failed while {}: {}", e.stage(), e)),
    }
    result
}

fn execute(options: &PipelineOptions, ctx: &RunContext, run_id: Uuid) -> PipelineResult<PipelineReport> {
    if options.inputs.is_empty() {
        return Err(PipelineError::NoInputs);
    }

    // A named schema is resolved before reading so its source format applies.
    let registry = SchemaRegistry::with_dir(&options.schema_dir);
    let preset = match &options.schema {
        SchemaSelection::Mapping(schema) => Some(schema.as_ref().clone()),
        SchemaSelection::Named(name) => Some(registry.require(name)?.clone()),
        SchemaSelection::Auto => None,
    };

    enter(Stage::Extracting);
    let (schema, parsed) = match preset {
        Some(schema) => {
            let parsed = extract_all(&options.inputs, &schema.source_format)?;
            (schema, parsed)
        }
        None => auto_select(&registry, &options.inputs)?,
    };
    let input_rows: Vec<usize> = parsed.iter().map(|p| p.table.len()).collect();

    let tables: Vec<RecordSet> = parsed.into_iter().map(|p| p.table).collect();
    let unified = if tables.len() > 1 {
        enter(Stage::Unifying);
        let unified = unify(tables);
        log_success(format!("Unified {} rows", unified.len()));
        unified
    } else {
        unify(tables)
    };

    enter(Stage::Transforming);
    log_info(format!("Using schema '{}'", schema.name));
    let canonical = transform(Some(unified), &schema, ctx)?;
    log_success(format!("Columns: {}", canonical.columns().join(", ")));

    enter(Stage::Loading);
    let output_rows = match load(Some(&canonical), &options.output)? {
        LoadOutcome::Written { rows } => rows,
        LoadOutcome::Skipped => 0,
    };

    Ok(PipelineReport {
        run_id,
        output: options.output.clone(),
        schema: schema.name,
        input_rows,
        output_rows,
        columns: canonical.columns().to_vec(),
        processing_date: ctx.processing_date,
    })
}

fn enter(stage: Stage) {
    log_info(format!("⚙️  Stage: {}", stage));
}

/// Read every input, logging each failure, and return the first one.
fn extract_all(inputs: &[PathBuf], format: &SourceFormat) -> PipelineResult<Vec<ParseResult>> {
    let mut parsed = Vec::with_capacity(inputs.len());
    let mut first_error = None;

    for result in extract(inputs, format) {
        match result {
            Ok(p) => parsed.push(p),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e.into()),
        None => Ok(parsed),
    }
}

/// Read the inputs once per registered source format and keep the schema
/// that best fits the headers read with its own format.
///
/// Fails with the first extraction error only when no format could read every
/// input; otherwise with `NoCompatibleSchema` over the default-format headers.
fn auto_select(
    registry: &SchemaRegistry,
    inputs: &[PathBuf],
) -> PipelineResult<(SchemaMapping, Vec<ParseResult>)> {
    let mut formats = vec![SourceFormat::default()];
    for schema in registry.list() {
        if !formats.contains(&schema.source_format) {
            formats.push(schema.source_format.clone());
        }
    }

    let mut best: Option<(SchemaMapping, f64, Vec<ParseResult>)> = None;
    let mut candidates = 0;
    let mut first_columns = None;
    let mut first_error = None;

    for format in &formats {
        let parsed = match extract_all(inputs, format) {
            Ok(parsed) => parsed,
            Err(e) => {
                first_error.get_or_insert(e);
                continue;
            }
        };

        let columns = header_union(&parsed);
        let compatible: Vec<(&SchemaMapping, f64)> = registry
            .find_compatible(&columns)
            .into_iter()
            .filter(|(schema, _)| &schema.source_format == format)
            .collect();
        candidates += compatible.len();
        first_columns.get_or_insert(columns);

        if let Some(&(schema, score)) = compatible.first() {
            let better = best
                .as_ref()
                .map_or(true, |(b, b_score, _)| rank((schema, score), (b, *b_score)).is_lt());
            if better {
                best = Some((schema.clone(), score, parsed));
            }
        }
    }

    match (best, first_columns, first_error) {
        (Some((schema, score, parsed)), _, _) => {
            if candidates > 1 {
                log_warning(format!(
                    "{} schemas fit these inputs, picked '{}' ({:.0}% match)",
                    candidates,
                    schema.name,
                    score * 100.0
                ));
            }
            Ok((schema, parsed))
        }
        (None, Some(columns), _) => Err(PipelineError::NoCompatibleSchema { columns }),
        (None, None, Some(e)) => Err(e),
        (None, None, None) => Err(PipelineError::NoInputs),
    }
}

/// Column names across every parsed input, first appearance order.
fn header_union(parsed: &[ParseResult]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for column in parsed.iter().flat_map(|p| p.table.columns()) {
        if !columns.contains(column) {
            columns.push(column.clone());
        }
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractionError;
    use crate::schema::ColumnMapping;
    use std::fs;
    use tempfile::tempdir;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, 31).unwrap()
    }

    #[test]
    fn test_no_inputs() {
        let dir = tempdir().unwrap();
        let options = PipelineOptions::new(vec![], dir.path().join("out.csv"));
        let err = run_pipeline(&options).unwrap_err();
        assert!(matches!(err, PipelineError::NoInputs));
    }

    #[test]
    fn test_missing_input_aborts_before_write() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("a.csv");
        fs::write(&good, "MUNICIPIO;SITUACAO\nSAO LUIS;Aprovado\n").unwrap();
        let output = dir.path().join("out.csv");

        let options = PipelineOptions::new(vec![good, dir.path().join("missing.csv")], output.clone())
            .with_schema(SchemaMapping::dual_source());
        let err = run_pipeline(&options).unwrap_err();

        assert!(matches!(err, PipelineError::Extract(ExtractionError::NotFound { .. })));
        assert_eq!(err.stage(), Stage::Extracting);
        assert!(!output.exists());
    }

    #[test]
    fn test_auto_schema_selection() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("extracao.csv");
        fs::write(
            &input,
            "UF;TIPO_INSTRUMENTO;MACRORREGIAO;REGIAO;MUNICIPIO;SITUACAO;FASE;EXERCICIO\n\
             MA;RAG;NORTE;SAO LUIS;SAO LUIS;Aprovado;;2024.0\n",
        )
        .unwrap();

        let mut options = PipelineOptions::new(vec![input], dir.path().join("out.csv"));
        options.schema_dir = dir.path().join("schemas");
        options.processing_date = Some(date());

        let report = run_pipeline(&options).unwrap();
        assert_eq!(report.schema, crate::schema::DUAL_SOURCE);
        assert_eq!(report.output_rows, 1);
        assert_eq!(report.columns[0], "ESTADO");
    }

    #[test]
    fn test_auto_schema_none_compatible() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("other.csv");
        fs::write(&input, "foo;bar\n1;2\n").unwrap();

        let mut options = PipelineOptions::new(vec![input], dir.path().join("out.csv"));
        options.schema_dir = dir.path().join("schemas");
        let err = run_pipeline(&options).unwrap_err();
        assert!(matches!(err, PipelineError::NoCompatibleSchema { .. }));
    }

    #[test]
    fn test_auto_selection_reads_with_schema_format() {
        let dir = tempdir().unwrap();
        let schema_dir = dir.path().join("schemas");

        let mut comma = SchemaMapping::single_source();
        comma.name = "comma".to_string();
        comma.columns = vec![
            ColumnMapping::new("CIDADE", "MUNICIPIO"),
            ColumnMapping::new("ESTADO_SITUACAO", "STATUS"),
        ];
        comma.source_format.delimiter = ',';
        SchemaRegistry::with_dir(&schema_dir).save(comma).unwrap();

        let input = dir.path().join("extracao.csv");
        fs::write(&input, "CIDADE,ESTADO_SITUACAO\nSAO LUIS,Aprovado\n").unwrap();
        let output = dir.path().join("out.csv");

        let mut options = PipelineOptions::new(vec![input], output);
        options.schema_dir = schema_dir;
        options.processing_date = Some(date());

        let report = run_pipeline(&options).unwrap();
        assert_eq!(report.schema, "comma");
        assert_eq!(report.output_rows, 1);
        assert_eq!(report.columns, vec!["MUNICIPIO", "STATUS", "DATA_PROCESSAMENTO"]);
    }

    #[test]
    fn test_unknown_named_schema() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("a.csv");
        fs::write(&input, "MUNICIPIO\nSAO LUIS\n").unwrap();

        let mut options = PipelineOptions::new(vec![input], dir.path().join("out.csv"));
        options.schema = SchemaSelection::parse("nope");
        options.schema_dir = dir.path().join("schemas");
        let err = run_pipeline(&options).unwrap_err();
        assert!(matches!(err, PipelineError::Registry(_)));
    }

    #[test]
    fn test_selection_parse() {
        assert_eq!(SchemaSelection::parse("AUTO"), SchemaSelection::Auto);
        assert_eq!(
            SchemaSelection::parse("dual-source"),
            SchemaSelection::Named("dual-source".into())
        );
    }
}
