//! REST API types for the dashboard.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::dashboard::{distinct_values, Filter, StatusBoard};
use crate::error::{PipelineError, Stage};
use crate::models::RecordSet;
use crate::transform::pipeline::PipelineReport;

/// Response to `POST /api/pipeline/run`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    /// "done"
    pub status: String,
    pub report: PipelineReport,
}

impl From<PipelineReport> for RunResponse {
    fn from(report: PipelineReport) -> Self {
        Self {
            status: "done".to_string(),
            report,
        }
    }
}

/// Response to `GET /api/records`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordsResponse {
    pub total: usize,
    pub columns: Vec<String>,
    pub records: Vec<Value>,
}

impl From<&RecordSet> for RecordsResponse {
    fn from(table: &RecordSet) -> Self {
        Self {
            total: table.len(),
            columns: table.columns().to_vec(),
            records: table.to_json_records(),
        }
    }
}

/// Response to `GET /api/filters`: the values each filter can take
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FiltersResponse {
    pub municipios: Vec<String>,
    pub macrorregioes: Vec<String>,
    pub regioes: Vec<String>,
    pub fases: Vec<String>,
    pub anos: Vec<String>,
    pub instrumentos: Vec<String>,
}

impl From<&RecordSet> for FiltersResponse {
    fn from(table: &RecordSet) -> Self {
        let macro_column = if table.has_column("NO_MACROREGIONAL") {
            "NO_MACROREGIONAL"
        } else {
            "MACRORREGIAO"
        };
        Self {
            municipios: distinct_values(table, "MUNICIPIO"),
            macrorregioes: distinct_values(table, macro_column),
            regioes: distinct_values(table, "REGIAO"),
            fases: distinct_values(table, "FASE"),
            anos: distinct_values(table, "ANO"),
            instrumentos: distinct_values(table, "INSTRUMENTO"),
        }
    }
}

/// Response to `GET /api/status`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub filter: Filter,
    pub board: StatusBoard,
}

/// JSON body for any failure
pub fn error_response(message: &str) -> Value {
    json!({
        "status": "error",
        "error": message
    })
}

/// JSON body for a pipeline failure, naming the stage
pub fn pipeline_error_response(err: &PipelineError) -> Value {
    let stage: Stage = err.stage();
    json!({
        "status": "error",
        "stage": stage,
        "error": err.to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractionError;

    #[test]
    fn test_records_response() {
        let table = RecordSet::from_rows(&["MUNICIPIO", "ANO"], &[&["SAO LUIS", "2024"]]);
        let response = RecordsResponse::from(&table);
        assert_eq!(response.total, 1);
        assert_eq!(response.records[0]["ANO"], "2024");
    }

    #[test]
    fn test_filters_use_schema_macro_column() {
        let table = RecordSet::from_rows(&["MACRORREGIAO", "MUNICIPIO"], &[&["NORTE", "SAO LUIS"]]);
        let response = FiltersResponse::from(&table);
        assert_eq!(response.macrorregioes, vec!["NORTE".to_string()]);
        assert!(response.fases.is_empty());
    }

    #[test]
    fn test_pipeline_error_response() {
        let err: PipelineError = ExtractionError::NotFound {
            path: "raw_data/x.csv".into(),
        }
        .into();
        let body = pipeline_error_response(&err);
        assert_eq!(body["status"], "error");
        assert_eq!(body["stage"], "extracting");
    }
}
