//! Error types for the instrument ETL pipeline.
//!
//! One error type per stage, plus the top-level orchestration error:
//!
//! - [`ExtractionError`] - a source file could not be read or parsed
//! - [`TransformError`] - the transform stage received no table, or a bad schema
//! - [`WriteError`] - the canonical file could not be written
//! - [`RegistryError`] - named schema storage errors
//! - [`PipelineError`] - the first failure of a pipeline run
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across stage boundaries.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

// =============================================================================
// Extraction Errors
// =============================================================================

/// Errors while reading one source extract.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The file does not exist.
    #[error("Source file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// The file exists but could not be read.
    #[error("Failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The bytes are not valid in the configured encoding.
    #[error("Encoding error in '{}': {message}", path.display())]
    Encoding { path: PathBuf, message: String },

    /// The delimiter structure is broken.
    #[error("Malformed CSV '{}' at line {line}: {message}", path.display())]
    Malformed {
        path: PathBuf,
        line: u64,
        message: String,
    },

    /// No header line at all.
    #[error("Source file '{}' is empty (no header row)", path.display())]
    EmptyFile { path: PathBuf },
}

impl ExtractionError {
    /// Path of the source that failed.
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::NotFound { path }
            | Self::Io { path, .. }
            | Self::Encoding { path, .. }
            | Self::Malformed { path, .. }
            | Self::EmptyFile { path } => path,
        }
    }
}

// =============================================================================
// Transformation Errors
// =============================================================================

/// Errors during the transform stage.
#[derive(Debug, Error)]
pub enum TransformError {
    /// No table reached the transform stage.
    #[error("No input table to transform")]
    MissingInput,

    /// The schema mapping is not usable.
    #[error("Invalid schema mapping '{name}': {message}")]
    InvalidSchema { name: String, message: String },
}

// =============================================================================
// Write Errors
// =============================================================================

/// Errors while writing the canonical file.
#[derive(Debug, Error)]
pub enum WriteError {
    /// Filesystem error on the destination or its temporary file.
    #[error("Cannot write '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// CSV serialization failed.
    #[error("CSV serialization failed for '{}': {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// The temporary file could not be moved over the destination.
    #[error("Cannot replace '{}': {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// =============================================================================
// Registry Errors
// =============================================================================

/// Errors from the schema registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Schema not found.
    #[error("Schema not found: {0}")]
    NotFound(String),

    /// Built-in schemas are read-only.
    #[error("Schema '{0}' is built in and cannot be modified")]
    BuiltIn(String),

    /// Stored schema is not valid.
    #[error("Invalid schema: {0}")]
    Invalid(#[from] TransformError),

    /// IO error.
    #[error("Registry IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON error.
    #[error("Registry JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Stages of a pipeline run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Extracting,
    Unifying,
    Transforming,
    Loading,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Extracting => "extracting",
            Stage::Unifying => "unifying",
            Stage::Transforming => "transforming",
            Stage::Loading => "loading",
        };
        f.write_str(name)
    }
}

/// Top-level pipeline orchestration errors.
///
/// This is the error returned by [`crate::transform::pipeline::run_pipeline`].
/// It carries the first stage failure of a run; no later stage was attempted.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The run was started without any input file.
    #[error("No input files configured")]
    NoInputs,

    /// Extraction error.
    #[error("Extraction failed: {0}")]
    Extract(#[from] ExtractionError),

    /// Transformation error.
    #[error("Transform failed: {0}")]
    Transform(#[from] TransformError),

    /// Write error.
    #[error("Write failed: {0}")]
    Write(#[from] WriteError),

    /// Schema lookup error.
    #[error("Schema error: {0}")]
    Registry(#[from] RegistryError),

    /// Auto mode found no schema matching the extracted headers.
    #[error("No compatible schema for columns: {}", columns.join(", "))]
    NoCompatibleSchema { columns: Vec<String> },
}

impl PipelineError {
    /// Stage in which the run failed.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::NoInputs | PipelineError::Extract(_) => Stage::Extracting,
            PipelineError::Transform(_)
            | PipelineError::Registry(_)
            | PipelineError::NoCompatibleSchema { .. } => Stage::Transforming,
            PipelineError::Write(_) => Stage::Loading,
        }
    }
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Background task failed to complete.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for extraction.
pub type ExtractionResult<T> = Result<T, ExtractionError>;

/// Result type for the transform stage.
pub type TransformResult<T> = Result<T, TransformError>;

/// Result type for the loader.
pub type WriteResult<T> = Result<T, WriteError>;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let err = ExtractionError::NotFound {
            path: PathBuf::from("raw_data/missing.csv"),
        };
        let pipeline_err: PipelineError = err.into();
        assert!(pipeline_err.to_string().contains("missing.csv"));
        assert_eq!(pipeline_err.stage(), Stage::Extracting);

        let pipeline_err: PipelineError = TransformError::MissingInput.into();
        assert_eq!(pipeline_err.stage(), Stage::Transforming);
    }

    #[test]
    fn test_malformed_error_format() {
        let err = ExtractionError::Malformed {
            path: PathBuf::from("a.csv"),
            line: 7,
            message: "found 4 fields, expected 3".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("a.csv"));
        assert!(msg.contains("line 7"));
        assert_eq!(err.path(), std::path::Path::new("a.csv"));
    }

    #[test]
    fn test_write_error_stage() {
        let err = WriteError::Io {
            path: PathBuf::from("/readonly/out.csv"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        let pipeline_err: PipelineError = err.into();
        assert_eq!(pipeline_err.stage(), Stage::Loading);
        assert_eq!(Stage::Loading.to_string(), "loading");
    }
}
