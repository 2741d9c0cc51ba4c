//! # Instrumentos - health-planning instrument ETL
//!
//! Instrumentos normalizes the semicolon-delimited extracts that track the
//! status of municipal health-planning instruments (health plans, annual
//! programs, quadrimester reports...) into one canonical CSV, and serves
//! that file to the monitoring dashboard.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Extract(s)  │────▶│   Parser    │────▶│  Transform  │────▶│  Canonical  │
//! │ (;, UTF-8)  │     │ (per file)  │     │(unify+map)  │     │  CSV (BOM)  │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use instrumentos::{run, SchemaMapping};
//! use std::path::Path;
//!
//! let output = run(
//!     &[Path::new("raw_data/a.csv"), Path::new("raw_data/b.csv")],
//!     Path::new("script/dados_final.csv"),
//!     &SchemaMapping::dual_source(),
//! ).unwrap();
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types per pipeline stage
//! - [`models`] - The `RecordSet` table
//! - [`schema`] - Schema mapping configurations
//! - [`cache`] - Registry of named schemas
//! - [`parser`] - Extractor
//! - [`transform`] - Unifier, transformer and pipeline orchestrator
//! - [`loader`] - Canonical CSV writer
//! - [`dashboard`] - Data contract of the monitoring dashboard
//! - [`config`] - Environment settings
//! - [`api`] - HTTP API server and log broadcaster

// Core modules
pub mod error;
pub mod models;
pub mod schema;

// Configuration
pub mod cache;
pub mod config;

// Pipeline stages
pub mod loader;
pub mod parser;
pub mod transform;

// Consumers
pub mod api;
pub mod dashboard;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ExtractionError, PipelineError, RegistryError, ServerError, Stage, TransformError, WriteError,
};

// =============================================================================
// Re-exports - Models & schema
// =============================================================================

pub use models::{CanonicalRecordSet, RawRecordSet, RecordSet, UnifiedRecordSet};
pub use schema::{
    ColumnMapping, DefaultValue, DerivedColumn, RunContext, SchemaMapping, SourceEncoding,
    SourceFormat,
};
pub use cache::SchemaRegistry;
pub use config::Settings;

// =============================================================================
// Re-exports - Pipeline stages
// =============================================================================

pub use parser::{detect_delimiter, detect_encoding, extract, extract_file, parse_bytes, ParseResult};
pub use transform::{normalize_year, transform, unify};
pub use loader::{load, write_csv, LoadOutcome};
pub use transform::pipeline::{
    run, run_pipeline, PipelineOptions, PipelineReport, SchemaSelection,
};

// =============================================================================
// Re-exports - Dashboard
// =============================================================================

pub use dashboard::{distinct_values, load_or_build, Dataset, Filter, StatusBoard};

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
