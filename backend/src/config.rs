//! Runtime settings.
//!
//! Values come from the environment (a `.env` file is loaded by the binary)
//! and fall back to the deployment defaults. CLI flags
//! override individual fields.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_REGISTRY_DIR;
use crate::transform::pipeline::{PipelineOptions, SchemaSelection};

/// Default raw extract.
pub const DEFAULT_INPUT: &str = "raw_data/extracao_2025-10-31.csv";

/// Default canonical output.
pub const DEFAULT_OUTPUT: &str = "script/dados_final.csv";

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 3000;

/// Application settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Source extracts (`INSTRUMENTOS_INPUTS`, comma-separated)
    pub inputs: Vec<PathBuf>,
    /// Canonical CSV (`INSTRUMENTOS_OUTPUT`)
    pub output: PathBuf,
    /// Schema name or `auto` (`INSTRUMENTOS_SCHEMA`)
    pub schema: String,
    /// User schema directory (`INSTRUMENTOS_SCHEMA_DIR`)
    pub schema_dir: PathBuf,
    /// HTTP port (`INSTRUMENTOS_PORT`)
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            inputs: vec![PathBuf::from(DEFAULT_INPUT)],
            output: PathBuf::from(DEFAULT_OUTPUT),
            schema: "auto".to_string(),
            schema_dir: PathBuf::from(DEFAULT_REGISTRY_DIR),
            port: DEFAULT_PORT,
        }
    }
}

impl Settings {
    /// Settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Settings from any key lookup. Unset or blank keys keep their default;
    /// an unparsable port keeps the default port.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut settings = Self::default();

        if let Some(inputs) = get("INSTRUMENTOS_INPUTS") {
            settings.inputs = inputs
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .collect();
        }
        if let Some(output) = get("INSTRUMENTOS_OUTPUT") {
            settings.output = PathBuf::from(output.trim());
        }
        if let Some(schema) = get("INSTRUMENTOS_SCHEMA") {
            settings.schema = schema.trim().to_string();
        }
        if let Some(dir) = get("INSTRUMENTOS_SCHEMA_DIR") {
            settings.schema_dir = PathBuf::from(dir.trim());
        }
        if let Some(port) = get("INSTRUMENTOS_PORT").and_then(|p| p.trim().parse().ok()) {
            settings.port = port;
        }

        settings
    }

    /// Pipeline options described by these settings.
    pub fn pipeline_options(&self) -> PipelineOptions {
        let mut options = PipelineOptions::new(self.inputs.clone(), self.output.clone());
        options.schema = SchemaSelection::parse(&self.schema);
        options.schema_dir = self.schema_dir.clone();
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(|_| None);
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.pipeline_options().schema, SchemaSelection::Auto);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("INSTRUMENTOS_INPUTS", "raw/a.csv, raw/b.csv"),
            ("INSTRUMENTOS_OUTPUT", "out/final.csv"),
            ("INSTRUMENTOS_SCHEMA", "dual-source"),
            ("INSTRUMENTOS_PORT", "8080"),
        ]
        .into_iter()
        .collect();

        let settings = Settings::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(settings.inputs, vec![PathBuf::from("raw/a.csv"), PathBuf::from("raw/b.csv")]);
        assert_eq!(settings.output, PathBuf::from("out/final.csv"));
        assert_eq!(settings.port, 8080);
        assert_eq!(
            settings.pipeline_options().schema,
            SchemaSelection::Named("dual-source".into())
        );
    }

    #[test]
    fn test_bad_port_keeps_default() {
        let settings = Settings::from_lookup(|k| (k == "INSTRUMENTOS_PORT").then(|| "abc".to_string()));
        assert_eq!(settings.port, DEFAULT_PORT);
    }
}
