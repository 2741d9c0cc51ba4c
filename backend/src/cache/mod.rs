//! Schema Registry - named schema mappings
//!
//! Built-in mappings are always available; user mappings are JSON files in a
//! registry directory. Given the headers of an extract, the registry can rank
//! the mappings that fit it.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::api::logs::log_warning;
use crate::error::{RegistryError, RegistryResult};
use crate::schema::SchemaMapping;

/// Directory where user schemas are stored (relative to current dir)
pub const DEFAULT_REGISTRY_DIR: &str = ".instrumentos/schemas";

/// Minimum share of a schema's source columns an extract must contain.
const COMPATIBILITY_THRESHOLD: f64 = 0.5;

/// Registry for named schema mappings
pub struct SchemaRegistry {
    /// Directory where user schemas are stored
    registry_dir: PathBuf,
    /// Loaded schemas (name -> schema), built-ins included
    schemas: BTreeMap<String, SchemaMapping>,
    /// File each user schema was loaded from or saved to
    files: BTreeMap<String, PathBuf>,
}

impl SchemaRegistry {
    /// Create a registry over the default directory
    pub fn new() -> Self {
        Self::with_dir(DEFAULT_REGISTRY_DIR)
    }

    /// Create a registry with a custom directory
    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        let mut registry = Self {
            registry_dir: PathBuf::from(dir.as_ref()),
            schemas: BTreeMap::new(),
            files: BTreeMap::new(),
        };
        for schema in SchemaMapping::builtins() {
            registry.schemas.insert(schema.name.clone(), schema);
        }
        registry.load_all();
        registry
    }

    /// Load every `*.json` schema in the registry directory. Unreadable or
    /// invalid files are skipped with a warning; files never shadow a built-in.
    fn load_all(&mut self) {
        let entries = match fs::read_dir(&self.registry_dir) {
            Ok(e) => e,
            Err(_) => return,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.extension().is_some_and(|e| e == "json") {
                continue;
            }

            let schema = match fs::read_to_string(&path) {
                Ok(content) => SchemaMapping::from_json(&content),
                Err(e) => Err(e.into()),
            };
            match schema {
                Ok(schema) if Self::is_builtin(&schema.name) => log_warning(format!(
                    "Skipping schema file {}: '{}' is a built-in name",
                    path.display(),
                    schema.name
                )),
                Ok(schema) => {
                    self.files.insert(schema.name.clone(), path);
                    self.schemas.insert(schema.name.clone(), schema);
                }
                Err(e) => log_warning(format!("Skipping schema file {}: {}", path.display(), e)),
            }
        }
    }

    pub fn is_builtin(name: &str) -> bool {
        SchemaMapping::builtins().iter().any(|s| s.name == name)
    }

    /// All schemas, sorted by name
    pub fn list(&self) -> Vec<&SchemaMapping> {
        self.schemas.values().collect()
    }

    /// Get a schema by name
    pub fn get(&self, name: &str) -> Option<&SchemaMapping> {
        self.schemas.get(name)
    }

    /// Get a schema by name or fail
    pub fn require(&self, name: &str) -> RegistryResult<&SchemaMapping> {
        self.get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Schemas whose source columns are mostly present in `headers`,
    /// best match first (ties: more mapped columns first, then name).
    pub fn find_compatible(&self, headers: &[String]) -> Vec<(&SchemaMapping, f64)> {
        let mut compatible: Vec<_> = self
            .schemas
            .values()
            .filter_map(|schema| {
                let score = compatibility(&schema.source_columns(), headers);
                (score > COMPATIBILITY_THRESHOLD).then_some((schema, score))
            })
            .collect();

        compatible.sort_by(|a, b| rank(*a, *b));

        compatible
    }

    /// Save a schema to the registry directory
    pub fn save(&mut self, schema: SchemaMapping) -> RegistryResult<PathBuf> {
        if Self::is_builtin(&schema.name) {
            return Err(RegistryError::BuiltIn(schema.name));
        }
        schema.validate()?;

        fs::create_dir_all(&self.registry_dir)?;
        let path = self
            .files
            .get(&schema.name)
            .cloned()
            .unwrap_or_else(|| self.schema_path(&schema.name));
        fs::write(&path, schema.to_json()?)?;

        self.files.insert(schema.name.clone(), path.clone());
        self.schemas.insert(schema.name.clone(), schema);
        Ok(path)
    }

    /// Import a schema from a JSON file, optionally renaming it
    pub fn import(&mut self, path: &Path, name: Option<&str>) -> RegistryResult<String> {
        let content = fs::read_to_string(path)?;
        let mut schema = SchemaMapping::from_json(&content)?;
        if let Some(name) = name {
            schema.name = name.to_string();
        }

        let name = schema.name.clone();
        self.save(schema)?;
        Ok(name)
    }

    /// Delete a user schema
    pub fn delete(&mut self, name: &str) -> RegistryResult<()> {
        if Self::is_builtin(name) {
            return Err(RegistryError::BuiltIn(name.to_string()));
        }
        if self.schemas.remove(name).is_none() {
            return Err(RegistryError::NotFound(name.to_string()));
        }
        let path = self
            .files
            .remove(name)
            .unwrap_or_else(|| self.schema_path(name));
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    fn schema_path(&self, name: &str) -> PathBuf {
        self.registry_dir.join(format!("{}.json", slug(name)))
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Order of two scored schemas: higher score first, then more mapped
/// columns, then name.
pub(crate) fn rank(a: (&SchemaMapping, f64), b: (&SchemaMapping, f64)) -> Ordering {
    b.1.partial_cmp(&a.1)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.0.columns.len().cmp(&a.0.columns.len()))
        .then_with(|| a.0.name.cmp(&b.0.name))
}

/// Share of `expected` columns found in `headers`, case-insensitive.
fn compatibility(expected: &[String], headers: &[String]) -> f64 {
    if expected.is_empty() {
        return 0.0;
    }

    let headers_lower: Vec<String> = headers.iter().map(|c| c.to_lowercase()).collect();
    let match_count = expected
        .iter()
        .filter(|col| headers_lower.contains(&col.to_lowercase()))
        .count();

    match_count as f64 / expected.len() as f64
}

/// File-name-safe version of a schema name
fn slug(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnMapping, DUAL_SOURCE, SINGLE_SOURCE};
    use std::fs;
    use tempfile::tempdir;

    fn headers(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_compatibility_score() {
        let expected = headers(&["UF", "MUNICIPIO", "FASE"]);
        let csv = headers(&["UF", "MUNICIPIO", "SITUACAO"]);

        let score = compatibility(&expected, &csv);
        assert!((score - 0.666).abs() < 0.01);
    }

    #[test]
    fn test_case_insensitive_match() {
        let expected = headers(&["municipio", "FASE"]);
        let csv = headers(&["MUNICIPIO", "fase"]);

        assert!((compatibility(&expected, &csv) - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_builtins_always_present() {
        let dir = tempdir().unwrap();
        let registry = SchemaRegistry::with_dir(dir.path());
        assert!(registry.get(SINGLE_SOURCE).is_some());
        assert!(registry.get(DUAL_SOURCE).is_some());
    }

    #[test]
    fn test_find_compatible_prefers_full_schema() {
        let dir = tempdir().unwrap();
        let registry = SchemaRegistry::with_dir(dir.path());

        let all = headers(&[
            "UF", "TIPO_INSTRUMENTO", "MACRORREGIAO", "REGIAO", "MUNICIPIO", "SITUACAO", "FASE", "EXERCICIO",
        ]);
        let ranked = registry.find_compatible(&all);
        assert_eq!(ranked[0].0.name, DUAL_SOURCE);

        let no_uf = headers(&[
            "TIPO_INSTRUMENTO", "MACRORREGIAO", "REGIAO", "MUNICIPIO", "SITUACAO", "FASE", "EXERCICIO",
        ]);
        let ranked = registry.find_compatible(&no_uf);
        assert_eq!(ranked[0].0.name, SINGLE_SOURCE);

        assert!(registry.find_compatible(&headers(&["foo", "bar"])).is_empty());
    }

    #[test]
    fn test_save_reload_delete() {
        let dir = tempdir().unwrap();
        let mut registry = SchemaRegistry::with_dir(dir.path());

        let mut schema = SchemaMapping::single_source();
        schema.name = "Extração 2023".to_string();
        schema.columns.push(ColumnMapping::new("ANO_REF", "ANO_REFERENCIA"));
        let path = registry.save(schema).unwrap();
        assert!(path.exists());

        let reloaded = SchemaRegistry::with_dir(dir.path());
        assert!(reloaded.get("Extração 2023").is_some());

        registry.delete("Extração 2023").unwrap();
        assert!(!path.exists());
        assert!(matches!(
            registry.delete("Extração 2023"),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_removes_file_named_differently() {
        let dir = tempdir().unwrap();
        let mut schema = SchemaMapping::single_source();
        schema.name = "Bar".to_string();
        let file = dir.path().join("foo.json");
        fs::write(&file, schema.to_json().unwrap()).unwrap();

        let mut registry = SchemaRegistry::with_dir(dir.path());
        assert!(registry.get("Bar").is_some());
        registry.delete("Bar").unwrap();

        assert!(!file.exists());
        assert!(SchemaRegistry::with_dir(dir.path()).get("Bar").is_none());
    }

    #[test]
    fn test_invalid_file_skipped_with_warning() {
        use crate::api::logs::LOG_BROADCASTER;
        use tokio::sync::broadcast::error::TryRecvError;

        let dir = tempdir().unwrap();
        let file = dir.path().join("broken-schema-1f3a.json");
        fs::write(&file, "{ not json").unwrap();

        let mut rx = LOG_BROADCASTER.subscribe();
        let registry = SchemaRegistry::with_dir(dir.path());
        assert_eq!(registry.list().len(), SchemaMapping::builtins().len());

        let mut warned = false;
        loop {
            match rx.try_recv() {
                Ok(entry) => {
                    if entry.message.contains("broken-schema-1f3a.json") {
                        warned = true;
                        break;
                    }
                }
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        assert!(warned);
    }

    #[test]
    fn test_builtins_are_read_only() {
        let dir = tempdir().unwrap();
        let mut registry = SchemaRegistry::with_dir(dir.path());
        assert!(matches!(
            registry.delete(SINGLE_SOURCE),
            Err(RegistryError::BuiltIn(_))
        ));
        assert!(matches!(
            registry.save(SchemaMapping::dual_source()),
            Err(RegistryError::BuiltIn(_))
        ));
    }
}
