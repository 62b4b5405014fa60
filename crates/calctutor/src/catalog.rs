//! Exercise catalog loading.
//!
//! The catalog is a JSON array of records. Field names differ between
//! deployments (`function`/`derivative`/`conclusion` in one data set,
//! `funcion`/`derivada` in another), so records are read through a
//! [`FieldMapping`] instead of a fixed schema.
//!
//! [`CatalogStore`] memoizes loads by path: a file is read at most once per
//! store, and a failed load stays failed.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

// ── Records ────────────────────────────────────────────────────────

/// One teachable exercise.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ExerciseRecord {
    /// Externally assigned identifier. Numeric ids are kept in their
    /// decimal text form.
    pub id: String,
    /// The function to differentiate, as written in the data file.
    pub function: String,
    /// The derivative or derived quantity the lesson should reach.
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<String>,
}

/// Names of the JSON keys that hold each record field.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub id: String,
    pub function: String,
    pub target: String,
    /// Key of the optional conclusion text. `None` ignores conclusions.
    #[serde(default)]
    pub conclusion: Option<String>,
}

impl FieldMapping {
    /// `id` / `function` / `derivative` / `conclusion`.
    pub fn english() -> Self {
        Self {
            id: "id".into(),
            function: "function".into(),
            target: "derivative".into(),
            conclusion: Some("conclusion".into()),
        }
    }

    /// `id` / `funcion` / `derivada`, no conclusion.
    pub fn spanish() -> Self {
        Self {
            id: "id".into(),
            function: "funcion".into(),
            target: "derivada".into(),
            conclusion: None,
        }
    }
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self::spanish()
    }
}

/// The loaded, immutable exercise catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    records: Vec<ExerciseRecord>,
}

impl Catalog {
    /// Build a catalog from records, rejecting duplicate ids.
    pub fn new(records: Vec<ExerciseRecord>) -> Result<Self, LoadFailure> {
        let mut seen = HashSet::new();
        for record in &records {
            if !seen.insert(record.id.as_str()) {
                return Err(LoadFailure::DuplicateId {
                    id: record.id.clone(),
                });
            }
        }
        Ok(Self { records })
    }

    pub fn records(&self) -> &[ExerciseRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ExerciseRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ExerciseRecord> {
        self.records.iter().find(|r| r.id == id)
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a ExerciseRecord;
    type IntoIter = std::slice::Iter<'a, ExerciseRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

// ── Failures ───────────────────────────────────────────────────────

/// Why a catalog could not be loaded.
///
/// An empty array is not a failure; it loads as an empty catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadFailure {
    NotFound { path: PathBuf },
    Unreadable { path: PathBuf, detail: String },
    InvalidJson { detail: String },
    NotAnArray,
    MalformedRecord { index: usize, detail: String },
    DuplicateId { id: String },
}

impl fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadFailure::NotFound { path } => {
                write!(f, "exercise file '{}' not found", path.display())
            }
            LoadFailure::Unreadable { path, detail } => {
                write!(f, "failed to read exercise file '{}': {detail}", path.display())
            }
            LoadFailure::InvalidJson { detail } => {
                write!(f, "exercise file is not valid JSON: {detail}")
            }
            LoadFailure::NotAnArray => write!(f, "exercise file must contain a JSON array"),
            LoadFailure::MalformedRecord { index, detail } => {
                write!(f, "exercise record #{index} is malformed: {detail}")
            }
            LoadFailure::DuplicateId { id } => write!(f, "duplicate exercise id '{id}'"),
        }
    }
}

impl std::error::Error for LoadFailure {}

// ── Loading ────────────────────────────────────────────────────────

/// Read and validate a catalog file.
pub fn load(path: impl AsRef<Path>, mapping: &FieldMapping) -> Result<Catalog, LoadFailure> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            LoadFailure::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            LoadFailure::Unreadable {
                path: path.to_path_buf(),
                detail: e.to_string(),
            }
        }
    })?;
    parse(&text, mapping)
}

/// Parse catalog JSON text through `mapping`.
pub fn parse(text: &str, mapping: &FieldMapping) -> Result<Catalog, LoadFailure> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| LoadFailure::InvalidJson {
            detail: e.to_string(),
        })?;
    let serde_json::Value::Array(entries) = value else {
        return Err(LoadFailure::NotAnArray);
    };

    let records = entries
        .iter()
        .enumerate()
        .map(|(index, entry)| read_record(index, entry, mapping))
        .collect::<Result<Vec<_>, _>>()?;

    Catalog::new(records)
}

fn read_record(
    index: usize,
    entry: &serde_json::Value,
    mapping: &FieldMapping,
) -> Result<ExerciseRecord, LoadFailure> {
    let malformed = |detail: String| LoadFailure::MalformedRecord { index, detail };

    let obj = entry
        .as_object()
        .ok_or_else(|| malformed("expected a JSON object".into()))?;

    let required = |key: &str| -> Result<String, LoadFailure> {
        match obj.get(key) {
            Some(v) => scalar_text(v).ok_or_else(|| malformed(format!("field '{key}' must be text"))),
            None => Err(malformed(format!("missing field '{key}'"))),
        }
    };

    let id = required(&mapping.id)?;
    let function = required(&mapping.function)?;
    let target = required(&mapping.target)?;

    let conclusion = match mapping.conclusion.as_deref().and_then(|key| obj.get(key)) {
        None | Some(serde_json::Value::Null) => None,
        Some(v) => Some(scalar_text(v).ok_or_else(|| malformed("conclusion must be text".into()))?),
    };

    Ok(ExerciseRecord {
        id,
        function,
        target,
        conclusion,
    })
}

/// Text form of a string or number value.
fn scalar_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ── Memoized store ─────────────────────────────────────────────────

/// Path-keyed memo of catalog loads.
///
/// The first call for a path reads the file; later calls return the cached
/// outcome, including a cached failure. The mapping used on the first call
/// wins for that path.
#[derive(Default)]
pub struct CatalogStore {
    entries: Mutex<HashMap<PathBuf, Result<Arc<Catalog>, LoadFailure>>>,
    reads: AtomicUsize,
}

impl CatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `path` once; subsequent calls are served from memory.
    pub fn load(
        &self,
        path: impl AsRef<Path>,
        mapping: &FieldMapping,
    ) -> Result<Arc<Catalog>, LoadFailure> {
        let path = path.as_ref().to_path_buf();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(cached) = entries.get(&path) {
            debug!("Catalog cache hit: {}", path.display());
            return cached.clone();
        }

        self.reads.fetch_add(1, Ordering::Relaxed);
        let outcome = load(&path, mapping).map(Arc::new);
        match &outcome {
            Ok(catalog) => info!(
                "Loaded {} exercise(s) from {}",
                catalog.len(),
                path.display()
            ),
            Err(e) => error!("Exercise catalog unavailable: {e}"),
        }
        entries.insert(path, outcome.clone());
        outcome
    }

    /// Number of file reads performed so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parses_spanish_schema() {
        let json = r#"[
            {"id": 1, "funcion": "x^2", "derivada": "2x"},
            {"id": 2, "funcion": "sin(x)", "derivada": "cos(x)"}
        ]"#;
        let catalog = parse(json, &FieldMapping::spanish()).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.records()[0].id, "1");
        assert_eq!(catalog.records()[1].function, "sin(x)");
        assert_eq!(catalog.records()[1].target, "cos(x)");
        assert!(catalog.records()[0].conclusion.is_none());
    }

    #[test]
    fn parses_english_schema_with_conclusion() {
        let json = r#"[
            {"id": "a", "function": "x^3 - 3x", "derivative": "3x^2 - 3", "conclusion": "critical points at x = ±1"},
            {"id": "b", "function": "e^x", "derivative": "e^x"}
        ]"#;
        let catalog = parse(json, &FieldMapping::english()).unwrap();
        assert_eq!(
            catalog.get("a").unwrap().conclusion.as_deref(),
            Some("critical points at x = ±1")
        );
        assert!(catalog.get("b").unwrap().conclusion.is_none());
    }

    #[test]
    fn keeps_file_order() {
        let json = r#"[
            {"id": 3, "funcion": "c", "derivada": "0"},
            {"id": 1, "funcion": "a", "derivada": "0"},
            {"id": 2, "funcion": "b", "derivada": "0"}
        ]"#;
        let catalog = parse(json, &FieldMapping::spanish()).unwrap();
        let ids: Vec<&str> = catalog.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["3", "1", "2"]);
    }

    #[test]
    fn empty_array_is_valid() {
        let catalog = parse("[]", &FieldMapping::spanish()).unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn wrong_schema_is_malformed() {
        let json = r#"[{"id": 1, "function": "x", "derivative": "1"}]"#;
        let err = parse(json, &FieldMapping::spanish()).unwrap_err();
        assert!(matches!(err, LoadFailure::MalformedRecord { index: 0, .. }));
        assert!(err.to_string().contains("funcion"));
    }

    #[test]
    fn non_array_is_rejected() {
        let err = parse(r#"{"id": 1}"#, &FieldMapping::spanish()).unwrap_err();
        assert_eq!(err, LoadFailure::NotAnArray);
    }

    #[test]
    fn invalid_json_is_rejected() {
        let err = parse("[{", &FieldMapping::spanish()).unwrap_err();
        assert!(matches!(err, LoadFailure::InvalidJson { .. }));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let json = r#"[
            {"id": 1, "funcion": "x", "derivada": "1"},
            {"id": 1, "funcion": "x^2", "derivada": "2x"}
        ]"#;
        let err = parse(json, &FieldMapping::spanish()).unwrap_err();
        assert_eq!(err, LoadFailure::DuplicateId { id: "1".into() });
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(dir.path().join("nope.json"), &FieldMapping::spanish()).unwrap_err();
        assert!(matches!(err, LoadFailure::NotFound { .. }));
    }

    #[test]
    fn store_reads_each_path_once() {
        let file = write_temp(r#"[{"id": 1, "funcion": "x^2", "derivada": "2x"}]"#);
        let store = CatalogStore::new();

        let first = store.load(file.path(), &FieldMapping::spanish()).unwrap();
        std::fs::write(file.path(), "[]").unwrap();
        let second = store.load(file.path(), &FieldMapping::spanish()).unwrap();

        assert_eq!(store.reads(), 1);
        assert_eq!(second.len(), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn store_memoizes_failures() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("later.json");
        let store = CatalogStore::new();

        assert!(store.load(&path, &FieldMapping::spanish()).is_err());
        std::fs::write(&path, "[]").unwrap();
        assert!(store.load(&path, &FieldMapping::spanish()).is_err());
        assert_eq!(store.reads(), 1);
    }
}
