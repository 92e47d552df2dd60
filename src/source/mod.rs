//! Source probing and preview extraction.
//!
//! Before any code is generated, the prober checks that the spec's declared
//! source actually resolves and pulls a small bounded preview of rows to
//! ground the code synthesis prompt. Dispatch over [`SourceKind`] is
//! exhaustive; adding a source kind will not compile until it is handled
//! here.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde_json::{Map, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::Row;
use walkdir::WalkDir;

use crate::error::SourceError;
use crate::spec::{PipelineSpec, SourceKind};

/// Default number of preview rows retained.
pub const DEFAULT_PREVIEW_ROWS: usize = 20;

/// A bounded, ordered sample of rows from the resolved source.
///
/// Used only to ground code generation; never persisted as authoritative
/// data.
#[derive(Debug, Clone, Default)]
pub struct DataPreview {
    rows: Vec<Map<String, Value>>,
}

impl DataPreview {
    /// Build a preview from rows, truncating to `cap`.
    pub fn capped(mut rows: Vec<Map<String, Value>>, cap: usize) -> Self {
        rows.truncate(cap);
        Self { rows }
    }

    /// The preview rows in first-seen order.
    pub fn rows(&self) -> &[Map<String, Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render the preview as a JSON array for prompt embedding.
    pub fn to_prompt_json(&self) -> String {
        serde_json::to_string_pretty(&self.rows).unwrap_or_else(|_| "[]".to_string())
    }
}

/// Optional exact-equality row filter on a date column.
#[derive(Debug, Clone)]
pub struct DateFilter {
    pub column: String,
    pub value: String,
}

/// Probes pipeline sources and extracts previews.
pub struct SourceProber {
    data_root: PathBuf,
    preview_rows: usize,
}

impl SourceProber {
    pub fn new(data_root: impl Into<PathBuf>, preview_rows: usize) -> Self {
        Self {
            data_root: data_root.into(),
            preview_rows,
        }
    }

    /// Probe the spec's source and return a bounded preview.
    pub async fn probe(&self, spec: &PipelineSpec) -> Result<DataPreview, SourceError> {
        self.probe_filtered(spec, None).await
    }

    /// Probe with an optional date-column equality filter on local files.
    pub async fn probe_filtered(
        &self,
        spec: &PipelineSpec,
        filter: Option<&DateFilter>,
    ) -> Result<DataPreview, SourceError> {
        match spec.source_kind {
            SourceKind::LocalCsv | SourceKind::LocalJson => {
                self.probe_local(&spec.source_path, filter)
            }
            SourceKind::RelationalDb => self.probe_database(&spec.source_path).await,
            SourceKind::Api => {
                // Not implemented; api sources pass the probe with nothing to
                // ground generation on.
                tracing::warn!("api source probing is not implemented, returning empty preview");
                Ok(DataPreview::default())
            }
        }
    }

    /// Whether any file matches the given pattern under the data root.
    pub fn check_file_exists(&self, pattern: &str) -> bool {
        !self.matching_files(pattern).is_empty()
    }

    /// Resolve a source pattern against the data root.
    ///
    /// Strips a leading `./` and a leading `data/` segment so specs written
    /// against the conventional layout resolve inside the configured root.
    fn resolve_pattern(&self, pattern: &str) -> String {
        let clean = pattern.trim_start_matches("./");
        let clean = clean.strip_prefix("data/").unwrap_or(clean);
        clean.to_string()
    }

    /// All files under the data root whose relative path matches the pattern,
    /// sorted lexicographically.
    fn matching_files(&self, pattern: &str) -> Vec<PathBuf> {
        let resolved = self.resolve_pattern(pattern);
        let Ok(matcher) = glob_to_regex(&resolved) else {
            return Vec::new();
        };

        let mut matches: Vec<PathBuf> = WalkDir::new(&self.data_root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry
                    .path()
                    .strip_prefix(&self.data_root)
                    .ok()
                    .and_then(|rel| rel.to_str())
                    .is_some_and(|rel| matcher.is_match(rel))
            })
            .map(|entry| entry.into_path())
            .collect();
        matches.sort();
        matches
    }

    fn probe_local(
        &self,
        pattern: &str,
        filter: Option<&DateFilter>,
    ) -> Result<DataPreview, SourceError> {
        let files = self.matching_files(pattern);
        if files.is_empty() {
            return Err(SourceError::NoMatchingFiles(pattern.to_string()));
        }
        tracing::debug!(pattern, files = files.len(), "resolved source files");

        let mut rows = Vec::new();
        for file in &files {
            let mut file_rows = load_rows(file)?;
            if let Some(f) = filter {
                file_rows.retain(|row| {
                    row.get(&f.column)
                        .is_some_and(|v| value_equals(v, &f.value))
                });
            }
            rows.extend(file_rows);
        }

        Ok(DataPreview::capped(rows, self.preview_rows))
    }

    /// Read a bounded preview from a relational source.
    ///
    /// The locator is a Postgres URL with the table named in the fragment:
    /// `postgres://host/db#table`.
    async fn probe_database(&self, locator: &str) -> Result<DataPreview, SourceError> {
        let (url, table) = split_db_locator(locator)?;

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .map_err(|e| SourceError::Database(e.to_string()))?;

        // Table ident is validated by split_db_locator; row_to_json keeps the
        // column types out of the picture.
        let sql = format!(
            "SELECT row_to_json(t) AS row FROM (SELECT * FROM {} LIMIT {}) t",
            table, self.preview_rows
        );

        let db_rows = sqlx::query(&sql)
            .fetch_all(&pool)
            .await
            .map_err(|e| SourceError::Database(e.to_string()))?;
        pool.close().await;

        let mut rows = Vec::new();
        for db_row in db_rows {
            let value: Value = db_row
                .try_get("row")
                .map_err(|e| SourceError::Database(e.to_string()))?;
            if let Value::Object(map) = value {
                rows.push(map);
            }
        }

        Ok(DataPreview::capped(rows, self.preview_rows))
    }
}

/// Split a `postgres://…#table` locator into connection URL and table name.
fn split_db_locator(locator: &str) -> Result<(&str, &str), SourceError> {
    let (url, table) = locator.split_once('#').ok_or_else(|| {
        SourceError::InvalidLocator {
            locator: locator.to_string(),
            reason: "missing '#table' fragment".to_string(),
        }
    })?;

    let valid_ident = !table.is_empty()
        && table
            .chars()
            .enumerate()
            .all(|(i, c)| c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()));
    if !valid_ident {
        return Err(SourceError::InvalidLocator {
            locator: locator.to_string(),
            reason: format!("'{}' is not a valid table identifier", table),
        });
    }

    Ok((url, table))
}

/// Convert a file pattern with `*`/`?` wildcards into an anchored regex.
///
/// `*` matches within one path segment only.
fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut out = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            _ => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');
    Regex::new(&out)
}

/// Load rows from a CSV or JSON file; other extensions yield no rows.
fn load_rows(path: &Path) -> Result<Vec<Map<String, Value>>, SourceError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("csv") => load_csv_rows(path),
        Some("json") => load_json_rows(path),
        _ => Ok(Vec::new()),
    }
}

fn load_csv_rows(path: &Path) -> Result<Vec<Map<String, Value>>, SourceError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| SourceError::ReadFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let headers = reader
        .headers()
        .map_err(|e| SourceError::ReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?
        .clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| SourceError::ReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let mut row = Map::new();
        for (header, field) in headers.iter().zip(record.iter()) {
            row.insert(header.to_string(), Value::String(field.to_string()));
        }
        rows.push(row);
    }
    Ok(rows)
}

fn load_json_rows(path: &Path) -> Result<Vec<Map<String, Value>>, SourceError> {
    let content = std::fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&content).map_err(|e| SourceError::ReadFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    match value {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect()),
        Value::Object(map) => Ok(vec![map]),
        _ => Err(SourceError::ReadFailed {
            path: path.display().to_string(),
            reason: "expected a JSON object or array of objects".to_string(),
        }),
    }
}

/// Exact-equality comparison between a JSON value and a filter string.
fn value_equals(value: &Value, expected: &str) -> bool {
    match value {
        Value::String(s) => s == expected,
        other => other.to_string() == expected,
    }
}
