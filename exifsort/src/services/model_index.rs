//! Model aggregation
//!
//! Builds a reverse index from the generator model named in each file's
//! cached secondary metadata to the files that name it, and writes it out as
//! a plain-text report. The index is derived data and is never persisted.

use crate::db::MetadataStore;
use crate::error::{ParseError, RunError, RunResult};
use crate::services::file_scanner::FileScanner;
use chrono::{DateTime, TimeZone};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const RESOURCES_MARKER: &str = "Civitai resources:";

/// Model name found in a secondary metadata section
///
/// Looks for a `Model:`/`model:` label on a comma-separated segment first.
/// Only when there is no such segment does it fall back to the first
/// `modelName` in the embedded resources JSON. A labelled but empty value
/// yields `None` without consulting the JSON.
pub fn extract_model_name(secondary: &str) -> Option<String> {
    let labelled = secondary
        .split(',')
        .find(|segment| segment.contains("Model:") || segment.contains("model:"))
        .and_then(|segment| segment.split_once(':'))
        .map(|(_, value)| value.trim().to_string());

    match labelled {
        Some(model) if model.is_empty() => None,
        Some(model) => Some(model),
        None => match parse_civitai_resources(secondary) {
            Ok(model) => model,
            Err(e) => {
                tracing::debug!("Failed to decode JSON in metadata: {}", e);
                None
            }
        },
    }
}

/// First non-empty `modelName` in the JSON array following the resources
/// marker
///
/// The array is cut at its first `]`, so nested arrays are not supported.
pub fn parse_civitai_resources(secondary: &str) -> Result<Option<String>, ParseError> {
    let Some(start) = secondary.find(RESOURCES_MARKER) else {
        return Ok(None);
    };

    let rest = secondary[start + RESOURCES_MARKER.len()..].trim();
    let head = rest.split_once(']').map_or(rest, |(head, _)| head);
    let json = format!("{}]", head);

    let value: Value = serde_json::from_str(&json)?;
    let Value::Array(items) = value else {
        return Err(ParseError::NotAnArray);
    };

    Ok(items.iter().find_map(|item| {
        item.get("modelName")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    }))
}

/// Model name → files naming it, ordered by model name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelIndex {
    models: BTreeMap<String, Vec<PathBuf>>,
}

impl ModelIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group `path` under `model` (exact match, no case folding)
    pub fn insert(&mut self, model: String, path: PathBuf) {
        self.models.entry(model).or_default().push(path);
    }

    /// Number of distinct models
    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn total_files(&self) -> usize {
        self.models.values().map(Vec::len).sum()
    }

    pub fn files_for(&self, model: &str) -> Option<&[PathBuf]> {
        self.models.get(model).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<PathBuf>)> {
        self.models.iter()
    }

    /// Write the plain-text report
    pub fn write_report<W: Write>(&self, out: &mut W) -> io::Result<()> {
        if self.is_empty() {
            writeln!(
                out,
                "No Image files with model information found in the specified directory."
            )?;
            return Ok(());
        }

        writeln!(out, "Model information for Image files:")?;
        for (model, files) in &self.models {
            writeln!(out, "\nModel: {}", model)?;
            writeln!(out, "Files: {}", files.len())?;
            for file in files {
                writeln!(out, " - {}", file.display())?;
            }
        }
        Ok(())
    }

    /// Write the report to `path`, replacing any existing file
    pub fn save_report(&self, path: &Path) -> io::Result<()> {
        let mut file = io::BufWriter::new(std::fs::File::create(path)?);
        self.write_report(&mut file)?;
        file.flush()?;

        tracing::info!(
            path = %path.display(),
            models = self.len(),
            files = self.total_files(),
            "Model report saved"
        );
        Ok(())
    }
}

/// Index every eligible file under `root_dir` by the model in its cached
/// secondary metadata
///
/// Lookups run `workers` at a time. Files without a cached row, or whose
/// metadata names no model, are left out; a failed lookup is logged and the
/// file is left out too.
pub async fn build_model_index(
    store: &MetadataStore,
    scanner: &FileScanner,
    root_dir: &Path,
    workers: usize,
) -> RunResult<ModelIndex> {
    let files = scanner
        .scan(root_dir)
        .map_err(|e| RunError::InvalidArgument(e.to_string()))?;
    let total_files = files.len();

    tracing::info!(root = %root_dir.display(), files = total_files, "Scanning files for models");

    let lookups: Vec<(PathBuf, Option<String>)> = stream::iter(files)
        .map(|path| async move {
            let model = match store.get_secondary(&path.to_string_lossy()).await {
                Ok(Some(secondary)) => extract_model_name(&secondary),
                Ok(None) => {
                    tracing::debug!(path = %path.display(), "No metadata found for file");
                    None
                }
                Err(e) => {
                    tracing::error!(
                        path = %path.display(),
                        error = %e,
                        "Database error getting model for file"
                    );
                    None
                }
            };
            (path, model)
        })
        .buffered(workers.max(1))
        .collect()
        .await;

    let mut index = ModelIndex::new();
    for (path, model) in lookups {
        if let Some(model) = model {
            index.insert(model, path);
        }
    }

    tracing::info!(
        models = index.len(),
        files = index.total_files(),
        "Found {} unique models across {} files",
        index.len(),
        index.total_files()
    );

    Ok(index)
}

/// `<YYYY-mm-dd_HHMM>.<dir name>.txt` inside `output_dir`
pub fn default_report_path<Tz>(output_dir: &Path, scanned_dir: &Path, now: DateTime<Tz>) -> PathBuf
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let dir_name = scanned_dir
        .components()
        .next_back()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .unwrap_or_default();

    output_dir.join(format!("{}.{}.txt", now.format("%Y-%m-%d_%H%M"), dir_name))
}
