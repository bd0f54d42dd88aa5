//! Read-only inspection of the pipeline's `vdb_*.json` vector stores.
//!
//! Stores written with a different embedding model carry a different
//! `embedding_dim`. This module only reports the mismatch; rebuilding a store
//! is left to the operator.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Deserialize;

/// Summary of one vector store file.
#[derive(Debug, Clone)]
pub struct StoreInfo {
    pub path: PathBuf,
    /// `None` when the file does not record its dimension.
    pub embedding_dim: Option<usize>,
    pub records: usize,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Local>>,
}

impl StoreInfo {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// True if the store records a dimension other than `expected`.
    pub fn mismatches(&self, expected: usize) -> bool {
        self.embedding_dim.is_some_and(|dim| dim != expected)
    }
}

/// A store file that exists but could not be read.
#[derive(Debug)]
pub struct UnreadableStore {
    pub path: PathBuf,
    pub error: anyhow::Error,
}

/// Everything found in a working directory.
#[derive(Debug, Default)]
pub struct VdbReport {
    pub stores: Vec<StoreInfo>,
    pub unreadable: Vec<UnreadableStore>,
}

impl VdbReport {
    pub fn is_empty(&self) -> bool {
        self.stores.is_empty() && self.unreadable.is_empty()
    }

    pub fn mismatched(&self, expected: usize) -> impl Iterator<Item = &StoreInfo> {
        self.stores.iter().filter(move |s| s.mismatches(expected))
    }

    /// No store disagrees with `expected` and every store could be read.
    pub fn is_compatible(&self, expected: usize) -> bool {
        self.unreadable.is_empty() && self.mismatched(expected).next().is_none()
    }
}

#[derive(Deserialize)]
struct StoreFile {
    embedding_dim: Option<usize>,
    #[serde(default)]
    data: Vec<serde::de::IgnoredAny>,
}

/// Scan `working_dir` for `vdb_*.json`. A missing directory is an empty report.
pub fn inspect(working_dir: &Path) -> Result<VdbReport> {
    let mut report = VdbReport::default();
    if !working_dir.exists() {
        tracing::debug!(dir = %working_dir.display(), "working directory does not exist");
        return Ok(report);
    }

    let entries = std::fs::read_dir(working_dir)
        .with_context(|| format!("failed to read directory: {}", working_dir.display()))?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| is_store_file(path))
        .collect();
    paths.sort();

    for path in paths {
        match read_store(&path) {
            Ok(info) => {
                tracing::debug!(
                    file = %info.file_name(),
                    dim = ?info.embedding_dim,
                    records = info.records,
                    "vector store inspected"
                );
                report.stores.push(info);
            }
            Err(error) => {
                tracing::warn!(path = %path.display(), error = %error, "unreadable vector store");
                report.unreadable.push(UnreadableStore { path, error });
            }
        }
    }

    Ok(report)
}

fn is_store_file(path: &Path) -> bool {
    path.is_file()
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.starts_with("vdb_") && name.ends_with(".json"))
}

/// Read one store file.
pub fn read_store(path: &Path) -> Result<StoreInfo> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let parsed: StoreFile = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    let metadata = std::fs::metadata(path)?;
    let modified = metadata.modified().ok().map(DateTime::<Local>::from);

    Ok(StoreInfo {
        path: path.to_path_buf(),
        embedding_dim: parsed.embedding_dim,
        records: parsed.data.len(),
        size_bytes: metadata.len(),
        modified,
    })
}
