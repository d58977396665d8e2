//! Conversion of legacy per-fragment store files into per-document records.
//!
//! The legacy layout wrote one file per fragment, named
//! `embed_{source}_{ordinal}.json`, each holding
//! `{ "text", "embeddings", "sourceFileName" }`. This module groups those
//! files by source document and writes one consolidated record per group.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::vector_store::{flatten_embedding, StoreError, StoredFragment, VectorStore, VectorStoreRecord};

/// Failures while consolidating a legacy store.
#[derive(Debug, Error)]
pub enum UpgradeError {
    /// Listing or reading the legacy directory failed.
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A legacy fragment file is not valid JSON of the expected shape.
    #[error("failed to parse legacy fragment {}: {source}", .path.display())]
    Json {
        /// Offending path.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
    /// Writing a consolidated record failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of a consolidation run.
#[derive(Debug, Default)]
pub struct UpgradeSummary {
    /// Source document and fragment count of each record written.
    pub written: Vec<(String, usize)>,
    /// Files that did not follow the legacy naming scheme or were empty.
    pub ignored: Vec<PathBuf>,
}

#[derive(Deserialize)]
struct LegacyFragment {
    text: String,
    #[serde(deserialize_with = "flatten_embedding")]
    embeddings: Vec<f32>,
}

struct LegacyFile {
    ordinal: u64,
    path: PathBuf,
}

/// Splits a legacy file name into `(source, ordinal)`.
///
/// `embed_notes_v2.txt_3.json` yields `("notes_v2.txt", 3)`. Names without
/// a numeric ordinal after the last `_` are not legacy fragment files.
fn parse_legacy_name(file_name: &str) -> Option<(&str, u64)> {
    let stem = file_name.strip_suffix(".json")?;
    let (_, rest) = stem.split_once('_')?;
    let (source, ordinal) = rest.rsplit_once('_')?;
    if source.is_empty() || !ordinal.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((source, ordinal.parse().ok()?))
}

/// Consolidates every legacy fragment file in `legacy_dir` into `output`.
///
/// Fragments are ordered by their numeric ordinal; empty files are ignored.
/// A file that cannot be parsed aborts the run before its group is written.
pub fn consolidate(legacy_dir: &Path, output: &VectorStore) -> Result<UpgradeSummary, UpgradeError> {
    let io_err = |path: &Path, source: std::io::Error| UpgradeError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut groups: BTreeMap<String, Vec<LegacyFile>> = BTreeMap::new();
    let mut summary = UpgradeSummary::default();

    for entry in fs::read_dir(legacy_dir).map_err(|err| io_err(legacy_dir, err))? {
        let path = entry.map_err(|err| io_err(legacy_dir, err))?.path();
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if !path.is_file() || !file_name.ends_with(".json") {
            continue;
        }
        match parse_legacy_name(file_name) {
            Some((source, ordinal)) => {
                groups
                    .entry(source.to_string())
                    .or_default()
                    .push(LegacyFile { ordinal, path });
            }
            None => {
                warn!(path = %path.display(), "not a legacy fragment file; ignoring");
                summary.ignored.push(path);
            }
        }
    }

    for (source, mut files) in groups {
        files.sort_by(|a, b| (a.ordinal, &a.path).cmp(&(b.ordinal, &b.path)));
        let mut fragments = Vec::with_capacity(files.len());
        for file in files {
            let raw = fs::read_to_string(&file.path).map_err(|err| io_err(&file.path, err))?;
            if raw.trim().is_empty() {
                summary.ignored.push(file.path);
                continue;
            }
            let legacy: LegacyFragment =
                serde_json::from_str(&raw).map_err(|err| UpgradeError::Json {
                    path: file.path.clone(),
                    source: err,
                })?;
            fragments.push(StoredFragment {
                text: legacy.text,
                embedding: legacy.embeddings,
            });
        }
        let count = fragments.len();
        let path = output.write(&VectorStoreRecord {
            source_name: source.clone(),
            fragments,
        })?;
        info!(source = %source, fragments = count, path = %path.display(), "consolidated record written");
        summary.written.push((source, count));
    }
    Ok(summary)
}
