//! On-disk vector store: one JSON record per source document.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::warn;

const RECORD_PREFIX: &str = "embed_";
const RECORD_EXTENSION: &str = "json";

/// Persisted fragments and embeddings of one source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorStoreRecord {
    /// File name of the source document.
    #[serde(rename = "sourceFileName")]
    pub source_name: String,
    /// Fragments in document order.
    #[serde(rename = "embeddings")]
    pub fragments: Vec<StoredFragment>,
}

/// A fragment's text alongside its embedding vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFragment {
    /// Fragment text submitted to the embedding model.
    pub text: String,
    /// Embedding vector. Older files wrap it in nested arrays or in the raw
    /// embedding-response object; those are flattened on read.
    #[serde(rename = "embeddings", deserialize_with = "flatten_embedding")]
    pub embedding: Vec<f32>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EmbeddingPayload {
    Flat(Vec<f32>),
    Nested(Vec<Vec<f32>>),
    Response(EmbeddingResponse),
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(alias = "Data")]
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    #[serde(alias = "Embedding")]
    embedding: Vec<f32>,
}

/// Deserializes any known embedding shape into one flat vector.
pub(crate) fn flatten_embedding<'de, D>(deserializer: D) -> Result<Vec<f32>, D::Error>
where
    D: Deserializer<'de>,
{
    let payload = EmbeddingPayload::deserialize(deserializer)?;
    Ok(match payload {
        EmbeddingPayload::Flat(values) => values,
        EmbeddingPayload::Nested(parts) => parts.into_iter().flatten().collect(),
        EmbeddingPayload::Response(response) => response
            .data
            .into_iter()
            .flat_map(|datum| datum.embedding)
            .collect(),
    })
}

/// Errors raised by the vector store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The source name cannot be used as a file name component.
    #[error("invalid source document name {0:?}")]
    InvalidName(String),
    /// Filesystem failure.
    #[error("vector store I/O on {}: {source}", .path.display())]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// A record could not be encoded or decoded.
    #[error("malformed vector store record {}: {source}", .path.display())]
    Json {
        /// Path of the record.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Store file that could not be loaded.
#[derive(Debug)]
pub struct SkippedRecord {
    /// Path of the unreadable file.
    pub path: PathBuf,
    /// Why it was skipped.
    pub reason: String,
}

/// Every readable record of a store directory.
#[derive(Debug, Default)]
pub struct Corpus {
    /// Records in file-name order.
    pub records: Vec<VectorStoreRecord>,
    /// Files skipped because they were unreadable or malformed.
    pub skipped: Vec<SkippedRecord>,
}

impl Corpus {
    /// Total fragment count across all records.
    pub fn fragment_count(&self) -> usize {
        self.records.iter().map(|record| record.fragments.len()).sum()
    }
}

/// Directory of `embed_{source}.json` records.
#[derive(Debug, Clone)]
pub struct VectorStore {
    dir: PathBuf,
}

impl VectorStore {
    /// Opens a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `source_name`.
    pub fn record_path(&self, source_name: &str) -> Result<PathBuf, StoreError> {
        validate_source_name(source_name)?;
        Ok(self
            .dir
            .join(format!("{RECORD_PREFIX}{source_name}.{RECORD_EXTENSION}")))
    }

    /// Atomically writes (or replaces) the record for its source document.
    ///
    /// The record is serialized into a temp file inside the store directory and
    /// renamed over the destination, so concurrent readers see either the old
    /// record or the new one.
    pub fn write(&self, record: &VectorStoreRecord) -> Result<PathBuf, StoreError> {
        let path = self.record_path(&record.source_name)?;
        fs::create_dir_all(&self.dir).map_err(|err| StoreError::io(&self.dir, err))?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".embed-")
            .suffix(".tmp")
            .tempfile_in(&self.dir)
            .map_err(|err| StoreError::io(&self.dir, err))?;
        let bytes = serde_json::to_vec(record).map_err(|err| StoreError::Json {
            path: path.clone(),
            source: err,
        })?;
        tmp.write_all(&bytes)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|err| StoreError::io(tmp.path(), err))?;
        tmp.persist(&path)
            .map_err(|err| StoreError::io(&path, err.error))?;
        Ok(path)
    }

    /// Reads a single record file.
    pub fn read(&self, path: &Path) -> Result<VectorStoreRecord, StoreError> {
        let bytes = fs::read(path).map_err(|err| StoreError::io(path, err))?;
        serde_json::from_slice(&bytes).map_err(|err| StoreError::Json {
            path: path.to_path_buf(),
            source: err,
        })
    }

    /// Loads every record in the store.
    ///
    /// A missing directory is an empty corpus. Unreadable or malformed files are
    /// skipped and reported in [`Corpus::skipped`]; only a failure to list the
    /// directory is an error.
    pub fn load_all(&self) -> Result<Corpus, StoreError> {
        let mut corpus = Corpus::default();
        for path in self.record_files()? {
            match self.read(&path) {
                Ok(record) => corpus.records.push(record),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable store record");
                    corpus.skipped.push(SkippedRecord {
                        path,
                        reason: err.to_string(),
                    });
                }
            }
        }
        Ok(corpus)
    }

    fn record_files(&self) -> Result<Vec<PathBuf>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StoreError::io(&self.dir, err)),
        };
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| StoreError::io(&self.dir, err))?;
            let path = entry.path();
            let is_record = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(RECORD_EXTENSION));
            if is_record && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

fn validate_source_name(name: &str) -> Result<(), StoreError> {
    let plain = Path::new(name)
        .file_name()
        .is_some_and(|file_name| file_name == name);
    if name.trim().is_empty() || !plain || name.contains(|ch: char| ch == '/' || ch == '\\') {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}
