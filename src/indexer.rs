//! Document indexing: chunk, embed every fragment, persist one record.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel::bounded;
use tracing::{debug, info, warn};

use crate::chunker::{self, DEFAULT_MAX_FRAGMENT_LEN};
use crate::embedder::Embedder;
use crate::error::IndexError;
use crate::retry::RetryPolicy;
use crate::vector_store::{StoredFragment, VectorStore, VectorStoreRecord};

const SOURCE_EXTENSION: &str = "txt";

/// Builds vector-store records from plain-text documents.
pub struct Indexer<E> {
    embedder: E,
    store: VectorStore,
    retry: RetryPolicy,
    max_fragment_len: usize,
    workers: usize,
}

/// Outcome of a directory run.
#[derive(Debug, Default)]
pub struct IndexSummary {
    /// Documents written, with their fragment counts.
    pub indexed: Vec<(String, usize)>,
    /// Documents that failed, with the reason.
    pub failed: Vec<(String, IndexError)>,
}

impl<E: Embedder> Indexer<E> {
    /// Creates an indexer writing into `store`, embedding fragments one at a time.
    pub fn new(embedder: E, store: VectorStore) -> Self {
        Self {
            embedder,
            store,
            retry: RetryPolicy::default(),
            max_fragment_len: DEFAULT_MAX_FRAGMENT_LEN,
            workers: 1,
        }
    }

    /// Overrides the retry policy used for each fragment.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Overrides the fragment length limit.
    pub fn with_max_fragment_len(mut self, max_fragment_len: usize) -> Self {
        self.max_fragment_len = max_fragment_len.max(1);
        self
    }

    /// Embeds fragments on up to `workers` threads. Output is unchanged.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Store the indexer writes to.
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    /// Chunks and embeds `text`, then replaces the stored record for `name`.
    ///
    /// Nothing is written unless every fragment was embedded.
    pub fn index_document(&self, name: &str, text: &str) -> Result<VectorStoreRecord, IndexError> {
        self.store.record_path(name)?;
        let fragments = chunker::split(text, self.max_fragment_len);
        debug!(document = name, fragments = fragments.len(), "chunked document");
        let embeddings = self.embed_fragments(name, &fragments)?;
        check_dimensions(name, &embeddings)?;

        let record = VectorStoreRecord {
            source_name: name.to_string(),
            fragments: fragments
                .into_iter()
                .zip(embeddings)
                .map(|(text, embedding)| StoredFragment { text, embedding })
                .collect(),
        };
        let path = self.store.write(&record)?;
        info!(
            document = name,
            fragments = record.fragments.len(),
            path = %path.display(),
            "indexed document"
        );
        Ok(record)
    }

    /// Reads and indexes one file, named after its file name.
    pub fn index_file(&self, path: &Path) -> Result<VectorStoreRecord, IndexError> {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        let text = fs::read_to_string(path).map_err(|err| IndexError::Read {
            path: path.display().to_string(),
            source: err,
        })?;
        self.index_document(name, &text)
    }

    /// Indexes every `*.txt` file in `input_dir`, in file-name order.
    ///
    /// A rejected credential aborts the run. Other per-document failures are
    /// collected in the summary and the run moves on.
    pub fn index_directory(&self, input_dir: &Path) -> Result<IndexSummary, IndexError> {
        let mut summary = IndexSummary::default();
        for path in source_files(input_dir)? {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            match self.index_file(&path) {
                Ok(record) => summary.indexed.push((name, record.fragments.len())),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(document = %name, error = %err, "failed to index document");
                    summary.failed.push((name, err));
                }
            }
        }
        Ok(summary)
    }

    fn embed_fragment(&self, name: &str, ordinal: usize, text: &str) -> Result<Vec<f32>, IndexError> {
        let label = format!("embed {name}#{ordinal}");
        Ok(self.retry.call(&label, || self.embedder.embed(text))?)
    }

    fn embed_fragments(&self, name: &str, fragments: &[String]) -> Result<Vec<Vec<f32>>, IndexError> {
        if self.workers <= 1 || fragments.len() <= 1 {
            return fragments
                .iter()
                .enumerate()
                .map(|(ordinal, text)| self.embed_fragment(name, ordinal, text))
                .collect();
        }
        self.embed_fragments_pooled(name, fragments)
    }

    /// Fans fragments out to a bounded worker pool and reassembles them in
    /// order. After the first failure no further fragments are embedded.
    fn embed_fragments_pooled(
        &self,
        name: &str,
        fragments: &[String],
    ) -> Result<Vec<Vec<f32>>, IndexError> {
        let workers = self.workers.min(fragments.len());
        let (task_tx, task_rx) = bounded::<(usize, &str)>(workers * 2);
        let (result_tx, result_rx) = bounded::<(usize, Result<Vec<f32>, IndexError>)>(workers * 2);
        let abort = AtomicBool::new(false);

        thread::scope(|scope| {
            for worker_id in 0..workers {
                let rx = task_rx.clone();
                let tx = result_tx.clone();
                let abort = &abort;
                scope.spawn(move || {
                    for (ordinal, text) in rx.iter() {
                        if abort.load(Ordering::Relaxed) {
                            break;
                        }
                        debug!(worker_id, document = name, ordinal, "embedding fragment");
                        let result = self.embed_fragment(name, ordinal, text);
                        if tx.send((ordinal, result)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(task_rx);
            drop(result_tx);

            let abort_feed = &abort;
            scope.spawn(move || {
                for (ordinal, text) in fragments.iter().enumerate() {
                    if abort_feed.load(Ordering::Relaxed) {
                        break;
                    }
                    if task_tx.send((ordinal, text.as_str())).is_err() {
                        break;
                    }
                }
            });

            let mut slots: Vec<Option<Vec<f32>>> = vec![None; fragments.len()];
            let mut failure = None;
            for (ordinal, result) in result_rx.iter() {
                match result {
                    Ok(vector) => slots[ordinal] = Some(vector),
                    Err(err) => {
                        abort.store(true, Ordering::Relaxed);
                        failure = Some(err);
                        break;
                    }
                }
            }
            drop(result_rx);
            if let Some(err) = failure {
                return Err(err);
            }
            slots
                .into_iter()
                .enumerate()
                .map(|(ordinal, slot)| {
                    slot.ok_or_else(|| IndexError::EmbeddingServiceTransient {
                        attempts: 0,
                        message: format!("fragment {ordinal} of {name} was never embedded"),
                    })
                })
                .collect()
        })
    }
}

fn check_dimensions(name: &str, embeddings: &[Vec<f32>]) -> Result<(), IndexError> {
    let Some(expected) = embeddings.first().map(Vec::len) else {
        return Ok(());
    };
    for (fragment, vector) in embeddings.iter().enumerate() {
        if vector.len() != expected {
            return Err(IndexError::DimensionMismatch {
                document: name.to_string(),
                fragment,
                expected,
                found: vector.len(),
            });
        }
    }
    Ok(())
}

fn source_files(input_dir: &Path) -> Result<Vec<PathBuf>, IndexError> {
    let read_err = |err| IndexError::Read {
        path: input_dir.display().to_string(),
        source: err,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(input_dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        let is_source = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(SOURCE_EXTENSION));
        if is_source && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
