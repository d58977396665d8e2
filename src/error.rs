//! Error taxonomy shared by the indexing and answering pipelines.

use std::fmt;

use thiserror::Error;

use crate::retry::RetryError;
use crate::vector_store::StoreError;

/// Failure reported by an external model capability (embedding or generation).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The credential was rejected; retrying cannot help.
    #[error("credential rejected: {0}")]
    Unauthorized(String),
    /// Network failure, rate limit or server-side error worth retrying.
    #[error("transient service failure: {0}")]
    Transient(String),
}

/// Errors surfaced while indexing a document.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The embedding service is unreachable for good (invalid credential).
    #[error("embedding service rejected the request: {0}")]
    EmbeddingService(String),
    /// Transient embedding failures outlasted the retry budget.
    #[error("embedding service failed after {attempts} attempts: {message}")]
    EmbeddingServiceTransient {
        /// Attempts made for the failing fragment.
        attempts: usize,
        /// Last failure reported by the service.
        message: String,
    },
    /// Fragments of one document came back with different dimensionality.
    #[error("fragment {fragment} of {document} has {found} dimensions, expected {expected}")]
    DimensionMismatch {
        /// Source document name.
        document: String,
        /// Ordinal of the offending fragment.
        fragment: usize,
        /// Dimensionality of the first fragment.
        expected: usize,
        /// Dimensionality of the offending fragment.
        found: usize,
    },
    /// Reading the source document failed.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path of the source document.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Persisting the record failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IndexError {
    /// True when the failure should abort a whole indexing run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::EmbeddingService(_))
    }
}

impl From<RetryError> for IndexError {
    fn from(err: RetryError) -> Self {
        match err {
            RetryError::Unauthorized { message } => Self::EmbeddingService(message),
            RetryError::Exhausted { attempts, message } => {
                Self::EmbeddingServiceTransient { attempts, message }
            }
        }
    }
}

/// Pipeline stage a query is in; used for logging and failure reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStage {
    /// Embedding the question text.
    EmbeddingQuery,
    /// Loading the persisted corpus.
    Retrieving,
    /// Ranking fragments and building the context.
    AssemblingContext,
    /// Waiting on the generation model.
    GeneratingAnswer,
}

impl fmt::Display for QueryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::EmbeddingQuery => "embedding_query",
            Self::Retrieving => "retrieving",
            Self::AssemblingContext => "assembling_context",
            Self::GeneratingAnswer => "generating_answer",
        };
        f.write_str(label)
    }
}

/// Caller-facing failures of a query. A query without a good match is not an
/// error; see [`crate::answerer::Answer::NoMatch`].
#[derive(Debug, Error)]
pub enum QueryError {
    /// The API credential is invalid; the configuration must be fixed.
    #[error("the model API key is invalid: {message}")]
    InvalidCredential {
        /// Stage that observed the rejection.
        stage: QueryStage,
        /// Message reported by the service.
        message: String,
    },
    /// The model service kept failing; the caller may try again later.
    #[error("an error occurred contacting the model service during {stage} ({attempts} attempts): {message}")]
    TransientService {
        /// Stage that exhausted its retries.
        stage: QueryStage,
        /// Attempts made.
        attempts: usize,
        /// Last failure reported by the service.
        message: String,
    },
    /// The persisted corpus could not be listed.
    #[error("an error occurred while reading the vector store: {0}")]
    CorpusRead(#[source] StoreError),
    /// The generation model returned no text.
    #[error("the model did not return an answer")]
    NoAnswer,
}

impl QueryError {
    pub(crate) fn from_retry(stage: QueryStage, err: RetryError) -> Self {
        match err {
            RetryError::Unauthorized { message } => Self::InvalidCredential { stage, message },
            RetryError::Exhausted { attempts, message } => Self::TransientService {
                stage,
                attempts,
                message,
            },
        }
    }
}
