#![warn(missing_docs)]
//! Core library for askdocs: index plain-text documents into an on-disk
//! vector store and answer questions about them with retrieval-augmented
//! generation.

pub mod answerer;
pub mod audit;
pub mod chunker;
pub mod config;
pub mod context;
pub mod embedder;
pub mod error;
pub mod generator;
mod http;
pub mod indexer;
pub mod logging;
pub mod rate_limit;
pub mod retry;
pub mod similarity;
pub mod upgrade;
pub mod upload;
pub mod vector_store;

pub use answerer::{render_html, Answer, AnswerSettings, Answerer, NO_MATCH_MESSAGE};
pub use audit::AuditLog;
pub use embedder::{Embedder, OpenAiEmbedder};
pub use error::{IndexError, QueryError, QueryStage, ServiceError};
pub use generator::{AnthropicGenerator, GenerationRequest, Generator, OpenAiGenerator};
pub use indexer::{IndexSummary, Indexer};
pub use retry::{RetryError, RetryPolicy};
pub use similarity::RankedFragment;
pub use upload::{validate_upload, UploadError, MAX_UPLOAD_BYTES};
pub use vector_store::{Corpus, StoreError, StoredFragment, VectorStore, VectorStoreRecord};
