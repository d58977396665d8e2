//! Embedding capability and its concrete clients.

use crate::error::ServiceError;

pub mod openai;

pub use openai::OpenAiEmbedder;

/// Turns text into an embedding vector.
pub trait Embedder: Send + Sync {
    /// Embeds one fragment or query string.
    fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError>;
}

impl<T: Embedder + ?Sized> Embedder for &T {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        (**self).embed(text)
    }
}

impl<T: Embedder + ?Sized> Embedder for Box<T> {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        (**self).embed(text)
    }
}

impl<T: Embedder + ?Sized> Embedder for std::sync::Arc<T> {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        (**self).embed(text)
    }
}
