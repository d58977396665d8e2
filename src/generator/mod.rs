//! Text-generation capability and its concrete providers.

use crate::error::ServiceError;

mod anthropic;
mod openai;

pub use anthropic::AnthropicGenerator;
pub use openai::OpenAiGenerator;

/// Trait implemented by concrete LLM providers.
pub trait Generator: Send + Sync {
    /// Generates a completion for `request.prompt`.
    fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, ServiceError>;
}

/// Request envelope shared by the various providers.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    /// Full prompt, context included.
    pub prompt: &'a str,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum number of generated tokens.
    pub max_tokens: usize,
}

impl<T: Generator + ?Sized> Generator for &T {
    fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, ServiceError> {
        (**self).generate(request)
    }
}

impl<T: Generator + ?Sized> Generator for Box<T> {
    fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, ServiceError> {
        (**self).generate(request)
    }
}

impl<T: Generator + ?Sized> Generator for std::sync::Arc<T> {
    fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, ServiceError> {
        (**self).generate(request)
    }
}
