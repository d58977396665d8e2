//! Per-query orchestration: embed, retrieve, rank, assemble, generate.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use tracing::{debug, info, warn};

use crate::audit::AuditLog;
use crate::context::{self, DEFAULT_MAX_CONTEXT_BYTES, DEFAULT_SIMILARITY_THRESHOLD};
use crate::embedder::Embedder;
use crate::error::{QueryError, QueryStage};
use crate::generator::{GenerationRequest, Generator};
use crate::retry::RetryPolicy;
use crate::similarity;
use crate::vector_store::VectorStore;

/// Message reported (and audited) when no fragment is relevant enough.
pub const NO_MATCH_MESSAGE: &str = "No good matches found.";

const PREAMBLE: &str = "You are a helpful assistant that answers questions about the user's \
documents. Answer using only the information provided for context; if it does not contain \
the answer, say so.";

/// Tunables for one answering pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnswerSettings {
    /// Minimum similarity for a fragment to enter the context.
    pub similarity_threshold: f32,
    /// Context budget in UTF-8 bytes.
    pub max_context_bytes: usize,
    /// Sampling temperature for the generation model.
    pub temperature: f32,
    /// Output cap for the generation model, in tokens.
    pub max_output_tokens: usize,
}

impl Default for AnswerSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            max_context_bytes: DEFAULT_MAX_CONTEXT_BYTES,
            temperature: 0.1,
            max_output_tokens: 512,
        }
    }
}

/// Successful outcome of a query.
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    /// The model answered using the retrieved context.
    Answered {
        /// Generated answer, leading whitespace trimmed.
        text: String,
        /// Context the answer was generated from.
        context: String,
    },
    /// Nothing in the corpus was similar enough to the question.
    NoMatch,
}

/// Answers questions against a vector store.
pub struct Answerer<E, G> {
    embedder: E,
    generator: G,
    store: VectorStore,
    settings: AnswerSettings,
    retry: RetryPolicy,
    audit: Option<AuditLog>,
    query_cache: Option<Mutex<LruCache<String, Vec<f32>>>>,
}

impl<E: Embedder, G: Generator> Answerer<E, G> {
    /// Wires the capabilities to a store with default settings.
    pub fn new(embedder: E, generator: G, store: VectorStore) -> Self {
        Self {
            embedder,
            generator,
            store,
            settings: AnswerSettings::default(),
            retry: RetryPolicy::default(),
            audit: None,
            query_cache: None,
        }
    }

    /// Replaces the answering tunables.
    pub fn with_settings(mut self, settings: AnswerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replaces the retry policy used for both capability calls.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Appends every outcome to `audit`.
    pub fn with_audit_log(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Caches up to `capacity` query embeddings (0 disables caching).
    pub fn with_query_cache(mut self, capacity: usize) -> Self {
        self.query_cache = NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap)));
        self
    }

    /// Current tunables.
    pub fn settings(&self) -> &AnswerSettings {
        &self.settings
    }

    /// Runs the full pipeline for `question` and audits the outcome.
    pub fn ask(&self, question: &str) -> Result<Answer, QueryError> {
        let outcome = self.answer(question);
        match &outcome {
            Ok(Answer::Answered { text, .. }) => {
                info!(outcome = "answered", "query finished");
                self.audit(|log| log.record_answer(question, text));
            }
            Ok(Answer::NoMatch) => {
                info!(outcome = "no_match", "query finished");
                self.audit(|log| log.record_answer(question, NO_MATCH_MESSAGE));
            }
            Err(err) => {
                warn!(outcome = "failed", error = %err, "query finished");
                self.audit(|log| log.record_failure(question, err));
            }
        }
        outcome
    }

    fn answer(&self, question: &str) -> Result<Answer, QueryError> {
        debug!(stage = %QueryStage::EmbeddingQuery, "query started");
        let query_vector = self.embed_query(question)?;

        debug!(stage = %QueryStage::Retrieving, "loading corpus");
        let corpus = self.store.load_all().map_err(QueryError::CorpusRead)?;

        debug!(
            stage = %QueryStage::AssemblingContext,
            records = corpus.records.len(),
            fragments = corpus.fragment_count(),
            skipped = corpus.skipped.len(),
            "ranking fragments"
        );
        let ranked = similarity::rank(&query_vector, &corpus.records);
        let context = context::assemble(
            &ranked,
            self.settings.similarity_threshold,
            self.settings.max_context_bytes,
        );
        if context.trim().is_empty() {
            return Ok(Answer::NoMatch);
        }

        debug!(stage = %QueryStage::GeneratingAnswer, context_bytes = context.len(), "generating answer");
        let prompt = build_prompt(question, &context);
        let request = GenerationRequest {
            prompt: &prompt,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_output_tokens,
        };
        let generated = self
            .retry
            .call("generate", || self.generator.generate(&request))
            .map_err(|err| QueryError::from_retry(QueryStage::GeneratingAnswer, err))?;
        let text = generated.trim_start();
        if text.trim().is_empty() {
            return Err(QueryError::NoAnswer);
        }
        Ok(Answer::Answered {
            text: text.to_string(),
            context,
        })
    }

    fn embed_query(&self, question: &str) -> Result<Vec<f32>, QueryError> {
        if let Some(hit) = self.cached_query(question) {
            debug!("query embedding cache hit");
            return Ok(hit);
        }
        let vector = self
            .retry
            .call("embed query", || self.embedder.embed(question))
            .map_err(|err| QueryError::from_retry(QueryStage::EmbeddingQuery, err))?;
        if let Some(cache) = &self.query_cache {
            if let Ok(mut guard) = cache.lock() {
                guard.put(question.to_string(), vector.clone());
            }
        }
        Ok(vector)
    }

    fn cached_query(&self, question: &str) -> Option<Vec<f32>> {
        let cache = self.query_cache.as_ref()?;
        let mut guard = cache.lock().ok()?;
        guard.get(question).cloned()
    }

    fn audit(&self, write: impl FnOnce(&AuditLog)) {
        if let Some(log) = &self.audit {
            write(log);
        }
    }
}

/// Builds the generation prompt: role preamble, context, then the question.
pub fn build_prompt(question: &str, context: &str) -> String {
    let mut prompt = String::with_capacity(PREAMBLE.len() + context.len() + question.len() + 128);
    prompt.push_str(PREAMBLE);
    prompt.push_str("\n\nThe following information is provided for context:\n\n");
    prompt.push_str(context);
    prompt.push_str("\n\nGiven this information, please answer the following question:\n\n\"");
    prompt.push_str(question.trim());
    prompt.push_str("\"\n");
    prompt
}

/// Escapes an answer for HTML output (quotes included) and turns line breaks
/// into `<br />`.
pub fn render_html(answer: &str) -> String {
    html_escape::encode_quoted_attribute(answer)
        .replace("\r\n", "<br />")
        .replace('\n', "<br />")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn prompt_orders_preamble_context_question() {
        let prompt = build_prompt("  what color is the sky ", "The sky is blue.");
        let preamble = prompt.find("helpful assistant").unwrap();
        let context = prompt.find("The sky is blue.").unwrap();
        let question = prompt.find("\"what color is the sky\"").unwrap();
        assert!(preamble < context && context < question);
    }

    #[test]
    fn html_rendering_escapes_and_breaks_lines() {
        assert_eq!(
            render_html("a < b & c\r\nnext\nlast"),
            "a &lt; b &amp; c<br />next<br />last"
        );
    }

    #[test]
    fn html_rendering_escapes_quotes() {
        assert_eq!(
            render_html(r#"say "hi" and 'bye'"#),
            "say &quot;hi&quot; and &#x27;bye&#x27;"
        );
    }

    #[test]
    fn default_settings_match_documented_values() {
        let settings = AnswerSettings::default();
        assert_eq!(settings.similarity_threshold, 0.75);
        assert_eq!(settings.max_context_bytes, 8192);
        assert_eq!(settings.max_output_tokens, 512);
    }
}
