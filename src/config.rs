//! Command-line argument groups shared by the askdocs binaries.
//!
//! Each group is a `clap::Args` struct meant to be `#[command(flatten)]`ed
//! into a binary's parser. Every flag also reads an `ASKDOCS_*` environment
//! variable.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};

use crate::answerer::AnswerSettings;
use crate::audit::{AuditLog, DEFAULT_AUDIT_LOG};
use crate::context::{DEFAULT_MAX_CONTEXT_BYTES, DEFAULT_SIMILARITY_THRESHOLD};
use crate::embedder::OpenAiEmbedder;
use crate::generator::{AnthropicGenerator, Generator, OpenAiGenerator};
use crate::retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};
use crate::vector_store::VectorStore;

/// OpenAI credential and embedding model settings.
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// OpenAI API key; falls back to the key file when unset.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// File holding the OpenAI API key.
    #[arg(long, env = "ASKDOCS_OPENAI_KEY_FILE", default_value = "OpenAI-API.key")]
    pub openai_key_file: PathBuf,

    /// Base URL for OpenAI-compatible endpoints.
    #[arg(
        long,
        env = "ASKDOCS_OPENAI_BASE",
        default_value = "https://api.openai.com/v1"
    )]
    pub openai_base_url: String,

    /// Embedding model identifier.
    #[arg(
        long,
        env = "ASKDOCS_EMBEDDING_MODEL",
        default_value = "text-embedding-3-small"
    )]
    pub embedding_model: String,

    /// Optional embedding dimension override.
    #[arg(long, env = "ASKDOCS_EMBEDDING_DIMENSIONS")]
    pub embedding_dimensions: Option<usize>,

    /// Seconds before model requests time out.
    #[arg(long, env = "ASKDOCS_TIMEOUT_SECS", default_value_t = 60)]
    pub timeout_secs: u64,
}

impl ModelArgs {
    /// Resolves the OpenAI key from the flag/env var or the key file.
    pub fn api_key(&self) -> Result<String> {
        if let Some(key) = self
            .openai_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
        {
            return Ok(key.to_string());
        }
        let raw = fs::read_to_string(&self.openai_key_file).with_context(|| {
            format!(
                "no OpenAI API key: set OPENAI_API_KEY or create {}",
                self.openai_key_file.display()
            )
        })?;
        let key = raw.trim();
        if key.is_empty() {
            bail!("OpenAI key file {} is empty", self.openai_key_file.display());
        }
        Ok(key.to_string())
    }

    /// Request timeout, at least one second.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Builds the embedding client.
    pub fn build_embedder(&self) -> Result<OpenAiEmbedder> {
        let key = self.api_key()?;
        OpenAiEmbedder::new(
            &key,
            &self.openai_base_url,
            self.embedding_model.clone(),
            self.embedding_dimensions,
            self.timeout(),
        )
    }
}

/// Which generation backend answers questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GeneratorProvider {
    /// OpenAI chat completions.
    Openai,
    /// Anthropic messages API.
    Anthropic,
}

/// Generation model settings.
#[derive(Args, Debug, Clone)]
pub struct GeneratorArgs {
    /// Backend used to generate answers.
    #[arg(long, env = "ASKDOCS_GENERATOR", value_enum, default_value = "openai")]
    pub generator: GeneratorProvider,

    /// OpenAI chat model identifier.
    #[arg(long, env = "ASKDOCS_CHAT_MODEL", default_value = "gpt-4o-mini")]
    pub chat_model: String,

    /// Anthropic API key (required with `--generator anthropic`).
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub anthropic_api_key: Option<String>,

    /// Anthropic model identifier.
    #[arg(
        long,
        env = "ASKDOCS_ANTHROPIC_MODEL",
        default_value = "claude-3-5-haiku-latest"
    )]
    pub anthropic_model: String,

    /// Sampling temperature.
    #[arg(long, env = "ASKDOCS_TEMPERATURE", default_value_t = 0.1)]
    pub temperature: f32,

    /// Maximum tokens in a generated answer.
    #[arg(long, env = "ASKDOCS_MAX_OUTPUT_TOKENS", default_value_t = 512)]
    pub max_output_tokens: usize,
}

impl GeneratorArgs {
    /// Builds the configured generation client.
    pub fn build_generator(&self, model: &ModelArgs) -> Result<Box<dyn Generator>> {
        match self.generator {
            GeneratorProvider::Openai => {
                let key = model.api_key()?;
                let generator = OpenAiGenerator::new(
                    &key,
                    &model.openai_base_url,
                    self.chat_model.clone(),
                    model.timeout(),
                )?;
                Ok(Box::new(generator))
            }
            GeneratorProvider::Anthropic => {
                let key = self
                    .anthropic_api_key
                    .as_deref()
                    .context("--anthropic-api-key (or ANTHROPIC_API_KEY) is required")?;
                let generator =
                    AnthropicGenerator::new(key, self.anthropic_model.clone(), model.timeout())?;
                Ok(Box::new(generator))
            }
        }
    }
}

/// Vector store location and retrieval tunables.
#[derive(Args, Debug, Clone)]
pub struct RetrievalArgs {
    /// Directory holding `embed_*.json` records.
    #[arg(long, env = "ASKDOCS_STORE_DIR", default_value = "Embeddings")]
    pub store_dir: PathBuf,

    /// Minimum cosine similarity for a fragment to enter the context.
    #[arg(long, env = "ASKDOCS_THRESHOLD", default_value_t = DEFAULT_SIMILARITY_THRESHOLD)]
    pub threshold: f32,

    /// Context budget in UTF-8 bytes.
    #[arg(long, env = "ASKDOCS_MAX_CONTEXT_BYTES", default_value_t = DEFAULT_MAX_CONTEXT_BYTES)]
    pub max_context_bytes: usize,

    /// Question/answer audit log.
    #[arg(long, env = "ASKDOCS_AUDIT_LOG", default_value = DEFAULT_AUDIT_LOG)]
    pub audit_log: PathBuf,

    /// Disable the audit log.
    #[arg(long)]
    pub no_audit_log: bool,

    /// Max cached query embeddings kept in-memory (0 disables caching).
    #[arg(long, env = "ASKDOCS_QUERY_CACHE", default_value_t = 256)]
    pub query_cache_size: usize,
}

impl RetrievalArgs {
    /// Store rooted at `--store-dir`.
    pub fn store(&self) -> VectorStore {
        VectorStore::new(&self.store_dir)
    }

    /// Audit log, unless disabled.
    pub fn audit(&self) -> Option<AuditLog> {
        (!self.no_audit_log).then(|| AuditLog::new(&self.audit_log))
    }

    /// Answer tunables from both argument groups.
    pub fn settings(&self, generator: &GeneratorArgs) -> Result<AnswerSettings> {
        if !(0.0..=1.0).contains(&self.threshold) {
            bail!("--threshold must be within [0, 1], got {}", self.threshold);
        }
        Ok(AnswerSettings {
            similarity_threshold: self.threshold,
            max_context_bytes: self.max_context_bytes,
            temperature: generator.temperature,
            max_output_tokens: generator.max_output_tokens.max(1),
        })
    }
}

/// Retry budget for capability calls.
#[derive(Args, Debug, Clone)]
pub struct RetryArgs {
    /// Attempts per capability call, first call included.
    #[arg(long, env = "ASKDOCS_MAX_ATTEMPTS", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: usize,

    /// Backoff unit in milliseconds; attempt `n` waits `n` units.
    #[arg(long, env = "ASKDOCS_BACKOFF_MS", default_value_t = 1000)]
    pub backoff_ms: u64,
}

impl RetryArgs {
    /// Policy described by the flags.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.backoff_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        model: ModelArgs,
        #[command(flatten)]
        generator: GeneratorArgs,
        #[command(flatten)]
        retrieval: RetrievalArgs,
        #[command(flatten)]
        retry: RetryArgs,
    }

    fn parse(args: &[&str]) -> TestCli {
        let mut argv = vec!["test"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv).expect("parse")
    }

    #[test]
    fn key_file_is_used_when_flag_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let key_file = dir.path().join("key");
        fs::write(&key_file, "  sk-from-file\n").unwrap();
        let mut cli = parse(&["--openai-key-file", key_file.to_str().unwrap()]);
        cli.model.openai_api_key = None;
        assert_eq!(cli.model.api_key().unwrap(), "sk-from-file");

        cli.model.openai_api_key = Some("sk-flag".into());
        assert_eq!(cli.model.api_key().unwrap(), "sk-flag");
    }

    #[test]
    fn missing_key_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut cli = parse(&[
            "--openai-key-file",
            dir.path().join("absent").to_str().unwrap(),
        ]);
        cli.model.openai_api_key = None;
        assert!(cli.model.api_key().is_err());
    }

    #[test]
    fn retry_flags_build_policy() {
        let cli = parse(&["--max-attempts", "5", "--backoff-ms", "10"]);
        let policy = cli.retry.policy();
        assert_eq!(policy.max_attempts(), 5);
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(20));
    }

    #[test]
    fn settings_reject_out_of_range_threshold() {
        let mut cli = parse(&[]);
        cli.retrieval.threshold = 1.5;
        assert!(cli.retrieval.settings(&cli.generator).is_err());
        cli.retrieval.threshold = 0.5;
        let settings = cli.retrieval.settings(&cli.generator).unwrap();
        assert_eq!(settings.similarity_threshold, 0.5);
    }

    #[test]
    fn audit_log_can_be_disabled() {
        let cli = parse(&["--no-audit-log"]);
        assert!(cli.retrieval.audit().is_none());
    }
}
