use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::{GenerationRequest, Generator};
use crate::error::ServiceError;
use crate::http::{build_client, status_error, transport_error};

const SERVICE: &str = "OpenAI chat completions";

/// Chat-completions client for OpenAI-compatible endpoints.
pub struct OpenAiGenerator {
    client: Client,
    endpoint: String,
    model: String,
}

impl OpenAiGenerator {
    /// Builds a client posting to `{base_url}/chat/completions`.
    pub fn new(api_key: &str, base_url: &str, model: String, timeout: Duration) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing OpenAI API key");
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).context("invalid OpenAI API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = build_client(timeout, headers, "OpenAI")?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model,
        })
    }
}

impl Generator for OpenAiGenerator {
    fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, ServiceError> {
        let body = ChatRequest {
            model: &self.model,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            messages: vec![ChatMessage {
                role: "user",
                content: request.prompt,
            }],
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .map_err(|err| transport_error(SERVICE, err))?;
        if !resp.status().is_success() {
            return Err(status_error(SERVICE, resp));
        }
        let parsed: ChatResponse = resp
            .json()
            .map_err(|err| ServiceError::Transient(format!("failed to parse {SERVICE} response: {err}")))?;
        Ok(parsed.answer())
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl ChatResponse {
    /// Content of the first choice that carries any; empty when none does.
    fn answer(self) -> String {
        self.choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}
