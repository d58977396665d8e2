use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::{GenerationRequest, Generator};
use crate::error::ServiceError;
use crate::http::{build_client, status_error, transport_error};

const SERVICE: &str = "Anthropic messages";
const ENDPOINT: &str = "https://api.anthropic.com/v1/messages";

/// Messages-API client for Anthropic models.
pub struct AnthropicGenerator {
    client: Client,
    model: String,
}

impl AnthropicGenerator {
    /// Builds a client authenticated with `api_key`.
    pub fn new(api_key: &str, model: String, timeout: Duration) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing Anthropic API key");
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(api_key.trim()).context("invalid Anthropic API key")?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = build_client(timeout, headers, "Anthropic")?;
        Ok(Self { client, model })
    }
}

impl Generator for AnthropicGenerator {
    fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, ServiceError> {
        let body = AnthropicRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            messages: vec![AnthropicMessage {
                role: "user",
                content: vec![AnthropicContentBlock {
                    kind: "text",
                    text: request.prompt,
                }],
            }],
        };
        let resp = self
            .client
            .post(ENDPOINT)
            .json(&body)
            .send()
            .map_err(|err| transport_error(SERVICE, err))?;
        if !resp.status().is_success() {
            return Err(status_error(SERVICE, resp));
        }
        let parsed: AnthropicResponse = resp
            .json()
            .map_err(|err| ServiceError::Transient(format!("failed to parse {SERVICE} response: {err}")))?;
        Ok(parsed.text())
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    temperature: f32,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: Vec<AnthropicContentBlock<'a>>,
}

#[derive(Serialize)]
struct AnthropicContentBlock<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicResponseBlock>,
}

impl AnthropicResponse {
    fn text(self) -> String {
        self.content
            .into_iter()
            .filter_map(|block| match block {
                AnthropicResponseBlock::Text { text } => Some(text),
                AnthropicResponseBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicResponseBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_text_blocks_and_ignores_others() {
        let parsed: AnthropicResponse = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"The sky"},{"type":"tool_use","id":"x"},{"type":"text","text":"is blue."}]}"#,
        )
        .expect("parse");
        assert_eq!(parsed.text(), "The sky\nis blue.");
    }
}
