//! OpenAI-based embedding client implementation.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::Embedder;
use crate::error::ServiceError;
use crate::http::{build_client, status_error, transport_error};

const SERVICE: &str = "OpenAI embeddings";

/// Blocking embeddings client that talks to OpenAI-compatible endpoints.
///
/// The client makes a single request per call; retries belong to the caller's
/// [`RetryPolicy`](crate::retry::RetryPolicy).
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: Option<usize>,
}

impl OpenAiEmbedder {
    /// Builds a new OpenAI embeddings client.
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: String,
        dimensions: Option<usize>,
        timeout: Duration,
    ) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing OpenAI API key");
        anyhow::ensure!(!model.trim().is_empty(), "missing OpenAI model name");
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).context("invalid OpenAI API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = build_client(timeout, headers, "OpenAI")?;
        let endpoint = format!("{}/embeddings", base_url.trim_end_matches('/'));
        Ok(Self {
            client,
            endpoint,
            model,
            dimensions,
        })
    }

    /// Model identifier sent with every request.
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl Embedder for OpenAiEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: [text],
            dimensions: self.dimensions,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .map_err(|err| transport_error(SERVICE, err))?;
        if !resp.status().is_success() {
            return Err(status_error(SERVICE, resp));
        }
        let mut parsed: EmbeddingResponse = resp
            .json()
            .map_err(|err| ServiceError::Transient(format!("failed to parse {SERVICE} response: {err}")))?;
        parsed.data.sort_by_key(|entry| entry.index);
        let vector: Vec<f32> = parsed
            .data
            .into_iter()
            .flat_map(|entry| entry.embedding)
            .collect();
        if vector.is_empty() {
            return Err(ServiceError::Transient(format!(
                "{SERVICE} returned no embedding"
            )));
        }
        Ok(vector)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}
