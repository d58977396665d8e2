//! Blocking HTTP plumbing shared by the model clients.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::{Client, Response};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;

use crate::error::ServiceError;

/// Builds a blocking client with a request timeout and default headers.
pub(crate) fn build_client(timeout: Duration, headers: HeaderMap, label: &str) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()
        .with_context(|| format!("failed to build {label} HTTP client"))
}

/// Maps a non-success response onto the capability failure kinds.
pub(crate) fn status_error(service: &str, resp: Response) -> ServiceError {
    let status = resp.status();
    let body = resp
        .text()
        .unwrap_or_else(|_| "<body unavailable>".to_string());
    let message = format!("{service} returned {status}: {body}");
    if is_unauthorized(status) {
        ServiceError::Unauthorized(message)
    } else {
        ServiceError::Transient(message)
    }
}

/// Transport-level failures (connect, timeout, body, decode) are retryable.
pub(crate) fn transport_error(service: &str, err: reqwest::Error) -> ServiceError {
    if let Some(status) = err.status().filter(|status| is_unauthorized(*status)) {
        return ServiceError::Unauthorized(format!("{service} returned {status}"));
    }
    ServiceError::Transient(format!("failed to call {service}: {err}"))
}

fn is_unauthorized(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}
