//! Shared HTTP plumbing: client construction, API keys and error mapping.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use tracing::warn;

use aira_core::error::{AiraError, Result};

/// Classification of a failed HTTP response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    RateLimit,
    Overloaded,
    ServerError,
    AuthError,
    InvalidRequest,
    Unknown,
}

impl ProviderErrorKind {
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            429 => Self::RateLimit,
            503 | 529 => Self::Overloaded,
            401 | 403 => Self::AuthError,
            400 | 404 | 422 => Self::InvalidRequest,
            500..=599 => Self::ServerError,
            _ => Self::Unknown,
        }
    }
}

pub(crate) fn build_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_default()
}

/// Read an API key from the named environment variable.
pub fn api_key_from_env(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => Err(AiraError::Config(format!("{} is not set", var))),
    }
}

/// Map a transport failure. Timeouts become [`AiraError::Timeout`];
/// everything else goes through `wrap`.
pub(crate) fn send_error(
    err: reqwest::Error,
    service: &str,
    timeout_secs: u64,
    wrap: fn(String) -> AiraError,
) -> AiraError {
    if err.is_timeout() {
        warn!(service, timeout_secs, "Request timed out");
        return AiraError::Timeout(timeout_secs);
    }
    if err.is_connect() {
        return wrap(format!("{} connection failed: {}", service, err));
    }
    wrap(format!("{} request failed: {}", service, err))
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

/// Map a non-success response. Rate-limit and overload statuses become
/// [`AiraError::RateLimited`] so callers back off before retrying.
pub(crate) fn status_error(
    status: StatusCode,
    body: &str,
    service: &str,
    wrap: fn(String) -> AiraError,
) -> AiraError {
    let detail = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => match envelope.error.kind {
            Some(kind) => format!("{} ({})", envelope.error.message, kind),
            None => envelope.error.message,
        },
        Err(_) => body.chars().take(200).collect(),
    };
    let message = if detail.is_empty() {
        format!("{} api error ({})", service, status)
    } else {
        format!("{} api error ({}): {}", service, status, detail)
    };
    warn!(service, status = status.as_u16(), "API request rejected");

    match ProviderErrorKind::from_status(status) {
        ProviderErrorKind::RateLimit | ProviderErrorKind::Overloaded => {
            AiraError::RateLimited(message)
        }
        ProviderErrorKind::AuthError => AiraError::Config(message),
        _ => wrap(message),
    }
}

/// Send a prepared request and return the response if its status is
/// successful.
pub(crate) async fn send(
    request: reqwest::RequestBuilder,
    service: &str,
    timeout_secs: u64,
    wrap: fn(String) -> AiraError,
) -> Result<reqwest::Response> {
    let response = request
        .send()
        .await
        .map_err(|e| send_error(e, service, timeout_secs, wrap))?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body, service, wrap))
}
