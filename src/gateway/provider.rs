//! LLM provider trait and the normalized response shape.

pub mod anthropic;
pub mod google;
pub mod openai;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::error::GatewayError;

/// HTTP request timeout for provider API calls.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// System prompt sent to providers that accept one.
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Token counts reported by a provider.
///
/// Providers that do not report usage produce zeros, never missing fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens.
    pub input: u64,
    /// Completion tokens.
    pub output: u64,
    /// Total tokens billed.
    pub total: u64,
}

/// Normalized answer from any provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Answer text.
    pub text: String,
    /// Model that produced the answer.
    pub model: String,
    /// Token usage.
    pub tokens: TokenUsage,
}

/// Metadata about a provider client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderMetadata {
    /// Provider id (`openai`, `anthropic`, `google`).
    pub provider: String,
    /// Model identifier requested.
    pub model: String,
}

/// Trait for LLM provider clients.
///
/// One call to [`send_request`](Self::send_request) is one HTTP attempt;
/// retrying is the gateway's job.
pub trait LlmProvider: Send + Sync {
    /// Sends a single question and returns the normalized answer.
    fn send_request<'a>(
        &'a self,
        question: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ProviderResponse, GatewayError>> + Send + 'a>>;

    /// Returns metadata about the client.
    fn get_metadata(&self) -> ProviderMetadata;
}

// ── Shared helpers for provider implementations ─────────────────────

/// Builds an HTTP client with the standard request timeout.
pub(crate) fn build_http_client(provider: &str) -> Result<Client, GatewayError> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| {
            GatewayError::configuration(provider, format!("failed to build HTTP client: {e}"))
        })
}

/// Strips a trailing slash from a base URL.
pub(crate) fn trim_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Maps a transport failure to a gateway error.
pub(crate) fn network_error(provider: &str, err: &reqwest::Error) -> GatewayError {
    GatewayError::transient(provider, format!("network error: {err}"))
}

/// Checks an HTTP response for error status.
///
/// On success, returns the response unchanged. HTTP 429 becomes
/// [`GatewayError::RateLimitExceeded`]; every other failure status becomes
/// [`GatewayError::Transient`].
pub(crate) async fn check_error_response(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error_text = response.text().await.unwrap_or_else(|e| {
        tracing::debug!("Failed to read error response body: {e}");
        String::new()
    });

    if status == StatusCode::TOO_MANY_REQUESTS {
        Err(GatewayError::RateLimitExceeded {
            provider: provider.to_string(),
            message: error_text,
        })
    } else {
        Err(GatewayError::transient(
            provider,
            format!("HTTP {status}: {error_text}"),
        ))
    }
}

/// Decodes a JSON response body.
pub(crate) async fn decode_json<T: for<'de> Deserialize<'de>>(
    provider: &str,
    response: reqwest::Response,
) -> Result<T, GatewayError> {
    response
        .json()
        .await
        .map_err(|e| GatewayError::transient(provider, format!("invalid response format: {e}")))
}

/// Logs a successfully normalized provider response.
pub(crate) fn log_response_success(provider: &str, response: &ProviderResponse) {
    tracing::debug!(
        response_len = response.text.len(),
        total_tokens = response.tokens.total,
        "Successfully extracted text content from {} API response",
        provider
    );
    tracing::debug!(
        response_content = %response.text,
        "{} API response content",
        provider
    );
}
