//! Anthropic Messages API client.

use std::future::Future;
use std::pin::Pin;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    build_http_client, check_error_response, decode_json, log_response_success, network_error,
    trim_base_url, LlmProvider, ProviderMetadata, ProviderResponse, TokenUsage,
};
use crate::gateway::error::GatewayError;

/// Public Anthropic endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

const API_VERSION: &str = "2023-06-01";

const PROVIDER: &str = "anthropic";

/// Anthropic API request message.
#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

/// Anthropic API request body.
#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
}

/// Anthropic API response content block.
#[derive(Deserialize)]
struct Content {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: Option<String>,
}

/// Anthropic API usage statistics.
#[derive(Deserialize, Default)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

/// Anthropic API response.
#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<Content>,
    model: Option<String>,
    usage: Option<Usage>,
}

/// Anthropic Messages API client.
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
}

impl AnthropicProvider {
    /// Creates a new Anthropic client.
    pub fn new(
        model: String,
        api_key: String,
        base_url: Option<String>,
        max_tokens: u32,
    ) -> Result<Self, GatewayError> {
        Ok(Self {
            client: build_http_client(PROVIDER)?,
            api_key,
            model,
            base_url: trim_base_url(base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)),
            max_tokens,
        })
    }

    fn get_api_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }
}

fn normalize(
    response: AnthropicResponse,
    requested_model: &str,
) -> Result<ProviderResponse, GatewayError> {
    let text: String = response
        .content
        .into_iter()
        .filter(|c| c.content_type == "text")
        .filter_map(|c| c.text)
        .collect();

    if text.is_empty() {
        return Err(GatewayError::transient(
            PROVIDER,
            "no text content in response",
        ));
    }

    let usage = response.usage.unwrap_or_default();

    Ok(ProviderResponse {
        text,
        model: response.model.unwrap_or_else(|| requested_model.to_string()),
        tokens: TokenUsage {
            input: usage.input_tokens,
            output: usage.output_tokens,
            total: usage.input_tokens + usage.output_tokens,
        },
    })
}

impl LlmProvider for AnthropicProvider {
    fn send_request<'a>(
        &'a self,
        question: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ProviderResponse, GatewayError>> + Send + 'a>> {
        Box::pin(async move {
            let request = AnthropicRequest {
                model: self.model.clone(),
                max_tokens: self.max_tokens,
                messages: vec![Message {
                    role: "user".to_string(),
                    content: question.to_string(),
                }],
            };
            let api_url = self.get_api_url();

            info!(
                url = %api_url,
                model = %self.model,
                max_tokens = self.max_tokens,
                "Sending request to Anthropic API"
            );

            let response = self
                .client
                .post(&api_url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", API_VERSION)
                .header("content-type", "application/json")
                .json(&request)
                .send()
                .await
                .map_err(|e| network_error(PROVIDER, &e))?;

            let response = check_error_response(PROVIDER, response).await?;
            let body: AnthropicResponse = decode_json(PROVIDER, response).await?;

            debug!(
                content_count = body.content.len(),
                "Received Anthropic API response"
            );

            let result = normalize(body, &self.model)?;
            log_response_success("Anthropic", &result);
            Ok(result)
        })
    }

    fn get_metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            provider: PROVIDER.to_string(),
            model: self.model.clone(),
        }
    }
}
