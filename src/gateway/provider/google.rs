//! Google Gemini `generateContent` client.

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

/// Public Gemini endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const PROVIDER: &str = "google";

#[derive(Serialize, Deserialize, Default)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Serialize, Deserialize, Default)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

/// Gemini request body.
#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

/// Gemini usage metadata; every count may be omitted.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    total_token_count: u64,
}

/// Gemini response body.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

/// Google Gemini client.
pub struct GoogleProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GoogleProvider {
    /// Creates a new Gemini client.
    pub fn new(
        model: String,
        api_key: String,
        base_url: Option<String>,
    ) -> Result<Self, GatewayError> {
        Ok(Self {
            client: build_http_client(PROVIDER)?,
            api_key,
            model,
            base_url: trim_base_url(base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)),
        })
    }

    fn get_api_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

/// Gemini does not echo the model, so the requested one is reported.
fn normalize(
    response: GenerateContentResponse,
    model: &str,
) -> Result<ProviderResponse, GatewayError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        return Err(GatewayError::transient(
            PROVIDER,
            "no candidate text in response",
        ));
    }

    let usage = response.usage_metadata.unwrap_or_default();

    Ok(ProviderResponse {
        text,
        model: model.to_string(),
        tokens: TokenUsage {
            input: usage.prompt_token_count,
            output: usage.candidates_token_count,
            total: usage.total_token_count,
        },
    })
}

impl LlmProvider for GoogleProvider {
    fn send_request<'a>(
        &'a self,
        question: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ProviderResponse, GatewayError>> + Send + 'a>> {
        Box::pin(async move {
            let request = GenerateContentRequest {
                contents: vec![Content {
                    role: Some("user".to_string()),
                    parts: vec![Part {
                        text: Some(question.to_string()),
                    }],
                }],
            };
            let api_url = self.get_api_url();

            info!(url = %api_url, model = %self.model, "Sending request to Gemini API");

            let response = self
                .client
                .post(&api_url)
                .header("x-goog-api-key", &self.api_key)
                .header("content-type", "application/json")
                .json(&request)
                .send()
                .await
                .map_err(|e| network_error(PROVIDER, &e))?;

            let response = check_error_response(PROVIDER, response).await?;
            let body: GenerateContentResponse = decode_json(PROVIDER, response).await?;

            debug!(
                candidate_count = body.candidates.len(),
                "Received Gemini API response"
            );

            let result = normalize(body, &self.model)?;
            log_response_success("Gemini", &result);
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
