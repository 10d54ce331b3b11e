//! OpenAI chat completions client.

use std::future::Future;
use std::pin::Pin;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    build_http_client, check_error_response, decode_json, log_response_success, network_error,
    trim_base_url, LlmProvider, ProviderMetadata, ProviderResponse, TokenUsage, SYSTEM_PROMPT,
};
use crate::gateway::error::GatewayError;

/// Public OpenAI endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

const PROVIDER: &str = "openai";

/// OpenAI API request message.
#[derive(Serialize, Debug)]
struct Message {
    role: String,
    content: String,
}

/// OpenAI API request body.
#[derive(Serialize, Debug)]
struct OpenAiRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// OpenAI API response choice.
#[derive(Deserialize, Debug)]
struct Choice {
    message: ResponseMessage,
}

/// OpenAI API response message.
#[derive(Deserialize, Debug)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI API response.
#[derive(Deserialize, Debug)]
struct OpenAiResponse {
    choices: Vec<Choice>,
    model: Option<String>,
    usage: Option<Usage>,
}

/// OpenAI API usage statistics.
#[derive(Deserialize, Debug, Default)]
struct Usage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
    total_tokens: Option<u64>,
}

/// OpenAI chat completions client.
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiProvider {
    /// Creates a new OpenAI client.
    pub fn new(
        model: String,
        api_key: String,
        base_url: Option<String>,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<Self, GatewayError> {
        Ok(Self {
            client: build_http_client(PROVIDER)?,
            api_key,
            model,
            base_url: trim_base_url(base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)),
            max_tokens,
            temperature,
        })
    }

    fn get_api_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    /// Reasoning-series models take `max_completion_tokens` and only the default temperature.
    fn is_reasoning_series(&self) -> bool {
        self.model.starts_with("gpt-5") || self.model.starts_with("o1")
    }

    fn build_request(&self, question: &str) -> OpenAiRequest {
        let messages = vec![
            Message {
                role: "system".to_string(),
                content: SYSTEM_PROMPT.to_string(),
            },
            Message {
                role: "user".to_string(),
                content: question.to_string(),
            },
        ];

        if self.is_reasoning_series() {
            OpenAiRequest {
                model: self.model.clone(),
                messages,
                max_tokens: None,
                max_completion_tokens: Some(self.max_tokens),
                temperature: None,
            }
        } else {
            OpenAiRequest {
                model: self.model.clone(),
                messages,
                max_tokens: Some(self.max_tokens),
                max_completion_tokens: None,
                temperature: Some(self.temperature),
            }
        }
    }
}

fn normalize(
    response: OpenAiResponse,
    requested_model: &str,
) -> Result<ProviderResponse, GatewayError> {
    let text = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| GatewayError::transient(PROVIDER, "no choices in response"))?;

    let usage = response.usage.unwrap_or_default();
    let input = usage.prompt_tokens.unwrap_or(0);
    let output = usage.completion_tokens.unwrap_or(0);

    Ok(ProviderResponse {
        text,
        model: response.model.unwrap_or_else(|| requested_model.to_string()),
        tokens: TokenUsage {
            input,
            output,
            total: usage.total_tokens.unwrap_or(input + output),
        },
    })
}

impl LlmProvider for OpenAiProvider {
    fn send_request<'a>(
        &'a self,
        question: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ProviderResponse, GatewayError>> + Send + 'a>> {
        Box::pin(async move {
            let request = self.build_request(question);
            let api_url = self.get_api_url();

            debug!(
                question_len = question.len(),
                max_tokens = ?request.max_tokens,
                max_completion_tokens = ?request.max_completion_tokens,
                temperature = ?request.temperature,
                "Built OpenAI request payload"
            );
            info!(url = %api_url, model = %self.model, "Sending request to OpenAI API");

            let response = self
                .client
                .post(&api_url)
                .header("Content-Type", "application/json")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&request)
                .send()
                .await
                .map_err(|e| network_error(PROVIDER, &e))?;

            let response = check_error_response(PROVIDER, response).await?;
            let body: OpenAiResponse = decode_json(PROVIDER, response).await?;

            debug!(
                choice_count = body.choices.len(),
                model = ?body.model,
                usage = ?body.usage,
                "Received OpenAI API response"
            );

            let result = normalize(body, &self.model)?;
            log_response_success("OpenAI", &result);
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

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, model: &str) -> OpenAiProvider {
        OpenAiProvider::new(
            model.to_string(),
            "sk-test".to_string(),
            Some(format!("{}/", server.uri())),
            512,
            0.7,
        )
        .unwrap()
    }

    #[test]
    fn default_base_url() {
        let client =
            OpenAiProvider::new("gpt-4o-mini".to_string(), "sk".to_string(), None, 512, 0.7)
                .unwrap();
        assert_eq!(
            client.get_api_url(),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn reasoning_models_use_completion_token_limit() {
        let client =
            OpenAiProvider::new("gpt-5-mini".to_string(), "sk".to_string(), None, 256, 0.7)
                .unwrap();
        let request = client.build_request("hi");
        assert_eq!(request.max_completion_tokens, Some(256));
        assert!(request.max_tokens.is_none());
        assert!(request.temperature.is_none());
    }

    #[test]
    fn chat_models_send_system_prompt_first() {
        let client =
            OpenAiProvider::new("gpt-4o-mini".to_string(), "sk".to_string(), None, 256, 0.7)
                .unwrap();
        let request = client.build_request("Best note apps?");
        assert_eq!(request.messages[0].role, "system");
        assert_eq!(request.messages[0].content, SYSTEM_PROMPT);
        assert_eq!(request.messages[1].content, "Best note apps?");
        assert_eq!(request.max_tokens, Some(256));
    }

    #[tokio::test]
    async fn parses_answer_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "gpt-4o-mini-2024-07-18",
                "choices": [{"message": {"role": "assistant", "content": "Obsidian is great"}}],
                "usage": {"prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16}
            })))
            .mount(&server)
            .await;

        let response = client_for(&server, "gpt-4o-mini")
            .send_request("Best note apps?")
            .await
            .unwrap();

        assert_eq!(response.text, "Obsidian is great");
        assert_eq!(response.model, "gpt-4o-mini-2024-07-18");
        assert_eq!(
            response.tokens,
            TokenUsage {
                input: 12,
                output: 4,
                total: 16
            }
        );
    }

    #[tokio::test]
    async fn missing_usage_reports_zero_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "ok"}}]
            })))
            .mount(&server)
            .await;

        let response = client_for(&server, "gpt-4o-mini")
            .send_request("q")
            .await
            .unwrap();

        assert_eq!(response.model, "gpt-4o-mini");
        assert_eq!(response.tokens, TokenUsage::default());
    }

    #[tokio::test]
    async fn status_429_is_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = client_for(&server, "gpt-4o-mini")
            .send_request("q")
            .await
            .unwrap_err();

        assert!(err.is_rate_limit());
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client_for(&server, "gpt-4o-mini")
            .send_request("q")
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Transient { .. }));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn empty_choices_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server, "gpt-4o-mini")
            .send_request("q")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("no choices"));
    }
}
