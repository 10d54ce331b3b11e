//! Provider gateway: uniform access to the configured LLM backends.
//!
//! The gateway builds one authenticated client per configured provider,
//! applies the retry policy around single attempts, and fans a question out
//! to every provider concurrently. A provider that cannot be built or that
//! fails a call only loses its own slot.

pub mod error;
pub mod provider;
pub mod retry;
#[cfg(test)]
pub(crate) mod test_utils;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{bail, Result};
use futures::future::join_all;
use tracing::{debug, info, warn};

pub use error::GatewayError;
pub use provider::anthropic::AnthropicProvider;
pub use provider::google::GoogleProvider;
pub use provider::openai::OpenAiProvider;
pub use provider::{LlmProvider, ProviderMetadata, ProviderResponse, TokenUsage};
pub use retry::{call_with_retry, RetryPolicy};

use crate::config::AppConfig;
use crate::utils::settings;

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// OpenAI chat completions.
    OpenAi,
    /// Anthropic Messages API.
    Anthropic,
    /// Google Gemini.
    Google,
}

impl ProviderKind {
    /// Resolves a canonical provider id.
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "openai" => Some(Self::OpenAi),
            "anthropic" => Some(Self::Anthropic),
            "google" => Some(Self::Google),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi => write!(f, "OpenAI"),
            Self::Anthropic => write!(f, "Anthropic"),
            Self::Google => write!(f, "Google Gemini"),
        }
    }
}

/// Maps user-facing names (`gpt`, `claude`, `gemini`) to provider ids.
///
/// Unknown names are lower-cased and passed through so that the error
/// raised later names what the user typed.
pub fn canonical_provider_id(name: &str) -> String {
    let name = name.trim().to_lowercase();
    match name.as_str() {
        "gpt" | "chatgpt" => "openai".to_string(),
        "claude" => "anthropic".to_string(),
        "gemini" => "google".to_string(),
        _ => name,
    }
}

/// Which providers a run asks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Every configured provider, concurrently.
    All,
    /// One provider, by canonical id.
    Single(String),
}

impl RunMode {
    /// Parses a `--provider` argument; absent or `all` means every provider.
    pub fn from_provider_arg(arg: Option<&str>) -> Self {
        match arg.map(str::trim) {
            None | Some("") => Self::All,
            Some(name) if name.eq_ignore_ascii_case("all") => Self::All,
            Some(name) => Self::Single(canonical_provider_id(name)),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all providers"),
            Self::Single(id) => write!(f, "{id}"),
        }
    }
}

/// Resolves a provider's API key from its configured environment variable.
pub fn resolve_api_key(provider: &str, env_var: &str) -> Result<String, GatewayError> {
    settings::get_env_var(env_var).map_err(|_| GatewayError::MissingCredential {
        provider: provider.to_string(),
        env_var: env_var.to_string(),
    })
}

/// Builds an authenticated client for a provider from configuration.
pub fn build_client(
    config: &AppConfig,
    provider_id: &str,
) -> Result<Arc<dyn LlmProvider>, GatewayError> {
    let id = canonical_provider_id(provider_id);
    let kind = ProviderKind::from_id(&id).ok_or_else(|| {
        GatewayError::configuration(
            &id,
            "unsupported provider; expected one of openai, anthropic, google",
        )
    })?;
    let provider_config = config.provider(&id).ok_or_else(|| {
        GatewayError::configuration(&id, format!("no entry under llm.providers.{id}"))
    })?;

    if provider_config.model.trim().is_empty() {
        return Err(GatewayError::configuration(&id, "model is empty"));
    }
    if provider_config.api_key_env.trim().is_empty() {
        return Err(GatewayError::configuration(&id, "api_key_env is empty"));
    }

    let api_key = resolve_api_key(&id, provider_config.api_key_env.trim())?;
    let model = provider_config.model.clone();
    let base_url = provider_config.base_url.clone();

    info!(provider = %id, model = %model, "Building {kind} client");

    let client: Arc<dyn LlmProvider> = match kind {
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(
            model,
            api_key,
            base_url,
            config.llm.max_tokens,
            config.llm.temperature,
        )?),
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(
            model,
            api_key,
            base_url,
            config.llm.max_tokens,
        )?),
        ProviderKind::Google => Arc::new(GoogleProvider::new(model, api_key, base_url)?),
    };

    Ok(client)
}

/// Asks one provider a question, retrying rate limits per `policy`.
pub async fn ask(
    provider: &dyn LlmProvider,
    question: &str,
    policy: &RetryPolicy,
) -> Result<ProviderResponse, GatewayError> {
    let metadata = provider.get_metadata();
    info!(provider = %metadata.provider, model = %metadata.model, "Calling provider");

    let response = call_with_retry(policy, &metadata.provider, || {
        provider.send_request(question)
    })
    .await?;

    info!(
        provider = %metadata.provider,
        total_tokens = response.tokens.total,
        "Provider response received"
    );
    Ok(response)
}

struct ProviderSlot {
    id: String,
    client: Result<Arc<dyn LlmProvider>, GatewayError>,
}

/// The set of providers a run talks to.
pub struct Gateway {
    slots: Vec<ProviderSlot>,
    retry: RetryPolicy,
}

impl Gateway {
    /// Creates an empty gateway.
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            slots: Vec::new(),
            retry,
        }
    }

    /// Adds a ready client under `id`.
    #[must_use]
    pub fn with_provider(mut self, id: impl Into<String>, client: Arc<dyn LlmProvider>) -> Self {
        self.slots.push(ProviderSlot {
            id: id.into(),
            client: Ok(client),
        });
        self
    }

    /// Adds a provider that could not be built; its slot is always absent.
    #[must_use]
    pub fn with_unavailable(mut self, id: impl Into<String>, err: GatewayError) -> Self {
        self.slots.push(ProviderSlot {
            id: id.into(),
            client: Err(err),
        });
        self
    }

    /// Builds the providers a run in `mode` needs.
    ///
    /// In [`RunMode::All`] a provider that fails to build is kept as an
    /// absent slot. Fails when no provider at all is usable, listing why.
    pub fn from_config(config: &AppConfig, mode: &RunMode) -> Result<Self> {
        let ids: Vec<String> = match mode {
            RunMode::All => config.llm.providers.keys().cloned().collect(),
            RunMode::Single(id) => vec![canonical_provider_id(id)],
        };

        if ids.is_empty() {
            bail!("No providers configured under llm.providers");
        }

        let mut gateway = Self::new(config.query_runner.retry_policy());
        for id in ids {
            match build_client(config, &id) {
                Ok(client) => gateway = gateway.with_provider(id, client),
                Err(err) => {
                    warn!(provider = %id, error = %err, "Provider unavailable");
                    gateway = gateway.with_unavailable(id, err);
                }
            }
        }

        if gateway.available_count() == 0 {
            let reasons: Vec<String> = gateway
                .slots
                .iter()
                .filter_map(|slot| slot.client.as_ref().err())
                .map(|err| format!("  - {err}"))
                .collect();
            bail!("No usable LLM provider:\n{}", reasons.join("\n"));
        }

        Ok(gateway)
    }

    /// Provider ids in slot order.
    pub fn provider_ids(&self) -> Vec<&str> {
        self.slots.iter().map(|slot| slot.id.as_str()).collect()
    }

    /// Number of providers with a working client.
    pub fn available_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.client.is_ok()).count()
    }

    /// Asks a single provider.
    pub async fn ask_provider(
        &self,
        id: &str,
        question: &str,
    ) -> Result<ProviderResponse, GatewayError> {
        let slot = self
            .slots
            .iter()
            .find(|slot| slot.id == id)
            .ok_or_else(|| GatewayError::configuration(id, "provider is not configured"))?;
        let client = slot.client.as_ref().map_err(Clone::clone)?;

        ask(client.as_ref(), question, &self.retry).await
    }

    /// Asks every provider concurrently.
    ///
    /// Every slot appears in the result; failed providers map to `None`.
    pub async fn ask_all_providers(
        &self,
        question: &str,
    ) -> BTreeMap<String, Option<ProviderResponse>> {
        let calls = self.slots.iter().map(|slot| async move {
            let result = match &slot.client {
                Ok(client) => ask(client.as_ref(), question, &self.retry).await,
                Err(err) => Err(err.clone()),
            };
            (slot.id.clone(), settle(&slot.id, result))
        });

        join_all(calls).await.into_iter().collect()
    }

    /// Asks the providers selected by `mode`.
    pub async fn ask_for_mode(
        &self,
        mode: &RunMode,
        question: &str,
    ) -> BTreeMap<String, Option<ProviderResponse>> {
        match mode {
            RunMode::All => self.ask_all_providers(question).await,
            RunMode::Single(id) => {
                let result = self.ask_provider(id, question).await;
                BTreeMap::from([(id.clone(), settle(id, result))])
            }
        }
    }
}

/// Collapses a provider result into an output slot, logging the failure.
fn settle(id: &str, result: Result<ProviderResponse, GatewayError>) -> Option<ProviderResponse> {
    match result {
        Ok(response) => Some(response),
        Err(
            err @ (GatewayError::Configuration { .. } | GatewayError::MissingCredential { .. }),
        ) => {
            debug!(provider = id, error = %err, "Skipping unavailable provider");
            None
        }
        Err(err) => {
            warn!(provider = id, error = %err, "Provider call failed");
            None
        }
    }
}
