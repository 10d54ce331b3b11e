//! Provider gateway errors.

use thiserror::Error;

/// Errors raised while building provider clients or calling them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Provider is unknown or its configuration is incomplete.
    #[error("Configuration error for provider '{provider}': {message}")]
    Configuration {
        /// Provider id as requested.
        provider: String,
        /// What is wrong with it.
        message: String,
    },

    /// The environment variable holding the provider's API key is unset or empty.
    #[error(
        "Missing API key for {provider}. Expected environment variable: {env_var}\n\
         Add `{env_var}=your_api_key_here` to a .env file in the project root or export it in your shell"
    )]
    MissingCredential {
        /// Provider id.
        provider: String,
        /// Variable that was looked up.
        env_var: String,
    },

    /// The provider signalled a rate limit (HTTP 429).
    #[error("Rate limit exceeded for {provider}: {message}")]
    RateLimitExceeded {
        /// Provider id.
        provider: String,
        /// Error body returned by the provider.
        message: String,
    },

    /// Any other provider-side failure: HTTP error, network error or malformed body.
    #[error("{provider} request failed: {message}")]
    Transient {
        /// Provider id.
        provider: String,
        /// Failure description.
        message: String,
    },
}

impl GatewayError {
    /// Returns true when the error should be retried with backoff.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimitExceeded { .. })
    }

    pub(crate) fn transient(provider: &str, message: impl Into<String>) -> Self {
        Self::Transient {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn configuration(provider: &str, message: impl Into<String>) -> Self {
        Self::Configuration {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rate_limits_are_retryable() {
        let rate = GatewayError::RateLimitExceeded {
            provider: "openai".to_string(),
            message: "slow down".to_string(),
        };
        assert!(rate.is_rate_limit());
        assert!(!GatewayError::transient("openai", "HTTP 500").is_rate_limit());
        assert!(!GatewayError::configuration("mistral", "unsupported").is_rate_limit());
    }

    #[test]
    fn missing_credential_names_the_variable() {
        let err = GatewayError::MissingCredential {
            provider: "google".to_string(),
            env_var: "GOOGLE_API_KEY".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("GOOGLE_API_KEY"));
        assert!(message.contains("google"));
    }
}
