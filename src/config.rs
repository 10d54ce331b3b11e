//! Application configuration loaded from `config.yaml`.
//!
//! The configuration is read once at startup and handed by reference to the
//! gateway, the runner and the analysis commands. Nothing looks it up
//! ambiently.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::analysis::DEFAULT_CHUNK_SIZE;
use crate::gateway::RetryPolicy;

/// Config file looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Longest single wait a retry policy may schedule.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(3600);

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// LLM provider settings.
    pub llm: LlmConfig,

    /// Query runner tuning.
    #[serde(default)]
    pub query_runner: RunnerConfig,

    /// Data locations.
    #[serde(default)]
    pub paths: PathsConfig,
}

/// LLM provider settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Provider used by single-provider commands when none is given.
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Maximum tokens requested per answer.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-provider settings keyed by provider id (`openai`, `anthropic`, `google`).
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
}

/// Settings for one provider.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Model identifier sent with every request.
    pub model: String,

    /// Name of the environment variable holding the API key.
    pub api_key_env: String,

    /// Overrides the provider's public API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Query runner tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunnerConfig {
    /// Total attempts per provider call when rate limited.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Wait before the first retry, in seconds.
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: f64,

    /// Multiplier applied to the wait after every retry.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Answers per worker chunk during mention analysis.
    #[serde(default = "default_analysis_chunk_size")]
    pub analysis_chunk_size: usize,
}

/// Data locations, relative to the working directory unless absolute.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathsConfig {
    /// Holds `brands.json`, `queries.json` and the query templates.
    #[serde(default = "default_entries_dir")]
    pub entries_dir: PathBuf,

    /// Holds one directory per run.
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
}

fn default_provider() -> String {
    "openai".to_string()
}

const fn default_max_tokens() -> u32 {
    512
}

const fn default_temperature() -> f32 {
    0.7
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_delay_secs() -> f64 {
    2.0
}

const fn default_backoff_factor() -> f64 {
    2.0
}

const fn default_analysis_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_entries_dir() -> PathBuf {
    PathBuf::from("data/entries")
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("data/results")
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_secs: default_initial_delay_secs(),
            backoff_factor: default_backoff_factor(),
            analysis_chunk_size: default_analysis_chunk_size(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            entries_dir: default_entries_dir(),
            results_dir: default_results_dir(),
        }
    }
}

impl RunnerConfig {
    /// Returns the retry policy described by this configuration.
    ///
    /// The initial delay is clamped to `0..=MAX_RETRY_DELAY`.
    pub fn retry_policy(&self) -> RetryPolicy {
        let initial_delay = Duration::try_from_secs_f64(
            self.initial_delay_secs.clamp(0.0, MAX_RETRY_DELAY.as_secs_f64()),
        )
        .unwrap_or(MAX_RETRY_DELAY);

        RetryPolicy::new(self.max_attempts, initial_delay, self.backoff_factor)
    }

    /// Wait before the final retry, in seconds: the longest one scheduled.
    fn longest_delay_secs(&self) -> f64 {
        if self.initial_delay_secs <= 0.0 {
            return 0.0;
        }
        let retries = self.max_attempts.saturating_sub(2);
        let exponent = i32::try_from(retries).unwrap_or(i32::MAX);
        self.initial_delay_secs * self.backoff_factor.powi(exponent)
    }
}

impl PathsConfig {
    /// Generated query source.
    pub fn queries_path(&self) -> PathBuf {
        self.entries_dir.join("queries.json")
    }

    /// Output of the `enhance` command.
    pub fn enhanced_queries_path(&self) -> PathBuf {
        self.entries_dir.join("queries_enhanced.json")
    }

    /// Brand registry.
    pub fn brands_path(&self) -> PathBuf {
        self.entries_dir.join("brands.json")
    }

    /// Query templates consumed by `generate`.
    pub fn templates_path(&self) -> PathBuf {
        self.entries_dir.join("query_template.json")
    }
}

impl AppConfig {
    /// Loads the configuration from a specific path.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            bail!(
                "Config not found at {}. Create it or pass --config <PATH>",
                path.display()
            );
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parses and validates configuration from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).context("Failed to parse config YAML")?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the settings for a provider id.
    pub fn provider(&self, id: &str) -> Option<&ProviderConfig> {
        self.llm.providers.get(id)
    }

    fn validate(&self) -> Result<()> {
        let runner = &self.query_runner;

        if !runner.initial_delay_secs.is_finite() || runner.initial_delay_secs < 0.0 {
            bail!(
                "query_runner.initial_delay_secs must be a non-negative number, got {}",
                runner.initial_delay_secs
            );
        }
        if !runner.backoff_factor.is_finite() || runner.backoff_factor < 1.0 {
            bail!(
                "query_runner.backoff_factor must be at least 1.0, got {}",
                runner.backoff_factor
            );
        }
        let longest = runner.longest_delay_secs();
        if longest.is_nan() || longest > MAX_RETRY_DELAY.as_secs_f64() {
            bail!(
                "query_runner retry waits grow to {longest}s, above the {}s limit; \
                 lower initial_delay_secs, backoff_factor or max_attempts",
                MAX_RETRY_DELAY.as_secs()
            );
        }
        if runner.analysis_chunk_size == 0 {
            bail!("query_runner.analysis_chunk_size must be greater than zero");
        }

        Ok(())
    }
}
