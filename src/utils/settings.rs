//! Settings and credential lookup.
//!
//! Provider API keys are read from the process environment first (a `.env`
//! file in the working directory is loaded into it at startup), then from
//! `$HOME/.llm-seo-monitor/settings.json`.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Settings loaded from `$HOME/.llm-seo-monitor/settings.json`.
#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    /// Environment variable fallbacks.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Settings {
    /// Loads settings from the default location.
    pub fn load() -> Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Self::load_from_path(&settings_path)
    }

    /// Loads settings from a specific path.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // A missing file just means no fallbacks
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

        serde_json::from_str::<Self>(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))
    }

    /// Returns the default settings path.
    pub fn get_settings_path() -> Result<PathBuf> {
        let home_dir = dirs::home_dir().context("Failed to determine home directory")?;

        Ok(home_dir.join(".llm-seo-monitor").join("settings.json"))
    }

    /// Returns a non-blank variable from the environment, falling back to these settings.
    pub fn get_env_var(&self, key: &str) -> Option<String> {
        non_blank(env::var(key).ok()).or_else(|| non_blank(self.env.get(key).cloned()))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Returns a non-blank environment variable with fallback to the settings file.
///
/// Unset and whitespace-only values are both treated as missing.
pub fn get_env_var(key: &str) -> Result<String> {
    if let Some(value) = non_blank(env::var(key).ok()) {
        return Ok(value);
    }

    match Settings::load() {
        Ok(settings) => settings
            .get_env_var(key)
            .ok_or_else(|| anyhow::anyhow!("Environment variable not found: {key}")),
        Err(err) => Err(anyhow::anyhow!("Environment variable not found: {key}").context(err)),
    }
}
