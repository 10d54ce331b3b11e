//! Brand registry: the target brand and its competitors.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::read_json_file;

/// A brand and the textual forms it is recognised by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Brand {
    /// Display name, used in analysis records.
    pub name: String,
    /// Alternate spellings matched literally.
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl Brand {
    /// Creates a brand from a name and its aliases.
    pub fn new<I, S>(name: impl Into<String>, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            aliases: aliases.into_iter().map(Into::into).collect(),
        }
    }

    /// Terms searched for in answers: non-blank aliases, or the name when
    /// there are none.
    pub fn match_terms(&self) -> Vec<&str> {
        let terms: Vec<&str> = self
            .aliases
            .iter()
            .map(|alias| alias.trim())
            .filter(|alias| !alias.is_empty())
            .collect();

        if terms.is_empty() {
            vec![self.name.as_str()]
        } else {
            terms
        }
    }

    /// The form used when writing about the brand: its first match term.
    pub fn primary_alias(&self) -> &str {
        self.match_terms()
            .first()
            .copied()
            .unwrap_or(self.name.as_str())
    }
}

/// The target brand and its competitors, in a fixed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandRegistry {
    /// The brand being monitored.
    pub target: Brand,
    /// Competitors, in registry order.
    #[serde(default)]
    pub competitors: Vec<Brand>,
}

impl BrandRegistry {
    /// Reads a registry file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        read_json_file(path)
            .with_context(|| format!("Failed to load brand registry from {}", path.display()))
    }

    /// Every brand with its target flag: target first, then competitors.
    pub fn brands(&self) -> impl Iterator<Item = (&Brand, bool)> {
        std::iter::once((&self.target, true))
            .chain(self.competitors.iter().map(|brand| (brand, false)))
    }

    /// Competitor names in registry order.
    pub fn competitor_names(&self) -> Vec<String> {
        self.competitors.iter().map(|b| b.name.clone()).collect()
    }
}
