//! Query source: the questions a run asks.

pub mod enhancer;
pub mod generator;

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::analysis::BrandRegistry;
use crate::data::{read_json_file, write_json_file};

/// One question to ask the providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Stable id, unique within a query file.
    pub id: u64,
    /// Template category the query came from.
    #[serde(default)]
    pub category: String,
    /// Question text.
    #[serde(rename = "query")]
    pub text: String,
}

/// On-disk query source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFile {
    /// Target brand the queries were generated for.
    #[serde(default)]
    pub brand: String,
    /// Competitor names, in registry order.
    #[serde(default)]
    pub competitors: Vec<String>,
    /// The queries, in id order.
    pub queries: Vec<Query>,
}

impl QueryFile {
    /// Wraps `queries` with the brand header taken from `registry`.
    pub fn new(registry: &BrandRegistry, queries: Vec<Query>) -> Self {
        Self {
            brand: registry.target.primary_alias().to_string(),
            competitors: registry.competitor_names(),
            queries,
        }
    }

    /// Reads a query file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        read_json_file(path.as_ref())
            .with_context(|| format!("Failed to load queries from {}", path.as_ref().display()))
    }

    /// Writes the query file, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_json_file(self, path)
    }
}
