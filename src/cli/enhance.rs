//! `enhance` command.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::config::AppConfig;
use crate::gateway::{canonical_provider_id, Gateway, RunMode};
use crate::queries::enhancer::enhance_queries;
use crate::queries::QueryFile;

/// Rephrases generated queries so they read like real user questions.
#[derive(Parser)]
pub struct EnhanceCommand {
    /// Provider doing the rephrasing (default: llm.default_provider).
    #[arg(long)]
    pub provider: Option<String>,

    /// Query source (default: queries.json in the entries directory).
    #[arg(long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Output file (default: queries_enhanced.json in the entries directory).
    #[arg(long, short, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

impl EnhanceCommand {
    /// Executes the enhance command.
    pub async fn execute(self, config: &AppConfig) -> Result<()> {
        let input_path = self.input.unwrap_or_else(|| config.paths.queries_path());
        let output_path = self
            .output
            .unwrap_or_else(|| config.paths.enhanced_queries_path());
        let provider =
            canonical_provider_id(self.provider.as_deref().unwrap_or(&config.llm.default_provider));

        let source = QueryFile::load(&input_path)?;
        let gateway = Gateway::from_config(config, &RunMode::Single(provider.clone()))?;

        println!(
            "Enhancing {} queries with {provider}...",
            source.queries.len()
        );
        let queries = enhance_queries(&gateway, &provider, &source.queries).await;

        let changed = queries
            .iter()
            .zip(&source.queries)
            .filter(|(new, old)| new.text != old.text)
            .count();
        let count = queries.len();
        QueryFile { queries, ..source }.save(&output_path)?;

        println!(
            "Rephrased {changed} of {count} queries into {}",
            output_path.display()
        );
        Ok(())
    }
}
