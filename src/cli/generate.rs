//! `generate` command.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::analysis::BrandRegistry;
use crate::config::AppConfig;
use crate::queries::generator::{generate_all_queries, TemplateFile};
use crate::queries::QueryFile;

/// Expands the query templates into the query source.
#[derive(Parser)]
pub struct GenerateCommand {
    /// Template file (default: query_template.json in the entries directory).
    #[arg(long, value_name = "PATH")]
    pub templates: Option<PathBuf>,

    /// Brand registry (default: brands.json in the entries directory).
    #[arg(long, value_name = "PATH")]
    pub brands: Option<PathBuf>,

    /// Output file (default: queries.json in the entries directory).
    #[arg(long, short, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

impl GenerateCommand {
    /// Executes the generate command.
    pub fn execute(self, config: &AppConfig) -> Result<()> {
        let templates_path = self
            .templates
            .unwrap_or_else(|| config.paths.templates_path());
        let brands_path = self.brands.unwrap_or_else(|| config.paths.brands_path());
        let output_path = self.output.unwrap_or_else(|| config.paths.queries_path());

        let templates = TemplateFile::load(&templates_path)?;
        let registry = BrandRegistry::load(&brands_path)?;

        let queries = generate_all_queries(&templates, &registry);
        let count = queries.len();
        QueryFile::new(&registry, queries).save(&output_path)?;

        println!("Generated {count} queries into {}", output_path.display());
        Ok(())
    }
}
