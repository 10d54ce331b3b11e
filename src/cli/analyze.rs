//! `analyze` command.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::analysis::{
    analyze_answers_chunked, load_answers, render_summary, save_analysis, summarize,
    BrandRegistry,
};
use crate::config::AppConfig;
use crate::store::{FsRunStore, RunId};

/// Detects brand mentions in a run's answers and prints a summary.
#[derive(Parser)]
pub struct AnalyzeCommand {
    /// Run to analyse (default: the most recent run).
    #[arg(long, value_name = "RUN")]
    pub run: Option<String>,

    /// Brand registry (default: brands.json in the entries directory).
    #[arg(long, value_name = "PATH")]
    pub brands: Option<PathBuf>,
}

impl AnalyzeCommand {
    /// Executes the analyze command.
    pub async fn execute(self, config: &AppConfig) -> Result<()> {
        let brands_path = self.brands.unwrap_or_else(|| config.paths.brands_path());
        let registry = BrandRegistry::load(&brands_path)?;

        let store = FsRunStore::new(&config.paths.results_dir);
        let requested = self.run.map(RunId::new);
        let (run, answers) = load_answers(&store, requested.as_ref())?;

        let records =
            analyze_answers_chunked(answers, &registry, config.query_runner.analysis_chunk_size)
                .await?;
        let path = save_analysis(&store, &run, &records)?;

        println!("Analysis saved to {}", path.display());
        println!("\n{}", render_summary(&summarize(&records)));
        Ok(())
    }
}
