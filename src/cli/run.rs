//! `run` command.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::config::AppConfig;
use crate::gateway::{Gateway, RunMode};
use crate::runner::{filter_queries, load_queries, QueryFilter, QueryOutcome, QueryRunner, Resume};
use crate::store::{FsRunStore, RunId};

const LATEST: &str = "latest";

/// Asks every query and stores the answers as a new (or resumed) run.
#[derive(Parser)]
pub struct RunCommand {
    /// Skip queries with a lower id.
    #[arg(long)]
    pub start: Option<u64>,

    /// Run at most this many queries.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Run only these ids (comma separated); overrides --start and --limit.
    #[arg(long, value_delimiter = ',')]
    pub ids: Option<Vec<u64>>,

    /// Continue a run, skipping answered queries (default: the most recent run).
    #[arg(long, value_name = "RUN", num_args = 0..=1, default_missing_value = LATEST)]
    pub resume: Option<String>,

    /// Ask only this provider (openai/gpt, anthropic/claude, google/gemini, or all).
    #[arg(long)]
    pub provider: Option<String>,

    /// Query source (default: queries.json in the entries directory).
    #[arg(long, value_name = "PATH")]
    pub queries: Option<PathBuf>,
}

impl RunCommand {
    fn resume(&self) -> Resume {
        match self.resume.as_deref() {
            None => Resume::Fresh,
            Some(LATEST) => Resume::Latest,
            Some(name) => Resume::Named(RunId::new(name)),
        }
    }

    fn filter(&self) -> QueryFilter {
        QueryFilter {
            start: self.start,
            limit: self.limit,
            ids: self.ids.clone(),
        }
    }

    /// Executes the run command.
    pub async fn execute(self, config: &AppConfig) -> Result<()> {
        let source = self
            .queries
            .clone()
            .unwrap_or_else(|| config.paths.queries_path());
        let queries = filter_queries(&load_queries(&source), &self.filter());
        if queries.is_empty() {
            println!("No queries to run from {}", source.display());
            return Ok(());
        }

        let mode = RunMode::from_provider_arg(self.provider.as_deref());
        let gateway = Gateway::from_config(config, &mode)?;
        let runner = QueryRunner::new(
            gateway,
            Box::new(FsRunStore::new(&config.paths.results_dir)),
        );
        let active = runner.start_run(&self.resume())?;

        println!(
            "Running {} queries against {mode} into {}",
            queries.len(),
            runner.store().run_location(&active.run).display()
        );

        let report = runner
            .run_queries(&active, &queries, &mode, |query, outcome| match outcome {
                QueryOutcome::Saved { path, .. } => {
                    println!("Query {} saved to {}", query.id, path.display());
                }
                QueryOutcome::Skipped => println!("Query {} already answered, skipped", query.id),
                QueryOutcome::WriteFailed { .. } => {
                    println!("Query {} could not be saved", query.id);
                }
            })
            .await;

        println!(
            "\nRun {}: {} saved, {} skipped, {} failed writes, {} missing provider answers",
            active.run, report.saved, report.skipped, report.failed_writes, report.absent_slots
        );
        Ok(())
    }
}
