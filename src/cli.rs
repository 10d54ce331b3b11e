//! CLI interface for llm-seo-monitor.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::{AppConfig, DEFAULT_CONFIG_PATH};

pub mod analyze;
pub mod config;
pub mod enhance;
pub mod generate;
pub mod run;

/// llm-seo-monitor: measures how LLM answers mention a brand and its competitors.
#[derive(Parser)]
#[command(name = "llm-seo-monitor")]
#[command(about = "Measure brand mentions in LLM answers", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file.
    #[arg(long, global = true, value_name = "PATH", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Generates queries from templates.
    Generate(generate::GenerateCommand),
    /// Rephrases generated queries with an LLM.
    Enhance(enhance::EnhanceCommand),
    /// Runs queries against the LLM providers.
    Run(run::RunCommand),
    /// Analyses brand mentions in a run.
    Analyze(analyze::AnalyzeCommand),
    /// Configuration inspection.
    Config(config::ConfigCommand),
}

impl Cli {
    /// Loads the configuration and executes the command.
    pub async fn execute(self) -> Result<()> {
        let config = AppConfig::load_from_path(&self.config)?;

        match self.command {
            Commands::Generate(cmd) => cmd.execute(&config),
            Commands::Enhance(cmd) => cmd.execute(&config).await,
            Commands::Run(cmd) => cmd.execute(&config).await,
            Commands::Analyze(cmd) => cmd.execute(&config).await,
            Commands::Config(cmd) => cmd.execute(&config, &self.config),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn config_flag_is_global_with_default() {
        let cli = Cli::try_parse_from(["llm-seo-monitor", "analyze"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("config.yaml"));

        let cli =
            Cli::try_parse_from(["llm-seo-monitor", "run", "--config", "alt.yaml"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("alt.yaml"));
    }
}
