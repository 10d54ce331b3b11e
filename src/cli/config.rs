//! Configuration-related CLI commands.

use std::path::Path;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::data::to_yaml;
use crate::gateway::resolve_api_key;

/// Configuration operations.
#[derive(Parser)]
pub struct ConfigCommand {
    /// Configuration subcommand to execute.
    #[command(subcommand)]
    pub command: ConfigSubcommands,
}

/// Configuration subcommands.
#[derive(Subcommand)]
pub enum ConfigSubcommands {
    /// Shows the resolved configuration and which API keys are available.
    Show(ShowCommand),
}

/// Show command options.
#[derive(Parser)]
pub struct ShowCommand {}

impl ConfigCommand {
    /// Executes the config command.
    pub fn execute(self, config: &AppConfig, path: &Path) -> Result<()> {
        match self.command {
            ConfigSubcommands::Show(show_cmd) => show_cmd.execute(config, path),
        }
    }
}

/// One line per provider: its key variable and whether it resolves.
fn credential_report(config: &AppConfig) -> String {
    config
        .llm
        .providers
        .iter()
        .map(|(id, provider)| {
            let status = if resolve_api_key(id, &provider.api_key_env).is_ok() {
                "set"
            } else {
                "missing"
            };
            format!("  {id}: {} ({status})\n", provider.api_key_env)
        })
        .collect()
}

impl ShowCommand {
    /// Executes the show command.
    pub fn execute(self, config: &AppConfig, path: &Path) -> Result<()> {
        println!("# {}", path.display());
        println!("{}", to_yaml(config)?);
        println!("API keys:");
        print!("{}", credential_report(config));
        Ok(())
    }
}
