use std::process;

use clap::Parser;
use llm_seo_monitor::Cli;

#[tokio::main]
async fn main() {
    // API keys may live in a .env file next to config.yaml
    let _ = dotenvy::dotenv();

    // Logs go to stderr so they never mix with the summary on stdout.
    // RUST_LOG overrides the default "warn" level.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = cli.execute().await {
        eprintln!("Error: {e}");

        let mut source = e.source();
        while let Some(err) = source {
            eprintln!("  Caused by: {err}");
            source = err.source();
        }

        process::exit(1);
    }
}
