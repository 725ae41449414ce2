//! `strata` binary: loads configuration, sets up logging and runs one
//! command.

use std::process::ExitCode;

use clap::Parser;
use strata_cli::{config, resolve_config_path, run, Cli, DEFAULT_CONFIG_PATH};
use strata_db::SchemaRegistry;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let (resolved_config_path, config_source) = resolve_config_path(cli.config.as_deref());
    let selected_config_path = resolved_config_path
        .as_deref()
        .unwrap_or(DEFAULT_CONFIG_PATH);

    let config = match config::load_config(Some(selected_config_path)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Logs go to stderr so command output on stdout stays exact.
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("warn"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    tracing::debug!(
        source = config_source,
        path = selected_config_path,
        "resolved configuration path"
    );

    let mut stdout = std::io::stdout().lock();
    match run(cli.command, &config, SchemaRegistry::new(), &mut stdout).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
