//! PortOps CLI entry point.

use clap::Parser;
use portops::cli::commands::{chat, ingest, init, retrieve};
use portops::cli::{Cli, Commands, ExitCode};
use portops::config::{ConfigError, Settings};
use portops::logging;

fn main() {
    let cli = Cli::parse();

    if let Commands::Init { force } = cli.command {
        logging::init();
        std::process::exit(init::run_init(force).code());
    }

    let config = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(ExitCode::GeneralError.code());
        }
    };

    logging::init_with_config(&config.logging);
    config.log_warnings();

    let code = match cli.command {
        Commands::Init { .. } => ExitCode::Success,
        Commands::Ingest {
            fail_on_error,
            no_progress,
        } => ingest::run(&config, fail_on_error, no_progress),
        Commands::Retrieve { query, k, json } => retrieve::run(&config, &query, k, json),
        Commands::Chat { no_rag } => chat::run(&config, no_rag),
        Commands::Config => init::run_config(&config),
    };

    std::process::exit(code.code());
}

/// `--config` if given, else the workspace settings file. A missing file is
/// an error; `portops init` is the only command that runs without one.
fn load_settings(cli: &Cli) -> Result<Settings, ConfigError> {
    match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
}
