//! Init and Config commands.

use std::path::Path;

use super::ExitCode;
use crate::config::{ConfigError, Settings};

/// Run init command - create configuration file.
pub fn run_init(force: bool) -> ExitCode {
    match Settings::init_config_file(Path::new("."), force) {
        Ok(path) => {
            println!("Created configuration file at: {}", path.display());
            println!("Edit this file to customize your settings.");
            ExitCode::Success
        }
        Err(ConfigError::AlreadyExists(path)) => {
            eprintln!("Configuration file already exists at: {}", path.display());
            eprintln!("Use --force to overwrite");
            ExitCode::GeneralError
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::GeneralError
        }
    }
}

/// Run config command - display current configuration.
pub fn run_config(config: &Settings) -> ExitCode {
    println!("Current Configuration:");
    println!("{}", "=".repeat(50));
    match toml::to_string_pretty(config) {
        Ok(toml_str) => {
            println!("{toml_str}");
            ExitCode::Success
        }
        Err(e) => {
            eprintln!("Error displaying config: {e}");
            ExitCode::GeneralError
        }
    }
}
