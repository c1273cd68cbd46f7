//! CLI module for the PortOps assistant.
//!
//! Provides command-line interface parsing and command dispatch.

pub mod args;
pub mod commands;

pub use args::{Cli, Commands};
pub use commands::ExitCode;
