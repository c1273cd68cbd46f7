//! CLI argument parsing using clap.
//!
//! Contains the Cli struct and the Commands enum.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

const QUICK_START: &str = "Quick Start:
  $ portops init                          # Write .portops/settings.toml
  $ portops ingest                        # Index every SOP under paths.raw_docs
  $ portops retrieve \"reefer plug-in\"     # Show the nearest snippets
  $ portops chat                          # Ask questions grounded in the SOPs";

/// Port-operations SOP assistant
#[derive(Parser)]
#[command(
    name = "portops",
    version = env!("CARGO_PKG_VERSION"),
    about = "Retrieval-augmented assistant for port-operations SOPs",
    long_about = "Ingest SOP documents into a vector index and answer questions grounded in them.",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = QUICK_START
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Initialize project
    #[command(about = "Set up .portops directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Ingest documents into the vector store
    #[command(
        about = "Chunk, embed and store every document in paths.raw_docs",
        after_help = "Supported formats: .pdf .docx .txt .md\n\nExit codes:\n  0  success (failed files are reported)\n  1  configuration or store error\n  2  some files failed and --fail-on-error was given"
    )]
    Ingest {
        /// Exit with status 2 when any document failed
        #[arg(long)]
        fail_on_error: bool,

        /// Disable the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Retrieve the snippets nearest to a query
    #[command(
        about = "Show the SOP snippets nearest to a query",
        after_help = "Examples:\n  portops retrieve \"gate-in seal check\"\n  portops retrieve \"hazardous cargo\" -k 8 --json"
    )]
    Retrieve {
        /// Free-text query
        query: String,

        /// Number of snippets (defaults to retrieval.top_k)
        #[arg(short)]
        k: Option<usize>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Interactive chat
    #[command(
        about = "Chat with answers grounded in the ingested SOPs",
        after_help = "Commands inside the chat:\n  /clear       clear the history\n  /rag on|off  toggle retrieval\n  /quit        leave (Ctrl-D works too)"
    )]
    Chat {
        /// Start with retrieval disabled
        #[arg(long)]
        no_rag: bool,
    },

    /// Show current configuration settings
    #[command(about = "Display active settings from .portops/settings.toml")]
    Config,
}
