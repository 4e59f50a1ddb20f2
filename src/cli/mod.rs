//! Command-line interface for the `smriti-server` binary.
//!
//! Uses clap for argument parsing and owo-colors for terminal output.

pub mod init;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Smriti - memory-augmented chat server
///
/// Answers chat queries grounded in each user's long-term memory and
/// keeps that memory current from the conversation.
#[derive(Parser, Debug)]
#[command(
    name = "smriti-server",
    version,
    about = "Smriti - memory-augmented chat server",
    after_help = "EXAMPLES:\n    \
                  smriti-server init                # Write smriti.toml and .env.example\n    \
                  smriti-server init --offline      # Local Ollama, in-process index\n    \
                  smriti-server                     # Start the server (requires smriti.toml)\n    \
                  smriti-server forget alice        # Delete everything remembered about alice"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "smriti.toml", global = true)]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scaffold smriti.toml and .env.example
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite an existing smriti.toml
        #[arg(short, long)]
        force: bool,

        /// Configure Ollama, the in-process index and the rule classifier
        #[arg(long)]
        offline: bool,

        /// Host address for the server
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port for the server
        #[arg(long, default_value = "8000")]
        port: u16,
    },

    /// Show the effective configuration
    Config {
        /// Only validate, do not print
        #[arg(long)]
        validate: bool,
    },

    /// Delete a user's memory index
    Forget {
        /// User whose memory should be deleted
        user_id: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
