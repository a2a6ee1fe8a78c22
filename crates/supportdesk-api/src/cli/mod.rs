//! CLI command definitions for the `supportdesk` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod session;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Real-time customer support chat server.
#[derive(Parser)]
#[command(name = "supportdesk", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Data directory holding `supportdesk.toml` and `supportdesk.db`.
    #[arg(long, global = true, env = "SUPPORTDESK_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP and WebSocket server.
    Serve {
        /// Port to listen on (overrides `server.port`).
        #[arg(short, long, env = "SUPPORTDESK_PORT")]
        port: Option<u16>,

        /// Host to bind to (overrides `server.host`).
        #[arg(long, env = "SUPPORTDESK_HOST")]
        host: Option<String>,

        /// Keep sessions in memory only; nothing is written to disk.
        #[arg(long)]
        ephemeral: bool,

        /// Export tracing spans through OpenTelemetry (stdout exporter).
        #[arg(long)]
        otel: bool,
    },

    /// List persisted chat sessions.
    #[command(alias = "ls")]
    Sessions,

    /// Print one session's transcript.
    Show {
        /// Session id (the guest's client id).
        session_id: String,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}
