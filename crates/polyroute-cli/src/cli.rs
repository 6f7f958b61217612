//! CLI argument definitions for polyroute.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// polyroute -- adaptive multi-provider request router.
#[derive(Parser)]
#[command(
    name = "polyroute",
    version,
    about = "polyroute -- adaptive multi-provider request router",
    long_about = "Routes tasks to the best-suited AI provider using fuzzy capability scoring \
                  and learns from recorded outcomes. Providers become available when their \
                  API-key environment variable is set (a .env file is honoured)."
)]
pub struct Cli {
    /// Router configuration file (TOML).  The builtin catalog is used when
    /// omitted.
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Default log level when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Route a task and print the decision as JSON.
    Route {
        /// The task text.
        text: String,

        /// Domain override: technical, analytical, creative, factual or
        /// conversational.
        #[arg(long)]
        domain: Option<String>,

        /// Preferred provider id.
        #[arg(long)]
        prefer: Option<String>,

        /// Priority override: low, normal, high or critical.
        #[arg(long)]
        priority: Option<String>,
    },

    /// List configured providers.
    Providers {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Print aggregate statistics as JSON.
    Stats,

    /// Replay recorded outcomes from a JSON-lines file, then print stats.
    Replay {
        /// File with one `{task, provider, success, latency_ms, cost}` object
        /// per line.
        file: PathBuf,

        /// Route this task after the replay and print the decision.
        #[arg(long)]
        then: Option<String>,
    },
}
