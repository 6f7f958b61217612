//! CLI entry point for polyroute.
//!
//! This binary provides the `polyroute` command: route a task, inspect the
//! provider catalog, print statistics, or replay recorded outcomes.

mod cli;
mod helpers;
mod replay;

use anyhow::{Context, Result};
use clap::Parser;
use polyroute_core::{AdaptiveRouter, Domain, Priority, TaskHints};
use serde::Serialize;

use crate::cli::{Cli, Commands};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; keys may come from the real environment.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    helpers::init_tracing(&cli.log_level, cli.log_json);

    let config = helpers::load_config(cli.config.as_deref())?;
    let router = helpers::build_router(&config)?;

    match cli.command {
        Commands::Route {
            text,
            domain,
            prefer,
            priority,
        } => cmd_route(&router, &text, domain, prefer, priority),
        Commands::Providers { json } => cmd_providers(&router, json),
        Commands::Stats => print_json(&router.stats()),
        Commands::Replay { file, then } => cmd_replay(&router, &file, then),
    }
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

fn cmd_route(
    router: &AdaptiveRouter,
    text: &str,
    domain: Option<String>,
    prefer: Option<String>,
    priority: Option<String>,
) -> Result<()> {
    let hints = TaskHints {
        domain: domain
            .map(|d| d.parse::<Domain>())
            .transpose()
            .context("invalid --domain")?,
        preferred_provider: prefer,
        priority: priority
            .map(|p| p.parse::<Priority>())
            .transpose()
            .context("invalid --priority")?,
        urgency_context: None,
    };

    let decision = router.route(text, &hints).context("routing failed")?;
    print_json(&decision)
}

fn cmd_providers(router: &AdaptiveRouter, json: bool) -> Result<()> {
    let providers = router.list_providers();
    if json {
        print_json(&providers)
    } else {
        print!("{}", helpers::providers_table(&providers));
        Ok(())
    }
}

fn cmd_replay(router: &AdaptiveRouter, file: &std::path::Path, then: Option<String>) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read replay file {}", file.display()))?;
    let records = replay::parse_records(&text)?;
    let summary = replay::apply(router, &records);

    #[derive(Serialize)]
    struct Report<'a> {
        replay: replay::ReplaySummary,
        stats: polyroute_core::Stats,
        decision: Option<&'a polyroute_core::Decision>,
    }

    let decision = match then {
        Some(task) => Some(
            router
                .route(&task, &TaskHints::default())
                .context("routing after replay failed")?,
        ),
        None => None,
    };

    print_json(&Report {
        replay: summary,
        stats: router.stats(),
        decision: decision.as_ref(),
    })
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{out}");
    Ok(())
}
