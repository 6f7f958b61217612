//! Shared helper functions used across CLI subcommands.
//!
//! Includes tracing initialization, configuration loading, router
//! construction and environment variable utilities.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use polyroute_core::{AdaptiveRouter, ProviderSnapshot, RouterConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
///
/// Logs go to stderr so that JSON written to stdout stays machine-readable.
pub fn init_tracing(default_level: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

// ---------------------------------------------------------------------------
// Router construction
// ---------------------------------------------------------------------------

/// Load the configuration file, or fall back to the builtin catalog.
pub fn load_config(path: Option<&Path>) -> Result<RouterConfig> {
    match path {
        Some(path) => RouterConfig::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        None => {
            info!("no configuration file given, using the builtin provider catalog");
            Ok(RouterConfig::builtin())
        }
    }
}

/// Build the router, marking providers available by API-key presence.
pub fn build_router(config: &RouterConfig) -> Result<AdaptiveRouter> {
    AdaptiveRouter::from_config(config, env_non_empty).context("failed to build router")
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Render provider snapshots as a fixed-width table.
pub fn providers_table(providers: &[ProviderSnapshot]) -> String {
    let width = providers
        .iter()
        .map(|p| p.id.len())
        .max()
        .unwrap_or(0)
        .max("PROVIDER".len());

    let mut out = format!(
        "{:<width$}  {:<9}  {:>5}  {:>10}  {:>7}  {:>6}\n",
        "PROVIDER", "AVAILABLE", "LOAD", "LATENCY_MS", "SUCCESS", "TASKS"
    );
    for p in providers {
        let _ = writeln!(
            out,
            "{:<width$}  {:<9}  {:>5.2}  {:>10.0}  {:>7.3}  {:>6}",
            p.id,
            if p.available { "yes" } else { "no" },
            p.current_load,
            p.avg_response_time_ms,
            p.success_rate,
            p.total_tasks,
        );
    }
    out
}

// ---------------------------------------------------------------------------
// Environment helpers
// ---------------------------------------------------------------------------

/// Return the value of an environment variable if it is set and non-empty.
pub fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
