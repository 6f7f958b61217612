//! Outcome replay from JSON-lines files.
//!
//! Each non-blank line that does not start with `#` is one record:
//!
//! ```json
//! {"task": "Summarise this report", "provider": "openai", "success": true, "latency_ms": 850, "cost": 0.004}
//! ```
//!
//! Records are fed through the router's normal feedback path, so rejected
//! records (unknown provider, negative latency) are logged and counted
//! without stopping the replay.

use anyhow::{Context, Result};
use polyroute_core::{AdaptiveRouter, Outcome, TaskHints};
use serde::{Deserialize, Serialize};

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayRecord {
    pub task: String,
    pub provider: String,
    pub success: bool,
    pub latency_ms: f64,
    #[serde(default)]
    pub cost: f64,
}

/// Counts reported after a replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub applied: usize,
    pub rejected: usize,
}

/// Parse every record in `text`, failing on the first malformed line.
pub fn parse_records(text: &str) -> Result<Vec<ReplayRecord>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(idx, line)| {
            serde_json::from_str(line).with_context(|| format!("invalid replay record on line {}", idx + 1))
        })
        .collect()
}

/// Feed `records` into the router as outcomes.
pub fn apply(router: &AdaptiveRouter, records: &[ReplayRecord]) -> ReplaySummary {
    let hints = TaskHints::default();
    let mut summary = ReplaySummary::default();

    for record in records {
        let features = router.features(&record.task, &hints);
        let outcome = Outcome::new(
            record.provider.clone(),
            features,
            record.success,
            record.latency_ms,
            record.cost,
        );
        match router.feedback(outcome) {
            Ok(()) => summary.applied += 1,
            // Already logged by the router.
            Err(_) => summary.rejected += 1,
        }
    }

    tracing::info!(
        applied = summary.applied,
        rejected = summary.rejected,
        "replay finished"
    );
    summary
}
