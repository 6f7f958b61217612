//! Fuzzy-rule suitability scoring.
//!
//! Scores how well one provider fits one task by evaluating a fixed set of
//! weighted rules, each pairing a task membership degree with a provider
//! capability:
//!
//! | Rule | Antecedent                 | Capability        | Weight |
//! |------|----------------------------|-------------------|--------|
//! | 1    | `high(complexity)`         | `reasoning`       | 0.30   |
//! | 2    | `creativity_required`      | `creativity`      | 0.25   |
//! | 3    | `technical_depth`          | `code_generation` | 0.25   |
//! | 4    | `high(urgency)`            | `speed`           | 0.20   |
//! | 5    | `analysis_intensive`       | `analysis`        | 0.25   |
//!
//! The weights add up to 1.25.  The raw sum is kept as is and clamped only
//! after the load and latency penalties are applied.

use serde::{Deserialize, Serialize};

use crate::features::TaskFeatures;
use crate::provider::{Provider, clamp01};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Complexity below which a task is fully "low complexity".
pub const COMPLEXITY_LOW_THRESHOLD: f64 = 0.3;
/// Complexity above which a task starts being "high complexity".
pub const COMPLEXITY_HIGH_THRESHOLD: f64 = 0.6;
/// Urgency below which a task is fully "low urgency".
pub const SPEED_LOW_THRESHOLD: f64 = 0.4;
/// Urgency above which a task starts needing a fast provider.
pub const SPEED_HIGH_THRESHOLD: f64 = 0.7;

pub const REASONING_RULE_WEIGHT: f64 = 0.30;
pub const CREATIVITY_RULE_WEIGHT: f64 = 0.25;
pub const TECHNICAL_RULE_WEIGHT: f64 = 0.25;
pub const SPEED_RULE_WEIGHT: f64 = 0.20;
pub const ANALYSIS_RULE_WEIGHT: f64 = 0.25;

/// Fraction of the raw score removed at full load.
pub const LOAD_PENALTY_FACTOR: f64 = 0.2;
/// Latency (ms) that maps to a response penalty of `1.0` before capping.
pub const RESPONSE_TIME_SCALE_MS: f64 = 10_000.0;
/// Upper bound on the response-time penalty.
pub const MAX_RESPONSE_PENALTY: f64 = 0.3;

// ---------------------------------------------------------------------------
// Membership functions
// ---------------------------------------------------------------------------

/// Degree to which `x` is "low" given the cut-off `t_low`.
pub fn low(x: f64, t_low: f64) -> f64 {
    clamp01((t_low - x) / t_low)
}

/// Triangular "medium" membership peaking at `0.5`.
pub fn medium(x: f64) -> f64 {
    clamp01(if x < 0.5 { x / 0.5 } else { (1.0 - x) / 0.5 })
}

/// Degree to which `x` is "high" given the cut-off `t_high`.
pub fn high(x: f64, t_high: f64) -> f64 {
    clamp01((x - t_high) / (1.0 - t_high))
}

/// Low/medium/high membership degrees of a single input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Memberships {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl Memberships {
    fn of(x: f64, t_low: f64, t_high: f64) -> Self {
        Self {
            low: low(x, t_low),
            medium: medium(x),
            high: high(x, t_high),
        }
    }
}

// ---------------------------------------------------------------------------
// Scorer
// ---------------------------------------------------------------------------

/// Every intermediate value of one fuzzy evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub complexity: Memberships,
    pub urgency: Memberships,
    pub reasoning_rule: f64,
    pub creativity_rule: f64,
    pub technical_rule: f64,
    pub speed_rule: f64,
    pub analysis_rule: f64,
    /// Weighted rule sum before penalties; may exceed `1.0`.
    pub raw: f64,
    pub load_penalty: f64,
    pub response_penalty: f64,
    /// Final score in `[0, 1]`.
    pub total: f64,
}

/// Stateless fuzzy scorer.
///
/// Pure and O(1): safe to call from any thread without synchronisation.
#[derive(Debug, Clone, Copy, Default)]
pub struct FuzzyScorer;

impl FuzzyScorer {
    pub fn new() -> Self {
        Self
    }

    /// Suitability of `provider` for `features`, in `[0, 1]`.
    ///
    /// Malformed provider data (non-finite or out-of-range values) scores `0`
    /// so that one bad entry cannot block routing to the others.
    pub fn score(&self, features: &TaskFeatures, provider: &Provider) -> f64 {
        self.breakdown(features, provider).total
    }

    /// Evaluate every rule and penalty, keeping the intermediate values.
    pub fn breakdown(&self, features: &TaskFeatures, provider: &Provider) -> ScoreBreakdown {
        let complexity = Memberships::of(
            clamp01(features.complexity),
            COMPLEXITY_LOW_THRESHOLD,
            COMPLEXITY_HIGH_THRESHOLD,
        );
        let urgency = Memberships::of(
            clamp01(features.urgency),
            SPEED_LOW_THRESHOLD,
            SPEED_HIGH_THRESHOLD,
        );

        if !provider_is_scorable(provider) {
            tracing::debug!(provider_id = %provider.id, "malformed provider data, scoring 0");
            return ScoreBreakdown {
                complexity,
                urgency,
                reasoning_rule: 0.0,
                creativity_rule: 0.0,
                technical_rule: 0.0,
                speed_rule: 0.0,
                analysis_rule: 0.0,
                raw: 0.0,
                load_penalty: 0.0,
                response_penalty: 0.0,
                total: 0.0,
            };
        }

        let caps = &provider.capabilities;
        let reasoning_rule = complexity.high * caps.reasoning;
        let creativity_rule = clamp01(features.creativity_required) * caps.creativity;
        let technical_rule = clamp01(features.technical_depth) * caps.code_generation;
        let speed_rule = urgency.high * caps.speed;
        let analysis_rule = clamp01(features.analysis_intensive) * caps.analysis;

        let raw = reasoning_rule * REASONING_RULE_WEIGHT
            + creativity_rule * CREATIVITY_RULE_WEIGHT
            + technical_rule * TECHNICAL_RULE_WEIGHT
            + speed_rule * SPEED_RULE_WEIGHT
            + analysis_rule * ANALYSIS_RULE_WEIGHT;

        let load_penalty = provider.current_load * LOAD_PENALTY_FACTOR;
        let response_penalty =
            (provider.avg_response_time_ms / RESPONSE_TIME_SCALE_MS).min(MAX_RESPONSE_PENALTY);
        let total = clamp01(raw * (1.0 - load_penalty - response_penalty));

        let breakdown = ScoreBreakdown {
            complexity,
            urgency,
            reasoning_rule,
            creativity_rule,
            technical_rule,
            speed_rule,
            analysis_rule,
            raw,
            load_penalty,
            response_penalty,
            total,
        };
        tracing::trace!(provider_id = %provider.id, ?breakdown, "fuzzy breakdown");
        breakdown
    }
}

fn provider_is_scorable(provider: &Provider) -> bool {
    provider.capabilities.is_well_formed()
        && crate::provider::is_unit(provider.current_load)
        && provider.avg_response_time_ms.is_finite()
        && provider.avg_response_time_ms >= 0.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
