//! Provider selection.
//!
//! For every available provider the engine computes a combined score:
//!
//! - **fuzzy**: the [`FuzzyScorer`] suitability score alone, used while a
//!   provider has fewer than `min_samples` retained history samples or when
//!   its mutual-information estimate is degenerate;
//! - **blended**: a weighted mix of the fuzzy score and the
//!   [`MutualInfoEstimator`] optimizer score once enough samples exist.
//!
//! Candidates are ranked by a total order (score desc, success rate desc,
//! average latency asc, id asc), so identical registry state always yields
//! the same decision.  Confidence grows with the gap to the runner-up.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::features::TaskFeatures;
use crate::fuzzy::FuzzyScorer;
use crate::history::TaskHistory;
use crate::mutual_info::MutualInfoEstimator;
use crate::provider::{Provider, clamp01};
use crate::registry::ProviderRegistry;

/// Confidence ceiling regardless of the score gap.
pub const MAX_CONFIDENCE: f64 = 0.95;
/// Default confidence when only one provider is available.
pub const SINGLE_PROVIDER_CONFIDENCE: f64 = 0.75;
/// Default maximum score deficit at which a preferred provider still wins.
pub const PREFERRED_PROVIDER_MARGIN: f64 = 0.10;
/// Default weight of the optimizer score in blended mode.
pub const MI_BLEND_WEIGHT: f64 = 0.5;
/// Number of runner-ups reported as fallbacks.
const FALLBACK_COUNT: usize = 2;

const COMPLEXITY_SIGNIFICANT: f64 = 0.7;
const CREATIVITY_SIGNIFICANT: f64 = 0.6;
const TECHNICAL_SIGNIFICANT: f64 = 0.6;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// How a provider's combined score was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    Fuzzy,
    Blended,
}

/// Score of one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub provider_id: String,
    pub score: f64,
    pub fuzzy: f64,
    /// Optimizer-mode score, present only in blended mode.
    pub optimizer: Option<f64>,
    pub mode: ScoringMode,
    success_rate: f64,
    avg_response_time_ms: f64,
}

/// The router's choice for one task.  Immutable once returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Time-ordered decision identifier (UUID v7).
    pub id: Uuid,
    pub provider_id: String,
    /// Combined score of the selected provider.
    pub score: f64,
    /// Combined score of every candidate.
    pub scores: BTreeMap<String, f64>,
    /// Scoring mode used for every candidate.
    pub modes: BTreeMap<String, ScoringMode>,
    pub confidence: f64,
    pub reasoning: String,
    /// Runner-ups in rank order.
    pub fallbacks: Vec<String>,
    /// Latency EMA of the selected provider at decision time.
    pub expected_latency_ms: f64,
    /// Cost EMA of the selected provider at decision time.
    pub expected_cost: f64,
    /// Features the decision was made on, needed again for feedback.
    pub features: TaskFeatures,
    pub timestamp: DateTime<Utc>,
}

/// Tuning knobs of the selection engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionSettings {
    pub blend_weight: f64,
    pub single_provider_confidence: f64,
    pub preferred_provider_margin: f64,
}

impl Default for SelectionSettings {
    fn default() -> Self {
        Self {
            blend_weight: MI_BLEND_WEIGHT,
            single_provider_confidence: SINGLE_PROVIDER_CONFIDENCE,
            preferred_provider_margin: PREFERRED_PROVIDER_MARGIN,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Ranks providers and builds [`Decision`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectionEngine {
    scorer: FuzzyScorer,
    estimator: MutualInfoEstimator,
    settings: SelectionSettings,
}

impl SelectionEngine {
    pub fn new(estimator: MutualInfoEstimator, settings: SelectionSettings) -> Self {
        Self {
            scorer: FuzzyScorer::new(),
            estimator,
            settings,
        }
    }

    /// Select a provider for `features`.
    ///
    /// `preferred` names a caller-preferred provider; it wins when available
    /// and within the preferred-provider margin of the best score.
    ///
    /// # Errors
    ///
    /// [`crate::RouterError::NoProviderAvailable`] when no provider is
    /// available.
    pub fn select(
        &self,
        features: &TaskFeatures,
        registry: &ProviderRegistry,
        history: &TaskHistory,
        preferred: Option<&str>,
    ) -> Result<Decision> {
        let candidates = registry.available_snapshots()?;
        let mut ranked = self.rank(features, &candidates, history);

        let mut preference_note = None;
        if let Some(wanted) = preferred {
            preference_note = Some(self.apply_preference(&mut ranked, wanted));
        }

        let winner = &ranked[0];
        let runner_up = ranked.get(1);
        let confidence = match runner_up {
            None => self.settings.single_provider_confidence,
            Some(second) => confidence_from_gap(winner.score - second.score),
        };

        let (expected_latency_ms, expected_cost) = candidates
            .iter()
            .find(|p| p.id == winner.provider_id)
            .map(|p| (p.avg_response_time_ms, p.avg_cost))
            .unwrap_or_default();

        let reasoning = reasoning_for(features, winner, confidence, preference_note.as_deref());

        Ok(Decision {
            id: Uuid::now_v7(),
            provider_id: winner.provider_id.clone(),
            score: winner.score,
            scores: ranked
                .iter()
                .map(|c| (c.provider_id.clone(), c.score))
                .collect(),
            modes: ranked.iter().map(|c| (c.provider_id.clone(), c.mode)).collect(),
            confidence,
            reasoning,
            fallbacks: ranked
                .iter()
                .skip(1)
                .take(FALLBACK_COUNT)
                .map(|c| c.provider_id.clone())
                .collect(),
            expected_latency_ms,
            expected_cost,
            features: features.clone(),
            timestamp: Utc::now(),
        })
    }

    /// Score and rank `candidates`, best first.
    pub fn rank(
        &self,
        features: &TaskFeatures,
        candidates: &[Provider],
        history: &TaskHistory,
    ) -> Vec<CandidateScore> {
        let mut ranked: Vec<CandidateScore> = candidates
            .iter()
            .map(|p| self.score_candidate(features, p, history))
            .collect();
        ranked.sort_by(compare_candidates);
        ranked
    }

    fn score_candidate(
        &self,
        features: &TaskFeatures,
        provider: &Provider,
        history: &TaskHistory,
    ) -> CandidateScore {
        let fuzzy = self.scorer.score(features, provider);
        let mut candidate = CandidateScore {
            provider_id: provider.id.clone(),
            score: fuzzy,
            fuzzy,
            optimizer: None,
            mode: ScoringMode::Fuzzy,
            success_rate: provider.success_rate,
            avg_response_time_ms: provider.avg_response_time_ms,
        };

        if history.count_for(&provider.id) < self.estimator.min_samples() {
            return candidate;
        }

        let samples = history.entries_for(&provider.id);
        match self.estimator.mutual_information(features, provider, &samples) {
            Ok(mi) => {
                let optimizer = self.estimator.optimizer_score(features, provider, mi).total;
                let w = self.settings.blend_weight;
                candidate.score = clamp01((1.0 - w) * fuzzy + w * optimizer);
                candidate.optimizer = Some(optimizer);
                candidate.mode = ScoringMode::Blended;
            }
            Err(e) => {
                tracing::debug!(provider_id = %provider.id, error = %e, "falling back to fuzzy-only scoring");
            }
        }

        tracing::debug!(
            provider_id = %provider.id,
            score = candidate.score,
            fuzzy,
            mode = ?candidate.mode,
            "candidate scored"
        );
        candidate
    }

    /// Move the preferred provider to the front if it is close enough to the
    /// best score.  Returns a note for the reasoning string.
    fn apply_preference(&self, ranked: &mut [CandidateScore], wanted: &str) -> String {
        let best = ranked[0].score;
        match ranked.iter().position(|c| c.provider_id == wanted) {
            Some(0) => format!("preferred provider {wanted} was already the best match"),
            Some(idx) if best - ranked[idx].score <= self.settings.preferred_provider_margin => {
                ranked[..=idx].rotate_right(1);
                format!("preferred provider {wanted} honoured within margin")
            }
            Some(_) => format!("preferred provider {wanted} ignored: score too far below best"),
            None => format!("preferred provider {wanted} ignored: not available"),
        }
    }
}

/// Total order used for ranking: score desc, success rate desc, latency asc,
/// id asc.
fn compare_candidates(a: &CandidateScore, b: &CandidateScore) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.success_rate.total_cmp(&a.success_rate))
        .then_with(|| a.avg_response_time_ms.total_cmp(&b.avg_response_time_ms))
        .then_with(|| a.provider_id.cmp(&b.provider_id))
}

/// `min(0.95, 0.5 + 2 * gap)`, floored at `0`.
pub fn confidence_from_gap(gap: f64) -> f64 {
    clamp01(0.5 + 2.0 * gap).min(MAX_CONFIDENCE)
}

fn reasoning_for(
    features: &TaskFeatures,
    winner: &CandidateScore,
    confidence: f64,
    preference_note: Option<&str>,
) -> String {
    let mut signals = Vec::new();
    if features.complexity > COMPLEXITY_SIGNIFICANT {
        signals.push(format!("high complexity ({:.2})", features.complexity));
    }
    if features.creativity_required > CREATIVITY_SIGNIFICANT {
        signals.push(format!("creative task ({:.2})", features.creativity_required));
    }
    if features.technical_depth > TECHNICAL_SIGNIFICANT {
        signals.push(format!("technical depth ({:.2})", features.technical_depth));
    }
    let signals = if signals.is_empty() {
        "no dominant task dimension".to_string()
    } else {
        signals.join(", ")
    };

    let mode = match winner.mode {
        ScoringMode::Fuzzy => "fuzzy rules",
        ScoringMode::Blended => "fuzzy rules blended with outcome history",
    };

    let mut reasoning = format!(
        "Selected {} for {} task: {}; score {:.3} via {}, confidence {:.2}",
        winner.provider_id, features.domain, signals, winner.score, mode, confidence
    );
    if let Some(note) = preference_note {
        reasoning.push_str("; ");
        reasoning.push_str(note);
    }
    reasoning
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RouterError;
    use crate::provider::Capabilities;

    fn provider(id: &str, caps: Capabilities) -> Provider {
        let mut p = Provider::new(id, caps);
        p.avg_response_time_ms = 500.0;
        p
    }

    fn creative_task() -> TaskFeatures {
        TaskFeatures {
            creativity_required: 1.0,
            complexity: 0.8,
            ..TaskFeatures::floor()
        }
    }

    fn engine() -> SelectionEngine {
        SelectionEngine::default()
    }

    #[test]
    fn single_provider_gets_fixed_confidence() {
        let registry = ProviderRegistry::new();
        registry.register(provider("only", Capabilities::default())).unwrap();

        let d = engine()
            .select(&creative_task(), &registry, &TaskHistory::new(16), None)
            .unwrap();
        assert_eq!(d.provider_id, "only");
        assert_eq!(d.confidence, SINGLE_PROVIDER_CONFIDENCE);
        assert!(d.fallbacks.is_empty());
    }

    #[test]
    fn no_available_provider_fails() {
        let registry = ProviderRegistry::new();
        let mut p = provider("off", Capabilities::default());
        p.available = false;
        registry.register(p).unwrap();

        let err = engine()
            .select(&creative_task(), &registry, &TaskHistory::new(16), None)
            .unwrap_err();
        assert!(matches!(err, RouterError::NoProviderAvailable { .. }));
    }

    #[test]
    fn best_capability_wins() {
        let registry = ProviderRegistry::new();
        let poet = Capabilities {
            creativity: 0.95,
            ..Capabilities::default()
        };
        let clerk = Capabilities {
            creativity: 0.2,
            ..Capabilities::default()
        };
        registry.register(provider("poet", poet)).unwrap();
        registry.register(provider("clerk", clerk)).unwrap();

        let d = engine()
            .select(&creative_task(), &registry, &TaskHistory::new(16), None)
            .unwrap();
        assert_eq!(d.provider_id, "poet");
        assert_eq!(d.fallbacks, vec!["clerk".to_string()]);
        assert!(d.confidence > 0.5 && d.confidence <= MAX_CONFIDENCE);
        assert_eq!(d.scores.len(), 2);
        assert_eq!(d.modes["poet"], ScoringMode::Fuzzy);
        assert!(d.reasoning.contains("poet"));
        assert!(d.reasoning.contains("high complexity"));
    }

    #[test]
    fn ties_break_on_success_rate_then_latency_then_id() {
        let registry = ProviderRegistry::new();
        let mut a = provider("a", Capabilities::default());
        let mut b = provider("b", Capabilities::default());
        let c = provider("c", Capabilities::default());
        // Same fuzzy score for all three on a floor task (0).
        a.success_rate = 0.8;
        b.success_rate = 0.9;
        a.avg_response_time_ms = 100.0;
        registry.register(a).unwrap();
        registry.register(b).unwrap();
        registry.register(c).unwrap();

        let history = TaskHistory::new(16);
        let ranked = engine().rank(
            &TaskFeatures::floor(),
            &registry.available_snapshots().unwrap(),
            &history,
        );
        let ids: Vec<_> = ranked.iter().map(|c| c.provider_id.as_str()).collect();
        // b has the best success rate; a beats c on latency.
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn equal_providers_break_on_id() {
        let registry = ProviderRegistry::new();
        registry.register(provider("zeta", Capabilities::default())).unwrap();
        registry.register(provider("alpha", Capabilities::default())).unwrap();

        let d = engine()
            .select(&creative_task(), &registry, &TaskHistory::new(16), None)
            .unwrap();
        assert_eq!(d.provider_id, "alpha");
        assert_eq!(d.confidence, 0.5);
    }

    #[test]
    fn preferred_provider_within_margin_wins() {
        let registry = ProviderRegistry::new();
        let strong = Capabilities {
            creativity: 0.9,
            ..Capabilities::default()
        };
        let close = Capabilities {
            creativity: 0.85,
            ..Capabilities::default()
        };
        registry.register(provider("strong", strong)).unwrap();
        registry.register(provider("close", close)).unwrap();

        let d = engine()
            .select(&creative_task(), &registry, &TaskHistory::new(16), Some("close"))
            .unwrap();
        assert_eq!(d.provider_id, "close");
        assert!(d.reasoning.contains("honoured"));
        assert_eq!(d.fallbacks, vec!["strong".to_string()]);
    }

    #[test]
    fn preferred_provider_far_below_is_ignored() {
        let registry = ProviderRegistry::new();
        let strong = Capabilities {
            creativity: 1.0,
            reasoning: 1.0,
            ..Capabilities::default()
        };
        let weak = Capabilities {
            creativity: 0.0,
            reasoning: 0.0,
            ..Capabilities::default()
        };
        registry.register(provider("strong", strong)).unwrap();
        registry.register(provider("weak", weak)).unwrap();

        let d = engine()
            .select(&creative_task(), &registry, &TaskHistory::new(16), Some("weak"))
            .unwrap();
        assert_eq!(d.provider_id, "strong");
        assert!(d.reasoning.contains("ignored"));

        let d = engine()
            .select(&creative_task(), &registry, &TaskHistory::new(16), Some("ghost"))
            .unwrap();
        assert!(d.reasoning.contains("not available"));
    }

    #[test]
    fn confidence_is_monotonic_in_gap() {
        let mut last = confidence_from_gap(-1.0);
        for step in 0..=100 {
            let c = confidence_from_gap(f64::from(step) / 100.0);
            assert!(c >= last);
            last = c;
        }
        assert_eq!(confidence_from_gap(0.0), 0.5);
        assert_eq!(confidence_from_gap(1.0), MAX_CONFIDENCE);
    }

    #[test]
    fn selection_is_deterministic() {
        let registry = ProviderRegistry::new();
        registry.register(provider("a", Capabilities::default())).unwrap();
        let strong = Capabilities {
            creativity: 0.7,
            ..Capabilities::default()
        };
        registry.register(provider("b", strong)).unwrap();

        let history = TaskHistory::new(16);
        let first = engine().select(&creative_task(), &registry, &history, None).unwrap();
        let second = engine().select(&creative_task(), &registry, &history, None).unwrap();
        assert_eq!(first.provider_id, second.provider_id);
        assert_eq!(first.score, second.score);
        assert_eq!(first.scores, second.scores);
    }
}
