//! Feedback recorder: online learning from invocation outcomes.
//!
//! Every accepted [`Outcome`] folds into its provider's statistics as an
//! exponential moving average `new = (1 - α) · old + α · sample`, then lands
//! in the bounded [`TaskHistory`] for the mutual-information estimator.
//!
//! The update is staged on a copy of the provider while the registry holds
//! its entry lock and committed only if every value is valid, so a rejected
//! outcome never leaves a partial mutation behind.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, RouterError};
use crate::features::TaskFeatures;
use crate::history::{HistoryEntry, TaskHistory};
use crate::mutual_info::provider_vector;
use crate::provider::{Provider, clamp01};
use crate::registry::ProviderRegistry;

/// Default EMA weight for success, cost, expertise and complexity handling.
pub const DEFAULT_LEARNING_RATE: f64 = 0.1;
/// Default EMA weight for response time.
pub const DEFAULT_LATENCY_LEARNING_RATE: f64 = 0.2;
/// Complexity above which an outcome also trains `complexity_handling`.
pub const COMPLEXITY_LEARNING_THRESHOLD: f64 = 0.7;

/// Post-hoc result of invoking the selected provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub provider_id: String,
    /// Features of the task that was served.
    pub features: TaskFeatures,
    pub success: bool,
    pub latency_ms: f64,
    pub cost: f64,
    /// Decision this outcome answers, if it came from [`crate::AdaptiveRouter::route`].
    #[serde(default)]
    pub decision_id: Option<Uuid>,
}

impl Outcome {
    pub fn new(
        provider_id: impl Into<String>,
        features: TaskFeatures,
        success: bool,
        latency_ms: f64,
        cost: f64,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            features,
            success,
            latency_ms,
            cost,
            decision_id: None,
        }
    }

    /// Attach the id of the decision this outcome answers.
    pub fn for_decision(mut self, decision_id: Uuid) -> Self {
        self.decision_id = Some(decision_id);
        self
    }

    fn check(&self) -> Result<()> {
        let invalid = |reason: String| RouterError::InvalidOutcome {
            provider_id: self.provider_id.clone(),
            reason,
        };
        if !self.latency_ms.is_finite() || self.latency_ms < 0.0 {
            return Err(invalid(format!("latency {} ms is not a finite, non-negative number", self.latency_ms)));
        }
        if !self.cost.is_finite() || self.cost < 0.0 {
            return Err(invalid(format!("cost {} is not a finite, non-negative number", self.cost)));
        }
        Ok(())
    }
}

/// Learning rates used by the recorder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LearningRates {
    pub stats: f64,
    pub latency: f64,
}

impl Default for LearningRates {
    fn default() -> Self {
        Self {
            stats: DEFAULT_LEARNING_RATE,
            latency: DEFAULT_LATENCY_LEARNING_RATE,
        }
    }
}

fn ema(old: f64, sample: f64, alpha: f64) -> f64 {
    (1.0 - alpha) * old + alpha * sample
}

/// Folds outcomes into provider statistics and the task history.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedbackRecorder {
    rates: LearningRates,
}

impl FeedbackRecorder {
    pub fn new(rates: LearningRates) -> Self {
        Self { rates }
    }

    pub fn rates(&self) -> LearningRates {
        self.rates
    }

    /// Apply `outcome` to its provider and append it to `history`.
    ///
    /// Returns the provider state after the update.
    ///
    /// # Errors
    ///
    /// - [`RouterError::InvalidOutcome`] for non-finite or negative latency
    ///   or cost.
    /// - [`RouterError::UnknownProvider`] when the provider is not registered.
    ///
    /// Neither the registry nor the history is touched on error.
    pub fn record(
        &self,
        registry: &ProviderRegistry,
        history: &TaskHistory,
        outcome: &Outcome,
    ) -> Result<Provider> {
        outcome.check()?;

        // The history append happens under the provider's entry lock, so
        // history order matches the order updates were committed in.
        let updated = registry.update(&outcome.provider_id, |provider| {
            self.apply(provider, outcome);
            history.push(HistoryEntry {
                provider_id: outcome.provider_id.clone(),
                features: outcome.features.clone(),
                success: outcome.success,
                latency_ms: outcome.latency_ms,
                cost: outcome.cost,
                provider_vector: provider_vector(provider),
                recorded_at: Utc::now(),
            });
            Ok(provider.clone())
        })?;

        tracing::debug!(
            provider_id = %updated.id,
            success = outcome.success,
            success_rate = updated.success_rate,
            avg_response_time_ms = updated.avg_response_time_ms,
            total_tasks = updated.total_tasks,
            "provider statistics updated"
        );
        Ok(updated)
    }

    fn apply(&self, provider: &mut Provider, outcome: &Outcome) {
        let alpha = self.rates.stats;
        let hit = if outcome.success { 1.0 } else { 0.0 };

        // Seed a new domain from the success rate before it moves.
        let domain = outcome.features.domain;
        let prior = provider.expertise_in(domain);
        provider
            .domain_expertise
            .insert(domain, clamp01(ema(prior, hit, alpha)));

        provider.success_rate = clamp01(ema(provider.success_rate, hit, alpha));
        provider.avg_response_time_ms =
            ema(provider.avg_response_time_ms, outcome.latency_ms, self.rates.latency);
        provider.avg_cost = ema(provider.avg_cost, outcome.cost, alpha);

        if outcome.features.complexity > COMPLEXITY_LEARNING_THRESHOLD {
            provider.complexity_handling = clamp01(ema(provider.complexity_handling, hit, alpha));
        }

        provider.total_tasks = provider.total_tasks.saturating_add(1);
        if outcome.success {
            provider.tasks_solved = provider.tasks_solved.saturating_add(1);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
