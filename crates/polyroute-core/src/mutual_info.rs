//! Mutual-information estimation between task features and provider history.
//!
//! For one provider, every retained history sample contributes a pair of
//! 7-dimensional vectors: the task vector of the request it served and the
//! provider vector right after its outcome was recorded.  Corresponding
//! dimensions are paired and binned into a `bins x bins` joint histogram,
//! from which the plug-in estimate
//!
//! ```text
//! I(T;P) = Σ p(i,j) · ln( p(i,j) / (p(i) · p(j)) )
//! ```
//!
//! is computed over non-zero cells.  The estimate is a population statistic:
//! it only becomes meaningful once a provider has accumulated enough samples,
//! and the estimator reports [`RouterError::DegenerateDistribution`] below the
//! configured minimum or when a marginal collapses onto a single bin.

use serde::{Deserialize, Serialize};

use crate::error::{Result, RouterError};
use crate::features::TaskFeatures;
use crate::history::HistoryEntry;
use crate::provider::{Provider, clamp01};

/// Default histogram resolution per axis.
pub const DEFAULT_BINS: usize = 20;
/// Default number of history samples required before MI is trusted.
pub const DEFAULT_MIN_SAMPLES: usize = 30;

/// Token count that maps to `1.0` on the log scale.
const TOKEN_LOG_CEILING: f64 = 100_000.0;
const LATENCY_LOG_CEILING_MS: f64 = 60_000.0;
/// Cost is log-scaled in units of this size, up to one currency unit.
const COST_RESOLUTION: f64 = 0.001;
const COST_LOG_CEILING: f64 = 1.0;
const TASK_COUNT_LOG_CEILING: f64 = 1_000_000.0;

/// Complexity-fit factor when a task exceeds the provider's handling level.
const COMPLEXITY_MISFIT: f64 = 0.7;

// ---------------------------------------------------------------------------
// Vectorisation
// ---------------------------------------------------------------------------

/// `ln(1 + x) / ln(1 + ceiling)`, clamped to `[0, 1]`.
fn log_scale(x: f64, ceiling: f64) -> f64 {
    if !x.is_finite() || x <= 0.0 {
        return 0.0;
    }
    clamp01(x.ln_1p() / ceiling.ln_1p())
}

/// Numeric task vector: complexity, domain ordinal, urgency, log tokens,
/// multimodal, reasoning, factuality.
pub fn task_vector(features: &TaskFeatures) -> [f64; 7] {
    [
        clamp01(features.complexity),
        features.domain.ordinal(),
        clamp01(features.urgency),
        log_scale(f64::from(features.token_estimate), TOKEN_LOG_CEILING),
        if features.multimodal { 1.0 } else { 0.0 },
        if features.reasoning { 1.0 } else { 0.0 },
        clamp01(features.factuality),
    ]
}

/// Numeric provider-history vector: success rate, log latency, log cost,
/// mean domain expertise, complexity handling, log task count, solved ratio.
pub fn provider_vector(provider: &Provider) -> [f64; 7] {
    [
        clamp01(provider.success_rate),
        log_scale(provider.avg_response_time_ms, LATENCY_LOG_CEILING_MS),
        log_scale(
            provider.avg_cost / COST_RESOLUTION,
            COST_LOG_CEILING / COST_RESOLUTION,
        ),
        clamp01(provider.mean_domain_expertise()),
        clamp01(provider.complexity_handling),
        log_scale(provider.total_tasks as f64, TASK_COUNT_LOG_CEILING),
        clamp01(provider.solved_ratio()),
    ]
}

// ---------------------------------------------------------------------------
// Joint histogram
// ---------------------------------------------------------------------------

/// Square joint histogram over two `[0, 1]` variables.
#[derive(Debug, Clone)]
pub struct JointHistogram {
    bins: usize,
    counts: Vec<u64>,
    total: u64,
}

impl JointHistogram {
    /// Create an empty histogram.  Fewer than two bins are raised to two.
    pub fn new(bins: usize) -> Self {
        let bins = bins.max(2);
        Self {
            bins,
            counts: vec![0; bins * bins],
            total: 0,
        }
    }

    fn bin_of(&self, x: f64) -> usize {
        // Truncation is the binning rule; 1.0 lands in the last bin.
        let idx = (clamp01(x) * self.bins as f64) as usize;
        idx.min(self.bins - 1)
    }

    /// Count one paired observation.
    pub fn add(&mut self, x: f64, y: f64) {
        let (i, j) = (self.bin_of(x), self.bin_of(y));
        self.counts[i * self.bins + j] += 1;
        self.total += 1;
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Plug-in mutual information in nats, or `None` when the histogram is
    /// empty or either marginal occupies a single bin.
    pub fn mutual_information(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }

        let n = self.total as f64;
        let mut rows = vec![0.0_f64; self.bins];
        let mut cols = vec![0.0_f64; self.bins];
        for i in 0..self.bins {
            for j in 0..self.bins {
                let p = self.counts[i * self.bins + j] as f64 / n;
                rows[i] += p;
                cols[j] += p;
            }
        }

        let occupied = |m: &[f64]| m.iter().filter(|p| **p > 0.0).count();
        if occupied(&rows) < 2 || occupied(&cols) < 2 {
            return None;
        }

        let mut mi = 0.0;
        for i in 0..self.bins {
            for j in 0..self.bins {
                let count = self.counts[i * self.bins + j];
                if count == 0 {
                    continue;
                }
                let p = count as f64 / n;
                mi += p * (p / (rows[i] * cols[j])).ln();
            }
        }
        // The plug-in estimate is non-negative up to rounding.
        Some(mi.max(0.0))
    }

    /// Upper bound of the estimate for this resolution, `ln(bins)`.
    pub fn max_information(&self) -> f64 {
        (self.bins as f64).ln()
    }
}

// ---------------------------------------------------------------------------
// Estimator
// ---------------------------------------------------------------------------

/// Components of an optimizer-mode score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizerScore {
    /// Raw mutual information in nats.
    pub mutual_information: f64,
    /// MI normalised by `ln(bins)`, in `[0, 1]`.
    pub normalized_mi: f64,
    pub domain_expertise: f64,
    pub complexity_fit: f64,
    pub success_rate: f64,
    /// Product of the factors above, in `[0, 1]`.
    pub total: f64,
}

/// Mutual-information estimator and optimizer-mode scorer.
#[derive(Debug, Clone, Copy)]
pub struct MutualInfoEstimator {
    bins: usize,
    min_samples: usize,
}

impl MutualInfoEstimator {
    pub fn new(bins: usize, min_samples: usize) -> Self {
        Self {
            bins: bins.max(2),
            min_samples,
        }
    }

    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    /// Estimate `I(Task; Provider)` for one provider from its retained
    /// samples plus the current request.
    ///
    /// # Errors
    ///
    /// [`RouterError::DegenerateDistribution`] when fewer than `min_samples`
    /// samples are available or the joint histogram is degenerate.
    pub fn mutual_information(
        &self,
        features: &TaskFeatures,
        provider: &Provider,
        samples: &[HistoryEntry],
    ) -> Result<f64> {
        let degenerate = || RouterError::DegenerateDistribution {
            provider_id: provider.id.clone(),
            samples: samples.len(),
        };

        if samples.len() < self.min_samples {
            return Err(degenerate());
        }

        let mut histogram = JointHistogram::new(self.bins);
        let pairs = samples
            .iter()
            .map(|s| (task_vector(&s.features), s.provider_vector))
            .chain(std::iter::once((task_vector(features), provider_vector(provider))));
        for (task, prov) in pairs {
            for (x, y) in task.iter().zip(prov.iter()) {
                histogram.add(*x, *y);
            }
        }

        histogram.mutual_information().ok_or_else(degenerate)
    }

    /// Optimizer-mode score: normalised MI combined multiplicatively with
    /// domain expertise, complexity fit and success rate.
    pub fn optimizer_score(
        &self,
        features: &TaskFeatures,
        provider: &Provider,
        mutual_information: f64,
    ) -> OptimizerScore {
        let normalized_mi = clamp01(mutual_information / (self.bins as f64).ln());
        let domain_expertise = clamp01(provider.expertise_in(features.domain));
        let complexity_fit = if features.complexity <= provider.complexity_handling {
            1.0
        } else {
            COMPLEXITY_MISFIT
        };
        let success_rate = clamp01(provider.success_rate);

        // MI scales the estimate between half and full weight rather than
        // zeroing providers whose outcomes are not yet feature-dependent.
        let mi_factor = 0.5 + 0.5 * normalized_mi;
        let total = clamp01(mi_factor * domain_expertise * complexity_fit * success_rate);

        OptimizerScore {
            mutual_information,
            normalized_mi,
            domain_expertise,
            complexity_fit,
            success_rate,
            total,
        }
    }
}

impl Default for MutualInfoEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_BINS, DEFAULT_MIN_SAMPLES)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
