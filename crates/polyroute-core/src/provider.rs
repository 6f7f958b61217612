//! Provider data model.
//!
//! A [`Provider`] is created from static configuration when the registry is
//! built and afterwards mutated only by the feedback recorder.  Every rate and
//! score field stays within `[0, 1]`; [`Provider::validate`] checks this at
//! configuration time so scoring never has to guess.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RouterError};

// ---------------------------------------------------------------------------
// Domain
// ---------------------------------------------------------------------------

/// Coarse task domain inferred by the feature extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Technical,
    Analytical,
    Creative,
    Factual,
    Conversational,
}

impl Domain {
    /// All domains in classification priority order.
    pub const ALL: [Domain; 5] = [
        Domain::Technical,
        Domain::Analytical,
        Domain::Creative,
        Domain::Factual,
        Domain::Conversational,
    ];

    /// Fixed ordinal in `[0, 1]` used when a domain has to enter a numeric
    /// feature vector.
    pub fn ordinal(self) -> f64 {
        match self {
            Self::Conversational => 0.0,
            Self::Factual => 0.25,
            Self::Creative => 0.5,
            Self::Analytical => 0.75,
            Self::Technical => 1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Technical => "technical",
            Self::Analytical => "analytical",
            Self::Creative => "creative",
            Self::Factual => "factual",
            Self::Conversational => "conversational",
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "technical" | "code" => Ok(Self::Technical),
            "analytical" | "analysis" | "research" => Ok(Self::Analytical),
            "creative" => Ok(Self::Creative),
            "factual" => Ok(Self::Factual),
            "conversational" | "general" | "chat" => Ok(Self::Conversational),
            other => Err(RouterError::config("domain", format!("unknown domain `{other}`"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Static capability profile of a provider.  Every field is in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub reasoning: f64,
    pub creativity: f64,
    pub speed: f64,
    pub accuracy: f64,
    pub knowledge_base: f64,
    pub code_generation: f64,
    pub analysis: f64,
}

impl Capabilities {
    /// Named view of every field, in declaration order.
    pub fn fields(&self) -> [(&'static str, f64); 7] {
        [
            ("reasoning", self.reasoning),
            ("creativity", self.creativity),
            ("speed", self.speed),
            ("accuracy", self.accuracy),
            ("knowledge_base", self.knowledge_base),
            ("code_generation", self.code_generation),
            ("analysis", self.analysis),
        ]
    }

    /// `true` when every capability is finite and inside `[0, 1]`.
    pub fn is_well_formed(&self) -> bool {
        self.fields().iter().all(|(_, v)| is_unit(*v))
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            reasoning: 0.5,
            creativity: 0.5,
            speed: 0.5,
            accuracy: 0.5,
            knowledge_base: 0.5,
            code_generation: 0.5,
            analysis: 0.5,
        }
    }
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Full mutable state of one provider as held by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    /// Stable provider identifier (e.g. "anthropic").
    pub id: String,
    pub capabilities: Capabilities,
    /// Live load in `[0, 1]`, reported by the composition root.
    pub current_load: f64,
    /// Exponential moving average of observed latency, in milliseconds.
    pub avg_response_time_ms: f64,
    /// Exponential moving average of observed cost per task.
    pub avg_cost: f64,
    /// Per-domain success rate, keyed lazily on first feedback.
    pub domain_expertise: BTreeMap<Domain, f64>,
    pub complexity_handling: f64,
    pub success_rate: f64,
    pub tasks_solved: u64,
    pub total_tasks: u64,
    /// Set by configuration; never changed by routing or feedback.
    pub available: bool,
}

impl Provider {
    /// Create a provider with neutral statistics.
    pub fn new(id: impl Into<String>, capabilities: Capabilities) -> Self {
        Self {
            id: id.into(),
            capabilities,
            current_load: 0.0,
            avg_response_time_ms: 1_000.0,
            avg_cost: 0.0,
            domain_expertise: BTreeMap::new(),
            complexity_handling: 0.5,
            success_rate: 0.8,
            tasks_solved: 0,
            total_tasks: 0,
            available: true,
        }
    }

    /// Expertise for `domain`, or the overall success rate when the domain
    /// has never been seen.
    pub fn expertise_in(&self, domain: Domain) -> f64 {
        self.domain_expertise
            .get(&domain)
            .copied()
            .unwrap_or(self.success_rate)
    }

    /// Mean of the recorded domain expertise values, or the success rate when
    /// none are recorded.
    pub fn mean_domain_expertise(&self) -> f64 {
        if self.domain_expertise.is_empty() {
            return self.success_rate;
        }
        self.domain_expertise.values().sum::<f64>() / self.domain_expertise.len() as f64
    }

    /// Fraction of tasks solved, or `0` before any feedback.
    pub fn solved_ratio(&self) -> f64 {
        if self.total_tasks == 0 {
            0.0
        } else {
            self.tasks_solved as f64 / self.total_tasks as f64
        }
    }

    /// Check the structural invariants of a provider record.
    pub fn validate(&self) -> Result<()> {
        let field = |name: &str| format!("providers.{}.{name}", self.id);

        if self.id.trim().is_empty() {
            return Err(RouterError::config("providers.id", "must not be empty"));
        }
        for (name, value) in self.capabilities.fields() {
            if !is_unit(value) {
                return Err(RouterError::config(
                    field(&format!("capabilities.{name}")),
                    format!("{value} is outside [0, 1]"),
                ));
            }
        }
        for (name, value) in [
            ("current_load", self.current_load),
            ("complexity_handling", self.complexity_handling),
            ("success_rate", self.success_rate),
        ] {
            if !is_unit(value) {
                return Err(RouterError::config(
                    field(name),
                    format!("{value} is outside [0, 1]"),
                ));
            }
        }
        for (domain, value) in &self.domain_expertise {
            if !is_unit(*value) {
                return Err(RouterError::config(
                    field(&format!("domain_expertise.{domain}")),
                    format!("{value} is outside [0, 1]"),
                ));
            }
        }
        for (name, value) in [
            ("avg_response_time_ms", self.avg_response_time_ms),
            ("avg_cost", self.avg_cost),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(RouterError::config(
                    field(name),
                    format!("{value} must be a finite, non-negative number"),
                ));
            }
        }
        if self.tasks_solved > self.total_tasks {
            return Err(RouterError::config(
                field("tasks_solved"),
                "cannot exceed total_tasks",
            ));
        }
        Ok(())
    }
}

/// Read-only view handed to monitoring collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSnapshot {
    pub id: String,
    pub capabilities: Capabilities,
    pub available: bool,
    pub current_load: f64,
    pub avg_response_time_ms: f64,
    pub avg_cost: f64,
    pub success_rate: f64,
    pub total_tasks: u64,
}

impl From<&Provider> for ProviderSnapshot {
    fn from(p: &Provider) -> Self {
        Self {
            id: p.id.clone(),
            capabilities: p.capabilities,
            available: p.available,
            current_load: p.current_load,
            avg_response_time_ms: p.avg_response_time_ms,
            avg_cost: p.avg_cost,
            success_rate: p.success_rate,
            total_tasks: p.total_tasks,
        }
    }
}

/// `true` for finite values inside `[0, 1]`.
pub(crate) fn is_unit(value: f64) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}

/// Clamp to `[0, 1]`, mapping NaN to `0`.
pub(crate) fn clamp01(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_parses_aliases() {
        assert_eq!("research".parse::<Domain>().unwrap(), Domain::Analytical);
        assert_eq!("General".parse::<Domain>().unwrap(), Domain::Conversational);
        assert!("astrology".parse::<Domain>().is_err());
    }

    #[test]
    fn expertise_falls_back_to_success_rate() {
        let mut p = Provider::new("x", Capabilities::default());
        p.success_rate = 0.66;
        assert_eq!(p.expertise_in(Domain::Creative), 0.66);

        p.domain_expertise.insert(Domain::Creative, 0.9);
        assert_eq!(p.expertise_in(Domain::Creative), 0.9);
        assert_eq!(p.mean_domain_expertise(), 0.9);
    }

    #[test]
    fn validate_rejects_out_of_range_capability() {
        let mut p = Provider::new("bad", Capabilities::default());
        p.capabilities.speed = 1.5;
        let err = p.validate().unwrap_err();
        assert!(err.to_string().contains("capabilities.speed"));
    }

    #[test]
    fn validate_rejects_solved_above_total() {
        let mut p = Provider::new("bad", Capabilities::default());
        p.tasks_solved = 3;
        p.total_tasks = 2;
        assert!(p.validate().is_err());
    }

    #[test]
    fn clamp01_handles_nan() {
        assert_eq!(clamp01(f64::NAN), 0.0);
        assert_eq!(clamp01(-2.0), 0.0);
        assert_eq!(clamp01(4.0), 1.0);
    }
}
