//! Static router configuration.
//!
//! Configuration is read once at startup, validated, and then turned into a
//! [`ProviderRegistry`].  It has two sections:
//!
//! ```toml
//! [settings]
//! learning_rate = 0.1
//! mi_min_samples = 30
//!
//! [[providers]]
//! id = "anthropic"
//! api_key_env = "ANTHROPIC_API_KEY"
//! avg_response_time_ms = 1800.0
//!
//! [providers.capabilities]
//! reasoning = 0.95
//! analysis = 0.92
//! ```
//!
//! Provider availability is resolved through a caller-supplied lookup so the
//! library never reads the process environment itself: a provider with an
//! `api_key_env` is available when the lookup returns a non-empty value for
//! it, unless `available` is set explicitly.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RouterError};
use crate::feedback::{DEFAULT_LATENCY_LEARNING_RATE, DEFAULT_LEARNING_RATE, LearningRates};
use crate::history::TaskHistory;
use crate::mutual_info::{DEFAULT_BINS, DEFAULT_MIN_SAMPLES, MutualInfoEstimator};
use crate::provider::{Capabilities, Domain, Provider, is_unit};
use crate::registry::ProviderRegistry;
use crate::selection::{
    MI_BLEND_WEIGHT, PREFERRED_PROVIDER_MARGIN, SINGLE_PROVIDER_CONFIDENCE, SelectionSettings,
};

/// Default bounded history size.
pub const DEFAULT_HISTORY_CAPACITY: usize = 10_000;
/// Default age after which a decision without feedback counts as failed.
pub const DEFAULT_FEEDBACK_TIMEOUT_SECS: u64 = 300;
/// Default number of outstanding decisions before `route` reaps overdue ones.
pub const DEFAULT_MAX_PENDING_DECISIONS: usize = 10_000;
/// Default per-subscriber event backlog.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Tuning constants of the router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSettings {
    /// EMA weight for success rate, cost, expertise and complexity handling.
    pub learning_rate: f64,
    /// EMA weight for average response time.
    pub latency_learning_rate: f64,
    pub history_capacity: usize,
    /// Samples a provider needs before its score blends in mutual information.
    pub mi_min_samples: usize,
    pub mi_bins: usize,
    /// Weight of the optimizer score in blended mode.
    pub mi_blend_weight: f64,
    pub single_provider_confidence: f64,
    pub preferred_provider_margin: f64,
    pub feedback_timeout_secs: u64,
    pub max_pending_decisions: usize,
    pub event_capacity: usize,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            learning_rate: DEFAULT_LEARNING_RATE,
            latency_learning_rate: DEFAULT_LATENCY_LEARNING_RATE,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            mi_min_samples: DEFAULT_MIN_SAMPLES,
            mi_bins: DEFAULT_BINS,
            mi_blend_weight: MI_BLEND_WEIGHT,
            single_provider_confidence: SINGLE_PROVIDER_CONFIDENCE,
            preferred_provider_margin: PREFERRED_PROVIDER_MARGIN,
            feedback_timeout_secs: DEFAULT_FEEDBACK_TIMEOUT_SECS,
            max_pending_decisions: DEFAULT_MAX_PENDING_DECISIONS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl RouterSettings {
    pub fn validate(&self) -> Result<()> {
        for (field, rate) in [
            ("settings.learning_rate", self.learning_rate),
            ("settings.latency_learning_rate", self.latency_learning_rate),
        ] {
            if !(rate.is_finite() && rate > 0.0 && rate <= 1.0) {
                return Err(RouterError::config(field, format!("{rate} is outside (0, 1]")));
            }
        }
        for (field, value) in [
            ("settings.mi_blend_weight", self.mi_blend_weight),
            ("settings.single_provider_confidence", self.single_provider_confidence),
            ("settings.preferred_provider_margin", self.preferred_provider_margin),
        ] {
            if !is_unit(value) {
                return Err(RouterError::config(field, format!("{value} is outside [0, 1]")));
            }
        }
        for (field, value) in [
            ("settings.history_capacity", self.history_capacity),
            ("settings.mi_min_samples", self.mi_min_samples),
            ("settings.max_pending_decisions", self.max_pending_decisions),
            ("settings.event_capacity", self.event_capacity),
        ] {
            if value == 0 {
                return Err(RouterError::config(field, "must be positive"));
            }
        }
        if self.mi_bins < 2 {
            return Err(RouterError::config("settings.mi_bins", "must be at least 2"));
        }
        if self.feedback_timeout_secs == 0 {
            return Err(RouterError::config("settings.feedback_timeout_secs", "must be positive"));
        }
        Ok(())
    }

    pub fn learning_rates(&self) -> LearningRates {
        LearningRates {
            stats: self.learning_rate,
            latency: self.latency_learning_rate,
        }
    }

    pub fn selection(&self) -> SelectionSettings {
        SelectionSettings {
            blend_weight: self.mi_blend_weight,
            single_provider_confidence: self.single_provider_confidence,
            preferred_provider_margin: self.preferred_provider_margin,
        }
    }

    pub fn estimator(&self) -> MutualInfoEstimator {
        MutualInfoEstimator::new(self.mi_bins, self.mi_min_samples)
    }

    pub fn history(&self) -> TaskHistory {
        TaskHistory::new(self.history_capacity)
    }
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

fn default_response_time() -> f64 {
    1_000.0
}

fn default_success_rate() -> f64 {
    0.8
}

fn default_complexity_handling() -> f64 {
    0.5
}

/// One `[[providers]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    #[serde(default)]
    pub capabilities: Capabilities,
    /// Environment variable whose presence marks the provider available.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Explicit availability; overrides the API-key check.
    #[serde(default)]
    pub available: Option<bool>,
    #[serde(default = "default_response_time")]
    pub avg_response_time_ms: f64,
    #[serde(default)]
    pub avg_cost: f64,
    #[serde(default = "default_success_rate")]
    pub success_rate: f64,
    #[serde(default = "default_complexity_handling")]
    pub complexity_handling: f64,
    #[serde(default)]
    pub domain_expertise: BTreeMap<Domain, f64>,
    #[serde(default)]
    pub current_load: f64,
}

impl ProviderConfig {
    /// Entry with default statistics and no API-key requirement.
    pub fn new(id: impl Into<String>, capabilities: Capabilities) -> Self {
        Self {
            id: id.into(),
            capabilities,
            api_key_env: None,
            available: None,
            avg_response_time_ms: default_response_time(),
            avg_cost: 0.0,
            success_rate: default_success_rate(),
            complexity_handling: default_complexity_handling(),
            domain_expertise: BTreeMap::new(),
            current_load: 0.0,
        }
    }

    /// Whether this provider is available given an environment lookup.
    pub fn is_available(&self, lookup: impl Fn(&str) -> Option<String>) -> bool {
        if let Some(explicit) = self.available {
            return explicit;
        }
        match &self.api_key_env {
            Some(var) => lookup(var).is_some_and(|v| !v.trim().is_empty()),
            None => true,
        }
    }

    /// Build the runtime provider record.
    pub fn to_provider(&self, available: bool) -> Provider {
        let mut provider = Provider::new(self.id.clone(), self.capabilities);
        provider.available = available;
        provider.avg_response_time_ms = self.avg_response_time_ms;
        provider.avg_cost = self.avg_cost;
        provider.success_rate = self.success_rate;
        provider.complexity_handling = self.complexity_handling;
        provider.domain_expertise = self.domain_expertise.clone();
        provider.current_load = self.current_load;
        provider
    }
}

// ---------------------------------------------------------------------------
// Router configuration
// ---------------------------------------------------------------------------

/// Complete router configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub settings: RouterSettings,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl RouterConfig {
    /// Read and validate a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| RouterError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!(
            path = %path.display(),
            providers = config.providers.len(),
            "router configuration loaded"
        );
        Ok(config)
    }

    /// Parse and validate TOML configuration text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every setting and provider entry.
    pub fn validate(&self) -> Result<()> {
        self.settings.validate()?;

        if self.providers.is_empty() {
            return Err(RouterError::config("providers", "at least one provider is required"));
        }

        let mut seen = HashSet::new();
        for entry in &self.providers {
            if !seen.insert(entry.id.as_str()) {
                return Err(RouterError::config(
                    "providers.id",
                    format!("duplicate provider id `{}`", entry.id),
                ));
            }
            if entry.api_key_env.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(RouterError::config(
                    format!("providers.{}.api_key_env", entry.id),
                    "must not be empty",
                ));
            }
            entry.to_provider(true).validate()?;
        }
        Ok(())
    }

    /// Provider records with availability resolved through `lookup`.
    pub fn resolve_availability(&self, lookup: impl Fn(&str) -> Option<String>) -> Vec<Provider> {
        self.providers
            .iter()
            .map(|entry| {
                let available = entry.is_available(&lookup);
                if !available {
                    tracing::debug!(
                        provider_id = %entry.id,
                        api_key_env = entry.api_key_env.as_deref().unwrap_or(""),
                        "provider disabled"
                    );
                }
                entry.to_provider(available)
            })
            .collect()
    }

    /// Build a registry with availability resolved through `lookup`.
    pub fn build_registry(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<ProviderRegistry> {
        ProviderRegistry::from_providers(self.resolve_availability(lookup))
    }

    /// Default catalog of five hosted providers, each keyed to its API-key
    /// environment variable.
    pub fn builtin() -> Self {
        let entry = |id: &str,
                     key: &str,
                     caps: Capabilities,
                     latency: f64,
                     cost: f64,
                     success: f64,
                     complexity: f64| ProviderConfig {
            api_key_env: Some(key.to_string()),
            avg_response_time_ms: latency,
            avg_cost: cost,
            success_rate: success,
            complexity_handling: complexity,
            ..ProviderConfig::new(id, caps)
        };

        let providers = vec![
            entry(
                "anthropic",
                "ANTHROPIC_API_KEY",
                Capabilities {
                    reasoning: 0.95,
                    creativity: 0.88,
                    speed: 0.70,
                    accuracy: 0.93,
                    knowledge_base: 0.90,
                    code_generation: 0.92,
                    analysis: 0.95,
                },
                1_800.0,
                0.015,
                0.92,
                0.90,
            ),
            entry(
                "openai",
                "OPENAI_API_KEY",
                Capabilities {
                    reasoning: 0.92,
                    creativity: 0.90,
                    speed: 0.75,
                    accuracy: 0.90,
                    knowledge_base: 0.92,
                    code_generation: 0.90,
                    analysis: 0.88,
                },
                1_500.0,
                0.012,
                0.90,
                0.85,
            ),
            entry(
                "gemini",
                "GOOGLE_API_KEY",
                Capabilities {
                    reasoning: 0.85,
                    creativity: 0.80,
                    speed: 0.85,
                    accuracy: 0.85,
                    knowledge_base: 0.95,
                    code_generation: 0.80,
                    analysis: 0.85,
                },
                1_100.0,
                0.004,
                0.86,
                0.75,
            ),
            entry(
                "deepseek",
                "DEEPSEEK_API_KEY",
                Capabilities {
                    reasoning: 0.88,
                    creativity: 0.70,
                    speed: 0.65,
                    accuracy: 0.85,
                    knowledge_base: 0.80,
                    code_generation: 0.95,
                    analysis: 0.85,
                },
                2_200.0,
                0.002,
                0.85,
                0.80,
            ),
            entry(
                "groq",
                "GROQ_API_KEY",
                Capabilities {
                    reasoning: 0.75,
                    creativity: 0.70,
                    speed: 0.98,
                    accuracy: 0.80,
                    knowledge_base: 0.75,
                    code_generation: 0.78,
                    analysis: 0.72,
                },
                300.0,
                0.001,
                0.88,
                0.60,
            ),
        ];

        Self {
            settings: RouterSettings::default(),
            providers,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[settings]
learning_rate = 0.2
mi_min_samples = 10

[[providers]]
id = "fast"
api_key_env = "FAST_KEY"
avg_response_time_ms = 200.0

[providers.capabilities]
speed = 0.95

[[providers]]
id = "local"
available = true
success_rate = 0.7

[providers.domain_expertise]
technical = 0.9
"#;

    #[test]
    fn parses_settings_and_providers() {
        let config = RouterConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.settings.learning_rate, 0.2);
        assert_eq!(config.settings.mi_min_samples, 10);
        // untouched settings keep their defaults
        assert_eq!(config.settings.history_capacity, DEFAULT_HISTORY_CAPACITY);

        assert_eq!(config.providers.len(), 2);
        let fast = &config.providers[0];
        assert_eq!(fast.capabilities.speed, 0.95);
        assert_eq!(fast.capabilities.reasoning, 0.5);
        assert_eq!(config.providers[1].domain_expertise[&Domain::Technical], 0.9);
    }

    #[test]
    fn availability_follows_api_key_lookup() {
        let config = RouterConfig::from_toml_str(SAMPLE).unwrap();

        let none = config.resolve_availability(|_| None);
        assert!(!none[0].available);
        assert!(none[1].available);

        let blank = config.resolve_availability(|_| Some("  ".into()));
        assert!(!blank[0].available);

        let set = config.resolve_availability(|var| (var == "FAST_KEY").then(|| "k".into()));
        assert!(set[0].available);
    }

    #[test]
    fn explicit_availability_wins() {
        let mut entry = ProviderConfig::new("x", Capabilities::default());
        entry.api_key_env = Some("X_KEY".into());
        entry.available = Some(false);
        assert!(!entry.is_available(|_| Some("key".into())));
    }

    #[test]
    fn rejects_empty_provider_list() {
        let err = RouterConfig::from_toml_str("[settings]\n").unwrap_err();
        assert!(err.to_string().contains("at least one provider"));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let text = "[[providers]]\nid = \"a\"\n[[providers]]\nid = \"a\"\n";
        assert!(matches!(
            RouterConfig::from_toml_str(text),
            Err(RouterError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let text = "[[providers]]\nid = \"a\"\nsuccess_rate = 1.5\n";
        assert!(RouterConfig::from_toml_str(text).is_err());

        let text = "[settings]\nlearning_rate = 0.0\n[[providers]]\nid = \"a\"\n";
        assert!(RouterConfig::from_toml_str(text).is_err());

        let text = "[settings]\nmi_bins = 1\n[[providers]]\nid = \"a\"\n";
        assert!(RouterConfig::from_toml_str(text).is_err());
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            RouterConfig::from_toml_str("[[providers]\nid ="),
            Err(RouterError::ConfigParse(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = RouterConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, RouterError::ConfigIo { .. }));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("router.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = RouterConfig::load(&path).unwrap();
        assert_eq!(config.providers[0].id, "fast");
    }

    #[test]
    fn builtin_catalog_is_valid() {
        let config = RouterConfig::builtin();
        config.validate().unwrap();
        assert_eq!(config.providers.len(), 5);

        let registry = config.build_registry(|_| None).unwrap();
        assert_eq!(registry.count(), 5);
        assert_eq!(registry.available_count(), 0);
    }

    #[test]
    fn builtin_catalog_round_trips_through_toml() {
        let text = toml::to_string(&RouterConfig::builtin()).unwrap();
        assert_eq!(RouterConfig::from_toml_str(&text).unwrap(), RouterConfig::builtin());
    }
}
