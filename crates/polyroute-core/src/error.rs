//! Router error types.
//!
//! Every public API in this crate returns [`RouterError`].  Only
//! [`RouterError::NoProviderAvailable`] is ever surfaced from routing; the
//! remaining variants belong to the feedback path, configuration loading, or
//! are recovered internally (see [`RouterError::DegenerateDistribution`]).

use std::path::PathBuf;

use uuid::Uuid;

/// Why no provider could be selected for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoProviderReason {
    /// The registry holds no providers at all.  Configuration guarantees at
    /// least one, so this indicates a deployment bug.
    RegistryEmpty,
    /// Providers are registered but every one of them is disabled.
    AllDisabled {
        /// Number of providers present in the registry.
        registered: usize,
    },
}

impl std::fmt::Display for NoProviderReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RegistryEmpty => write!(
                f,
                "the provider registry is empty; the router was built without any provider configuration"
            ),
            Self::AllDisabled { registered } => write!(
                f,
                "all {registered} registered providers are disabled; set a provider API key or mark one available"
            ),
        }
    }
}

/// Unified error type for the router.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    // -- Selection ----------------------------------------------------------
    /// No provider with `available = true` exists.
    #[error("no provider available: {reason}")]
    NoProviderAvailable { reason: NoProviderReason },

    /// The mutual-information estimator had too few samples or a zero-variance
    /// histogram.  Selection falls back to fuzzy-only scoring on this error.
    #[error("degenerate distribution for provider {provider_id} ({samples} samples)")]
    DegenerateDistribution { provider_id: String, samples: usize },

    // -- Feedback -----------------------------------------------------------
    /// Feedback referenced a provider id that is not registered.
    #[error("unknown provider: {provider_id}")]
    UnknownProvider { provider_id: String },

    /// Feedback carried values that cannot be folded into the statistics.
    #[error("invalid outcome for {provider_id}: {reason}")]
    InvalidOutcome { provider_id: String, reason: String },

    /// The outcome's provider differs from the one chosen by the referenced
    /// decision.
    #[error("outcome for decision {decision_id} names {actual}, but the decision selected {expected}")]
    FeedbackMismatch {
        decision_id: Uuid,
        expected: String,
        actual: String,
    },

    /// An injected [`crate::router::ProviderInvoker`] failed to call the
    /// provider.  Dispatch records this as an unsuccessful outcome.
    #[error("invocation of {provider_id} failed: {reason}")]
    InvocationFailed { provider_id: String, reason: String },

    // -- Configuration ------------------------------------------------------
    /// A configuration value failed validation.
    #[error("invalid configuration `{field}`: {reason}")]
    InvalidConfig { field: String, reason: String },

    /// The configuration file could not be read.
    #[error("failed to read configuration {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for the expected schema.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // -- Generic ------------------------------------------------------------
    /// Catch-all for unexpected internal errors.
    #[error("internal router error: {0}")]
    Internal(String),
}

impl RouterError {
    /// Shorthand for building an [`RouterError::InvalidConfig`].
    pub(crate) fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RouterError>;
