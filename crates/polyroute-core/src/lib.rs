//! Adaptive multi-provider request router.
//!
//! Given a task description, decide which of several interchangeable
//! backend providers should handle it, then keep refining that choice from
//! outcome feedback:
//!
//! - **[`features`]** -- keyword/phrase feature extraction with
//!   [`aho_corasick`] automata and a few [`regex`] structure patterns.
//! - **[`provider`]** / **[`registry`]** -- provider records and the
//!   concurrent [`DashMap`](dashmap::DashMap)-backed registry.
//! - **[`fuzzy`]** -- weighted fuzzy-rule suitability scoring.
//! - **[`mutual_info`]** -- binned mutual-information estimation over the
//!   bounded task **[`history`]**.
//! - **[`selection`]** -- deterministic ranking, confidence and reasoning.
//! - **[`feedback`]** -- exponential-moving-average online learning.
//! - **[`events`]** -- [`tokio::sync::broadcast`] event bus for monitoring.
//! - **[`config`]** -- TOML configuration and the builtin provider catalog.
//! - **[`router`]** -- the [`AdaptiveRouter`] facade tying it all together.
//! - **[`error`]** -- unified error types via [`thiserror`].
//!
//! The router performs no network or disk I/O on the routing path.  Calling
//! the chosen provider is the caller's job, either directly followed by
//! [`AdaptiveRouter::feedback`], or through an injected
//! [`ProviderInvoker`] with [`AdaptiveRouter::dispatch`].

pub mod config;
pub mod error;
pub mod events;
pub mod features;
pub mod feedback;
pub mod fuzzy;
pub mod history;
pub mod mutual_info;
pub mod provider;
pub mod registry;
pub mod router;
pub mod selection;

pub use config::{ProviderConfig, RouterConfig, RouterSettings};
pub use error::{NoProviderReason, Result, RouterError};
pub use events::{EventBus, RouterEvent};
pub use features::{FeatureExtractor, Priority, TaskFeatures, TaskHints, UrgencyContext};
pub use feedback::{FeedbackRecorder, Outcome};
pub use fuzzy::FuzzyScorer;
pub use mutual_info::MutualInfoEstimator;
pub use provider::{Capabilities, Domain, Provider, ProviderSnapshot};
pub use registry::ProviderRegistry;
pub use router::{AdaptiveRouter, DispatchReport, Invocation, ProviderInvoker, Stats};
pub use selection::{Decision, ScoringMode, SelectionEngine};
