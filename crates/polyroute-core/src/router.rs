//! The adaptive router facade.
//!
//! [`AdaptiveRouter`] wires the components together and exposes the four
//! operations a transport layer needs:
//!
//! | Operation                          | Purpose                                   |
//! |------------------------------------|-------------------------------------------|
//! | [`AdaptiveRouter::route`]          | extract features and select a provider    |
//! | [`AdaptiveRouter::feedback`]       | fold an invocation outcome into the stats |
//! | [`AdaptiveRouter::list_providers`] | read-only provider snapshots              |
//! | [`AdaptiveRouter::stats`]          | aggregate statistics                      |
//!
//! Every routed decision is tracked until its feedback arrives.  Decisions
//! that stay unanswered longer than `feedback_timeout_secs` are recorded as
//! failures by [`AdaptiveRouter::reap_overdue`], so a lost feedback call
//! cannot leave a provider's statistics optimistically stale.  Feedback
//! without a `decision_id` settles the oldest decision routed to the same
//! provider, and at most `max_pending_decisions` are tracked at once.
//!
//! The router is `Send + Sync`; share it behind an [`std::sync::Arc`].

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::{RouterConfig, RouterSettings};
use crate::error::{Result, RouterError};
use crate::events::{EventBus, RouterEvent};
use crate::features::{FeatureExtractor, TaskFeatures, TaskHints};
use crate::feedback::{FeedbackRecorder, Outcome};
use crate::history::TaskHistory;
use crate::provider::{Provider, ProviderSnapshot};
use crate::registry::ProviderRegistry;
use crate::selection::{Decision, SelectionEngine};

// ---------------------------------------------------------------------------
// Invocation seam
// ---------------------------------------------------------------------------

/// Result of calling a provider, as reported by a [`ProviderInvoker`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub success: bool,
    pub cost: f64,
    /// Provider-reported latency; wall-clock time is used when absent.
    pub latency_ms: Option<f64>,
}

/// Capability that actually calls a provider.  Supplied by the composition
/// root; the router itself never performs network I/O.
#[async_trait]
pub trait ProviderInvoker: Send + Sync {
    async fn invoke(&self, provider_id: &str, task: &str) -> Result<Invocation>;
}

/// What happened during [`AdaptiveRouter::dispatch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub decision: Decision,
    pub success: bool,
    pub latency_ms: f64,
    pub cost: f64,
    /// Why the call failed, if it did not complete normally.
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Aggregate view for monitoring collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    /// Outcomes recorded across every provider.
    pub total_tasks: u64,
    /// Mean success rate across registered providers.
    pub avg_success_rate: f64,
    /// Provider with the highest success rate; ties go to the lower id.
    pub top_performing_provider: Option<String>,
    pub registered_providers: usize,
    pub available_providers: usize,
    pub history_len: usize,
    pub pending_decisions: usize,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

struct PendingDecision {
    provider_id: String,
    features: TaskFeatures,
    issued_at: Instant,
}

/// Adaptive multi-provider request router.
pub struct AdaptiveRouter {
    settings: RouterSettings,
    extractor: FeatureExtractor,
    registry: ProviderRegistry,
    history: TaskHistory,
    selection: SelectionEngine,
    recorder: FeedbackRecorder,
    events: EventBus,
    pending: DashMap<Uuid, PendingDecision>,
}

impl AdaptiveRouter {
    /// Build a router over an existing registry.
    pub fn new(registry: ProviderRegistry, settings: RouterSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            extractor: FeatureExtractor::new()?,
            history: settings.history(),
            selection: SelectionEngine::new(settings.estimator(), settings.selection()),
            recorder: FeedbackRecorder::new(settings.learning_rates()),
            events: EventBus::new(settings.event_capacity),
            pending: DashMap::new(),
            registry,
            settings,
        })
    }

    /// Build a router from validated configuration, resolving provider
    /// availability through `lookup`.
    pub fn from_config(config: &RouterConfig, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        config.validate()?;
        let registry = config.build_registry(lookup)?;
        tracing::info!(
            providers = registry.count(),
            available = registry.available_count(),
            "adaptive router initialised"
        );
        Self::new(registry, config.settings.clone())
    }

    // -- Routing ------------------------------------------------------------

    /// Route one task.
    ///
    /// # Errors
    ///
    /// [`RouterError::NoProviderAvailable`] when no provider is available.
    /// No other error is surfaced from routing.
    pub fn route(&self, text: &str, hints: &TaskHints) -> Result<Decision> {
        if self.pending.len() >= self.settings.max_pending_decisions {
            self.reap_overdue();
            self.evict_oldest_pending();
        }

        let features = self.extractor.extract_with_hints(text, hints);
        let decision = self
            .selection
            .select(
                &features,
                &self.registry,
                &self.history,
                hints.preferred_provider.as_deref(),
            )
            .inspect_err(|e| tracing::warn!(error = %e, "routing failed"))?;

        self.pending.insert(
            decision.id,
            PendingDecision {
                provider_id: decision.provider_id.clone(),
                features,
                issued_at: Instant::now(),
            },
        );

        tracing::info!(
            decision_id = %decision.id,
            provider_id = %decision.provider_id,
            score = decision.score,
            confidence = decision.confidence,
            domain = %decision.features.domain,
            "task routed"
        );
        self.events.publish(RouterEvent::DecisionMade {
            decision_id: decision.id,
            provider_id: decision.provider_id.clone(),
            score: decision.score,
            confidence: decision.confidence,
            timestamp: decision.timestamp,
        });
        Ok(decision)
    }

    /// Extract features without routing.
    pub fn features(&self, text: &str, hints: &TaskHints) -> TaskFeatures {
        self.extractor.extract_with_hints(text, hints)
    }

    // -- Feedback -----------------------------------------------------------

    /// Record the outcome of invoking a provider.
    ///
    /// Rejected feedback is logged, published as
    /// [`RouterEvent::FeedbackRejected`] and returned; the registry is left
    /// untouched.
    ///
    /// # Errors
    ///
    /// - [`RouterError::UnknownProvider`]
    /// - [`RouterError::InvalidOutcome`]
    /// - [`RouterError::FeedbackMismatch`] when `decision_id` names a
    ///   decision that selected a different provider.
    pub fn feedback(&self, outcome: Outcome) -> Result<()> {
        let result = self.apply_feedback(&outcome);
        if let Err(e) = &result {
            tracing::warn!(provider_id = %outcome.provider_id, error = %e, "feedback rejected");
            self.events.publish(RouterEvent::FeedbackRejected {
                provider_id: outcome.provider_id.clone(),
                reason: e.to_string(),
                timestamp: Utc::now(),
            });
        }
        result
    }

    fn apply_feedback(&self, outcome: &Outcome) -> Result<()> {
        let claimed = match outcome.decision_id {
            Some(id) => match self.pending.remove(&id) {
                Some((id, pending)) if pending.provider_id != outcome.provider_id => {
                    let err = RouterError::FeedbackMismatch {
                        decision_id: id,
                        expected: pending.provider_id.clone(),
                        actual: outcome.provider_id.clone(),
                    };
                    self.pending.insert(id, pending);
                    return Err(err);
                }
                Some(entry) => Some(entry),
                None => {
                    tracing::debug!(decision_id = %id, "feedback for an unknown or already settled decision");
                    None
                }
            },
            None => self.claim_oldest_for(&outcome.provider_id),
        };
        let decision_id = claimed.as_ref().map(|(id, _)| *id).or(outcome.decision_id);

        match self.recorder.record(&self.registry, &self.history, outcome) {
            Ok(provider) => {
                tracing::info!(
                    provider_id = %provider.id,
                    success = outcome.success,
                    latency_ms = outcome.latency_ms,
                    success_rate = provider.success_rate,
                    "feedback recorded"
                );
                self.events.publish(RouterEvent::OutcomeRecorded {
                    decision_id,
                    provider_id: provider.id,
                    success: outcome.success,
                    success_rate: provider.success_rate,
                    timestamp: Utc::now(),
                });
                Ok(())
            }
            Err(e) => {
                // Keep the decision outstanding so the reaper still settles it.
                if let Some((id, pending)) = claimed {
                    self.pending.insert(id, pending);
                }
                Err(e)
            }
        }
    }

    /// Take the oldest outstanding decision routed to `provider_id`.
    ///
    /// Untagged feedback settles decisions for a provider in the order
    /// they were issued.
    fn claim_oldest_for(&self, provider_id: &str) -> Option<(Uuid, PendingDecision)> {
        loop {
            let oldest = self
                .pending
                .iter()
                .filter(|e| e.value().provider_id == provider_id)
                .min_by_key(|e| e.value().issued_at)
                .map(|e| *e.key())?;
            // Lost the race to another claimant; look again.
            if let Some(entry) = self.pending.remove(&oldest) {
                return Some(entry);
            }
        }
    }

    /// Drop the oldest outstanding decisions until there is room for one
    /// more under `max_pending_decisions`.  Returns the number dropped.
    ///
    /// Dropped decisions are not recorded as failures: their feedback may
    /// still arrive and is recorded as untracked when it does.
    fn evict_oldest_pending(&self) -> usize {
        let cap = self.settings.max_pending_decisions;
        let excess = (self.pending.len() + 1).saturating_sub(cap);
        if excess == 0 {
            return 0;
        }

        let mut by_age: Vec<(Instant, Uuid)> = self
            .pending
            .iter()
            .map(|e| (e.value().issued_at, *e.key()))
            .collect();
        by_age.sort_unstable();

        let evicted = by_age
            .into_iter()
            .take(excess)
            .filter(|(_, id)| self.pending.remove(id).is_some())
            .count();
        tracing::warn!(
            evicted,
            max_pending_decisions = cap,
            "pending decision limit reached; oldest decisions dropped"
        );
        evicted
    }

    /// Record failures for decisions older than `feedback_timeout_secs`.
    /// Returns the number of decisions settled.
    pub fn reap_overdue(&self) -> usize {
        self.reap_older_than(Duration::from_secs(self.settings.feedback_timeout_secs))
    }

    /// Record failures for decisions older than `max_age`.
    pub fn reap_older_than(&self, max_age: Duration) -> usize {
        let expired: Vec<Uuid> = self
            .pending
            .iter()
            .filter(|e| e.value().issued_at.elapsed() >= max_age)
            .map(|e| *e.key())
            .collect();

        let mut reaped = 0;
        for id in expired {
            let Some((id, pending)) = self.pending.remove(&id) else {
                // Answered between the scan and now.
                continue;
            };
            let age_ms = pending.issued_at.elapsed().as_secs_f64() * 1_000.0;
            let outcome = Outcome::new(pending.provider_id.clone(), pending.features, false, age_ms, 0.0)
                .for_decision(id);

            match self.recorder.record(&self.registry, &self.history, &outcome) {
                Ok(_) => {
                    reaped += 1;
                    tracing::warn!(
                        decision_id = %id,
                        provider_id = %pending.provider_id,
                        age_ms,
                        "decision expired without feedback; recorded as failure"
                    );
                    self.events.publish(RouterEvent::DecisionExpired {
                        decision_id: id,
                        provider_id: pending.provider_id,
                        age_ms,
                        timestamp: Utc::now(),
                    });
                }
                Err(e) => {
                    tracing::warn!(decision_id = %id, error = %e, "failed to settle expired decision");
                }
            }
        }
        reaped
    }

    // -- Dispatch -----------------------------------------------------------

    /// Route a task, invoke the chosen provider through `invoker` and record
    /// the outcome.
    ///
    /// A timeout or an invoker error is recorded as an unsuccessful outcome
    /// and reported in [`DispatchReport::error`]; only routing and feedback
    /// errors are returned.
    pub async fn dispatch(
        &self,
        text: &str,
        hints: &TaskHints,
        invoker: &dyn ProviderInvoker,
        timeout: Duration,
    ) -> Result<DispatchReport> {
        let decision = self.route(text, hints)?;
        let started = Instant::now();

        let called = tokio::time::timeout(timeout, invoker.invoke(&decision.provider_id, text)).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;

        let (success, latency_ms, cost, error) = match called {
            Ok(Ok(invocation)) => (
                invocation.success,
                invocation.latency_ms.unwrap_or(elapsed_ms),
                invocation.cost,
                None,
            ),
            Ok(Err(e)) => (false, elapsed_ms, 0.0, Some(e.to_string())),
            Err(_) => (
                false,
                elapsed_ms,
                0.0,
                Some(format!("timed out after {} ms", timeout.as_millis())),
            ),
        };
        if let Some(reason) = &error {
            tracing::warn!(provider_id = %decision.provider_id, reason = %reason, "provider invocation failed");
        }

        let outcome = Outcome::new(
            decision.provider_id.clone(),
            decision.features.clone(),
            success,
            latency_ms,
            cost,
        )
        .for_decision(decision.id);
        self.feedback(outcome)?;

        Ok(DispatchReport {
            decision,
            success,
            latency_ms,
            cost,
            error,
        })
    }

    // -- Introspection ------------------------------------------------------

    /// Read-only snapshots of every provider, sorted by id.
    pub fn list_providers(&self) -> Vec<ProviderSnapshot> {
        self.registry.list()
    }

    pub fn stats(&self) -> Stats {
        let providers = self.registry.all();
        let total_tasks = providers.iter().map(|p| p.total_tasks).sum();
        let avg_success_rate = if providers.is_empty() {
            0.0
        } else {
            providers.iter().map(|p| p.success_rate).sum::<f64>() / providers.len() as f64
        };
        // `all()` is sorted by id, so keeping the first maximum breaks ties on id.
        let top_performing_provider = providers
            .iter()
            .fold(None, |best: Option<&Provider>, p| match best {
                Some(b) if b.success_rate >= p.success_rate => Some(b),
                _ => Some(p),
            })
            .map(|p| p.id.clone());

        Stats {
            total_tasks,
            avg_success_rate,
            top_performing_provider,
            registered_providers: providers.len(),
            available_providers: providers.iter().filter(|p| p.available).count(),
            history_len: self.history.len(),
            pending_decisions: self.pending.len(),
        }
    }

    /// Subscribe to router events.
    pub fn subscribe(&self) -> broadcast::Receiver<std::sync::Arc<RouterEvent>> {
        self.events.subscribe()
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &RouterSettings {
        &self.settings
    }

    pub fn pending_decisions(&self) -> usize {
        self.pending.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
