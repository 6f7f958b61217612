//! Integration tests for the polyroute-core crate.
//!
//! These tests drive the router through its public facade: routing,
//! feedback, dispatch through an injected invoker, configuration loading,
//! and concurrent use from many tokio tasks.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use polyroute_core::{
    AdaptiveRouter, Capabilities, Domain, Invocation, NoProviderReason, Outcome, Provider,
    ProviderInvoker, ProviderRegistry, RouterConfig, RouterError, RouterEvent, RouterSettings,
    ScoringMode, TaskFeatures, TaskHints,
};

fn router(providers: Vec<Provider>) -> AdaptiveRouter {
    router_with_settings(providers, RouterSettings::default())
}

fn router_with_settings(providers: Vec<Provider>, settings: RouterSettings) -> AdaptiveRouter {
    let registry = ProviderRegistry::from_providers(providers).unwrap();
    AdaptiveRouter::new(registry, settings).unwrap()
}

fn provider(id: &str, caps: Capabilities) -> Provider {
    let mut p = Provider::new(id, caps);
    p.avg_response_time_ms = 800.0;
    p
}

// ═══════════════════════════════════════════════════════════════════════
//  Selection scenarios
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn single_provider_gets_fixed_confidence() {
    let router = router(vec![Provider::new("solo", Capabilities::default())]);
    for text in ["", "hello", "Write a poem", "Debug this SQL query urgently"] {
        let d = router.route(text, &TaskHints::default()).unwrap();
        assert_eq!(d.provider_id, "solo");
        assert_eq!(d.confidence, 0.75);
    }
}

#[test]
fn no_available_provider_is_reported() {
    let mut off = Provider::new("off", Capabilities::default());
    off.available = false;
    let disabled = router(vec![off]);
    let err = disabled.route("hello", &TaskHints::default()).unwrap_err();
    assert!(matches!(
        err,
        RouterError::NoProviderAvailable {
            reason: NoProviderReason::AllDisabled { registered: 1 }
        }
    ));
    assert!(err.to_string().contains("disabled"));

    let empty = router(Vec::new());
    let err = empty.route("hello", &TaskHints::default()).unwrap_err();
    assert!(err.to_string().contains("registry is empty"));
}

#[test]
fn analysis_task_goes_to_analytical_provider() {
    let x = provider(
        "x",
        Capabilities {
            analysis: 0.95,
            reasoning: 0.9,
            ..Capabilities::default()
        },
    );
    let y = provider(
        "y",
        Capabilities {
            analysis: 0.3,
            reasoning: 0.4,
            ..Capabilities::default()
        },
    );
    let router = router(vec![y, x]);

    let d = router
        .route(
            "Analyze and compare these two algorithms for performance",
            &TaskHints::default(),
        )
        .unwrap();
    assert_eq!(d.provider_id, "x");
    assert!(d.scores["x"] > d.scores["y"]);
    assert_eq!(d.fallbacks, vec!["y".to_string()]);
    assert!(d.confidence > 0.5);
}

#[test]
fn routing_is_deterministic() {
    let router = router(vec![
        provider("a", Capabilities::default()),
        provider(
            "b",
            Capabilities {
                code_generation: 0.9,
                ..Capabilities::default()
            },
        ),
        provider(
            "c",
            Capabilities {
                creativity: 0.9,
                ..Capabilities::default()
            },
        ),
    ]);
    let text = "Implement a concurrent hash map in Rust and explain the algorithm";
    let first = router.route(text, &TaskHints::default()).unwrap();
    for _ in 0..20 {
        let again = router.route(text, &TaskHints::default()).unwrap();
        assert_eq!(again.provider_id, first.provider_id);
        assert_eq!(again.score, first.score);
        assert_eq!(again.scores, first.scores);
        assert_ne!(again.id, first.id);
    }
    assert_eq!(first.provider_id, "b");
}

#[test]
fn preferred_provider_hint_is_honoured_when_close() {
    let router = router(vec![
        provider("a", Capabilities::default()),
        provider("b", Capabilities::default()),
    ]);
    let hints = TaskHints {
        preferred_provider: Some("b".into()),
        ..TaskHints::default()
    };
    let d = router.route("hello", &hints).unwrap();
    assert_eq!(d.provider_id, "b");
}

#[test]
fn domain_hint_overrides_inference() {
    let router = router(vec![provider("a", Capabilities::default())]);
    let hints = TaskHints {
        domain: Some(Domain::Creative),
        ..TaskHints::default()
    };
    let d = router.route("debug this function", &hints).unwrap();
    assert_eq!(d.features.domain, Domain::Creative);
}

// ═══════════════════════════════════════════════════════════════════════
//  Feedback
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn repeated_failures_lower_success_rate() {
    let mut x = Provider::new("x", Capabilities::default());
    x.success_rate = 0.9;
    let router = router(vec![x]);

    let mut last = 0.9;
    for _ in 0..10 {
        router
            .feedback(Outcome::new("x", TaskFeatures::floor(), false, 500.0, 0.01))
            .unwrap();
        let now = router.list_providers()[0].success_rate;
        assert!(now < last);
        assert!(now >= 0.0);
        last = now;
    }
}

#[test]
fn unknown_provider_feedback_changes_nothing() {
    let router = router(vec![provider("a", Capabilities::default())]);
    let before = router.list_providers();

    let err = router
        .feedback(Outcome::new("ghost", TaskFeatures::floor(), true, 10.0, 0.0))
        .unwrap_err();
    assert!(matches!(err, RouterError::UnknownProvider { .. }));
    assert_eq!(router.list_providers(), before);
    assert_eq!(router.stats().history_len, 0);
}

#[test]
fn list_providers_is_idempotent() {
    let router = router(vec![
        provider("a", Capabilities::default()),
        provider("b", Capabilities::default()),
    ]);
    assert_eq!(router.list_providers(), router.list_providers());
}

#[test]
fn history_switches_provider_to_blended_scoring() {
    let settings = RouterSettings {
        mi_min_samples: 5,
        ..RouterSettings::default()
    };
    let router = router_with_settings(
        vec![
            provider("a", Capabilities::default()),
            provider("b", Capabilities::default()),
        ],
        settings,
    );

    let texts = [
        "Write a poem about autumn",
        "Debug this Python function",
        "Analyze the quarterly statistics",
        "What is the capital of Peru?",
        "Explain why the sky is blue, step by step",
        "Urgent: fix the database endpoint",
    ];
    for (i, text) in texts.iter().enumerate() {
        let features = router.features(text, &TaskHints::default());
        router
            .feedback(Outcome::new("a", features, i % 2 == 0, 300.0 + 100.0 * i as f64, 0.002))
            .unwrap();
    }

    let d = router.route("Compare two sorting algorithms", &TaskHints::default()).unwrap();
    assert_eq!(d.modes["a"], ScoringMode::Blended);
    assert_eq!(d.modes["b"], ScoringMode::Fuzzy);
}

#[test]
fn stats_aggregate_outcomes() {
    let router = router(vec![
        provider("a", Capabilities::default()),
        provider("b", Capabilities::default()),
    ]);
    for success in [true, true, false] {
        router
            .feedback(Outcome::new("a", TaskFeatures::floor(), success, 100.0, 0.0))
            .unwrap();
    }
    router
        .feedback(Outcome::new("b", TaskFeatures::floor(), false, 100.0, 0.0))
        .unwrap();

    let stats = router.stats();
    assert_eq!(stats.total_tasks, 4);
    assert_eq!(stats.history_len, 4);
    assert_eq!(stats.top_performing_provider.as_deref(), Some("a"));
    assert!((0.0..=1.0).contains(&stats.avg_success_rate));
}

// ═══════════════════════════════════════════════════════════════════════
//  Dispatch
// ═══════════════════════════════════════════════════════════════════════

struct MockInvoker {
    delay: Duration,
    fail: bool,
    calls: AtomicU32,
}

impl MockInvoker {
    fn new(delay: Duration, fail: bool) -> Self {
        Self {
            delay,
            fail,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl ProviderInvoker for MockInvoker {
    async fn invoke(&self, provider_id: &str, _task: &str) -> polyroute_core::Result<Invocation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.fail {
            return Err(RouterError::InvocationFailed {
                provider_id: provider_id.to_string(),
                reason: "HTTP 503".into(),
            });
        }
        Ok(Invocation {
            success: true,
            cost: 0.02,
            latency_ms: Some(250.0),
        })
    }
}

#[tokio::test]
async fn dispatch_records_successful_outcome() {
    let router = router(vec![provider("a", Capabilities::default())]);
    let invoker = MockInvoker::new(Duration::ZERO, false);

    let report = router
        .dispatch("hello", &TaskHints::default(), &invoker, Duration::from_secs(5))
        .await
        .unwrap();
    assert!(report.success);
    assert_eq!(report.latency_ms, 250.0);
    assert!(report.error.is_none());
    assert_eq!(invoker.calls.load(Ordering::SeqCst), 1);

    let stats = router.stats();
    assert_eq!(stats.total_tasks, 1);
    assert_eq!(stats.pending_decisions, 0);
}

#[tokio::test]
async fn dispatch_timeout_is_recorded_as_failure() {
    let router = router(vec![provider("a", Capabilities::default())]);
    let before = router.list_providers()[0].success_rate;
    let invoker = MockInvoker::new(Duration::from_secs(10), false);

    let report = router
        .dispatch("hello", &TaskHints::default(), &invoker, Duration::from_millis(20))
        .await
        .unwrap();
    assert!(!report.success);
    assert!(report.error.unwrap().contains("timed out"));

    let after = &router.list_providers()[0];
    assert!(after.success_rate < before);
    assert_eq!(after.total_tasks, 1);
    assert_eq!(router.pending_decisions(), 0);
}

#[tokio::test]
async fn dispatch_invoker_error_is_recorded_as_failure() {
    let router = router(vec![provider("a", Capabilities::default())]);
    let invoker = MockInvoker::new(Duration::ZERO, true);

    let report = router
        .dispatch("hello", &TaskHints::default(), &invoker, Duration::from_secs(5))
        .await
        .unwrap();
    assert!(!report.success);
    assert!(report.error.unwrap().contains("503"));
    assert_eq!(router.stats().total_tasks, 1);
}

#[tokio::test]
async fn dispatch_publishes_decision_and_outcome() {
    let router = router(vec![provider("a", Capabilities::default())]);
    let mut rx = router.subscribe();
    let invoker = MockInvoker::new(Duration::ZERO, false);

    router
        .dispatch("hello", &TaskHints::default(), &invoker, Duration::from_secs(5))
        .await
        .unwrap();

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert!(matches!(first.as_ref(), RouterEvent::DecisionMade { .. }));
    assert!(matches!(
        second.as_ref(),
        RouterEvent::OutcomeRecorded { success: true, .. }
    ));
}

// ═══════════════════════════════════════════════════════════════════════
//  Concurrency
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_route_and_feedback() {
    let router = Arc::new(router(vec![
        provider("a", Capabilities::default()),
        provider(
            "b",
            Capabilities {
                creativity: 0.9,
                ..Capabilities::default()
            },
        ),
        provider(
            "c",
            Capabilities {
                code_generation: 0.9,
                ..Capabilities::default()
            },
        ),
    ]));

    let mut handles = Vec::new();
    for worker in 0..16u32 {
        let router = Arc::clone(&router);
        handles.push(tokio::spawn(async move {
            for i in 0..25u32 {
                let text = match (worker + i) % 3 {
                    0 => "Write a story about dragons",
                    1 => "Refactor this Rust function",
                    _ => "hello",
                };
                let d = router.route(text, &TaskHints::default()).unwrap();
                let outcome = Outcome::new(
                    d.provider_id.clone(),
                    d.features.clone(),
                    (worker + i) % 4 != 0,
                    100.0 + f64::from(i),
                    0.001,
                )
                .for_decision(d.id);
                router.feedback(outcome).unwrap();
                tokio::task::yield_now().await;
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let stats = router.stats();
    assert_eq!(stats.total_tasks, 400);
    assert_eq!(stats.history_len, 400);
    assert_eq!(stats.pending_decisions, 0);
    for p in router.registry().all() {
        assert!(p.tasks_solved <= p.total_tasks);
        assert!((0.0..=1.0).contains(&p.success_rate));
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Configuration
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn router_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("polyroute.toml");
    std::fs::write(
        &path,
        r#"
[settings]
history_capacity = 50

[[providers]]
id = "keyed"
api_key_env = "KEYED_API_KEY"

[providers.capabilities]
analysis = 0.9

[[providers]]
id = "unkeyed"
api_key_env = "MISSING_API_KEY"
"#,
    )
    .unwrap();

    let config = RouterConfig::load(&path).unwrap();
    let router = AdaptiveRouter::from_config(&config, |var| {
        (var == "KEYED_API_KEY").then(|| "secret".to_string())
    })
    .unwrap();

    let stats = router.stats();
    assert_eq!(stats.registered_providers, 2);
    assert_eq!(stats.available_providers, 1);
    assert_eq!(router.settings().history_capacity, 50);

    let d = router.route("Compare these reports", &TaskHints::default()).unwrap();
    assert_eq!(d.provider_id, "keyed");
}

#[test]
fn builtin_catalog_without_keys_has_no_available_provider() {
    let router = AdaptiveRouter::from_config(&RouterConfig::builtin(), |_| None).unwrap();
    let err = router.route("hello", &TaskHints::default()).unwrap_err();
    assert!(matches!(
        err,
        RouterError::NoProviderAvailable {
            reason: NoProviderReason::AllDisabled { registered: 5 }
        }
    ));
}
