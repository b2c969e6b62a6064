//! Provider health lifecycle tests through the pool.

use std::sync::Arc;

use serde_json::json;

use cv_server::council::{CouncilMember, ProviderErrorKind, RetryPolicy};
use cv_server::health::{HealthStatus, HealthTracker};
use cv_server::pool::{mock_pool, MockAdapter};

fn member(provider: &str) -> CouncilMember {
    CouncilMember {
        member_id: format!("{provider}-member"),
        provider_id: provider.to_string(),
        model: "test-model".to_string(),
        version: None,
        weight: None,
        timeout_seconds: 5.0,
        retry: RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        },
        cost_per_1k_tokens: None,
    }
}

// S6/P4: five consecutive failures disable the provider; traffic is then
// refused before the adapter, and an explicit reset restores service.
#[tokio::test]
async fn five_consecutive_failures_disable_then_reset_restores() {
    let health = Arc::new(HealthTracker::new());
    let adapter = Arc::new(MockAdapter::always_fail(ProviderErrorKind::TransportError));
    let pool = mock_pool(Arc::clone(&health), vec![("openai", Arc::clone(&adapter))]);
    let m = member("openai");

    for _ in 0..5 {
        let err = pool
            .send_request(&m, "q", None)
            .await
            .expect_err("scripted failure");
        assert_eq!(err.kind, ProviderErrorKind::TransportError);
    }

    assert!(health.is_disabled("openai"));
    assert_eq!(adapter.calls(), 5);

    // Disabled providers are refused without reaching the adapter.
    let err = pool
        .send_request(&m, "q", None)
        .await
        .expect_err("refused while disabled");
    assert_eq!(err.kind, ProviderErrorKind::ProviderDisabled);
    assert_eq!(adapter.calls(), 5);

    health.reset_failure_count("openai");
    assert_eq!(health.health_status("openai"), HealthStatus::Healthy);

    // Traffic flows again after the reset.
    let err = pool
        .send_request(&m, "q", None)
        .await
        .expect_err("adapter still scripted to fail");
    assert_eq!(err.kind, ProviderErrorKind::TransportError);
    assert_eq!(adapter.calls(), 6);
}

// The refusal path never counts against health, so a disabled provider
// cannot dig itself deeper while refused.
#[tokio::test]
async fn refusals_do_not_accumulate_failures() {
    let health = Arc::new(HealthTracker::new());
    let adapter = Arc::new(MockAdapter::always_fail(ProviderErrorKind::TransportError));
    let pool = mock_pool(Arc::clone(&health), vec![("openai", adapter)]);
    let m = member("openai");

    for _ in 0..5 {
        let _ = pool.send_request(&m, "q", None).await;
    }
    assert_eq!(health.failure_count("openai"), 5);

    for _ in 0..10 {
        let _ = pool.send_request(&m, "q", None).await;
    }
    assert_eq!(health.failure_count("openai"), 5);
}

// P5: rates stay in [0, 1] through a mixed workload driven via the pool.
#[tokio::test]
async fn success_rate_stays_bounded_through_the_pool() {
    let health = Arc::new(HealthTracker::new());
    let adapter = Arc::new(MockAdapter::sequence(
        (0..20)
            .map(|i| {
                if i % 4 == 0 {
                    cv_server::pool::MockOutcome::Fail {
                        kind: ProviderErrorKind::UpstreamError,
                    }
                } else {
                    cv_server::pool::MockOutcome::succeed(json!("ok"))
                }
            })
            .collect(),
    ));
    let pool = mock_pool(Arc::clone(&health), vec![("openai", adapter)]);
    let m = member("openai");

    for _ in 0..20 {
        let _ = pool.send_request(&m, "q", None).await;
        let rate = health.success_rate("openai");
        assert!(rate.is_finite());
        assert!((0.0..=1.0).contains(&rate));
    }

    let view = pool.provider_health("openai");
    assert!((view.success_rate - 0.75).abs() < 1e-9);
    assert!(view.avg_latency_ms >= 0.0);
}

// An adapter success after failures clears the consecutive count via the
// pool's own reporting.
#[tokio::test]
async fn pool_success_resets_consecutive_failures() {
    let health = Arc::new(HealthTracker::new());
    let adapter = Arc::new(MockAdapter::sequence(vec![
        cv_server::pool::MockOutcome::Fail {
            kind: ProviderErrorKind::TransportError,
        },
        cv_server::pool::MockOutcome::Fail {
            kind: ProviderErrorKind::TransportError,
        },
        cv_server::pool::MockOutcome::succeed(json!("recovered")),
    ]));
    let pool = mock_pool(Arc::clone(&health), vec![("openai", adapter)]);
    let m = member("openai");

    let _ = pool.send_request(&m, "q", None).await;
    let _ = pool.send_request(&m, "q", None).await;
    assert_eq!(health.failure_count("openai"), 2);

    pool.send_request(&m, "q", None).await.expect("recovery");
    assert_eq!(health.failure_count("openai"), 0);
    assert_eq!(health.health_status("openai"), HealthStatus::Degraded);
}
