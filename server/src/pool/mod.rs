//! Provider Pool
//!
//! Thin dispatcher from (member, prompt, context) to an upstream adapter.
//! Refuses calls to disabled providers, applies the member's retry policy,
//! coerces adapter content to a string, and reports every outcome to the
//! health tracker exactly once.

mod adapter;
mod content;
mod mock;
mod retry;

pub use adapter::{AdapterResponse, ProviderAdapter};
pub use content::coerce_content;
pub use mock::{MockAdapter, MockOutcome};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::council::{ConversationContext, CouncilMember, ProviderError, ProviderReply};
use crate::health::{HealthTracker, ProviderHealth};

use retry::backoff_delay;

/// Dispatcher over the registered adapters.
pub struct ProviderPool {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
    health: Arc<HealthTracker>,
}

impl ProviderPool {
    /// Create an empty pool over the given health tracker.
    #[must_use]
    pub fn new(health: Arc<HealthTracker>) -> Self {
        Self {
            adapters: HashMap::new(),
            health,
        }
    }

    /// Bind an adapter for a provider id, replacing any previous binding.
    pub fn register(&mut self, provider_id: impl Into<String>, adapter: Arc<dyn ProviderAdapter>) {
        let provider_id = provider_id.into();
        self.health.initialize(&provider_id);
        self.adapters.insert(provider_id, adapter);
    }

    /// Provider ids with a bound adapter.
    #[must_use]
    pub fn registered_providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.adapters.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Send one prompt to the member's provider.
    ///
    /// Refuses with `ProviderDisabled` when the tracker reports the
    /// provider disabled and with `AdapterNotConfigured` when no adapter
    /// is bound; neither refusal reaches the adapter or counts against
    /// health. Otherwise the adapter is called under the member's retry
    /// policy and the final outcome is reported to the tracker once.
    #[tracing::instrument(skip_all, fields(member_id = %member.member_id, provider_id = %member.provider_id))]
    pub async fn send_request(
        &self,
        member: &CouncilMember,
        prompt: &str,
        context: Option<&ConversationContext>,
    ) -> Result<ProviderReply, ProviderError> {
        let provider_id = member.provider_id.as_str();

        if self.health.is_disabled(provider_id) {
            debug!("Refusing call to disabled provider");
            return Err(ProviderError::provider_disabled(provider_id));
        }

        let Some(adapter) = self.adapters.get(provider_id) else {
            warn!("No adapter bound for provider");
            return Err(ProviderError::adapter_not_configured(provider_id));
        };

        let started = Instant::now();
        let max_attempts = member.retry.max_attempts.max(1);
        let mut attempt = 1u32;

        let failure = loop {
            match adapter.complete(member, prompt, context).await {
                Ok(response) => {
                    let latency_ms = started.elapsed().as_millis() as u64;
                    let content = coerce_content(&response.content);
                    self.health.record_success(provider_id, Some(latency_ms));
                    crate::observability::metrics::record_provider_call(provider_id, true);
                    return Ok(ProviderReply {
                        content,
                        usage: response.usage,
                        latency_ms,
                    });
                }
                Err(error) => {
                    let retryable = error.retryable
                        && member.retry.retryable_kinds.contains(&error.kind)
                        && attempt < max_attempts;
                    if !retryable {
                        break error;
                    }

                    let delay = backoff_delay(&member.retry, attempt);
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        kind = %error.kind,
                        "Retrying adapter call after failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        };

        if failure.kind.counts_against_health() {
            self.health.record_failure(provider_id, Some(&failure));
            crate::observability::metrics::record_provider_call(provider_id, false);
        }
        debug!(kind = %failure.kind, attempts = attempt, "Adapter call failed");
        Err(failure)
    }

    /// Health view for a provider, computed from the tracker.
    #[must_use]
    pub fn provider_health(&self, provider_id: &str) -> ProviderHealth {
        self.health.health(provider_id)
    }

    /// Idempotently mark a provider disabled.
    pub fn mark_provider_disabled(&self, provider_id: &str, reason: &str) {
        if !self.health.is_disabled(provider_id) {
            self.health.mark_disabled(provider_id, reason);
        }
    }

    /// The tracker backing this pool.
    #[must_use]
    pub fn health_tracker(&self) -> &Arc<HealthTracker> {
        &self.health
    }
}

/// Convenience used by tests and embedded setups: a pool with one mock
/// adapter bound per provider id.
#[must_use]
pub fn mock_pool(
    health: Arc<HealthTracker>,
    adapters: Vec<(&str, Arc<MockAdapter>)>,
) -> Arc<ProviderPool> {
    let mut pool = ProviderPool::new(health);
    for (provider_id, adapter) in adapters {
        pool.register(provider_id, adapter);
    }
    Arc::new(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::council::{ProviderErrorKind, RetryPolicy};
    use serde_json::json;

    fn member(provider_id: &str) -> CouncilMember {
        CouncilMember {
            member_id: format!("{provider_id}-m"),
            provider_id: provider_id.to_string(),
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

    #[tokio::test]
    async fn unbound_provider_is_refused_without_health_impact() {
        let health = Arc::new(HealthTracker::new());
        let pool = ProviderPool::new(Arc::clone(&health));

        let err = pool
            .send_request(&member("ghost"), "hello", None)
            .await
            .expect_err("must refuse");
        assert_eq!(err.kind, ProviderErrorKind::AdapterNotConfigured);
        assert_eq!(health.failure_count("ghost"), 0);
    }

    #[tokio::test]
    async fn disabled_provider_is_refused_before_the_adapter() {
        let health = Arc::new(HealthTracker::new());
        let adapter = Arc::new(MockAdapter::always_succeed(json!("answer")));
        let pool = mock_pool(Arc::clone(&health), vec![("openai", Arc::clone(&adapter))]);

        health.mark_disabled("openai", "test");
        let err = pool
            .send_request(&member("openai"), "hello", None)
            .await
            .expect_err("must refuse");
        assert_eq!(err.kind, ProviderErrorKind::ProviderDisabled);
        assert_eq!(adapter.calls(), 0);
    }

    #[tokio::test]
    async fn success_reports_latency_to_tracker() {
        let health = Arc::new(HealthTracker::new());
        let adapter = Arc::new(MockAdapter::always_succeed(json!("fine")));
        let pool = mock_pool(Arc::clone(&health), vec![("openai", adapter)]);

        let reply = pool
            .send_request(&member("openai"), "hello", None)
            .await
            .expect("must succeed");
        assert_eq!(reply.content, "fine");
        assert!((health.success_rate("openai") - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn retry_exhausts_then_reports_one_failure() {
        let health = Arc::new(HealthTracker::new());
        let adapter = Arc::new(MockAdapter::always_fail(ProviderErrorKind::TransportError));
        let pool = mock_pool(Arc::clone(&health), vec![("openai", Arc::clone(&adapter))]);

        let mut m = member("openai");
        m.retry = RetryPolicy {
            max_attempts: 3,
            initial_delay_ms: 1,
            max_delay_ms: 2,
            backoff_multiplier: 1.0,
            retryable_kinds: vec![ProviderErrorKind::TransportError],
        };

        let err = pool
            .send_request(&m, "hello", None)
            .await
            .expect_err("must fail");
        assert_eq!(err.kind, ProviderErrorKind::TransportError);
        assert_eq!(adapter.calls(), 3);
        // Exactly one failure reported, not one per attempt.
        assert_eq!(health.failure_count("openai"), 1);
    }

    #[tokio::test]
    async fn non_retryable_kind_fails_fast() {
        let health = Arc::new(HealthTracker::new());
        let adapter = Arc::new(MockAdapter::always_fail(ProviderErrorKind::UpstreamError));
        let pool = mock_pool(Arc::clone(&health), vec![("openai", Arc::clone(&adapter))]);

        let mut m = member("openai");
        m.retry.max_attempts = 3;

        let err = pool
            .send_request(&m, "hello", None)
            .await
            .expect_err("must fail");
        assert_eq!(err.kind, ProviderErrorKind::UpstreamError);
        assert_eq!(adapter.calls(), 1);
    }

    #[tokio::test]
    async fn mark_provider_disabled_is_idempotent() {
        let health = Arc::new(HealthTracker::new());
        let pool = ProviderPool::new(Arc::clone(&health));

        pool.mark_provider_disabled("openai", "first");
        pool.mark_provider_disabled("openai", "second");

        assert!(health.is_disabled("openai"));
        assert_eq!(health.disabled_reason("openai").as_deref(), Some("first"));
    }
}
