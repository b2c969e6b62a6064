//! Rolling-window provider health tracker.
//!
//! One entry per provider id, created on first touch and process-lived.
//! Mutation is exclusive per entry; distinct providers do not contend.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use sqlx::PgPool;
use tracing::{debug, warn};

use crate::council::ProviderError;

use super::types::{HealthStatus, ProviderHealth};

/// Default rolling window over which success rate is computed.
const DEFAULT_WINDOW_MINUTES: i64 = 15;
/// Default consecutive-failure threshold for disabling a provider.
const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
/// Number of latency observations kept for the running average.
const LATENCY_WINDOW: usize = 100;
/// Success rate below which a provider is considered degraded.
const DEGRADED_RATE: f64 = 0.8;

/// One request observation inside the rolling window.
#[derive(Debug, Clone, Copy)]
struct HistoryRecord {
    at: DateTime<Utc>,
    success: bool,
}

/// Internal per-provider state.
#[derive(Debug, Default)]
struct ProviderHealthState {
    history: VecDeque<HistoryRecord>,
    consecutive_failures: u32,
    success_count: u32,
    total_requests: u32,
    last_failure_at: Option<DateTime<Utc>>,
    disabled_reason: Option<String>,
    latencies: VecDeque<u64>,
}

impl ProviderHealthState {
    /// Append a record, then prune records older than the window.
    ///
    /// Order matters: the prune step recomputes `total_requests` and
    /// `success_count` from the surviving records, so the record appended
    /// by the current call is always visible to success-rate reads made
    /// in the same call.
    fn append_then_prune(&mut self, success: bool, now: DateTime<Utc>, window: Duration) {
        self.history.push_back(HistoryRecord { at: now, success });

        let cutoff = now - window;
        while self
            .history
            .front()
            .is_some_and(|record| record.at < cutoff)
        {
            self.history.pop_front();
        }

        self.total_requests = self.history.len() as u32;
        self.success_count = self.history.iter().filter(|r| r.success).count() as u32;
    }

    fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            f64::from(self.success_count) / f64::from(self.total_requests)
        }
    }

    fn avg_latency_ms(&self) -> f64 {
        if self.latencies.is_empty() {
            0.0
        } else {
            self.latencies.iter().sum::<u64>() as f64 / self.latencies.len() as f64
        }
    }

    fn push_latency(&mut self, latency_ms: u64) {
        if self.latencies.len() == LATENCY_WINDOW {
            self.latencies.pop_front();
        }
        self.latencies.push_back(latency_ms);
    }

    fn status(&self, threshold: u32) -> HealthStatus {
        if self.consecutive_failures >= threshold {
            HealthStatus::Disabled
        } else if self.total_requests > 0 && self.success_rate() < DEGRADED_RATE {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    fn view(&self, provider_id: &str, threshold: u32) -> ProviderHealth {
        ProviderHealth {
            provider_id: provider_id.to_string(),
            status: self.status(threshold),
            success_rate: self.success_rate(),
            avg_latency_ms: self.avg_latency_ms(),
            last_failure_at: self.last_failure_at,
            disabled_reason: self.disabled_reason.clone(),
        }
    }
}

/// Process-wide health tracker.
///
/// Entries are created on first touch and never destroyed. All public
/// operations are thread-safe; mutation is serialized per provider entry.
pub struct HealthTracker {
    providers: DashMap<String, ProviderHealthState>,
    window: Duration,
    failure_threshold: u32,
    pool: Option<PgPool>,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    /// Tracker with the default 15-minute window and threshold of 5.
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(
            Duration::minutes(DEFAULT_WINDOW_MINUTES),
            DEFAULT_FAILURE_THRESHOLD,
        )
    }

    /// Tracker with an explicit rolling window and failure threshold.
    #[must_use]
    pub fn with_settings(window: Duration, failure_threshold: u32) -> Self {
        Self {
            providers: DashMap::new(),
            window,
            failure_threshold: failure_threshold.max(1),
            pool: None,
        }
    }

    /// Enable best-effort persistence of health snapshots.
    ///
    /// Every state change upserts a `provider_health` row; persistence
    /// errors are logged and swallowed.
    #[must_use]
    pub fn with_persistence(mut self, pool: PgPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// The configured consecutive-failure threshold.
    #[must_use]
    pub const fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// Idempotently create an empty state for the provider.
    pub fn initialize(&self, provider_id: &str) {
        self.providers.entry(provider_id.to_string()).or_default();
    }

    /// Record a successful call and reset the consecutive-failure count.
    pub fn record_success(&self, provider_id: &str, latency_ms: Option<u64>) {
        let now = Utc::now();
        let view = {
            let mut entry = self.providers.entry(provider_id.to_string()).or_default();
            let state = entry.value_mut();
            state.append_then_prune(true, now, self.window);
            state.consecutive_failures = 0;
            state.disabled_reason = None;
            if let Some(latency) = latency_ms {
                state.push_latency(latency);
            }
            state.view(provider_id, self.failure_threshold)
        };
        self.persist(view);
    }

    /// Record a failed call.
    ///
    /// Returns `true` iff the provider is disabled after this failure.
    pub fn record_failure(&self, provider_id: &str, error: Option<&ProviderError>) -> bool {
        let now = Utc::now();
        let (view, disabled) = {
            let mut entry = self.providers.entry(provider_id.to_string()).or_default();
            let state = entry.value_mut();
            state.append_then_prune(false, now, self.window);
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            state.last_failure_at = Some(now);

            let disabled = state.status(self.failure_threshold) == HealthStatus::Disabled;
            if disabled && state.disabled_reason.is_none() {
                state.disabled_reason = Some(error.map_or_else(
                    || format!("{} consecutive failures", state.consecutive_failures),
                    |e| format!("{} consecutive failures, last: {e}", state.consecutive_failures),
                ));
            }
            (state.view(provider_id, self.failure_threshold), disabled)
        };

        if disabled {
            warn!(
                provider_id = %provider_id,
                reason = view.disabled_reason.as_deref().unwrap_or(""),
                "Provider disabled by health tracker"
            );
        }
        self.persist(view);
        disabled
    }

    /// Forcibly disable the provider.
    ///
    /// Fixes `consecutive_failures` at the threshold to keep the status
    /// derivation consistent with failure-driven disabling.
    pub fn mark_disabled(&self, provider_id: &str, reason: &str) {
        let view = {
            let mut entry = self.providers.entry(provider_id.to_string()).or_default();
            let state = entry.value_mut();
            state.consecutive_failures = self.failure_threshold;
            state.disabled_reason = Some(reason.to_string());
            state.view(provider_id, self.failure_threshold)
        };
        debug!(provider_id = %provider_id, reason = %reason, "Provider marked disabled");
        self.persist(view);
    }

    /// Clear sticky disabled state, returning the provider to a fresh
    /// (healthy, empty-window) state.
    pub fn enable_provider(&self, provider_id: &str) {
        let view = {
            let mut entry = self.providers.entry(provider_id.to_string()).or_default();
            let state = entry.value_mut();
            *state = ProviderHealthState::default();
            state.view(provider_id, self.failure_threshold)
        };
        debug!(provider_id = %provider_id, "Provider re-enabled");
        self.persist(view);
    }

    /// Alias of [`Self::enable_provider`]; kept as a distinct operation
    /// so callers can express intent.
    pub fn reset_failure_count(&self, provider_id: &str) {
        self.enable_provider(provider_id);
    }

    /// Whether the provider is currently disabled.
    #[must_use]
    pub fn is_disabled(&self, provider_id: &str) -> bool {
        self.health_status(provider_id) == HealthStatus::Disabled
    }

    /// Current consecutive-failure count; 0 for untracked providers.
    #[must_use]
    pub fn failure_count(&self, provider_id: &str) -> u32 {
        self.providers
            .get(provider_id)
            .map_or(0, |state| state.consecutive_failures)
    }

    /// Reason attached when the provider was disabled, if any.
    #[must_use]
    pub fn disabled_reason(&self, provider_id: &str) -> Option<String> {
        self.providers
            .get(provider_id)
            .and_then(|state| state.disabled_reason.clone())
    }

    /// Success rate over the rolling window; 0 when the window is empty
    /// or the provider is untracked. Never NaN.
    #[must_use]
    pub fn success_rate(&self, provider_id: &str) -> f64 {
        self.providers
            .get(provider_id)
            .map_or(0.0, |state| state.success_rate())
    }

    /// Current health verdict; healthy for untracked providers.
    #[must_use]
    pub fn health_status(&self, provider_id: &str) -> HealthStatus {
        self.providers
            .get(provider_id)
            .map_or(HealthStatus::Healthy, |state| {
                state.status(self.failure_threshold)
            })
    }

    /// Timestamp of the most recent recorded failure.
    #[must_use]
    pub fn last_failure(&self, provider_id: &str) -> Option<DateTime<Utc>> {
        self.providers
            .get(provider_id)
            .and_then(|state| state.last_failure_at)
    }

    /// All provider ids with a tracked state.
    #[must_use]
    pub fn tracked_providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .providers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Exposed health view for one provider.
    #[must_use]
    pub fn health(&self, provider_id: &str) -> ProviderHealth {
        self.providers
            .get(provider_id)
            .map_or_else(
                || ProviderHealthState::default().view(provider_id, self.failure_threshold),
                |state| state.view(provider_id, self.failure_threshold),
            )
    }

    /// Best-effort snapshot upsert. Never fails the caller.
    fn persist(&self, view: ProviderHealth) {
        if let Some(pool) = &self.pool {
            let pool = pool.clone();
            tokio::spawn(async move {
                if let Err(e) = crate::db::upsert_provider_health(&pool, &view).await {
                    warn!(provider_id = %view.provider_id, error = %e, "Provider health upsert failed");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::council::ProviderErrorKind;

    fn transport_error() -> ProviderError {
        ProviderError::new(ProviderErrorKind::TransportError, "connection reset", true)
    }

    #[test]
    fn fresh_provider_is_healthy_with_zero_rate() {
        let tracker = HealthTracker::new();
        tracker.initialize("openai");

        assert_eq!(tracker.health_status("openai"), HealthStatus::Healthy);
        assert!((tracker.success_rate("openai") - 0.0).abs() < f64::EPSILON);
        assert!(!tracker.is_disabled("openai"));
    }

    #[test]
    fn new_record_is_visible_to_same_call_rate() {
        let tracker = HealthTracker::new();
        tracker.record_success("openai", Some(100));

        // Append-then-prune: the record just added must already count.
        assert!((tracker.success_rate("openai") - 1.0).abs() < f64::EPSILON);

        tracker.record_failure("openai", None);
        assert!((tracker.success_rate("openai") - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn threshold_consecutive_failures_disable() {
        let tracker = HealthTracker::new();
        for i in 0..5 {
            let disabled = tracker.record_failure("anthropic", Some(&transport_error()));
            assert_eq!(disabled, i == 4, "disabled only on the fifth failure");
        }

        assert!(tracker.is_disabled("anthropic"));
        assert_eq!(tracker.failure_count("anthropic"), 5);
        assert!(tracker.disabled_reason("anthropic").is_some());
        assert!(tracker.last_failure("anthropic").is_some());
    }

    #[test]
    fn intervening_success_resets_consecutive_failures() {
        let tracker = HealthTracker::new();
        for _ in 0..4 {
            tracker.record_failure("openai", None);
        }
        tracker.record_success("openai", Some(50));
        assert_eq!(tracker.failure_count("openai"), 0);

        for _ in 0..4 {
            tracker.record_failure("openai", None);
        }
        assert!(!tracker.is_disabled("openai"));
    }

    #[test]
    fn enable_provider_returns_to_healthy() {
        let tracker = HealthTracker::new();
        for _ in 0..5 {
            tracker.record_failure("openai", None);
        }
        assert!(tracker.is_disabled("openai"));

        tracker.enable_provider("openai");
        assert_eq!(tracker.health_status("openai"), HealthStatus::Healthy);
        assert_eq!(tracker.failure_count("openai"), 0);
        assert!(tracker.disabled_reason("openai").is_none());
    }

    #[test]
    fn reset_failure_count_clears_sticky_state() {
        let tracker = HealthTracker::new();
        tracker.mark_disabled("gemini", "operator action");
        assert!(tracker.is_disabled("gemini"));
        assert_eq!(tracker.failure_count("gemini"), 5);

        tracker.reset_failure_count("gemini");
        assert_eq!(tracker.health_status("gemini"), HealthStatus::Healthy);
    }

    #[test]
    fn low_success_rate_degrades() {
        let tracker = HealthTracker::new();
        tracker.record_success("openai", None);
        tracker.record_failure("openai", None);
        tracker.record_failure("openai", None);

        // 1/3 success rate, below 0.8, not yet disabled.
        assert_eq!(tracker.health_status("openai"), HealthStatus::Degraded);
    }

    #[test]
    fn success_rate_always_in_unit_interval() {
        let tracker = HealthTracker::new();
        for i in 0..50 {
            if i % 3 == 0 {
                tracker.record_failure("p", None);
            } else {
                tracker.record_success("p", Some(10));
            }
            let rate = tracker.success_rate("p");
            assert!(rate.is_finite());
            assert!((0.0..=1.0).contains(&rate));
        }
    }

    #[test]
    fn latency_window_evicts_fifo() {
        let tracker = HealthTracker::new();
        for i in 0..150u64 {
            tracker.record_success("p", Some(i));
        }

        // Only the last 100 observations (50..149) remain: mean 99.5.
        let avg = tracker.health("p").avg_latency_ms;
        assert!((avg - 99.5).abs() < 1e-9);
    }

    #[test]
    fn tracked_providers_sorted() {
        let tracker = HealthTracker::new();
        tracker.initialize("zeta");
        tracker.initialize("alpha");
        assert_eq!(tracker.tracked_providers(), vec!["alpha", "zeta"]);
    }
}
