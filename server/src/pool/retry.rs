//! Jittered exponential backoff for adapter retries.

use std::time::Duration;

use rand::Rng;

use crate::council::RetryPolicy;

/// Deterministic backoff base for the given attempt (1-based), capped at
/// the policy's max delay.
#[must_use]
pub fn backoff_base_ms(policy: &RetryPolicy, attempt: u32) -> u64 {
    let exponent = attempt.saturating_sub(1).min(31);
    let base = policy.initial_delay_ms as f64 * policy.backoff_multiplier.powi(exponent as i32);
    if !base.is_finite() || base < 0.0 {
        return policy.max_delay_ms;
    }
    (base as u64).min(policy.max_delay_ms)
}

/// Backoff with jitter in [50%, 100%] of the base, so concurrent retries
/// against the same upstream spread out.
#[must_use]
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let base = backoff_base_ms(policy, attempt);
    let jittered = rand::thread_rng().gen_range(base / 2..=base.max(1));
    Duration::from_millis(jittered)
}
