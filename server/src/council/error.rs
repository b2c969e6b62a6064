//! Council Error Types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by `process_request`.
///
/// Per-member failures never escape; they are absorbed into the partial
/// result set as long as at least one member answered.
#[derive(Debug, Error)]
pub enum CouncilError {
    /// Invalid timeout or malformed configuration; fails before fan-out.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Active members below the configured minimum.
    #[error("Insufficient quorum: {active} active members, {minimum} required")]
    InsufficientQuorum { active: usize, minimum: usize },

    /// Fan-out completed with zero successful responses.
    #[error("No council member produced a response")]
    NoResponses,

    /// The synthesis collaborator failed.
    #[error("Synthesis failed: {0}")]
    Synthesis(String),
}

/// Adapter-facing error taxonomy, consumed internally and never surfaced
/// by `process_request` directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// The per-member deadline fired before the adapter replied.
    MemberTimeout,
    /// The provider is disabled in the health tracker.
    ProviderDisabled,
    /// No adapter is bound for the provider.
    AdapterNotConfigured,
    /// The upstream rejected the call for rate limiting.
    RateLimit,
    /// The upstream returned a server error.
    UpstreamError,
    /// The call failed at the transport layer.
    TransportError,
}

impl ProviderErrorKind {
    /// String identifier for logs and persisted rows.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MemberTimeout => "member_timeout",
            Self::ProviderDisabled => "provider_disabled",
            Self::AdapterNotConfigured => "adapter_not_configured",
            Self::RateLimit => "rate_limit",
            Self::UpstreamError => "upstream_error",
            Self::TransportError => "transport_error",
        }
    }

    /// Whether failures of this kind count against provider health.
    ///
    /// `ProviderDisabled` and `AdapterNotConfigured` never reached the
    /// upstream, so they do not count.
    #[must_use]
    pub const fn counts_against_health(self) -> bool {
        !matches!(self, Self::ProviderDisabled | Self::AdapterNotConfigured)
    }
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured failure from an adapter call or the pool itself.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    /// Kind tag inspected by the orchestrator and health bookkeeping.
    pub kind: ProviderErrorKind,
    /// Human-readable detail.
    pub message: String,
    /// Whether the adapter considers the failure retryable.
    pub retryable: bool,
}

impl ProviderError {
    /// Construct an error of the given kind.
    #[must_use]
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable,
        }
    }

    /// Synthetic failure produced when a per-member deadline fires.
    #[must_use]
    pub fn member_timeout(timeout_seconds: f64) -> Self {
        Self::new(
            ProviderErrorKind::MemberTimeout,
            format!("member deadline of {timeout_seconds}s elapsed"),
            false,
        )
    }

    /// Refusal for a provider currently disabled in the health tracker.
    #[must_use]
    pub fn provider_disabled(provider_id: &str) -> Self {
        Self::new(
            ProviderErrorKind::ProviderDisabled,
            format!("provider {provider_id} is disabled"),
            false,
        )
    }

    /// Refusal when no adapter is bound for the provider.
    #[must_use]
    pub fn adapter_not_configured(provider_id: &str) -> Self {
        Self::new(
            ProviderErrorKind::AdapterNotConfigured,
            format!("no adapter configured for provider {provider_id}"),
            false,
        )
    }
}

/// Failure from the synthesis collaborator.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct SynthesisError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_and_unbound_do_not_count_against_health() {
        assert!(!ProviderErrorKind::ProviderDisabled.counts_against_health());
        assert!(!ProviderErrorKind::AdapterNotConfigured.counts_against_health());

        assert!(ProviderErrorKind::MemberTimeout.counts_against_health());
        assert!(ProviderErrorKind::RateLimit.counts_against_health());
        assert!(ProviderErrorKind::UpstreamError.counts_against_health());
        assert!(ProviderErrorKind::TransportError.counts_against_health());
    }
}
