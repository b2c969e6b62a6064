//! Health tracking types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Three-state health verdict for a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Serving normally.
    Healthy,
    /// Success rate below threshold but still serving.
    Degraded,
    /// Sticky state: traffic refused until explicit re-enable or reset.
    Disabled,
}

impl HealthStatus {
    /// String identifier used in logs and persisted rows.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Disabled => "disabled",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exposed health view for one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealth {
    /// Provider identifier.
    pub provider_id: String,
    /// Current verdict.
    pub status: HealthStatus,
    /// Success rate over the rolling window, in [0, 1]; 0 when empty.
    pub success_rate: f64,
    /// Running average latency over the last observed calls, in ms.
    pub avg_latency_ms: f64,
    /// When the most recent failure was recorded.
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Reason attached when the provider was disabled.
    pub disabled_reason: Option<String>,
}
