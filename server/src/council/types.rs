//! Council data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ProviderErrorKind;

/// Token usage reported by an adapter for a single completion.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt.
    pub prompt_tokens: u32,
    /// Tokens produced in the completion.
    pub completion_tokens: u32,
    /// Total tokens (prompt + completion).
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Construct a usage triple.
    #[must_use]
    pub const fn new(prompt_tokens: u32, completion_tokens: u32, total_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }
}

/// Bounded retry policy applied by the provider pool around adapter calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts including the first (1 = no retry).
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Cap on the computed delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Multiplier applied to the delay after each attempt.
    pub backoff_multiplier: f64,
    /// Error kinds eligible for retry.
    pub retryable_kinds: Vec<ProviderErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_ms: 250,
            max_delay_ms: 4000,
            backoff_multiplier: 2.0,
            retryable_kinds: vec![
                ProviderErrorKind::RateLimit,
                ProviderErrorKind::TransportError,
            ],
        }
    }
}

/// One council member: a (provider, model) pairing with its own deadline
/// and retry policy. Immutable for the lifetime of a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilMember {
    /// Stable member identifier, unique within the council.
    pub member_id: String,
    /// Upstream API family this member is served by.
    pub provider_id: String,
    /// Model name passed to the adapter.
    pub model: String,
    /// Optional model version pin.
    #[serde(default)]
    pub version: Option<String>,
    /// Optional weight hint for synthesis strategies.
    #[serde(default)]
    pub weight: Option<f64>,
    /// Per-member deadline in seconds.
    pub timeout_seconds: f64,
    /// Retry policy applied by the pool.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Optional cost per 1k total tokens, used for cost records.
    #[serde(default)]
    pub cost_per_1k_tokens: Option<f64>,
}

/// A single message in a conversation context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContextMessage {
    /// Message role ("user", "assistant", "system").
    pub role: String,
    /// Message body.
    pub content: String,
    /// When the message was produced.
    pub timestamp: DateTime<Utc>,
}

/// Prior conversation carried alongside a query.
///
/// Every round-0 adapter call of a request receives the same context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationContext {
    /// Ordered message history.
    pub messages: Vec<ContextMessage>,
    /// Token count of the history.
    pub total_tokens: u32,
    /// Whether the history has been summarized upstream.
    pub summarized: bool,
}

/// A single user request entering the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRequest {
    /// Process-unique request identifier.
    pub request_id: Uuid,
    /// The query text fanned out to the council.
    pub query: String,
    /// Optional session identifier.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Optional conversation context.
    #[serde(default)]
    pub context: Option<ConversationContext>,
    /// Client-side timestamp.
    pub created_at: DateTime<Utc>,
}

impl UserRequest {
    /// Create a request with a fresh id and the current timestamp.
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::now_v7(),
            query: query.into(),
            session_id: None,
            context: None,
            created_at: Utc::now(),
        }
    }
}

/// A successful reply from the provider pool.
#[derive(Debug, Clone)]
pub struct ProviderReply {
    /// Content coerced to a string by the pool.
    pub content: String,
    /// Token usage reported by the adapter.
    pub usage: TokenUsage,
    /// Latency measured by the pool, in milliseconds.
    pub latency_ms: u64,
}

/// A successful round-0 answer attributed to its council member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialResponse {
    /// The member that produced the answer.
    pub council_member_id: String,
    /// Answer content.
    pub content: String,
    /// Token usage for the call.
    pub token_usage: TokenUsage,
    /// Measured latency in milliseconds.
    pub latency_ms: u64,
    /// When the answer was collected.
    pub timestamp: DateTime<Utc>,
}

/// One row in a deliberation round.
///
/// In round 0 `references_to` is empty; in round k >= 1 it is exactly the
/// set of peer member ids present in round k-1 (no self-reference, no
/// duplicates).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exchange {
    /// The member that produced this exchange.
    pub council_member_id: String,
    /// Exchange content (new answer, or the previous round's on fallback).
    pub content: String,
    /// Peer member ids this exchange reviewed.
    pub references_to: Vec<String>,
    /// Token usage for the call (zero on fallback).
    pub token_usage: TokenUsage,
}

/// One full fan-out/fan-in iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliberationRound {
    /// Round index; 0 holds the initial answers.
    pub round_number: u32,
    /// Exchanges in `responses_{k-1}` order.
    pub exchanges: Vec<Exchange>,
}

/// The ordered record of rounds for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliberationThread {
    /// Rounds 0..=R in order.
    pub rounds: Vec<DeliberationRound>,
    /// Wall-clock duration of the whole deliberation, in milliseconds.
    pub total_duration_ms: u64,
}

impl DeliberationThread {
    /// The final round of the thread, if any.
    #[must_use]
    pub fn final_round(&self) -> Option<&DeliberationRound> {
        self.rounds.last()
    }

    /// Deduplicated member ids from round 0, preserving order.
    #[must_use]
    pub fn contributing_members(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.rounds
            .first()
            .map(|round| {
                round
                    .exchanges
                    .iter()
                    .filter(|e| seen.insert(e.council_member_id.clone()))
                    .map(|e| e.council_member_id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Confidence band attached to a consensus decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// String identifier used in persisted rows.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// The single decision synthesized from a deliberation thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusDecision {
    /// Decision content.
    pub content: String,
    /// Confidence band.
    pub confidence: Confidence,
    /// Agreement level across the final round, in [0, 1].
    pub agreement_level: f64,
    /// Strategy descriptor that produced the decision.
    pub strategy: String,
    /// Deduplicated member ids whose round-0 content flowed into synthesis.
    pub contributing_members: Vec<String>,
    /// When the decision was produced.
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(member: &str) -> Exchange {
        Exchange {
            council_member_id: member.to_string(),
            content: "answer".to_string(),
            references_to: Vec::new(),
            token_usage: TokenUsage::default(),
        }
    }

    #[test]
    fn contributing_members_deduplicates_round_zero() {
        let thread = DeliberationThread {
            rounds: vec![DeliberationRound {
                round_number: 0,
                exchanges: vec![exchange("m1"), exchange("m2"), exchange("m1")],
            }],
            total_duration_ms: 0,
        };

        assert_eq!(thread.contributing_members(), vec!["m1", "m2"]);
    }

    #[test]
    fn contributing_members_empty_without_rounds() {
        let thread = DeliberationThread {
            rounds: Vec::new(),
            total_duration_ms: 0,
        };

        assert!(thread.contributing_members().is_empty());
    }
}
