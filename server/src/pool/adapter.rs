//! Adapter seam between the pool and upstream model APIs.
//!
//! Concrete adapters (HTTP clients for specific providers) live with the
//! hosting application; the pool only depends on this trait.

use async_trait::async_trait;

use crate::council::{ConversationContext, CouncilMember, ProviderError, TokenUsage};

/// Raw adapter reply before content coercion.
#[derive(Debug, Clone)]
pub struct AdapterResponse {
    /// Completion content as returned upstream. Some upstreams return
    /// structured payloads rather than plain strings; the pool coerces.
    pub content: serde_json::Value,
    /// Token usage reported upstream.
    pub usage: TokenUsage,
}

/// One upstream model API family.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Run one completion for the member.
    ///
    /// Failures carry a kind from the provider error taxonomy; adapters
    /// must map upstream 5xx to `UpstreamError`, throttling to
    /// `RateLimit`, and connection problems to `TransportError`.
    async fn complete(
        &self,
        member: &CouncilMember,
        prompt: &str,
        context: Option<&ConversationContext>,
    ) -> Result<AdapterResponse, ProviderError>;
}
