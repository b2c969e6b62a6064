//! Scripted mock adapter for tests and offline development.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::council::{
    ConversationContext, CouncilMember, ProviderError, ProviderErrorKind, TokenUsage,
};

use super::adapter::{AdapterResponse, ProviderAdapter};

/// One scripted adapter outcome.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Succeed with the given content and usage.
    Succeed { content: Value, usage: TokenUsage },
    /// Fail with the given kind; retryable follows the kind's usual shape.
    Fail { kind: ProviderErrorKind },
}

impl MockOutcome {
    /// A success outcome with a fixed usage triple.
    #[must_use]
    pub fn succeed(content: Value) -> Self {
        Self::Succeed {
            content,
            usage: TokenUsage::new(10, 20, 30),
        }
    }
}

/// Adapter whose outcomes are scripted per call.
///
/// Outcomes pop from the script in order; when the script is exhausted
/// the fallback outcome repeats. An optional per-call delay simulates
/// slow upstreams for timeout tests, and a call counter lets tests assert
/// the adapter was (not) reached.
pub struct MockAdapter {
    script: Mutex<VecDeque<MockOutcome>>,
    fallback: MockOutcome,
    delay: Duration,
    calls: AtomicUsize,
}

impl MockAdapter {
    /// Adapter that always succeeds with the given content.
    #[must_use]
    pub fn always_succeed(content: Value) -> Self {
        Self::with_fallback(MockOutcome::succeed(content))
    }

    /// Adapter that always fails with the given kind.
    #[must_use]
    pub fn always_fail(kind: ProviderErrorKind) -> Self {
        Self::with_fallback(MockOutcome::Fail { kind })
    }

    /// Adapter that plays the script then repeats the last outcome.
    #[must_use]
    pub fn sequence(outcomes: Vec<MockOutcome>) -> Self {
        let fallback = outcomes
            .last()
            .cloned()
            .unwrap_or_else(|| MockOutcome::succeed(Value::String(String::new())));
        Self {
            script: Mutex::new(outcomes.into()),
            fallback,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    fn with_fallback(fallback: MockOutcome) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Delay every call by the given duration before resolving.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of calls that reached this adapter.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> MockOutcome {
        self.script
            .lock()
            .expect("mock script lock poisoned")
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    async fn complete(
        &self,
        _member: &CouncilMember,
        _prompt: &str,
        _context: Option<&ConversationContext>,
    ) -> Result<AdapterResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.delay > Duration::ZERO {
            tokio::time::sleep(self.delay).await;
        }

        match self.next_outcome() {
            MockOutcome::Succeed { content, usage } => Ok(AdapterResponse { content, usage }),
            MockOutcome::Fail { kind } => Err(ProviderError::new(
                kind,
                "scripted failure",
                matches!(
                    kind,
                    ProviderErrorKind::RateLimit | ProviderErrorKind::TransportError
                ),
            )),
        }
    }
}
