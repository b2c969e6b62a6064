//! Orchestration Core
//!
//! Per-request coordinator: fans one query out to the active council,
//! enforces per-member and global deadlines, drives deliberation rounds
//! with peer propagation, and hands the final thread to synthesis.

mod prompts;

pub use prompts::deliberation_prompt;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::council::{
    ConfigProvider, ConsensusDecision, CouncilError, CouncilMember, DeliberationRound,
    DeliberationThread, Exchange, InitialResponse, ProviderError, ProviderErrorKind,
    ProviderReply, TokenUsage, UserRequest,
};
use crate::health::HealthTracker;
use crate::pool::ProviderPool;
use crate::synthesis::Synthesizer;

/// A successful reply bound to the member that produced it.
///
/// Owned by one request's scope; every entry in the partial list is a
/// success, attributed to a configured member id.
#[derive(Debug, Clone)]
struct TrackedResponse {
    member_id: String,
    reply: ProviderReply,
    timestamp: DateTime<Utc>,
}

/// Settled result of one member task; successful replies land in the
/// request's partial list instead.
#[derive(Debug)]
struct MemberTaskResult {
    provider_id: String,
    error: Option<ProviderError>,
}

/// Full result of one deliberation, for hosts that persist the thread.
#[derive(Debug, Clone)]
pub struct DeliberationOutcome {
    /// The synthesized decision.
    pub decision: ConsensusDecision,
    /// All rounds driven for the request.
    pub thread: DeliberationThread,
    /// Round-0 responses with per-call latency, for persistence.
    pub initial_responses: Vec<InitialResponse>,
    /// Whether the global deadline fired during round 0.
    pub global_timeout_hit: bool,
}

/// Per-request coordinator over the pool, tracker, config, and synthesis
/// collaborators.
pub struct Orchestrator {
    pool: Arc<ProviderPool>,
    health: Arc<HealthTracker>,
    config: Arc<dyn ConfigProvider>,
    synthesizer: Arc<dyn Synthesizer>,
}

impl Orchestrator {
    /// Assemble an orchestrator from its collaborators.
    #[must_use]
    pub fn new(
        pool: Arc<ProviderPool>,
        config: Arc<dyn ConfigProvider>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        let health = Arc::clone(pool.health_tracker());
        Self {
            pool,
            health,
            config,
            synthesizer,
        }
    }

    /// Process one request to a consensus decision.
    ///
    /// Only `ConfigurationError`, `InsufficientQuorum`, `NoResponses`,
    /// and `SynthesisError` escape; per-member failures are absorbed.
    pub async fn process_request(
        &self,
        request: &UserRequest,
    ) -> Result<ConsensusDecision, CouncilError> {
        self.deliberate(request).await.map(|outcome| outcome.decision)
    }

    /// Process one request, returning the decision together with the
    /// full thread for persistence.
    #[tracing::instrument(skip(self, request), fields(request_id = %request.request_id))]
    pub async fn deliberate(
        &self,
        request: &UserRequest,
    ) -> Result<DeliberationOutcome, CouncilError> {
        // Pre-flight: configuration is re-read on every request.
        let council = self.config.council_config()?;
        let deliberation = self.config.deliberation_config()?;
        let performance = self.config.performance_config()?;
        let synthesis = self.config.synthesis_config()?;

        council.validate()?;
        performance.validate()?;

        let active: Vec<CouncilMember> = council
            .members
            .iter()
            .filter(|m| !self.health.is_disabled(&m.provider_id))
            .cloned()
            .collect();

        if council.require_minimum_for_consensus && active.len() < council.minimum_size {
            return Err(CouncilError::InsufficientQuorum {
                active: active.len(),
                minimum: council.minimum_size,
            });
        }
        if active.is_empty() {
            return Err(CouncilError::NoResponses);
        }

        info!(
            active_members = active.len(),
            rounds = deliberation.rounds,
            global_timeout_s = performance.global_timeout_seconds,
            "Starting deliberation"
        );
        let started = Instant::now();

        // Round 0: concurrent fan-out under the global deadline.
        let (responses, global_timeout_hit) = self
            .fan_out(request, &active, performance.global_timeout_seconds)
            .await;
        if responses.is_empty() {
            return Err(CouncilError::NoResponses);
        }

        let mut rounds = vec![DeliberationRound {
            round_number: 0,
            exchanges: responses
                .iter()
                .map(|r| Exchange {
                    council_member_id: r.council_member_id.clone(),
                    content: r.content.clone(),
                    references_to: Vec::new(),
                    token_usage: r.token_usage,
                })
                .collect(),
        }];

        // Rounds 1..=R: peer review over the previous round, best-effort
        // per member. On global-timeout recovery the surviving subset
        // deliberates alone.
        let mut previous = rounds[0].exchanges.clone();
        for round_number in 1..=deliberation.rounds {
            let exchanges = self
                .run_review_round(request, &active, &previous, round_number)
                .await;
            previous = exchanges.clone();
            rounds.push(DeliberationRound {
                round_number,
                exchanges,
            });
        }

        let thread = DeliberationThread {
            rounds,
            total_duration_ms: started.elapsed().as_millis() as u64,
        };

        let mut decision = self
            .synthesizer
            .synthesize(request, &thread, &synthesis)
            .await
            .map_err(|e| CouncilError::Synthesis(e.to_string()))?;

        if global_timeout_hit {
            decision.confidence = crate::council::Confidence::Low;
        }

        info!(
            contributing = decision.contributing_members.len(),
            confidence = decision.confidence.as_str(),
            agreement = decision.agreement_level,
            duration_ms = thread.total_duration_ms,
            global_timeout_hit,
            "Deliberation complete"
        );

        Ok(DeliberationOutcome {
            decision,
            thread,
            initial_responses: responses,
            global_timeout_hit,
        })
    }

    /// Round-0 fan-out: one task per member racing its own deadline, all
    /// racing the global deadline.
    ///
    /// Returns the successful responses (in arrival order) and whether
    /// the global deadline fired. On a global timeout the partial list is
    /// snapshotted at the moment the deadline fired: tasks still in
    /// flight settle under their own deadlines and late arrivals are
    /// discarded.
    async fn fan_out(
        &self,
        request: &UserRequest,
        active: &[CouncilMember],
        global_timeout_seconds: f64,
    ) -> (Vec<InitialResponse>, bool) {
        let partial: Arc<Mutex<Vec<TrackedResponse>>> = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::with_capacity(active.len());
        for member in active.iter().cloned() {
            let pool = Arc::clone(&self.pool);
            let query = request.query.clone();
            let context = request.context.clone();
            let partial = Arc::clone(&partial);

            handles.push(tokio::spawn(async move {
                let result = Self::call_member(&pool, &member, &query, context.as_ref()).await;
                match result {
                    Ok(reply) => {
                        partial
                            .lock()
                            .expect("partial list lock poisoned")
                            .push(TrackedResponse {
                                member_id: member.member_id,
                                reply,
                                timestamp: Utc::now(),
                            });
                        MemberTaskResult {
                            provider_id: member.provider_id,
                            error: None,
                        }
                    }
                    Err(error) => MemberTaskResult {
                        provider_id: member.provider_id,
                        error: Some(error),
                    },
                }
            }));
        }

        let mut settled = futures::future::join_all(handles);
        let global = Duration::from_secs_f64(global_timeout_seconds);

        let (snapshot, outcomes, global_timeout_hit) =
            match tokio::time::timeout(global, &mut settled).await {
                Ok(outcomes) => {
                    let tracked =
                        std::mem::take(&mut *partial.lock().expect("partial list lock poisoned"));
                    (tracked, outcomes, false)
                }
                Err(_) => {
                    // Freeze what arrived before the deadline, then await
                    // settlement so no append races synthesis and failure
                    // bookkeeping sees every task.
                    let tracked = partial.lock().expect("partial list lock poisoned").clone();
                    warn!(
                        request_id = %request.request_id,
                        collected = tracked.len(),
                        "Global deadline fired, awaiting member task settlement"
                    );
                    let outcomes = settled.await;
                    (tracked, outcomes, true)
                }
            };

        // Failure bookkeeping. Successes were reported by the pool at
        // call time; member timeouts never reached the pool and are
        // reported here.
        for outcome in outcomes {
            match outcome {
                Ok(MemberTaskResult {
                    provider_id,
                    error: Some(error),
                }) => {
                    let disabled = if error.kind == ProviderErrorKind::MemberTimeout {
                        crate::observability::metrics::record_member_timeout(&provider_id);
                        self.health.record_failure(&provider_id, Some(&error))
                    } else {
                        self.health.is_disabled(&provider_id)
                    };
                    if disabled {
                        self.pool
                            .mark_provider_disabled(&provider_id, "consecutive failures");
                    }
                }
                Ok(MemberTaskResult { error: None, .. }) => {}
                Err(join_error) => {
                    warn!(request_id = %request.request_id, error = %join_error, "Member task aborted");
                }
            }
        }

        let responses = snapshot
            .into_iter()
            .map(|tracked| InitialResponse {
                council_member_id: tracked.member_id,
                content: tracked.reply.content,
                token_usage: tracked.reply.usage,
                latency_ms: tracked.reply.latency_ms,
                timestamp: tracked.timestamp,
            })
            .collect();

        (responses, global_timeout_hit)
    }

    /// One peer-review round over the previous round's exchanges.
    ///
    /// Best-effort per member: a failed or timed-out review falls back to
    /// the member's previous content and never aborts the round. The
    /// round completes when every member task has settled.
    async fn run_review_round(
        &self,
        request: &UserRequest,
        active: &[CouncilMember],
        previous: &[Exchange],
        round_number: u32,
    ) -> Vec<Exchange> {
        let members_by_id: HashMap<&str, &CouncilMember> = active
            .iter()
            .map(|m| (m.member_id.as_str(), m))
            .collect();

        let mut handles = Vec::with_capacity(previous.len());
        for (position, exchange) in previous.iter().enumerate() {
            let references: Vec<String> = previous
                .iter()
                .filter(|peer| peer.council_member_id != exchange.council_member_id)
                .map(|peer| peer.council_member_id.clone())
                .collect();
            let peers: Vec<&str> = previous
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != position)
                .map(|(_, peer)| peer.content.as_str())
                .collect();
            let prompt = deliberation_prompt(&request.query, &exchange.content, &peers);

            let Some(member) = members_by_id.get(exchange.council_member_id.as_str()) else {
                // A surviving response without a roster entry cannot be
                // re-queried; carry the previous content forward.
                let fallback = Exchange {
                    council_member_id: exchange.council_member_id.clone(),
                    content: exchange.content.clone(),
                    references_to: references,
                    token_usage: TokenUsage::default(),
                };
                handles.push(tokio::spawn(async move { fallback }));
                continue;
            };

            let pool = Arc::clone(&self.pool);
            let health = Arc::clone(&self.health);
            let member = (*member).clone();
            let fallback_content = exchange.content.clone();
            let member_id = exchange.council_member_id.clone();

            handles.push(tokio::spawn(async move {
                let result = Self::call_member(&pool, &member, &prompt, None).await;
                match result {
                    Ok(reply) => Exchange {
                        council_member_id: member_id,
                        content: reply.content,
                        references_to: references,
                        token_usage: reply.usage,
                    },
                    Err(error) => {
                        if error.kind == ProviderErrorKind::MemberTimeout {
                            health.record_failure(&member.provider_id, Some(&error));
                        }
                        debug!(
                            member_id = %member_id,
                            kind = %error.kind,
                            "Review call failed, falling back to previous content"
                        );
                        Exchange {
                            council_member_id: member_id,
                            content: fallback_content,
                            references_to: references,
                            token_usage: TokenUsage::default(),
                        }
                    }
                }
            }));
        }

        let mut exchanges = Vec::with_capacity(handles.len());
        for (handle, previous_exchange) in futures::future::join_all(handles)
            .await
            .into_iter()
            .zip(previous)
        {
            match handle {
                Ok(exchange) => exchanges.push(exchange),
                Err(join_error) => {
                    warn!(round_number, error = %join_error, "Review task aborted, keeping previous content");
                    exchanges.push(Exchange {
                        council_member_id: previous_exchange.council_member_id.clone(),
                        content: previous_exchange.content.clone(),
                        references_to: previous
                            .iter()
                            .filter(|p| p.council_member_id != previous_exchange.council_member_id)
                            .map(|p| p.council_member_id.clone())
                            .collect(),
                        token_usage: TokenUsage::default(),
                    });
                }
            }
        }
        exchanges
    }

    /// One pool call raced against the member's own deadline.
    ///
    /// The deadline timer is dropped as soon as the race resolves; on
    /// expiry the call yields a synthetic `MemberTimeout` failure and the
    /// adapter I/O is abandoned rather than cancelled upstream.
    async fn call_member(
        pool: &ProviderPool,
        member: &CouncilMember,
        prompt: &str,
        context: Option<&crate::council::ConversationContext>,
    ) -> Result<ProviderReply, ProviderError> {
        let deadline = Duration::from_secs_f64(member.timeout_seconds);
        match tokio::time::timeout(deadline, pool.send_request(member, prompt, context)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::member_timeout(member.timeout_seconds)),
        }
    }
}
