//! Best-effort persistence of deliberation outcomes.
//!
//! The decision already exists when these writes run; a persistence
//! failure is logged and never propagated to the caller.

use std::collections::HashMap;

use serde_json::json;
use tracing::warn;

use crate::council::{CouncilMember, TokenUsage, UserRequest};
use crate::db;
use crate::orchestrator::DeliberationOutcome;

use super::AppState;

/// Persist the request row, per-round rows, and cost records.
pub async fn persist_outcome(
    state: &AppState,
    request: &UserRequest,
    outcome: &DeliberationOutcome,
) {
    let council = state.config_provider.council_config().ok();
    let deliberation = state.config_provider.deliberation_config().ok();
    let performance = state.config_provider.performance_config().ok();

    let config_snapshot = json!({
        "members": council.as_ref().map(|c| &c.members),
        "deliberation": {
            "rounds": deliberation.as_ref().map_or(0, |d| d.rounds),
        },
        "performance": {
            "global_timeout_seconds": performance.as_ref().map(|p| p.global_timeout_seconds),
        },
    });

    let members_by_id: HashMap<&str, &CouncilMember> = council
        .as_ref()
        .map(|c| {
            c.members
                .iter()
                .map(|m| (m.member_id.as_str(), m))
                .collect()
        })
        .unwrap_or_default();

    let costs = member_costs(outcome, &members_by_id);
    let total_cost = if costs.is_empty() {
        None
    } else {
        Some(costs.iter().filter_map(|c| c.cost).sum())
    };

    let status = if outcome.global_timeout_hit {
        "timeout_recovered"
    } else {
        "completed"
    };

    let decision = &outcome.decision;
    let insert = db::InsertRequest {
        request_id: request.request_id,
        query: &request.query,
        status,
        consensus_content: Some(decision.content.as_str()),
        confidence: Some(decision.confidence.as_str()),
        agreement_level: Some(decision.agreement_level),
        total_cost,
        total_latency_ms: outcome.thread.total_duration_ms as i64,
        config_snapshot: &config_snapshot,
    };
    if let Err(e) = db::insert_request(&state.db, &insert).await {
        warn!(request_id = %request.request_id, error = %e, "Request row insert failed");
        // Child rows reference the request row; without it there is
        // nothing more to persist.
        return;
    }

    persist_rounds(state, request, outcome).await;

    for cost in costs {
        let insert = db::InsertCostRecord {
            request_id: request.request_id,
            provider: &cost.provider,
            model: &cost.model,
            cost: cost.cost,
        };
        if let Err(e) = db::insert_cost_record(&state.db, &insert).await {
            warn!(request_id = %request.request_id, error = %e, "Cost record insert failed");
        }
    }
}

async fn persist_rounds(state: &AppState, request: &UserRequest, outcome: &DeliberationOutcome) {
    // Round 0 persists from the initial responses, which carry latency.
    let mut initial: Vec<_> = outcome.initial_responses.iter().collect();
    initial.sort_by(|a, b| a.council_member_id.cmp(&b.council_member_id));
    for response in initial {
        let token_usage =
            serde_json::to_value(response.token_usage).unwrap_or(serde_json::Value::Null);
        let insert = db::InsertCouncilResponse {
            request_id: request.request_id,
            council_member_id: &response.council_member_id,
            content: Some(response.content.as_str()),
            round_number: 0,
            token_usage: &token_usage,
            latency_ms: response.latency_ms as i64,
        };
        if let Err(e) = db::insert_council_response(&state.db, &insert).await {
            warn!(
                request_id = %request.request_id,
                member_id = %response.council_member_id,
                error = %e,
                "Council response insert failed"
            );
        }
    }

    for round in outcome.thread.rounds.iter().filter(|r| r.round_number > 0) {
        // Round order within the pool is arbitrary; sort persisted rows
        // by member id so readers see deterministic rounds.
        let mut exchanges: Vec<_> = round.exchanges.iter().collect();
        exchanges.sort_by(|a, b| a.council_member_id.cmp(&b.council_member_id));

        for exchange in exchanges {
            let token_usage =
                serde_json::to_value(exchange.token_usage).unwrap_or(serde_json::Value::Null);

            let references =
                serde_json::to_value(&exchange.references_to).unwrap_or(serde_json::Value::Null);
            let insert = db::InsertExchange {
                request_id: request.request_id,
                round_number: round.round_number as i32,
                council_member_id: &exchange.council_member_id,
                content: &exchange.content,
                references_to: &references,
                token_usage: &token_usage,
            };

            if let Err(e) = db::insert_exchange(&state.db, &insert).await {
                warn!(
                    request_id = %request.request_id,
                    round_number = round.round_number,
                    member_id = %exchange.council_member_id,
                    error = %e,
                    "Round row insert failed"
                );
            }
        }
    }
}

struct MemberCost {
    provider: String,
    model: String,
    cost: Option<f64>,
}

/// Per-member cost across all rounds, priced from the member's
/// `cost_per_1k_tokens`. Members without pricing record no row.
fn member_costs(
    outcome: &DeliberationOutcome,
    members_by_id: &HashMap<&str, &CouncilMember>,
) -> Vec<MemberCost> {
    let mut usage_by_member: HashMap<&str, TokenUsage> = HashMap::new();
    for round in &outcome.thread.rounds {
        for exchange in &round.exchanges {
            let entry = usage_by_member
                .entry(exchange.council_member_id.as_str())
                .or_default();
            entry.prompt_tokens += exchange.token_usage.prompt_tokens;
            entry.completion_tokens += exchange.token_usage.completion_tokens;
            entry.total_tokens += exchange.token_usage.total_tokens;
        }
    }

    let mut costs: Vec<MemberCost> = usage_by_member
        .into_iter()
        .filter_map(|(member_id, usage)| {
            let member = members_by_id.get(member_id)?;
            let price = member.cost_per_1k_tokens?;
            Some(MemberCost {
                provider: member.provider_id.clone(),
                model: member.model.clone(),
                cost: Some(f64::from(usage.total_tokens) / 1000.0 * price),
            })
        })
        .collect();
    costs.sort_by(|a, b| (&a.provider, &a.model).cmp(&(&b.provider, &b.model)));
    costs
}
