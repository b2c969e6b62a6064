//! API Handlers

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::analytics::{AgreementMatrix, CostQualityPoint, CostReport, LatencyReport};
use crate::council::{ConsensusDecision, ConversationContext, UserRequest};
use crate::health::ProviderHealth;
use crate::observability::metrics;

use super::error::ApiResult;
use super::{store, AppState};

/// Liveness response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// POST /api/deliberate request body.
#[derive(Debug, Deserialize)]
pub struct DeliberateRequest {
    /// The query fanned out to the council.
    pub query: String,
    /// Optional session identifier.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Optional conversation context carried to every round-0 call.
    #[serde(default)]
    pub context: Option<ConversationContext>,
}

/// POST /api/deliberate response body.
#[derive(Debug, Serialize)]
pub struct DeliberateResponse {
    pub request_id: Uuid,
    pub decision: ConsensusDecision,
}

/// POST /api/deliberate
///
/// Runs one full deliberation. The decision is returned even when
/// persistence fails; row writes are best-effort.
pub async fn deliberate(
    State(state): State<AppState>,
    Json(body): Json<DeliberateRequest>,
) -> ApiResult<Json<DeliberateResponse>> {
    let request = UserRequest {
        request_id: Uuid::now_v7(),
        query: body.query,
        session_id: body.session_id,
        context: body.context,
        created_at: Utc::now(),
    };

    let outcome = match state.orchestrator.deliberate(&request).await {
        Ok(outcome) => outcome,
        Err(error) => {
            metrics::record_deliberation("error", 0.0, false);
            return Err(error.into());
        }
    };

    metrics::record_deliberation(
        "success",
        outcome.thread.total_duration_ms as f64,
        outcome.global_timeout_hit,
    );

    store::persist_outcome(&state, &request, &outcome).await;

    Ok(Json(DeliberateResponse {
        request_id: request.request_id,
        decision: outcome.decision,
    }))
}

/// GET /api/providers/health
pub async fn providers_health(State(state): State<AppState>) -> Json<Vec<ProviderHealth>> {
    let providers = state.health.tracked_providers();
    let snapshot = providers
        .iter()
        .map(|provider_id| state.pool.provider_health(provider_id))
        .collect();
    Json(snapshot)
}

/// POST /api/providers/{provider_id}/enable
pub async fn enable_provider(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
) -> Json<ProviderHealth> {
    state.health.enable_provider(&provider_id);
    info!(provider_id = %provider_id, "Provider re-enabled via API");
    Json(state.pool.provider_health(&provider_id))
}

/// Time-range query parameters shared by the analytics endpoints.
#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    /// Range length in hours, counted back from now (default 24).
    #[serde(default = "default_hours")]
    pub hours: i64,
}

const fn default_hours() -> i64 {
    24
}

impl RangeQuery {
    fn bounds(&self) -> (chrono::DateTime<Utc>, chrono::DateTime<Utc>) {
        let to = Utc::now();
        let from = to - Duration::hours(self.hours.clamp(1, 24 * 90));
        (from, to)
    }
}

/// GET /api/analytics/latency
pub async fn analytics_latency(
    State(state): State<AppState>,
    Query(range): Query<RangeQuery>,
) -> ApiResult<Json<LatencyReport>> {
    let (from, to) = range.bounds();
    Ok(Json(state.analytics.latency_report(from, to).await?))
}

/// GET /api/analytics/agreement
pub async fn analytics_agreement(
    State(state): State<AppState>,
    Query(range): Query<RangeQuery>,
) -> ApiResult<Json<AgreementMatrix>> {
    let (from, to) = range.bounds();
    Ok(Json(state.analytics.agreement_report(from, to).await?))
}

/// GET /api/analytics/influence
pub async fn analytics_influence(
    State(state): State<AppState>,
    Query(range): Query<RangeQuery>,
) -> ApiResult<Json<std::collections::BTreeMap<String, f64>>> {
    let (from, to) = range.bounds();
    Ok(Json(state.analytics.influence_report(from, to).await?))
}

/// GET /api/analytics/costs
pub async fn analytics_costs(
    State(state): State<AppState>,
    Query(range): Query<RangeQuery>,
) -> ApiResult<Json<CostReport>> {
    let (from, to) = range.bounds();
    Ok(Json(state.analytics.cost_report(from, to).await?))
}

/// GET /api/analytics/cost-quality
pub async fn analytics_cost_quality(
    State(state): State<AppState>,
    Query(range): Query<RangeQuery>,
) -> ApiResult<Json<Vec<CostQualityPoint>>> {
    let (from, to) = range.bounds();
    Ok(Json(state.analytics.cost_quality_report(from, to).await?))
}
