//! Database Queries
//!
//! Runtime queries (no compile-time `DATABASE_URL` required).

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::health::ProviderHealth;

use super::models::{
    CostQualityRow, CostRecordRow, InfluenceJoinRow, InsertCostRecord, InsertCouncilResponse,
    InsertExchange, InsertRequest, RequestLatencyRow, RequestRecord, ResponseContentRow,
};

// ============================================================================
// Write side
// ============================================================================

/// Insert a completed request row.
pub async fn insert_request(pool: &PgPool, params: &InsertRequest<'_>) -> sqlx::Result<()> {
    sqlx::query(
        r"
        INSERT INTO requests
            (request_id, query, status, consensus_content, confidence,
             agreement_level, total_cost, total_latency_ms, config_snapshot)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ",
    )
    .bind(params.request_id)
    .bind(params.query)
    .bind(params.status)
    .bind(params.consensus_content)
    .bind(params.confidence)
    .bind(params.agreement_level)
    .bind(params.total_cost)
    .bind(params.total_latency_ms)
    .bind(params.config_snapshot)
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert one council response row.
pub async fn insert_council_response(
    pool: &PgPool,
    params: &InsertCouncilResponse<'_>,
) -> sqlx::Result<()> {
    sqlx::query(
        r"
        INSERT INTO council_responses
            (request_id, council_member_id, content, round_number, token_usage, latency_ms)
        VALUES ($1, $2, $3, $4, $5, $6)
        ",
    )
    .bind(params.request_id)
    .bind(params.council_member_id)
    .bind(params.content)
    .bind(params.round_number)
    .bind(params.token_usage)
    .bind(params.latency_ms)
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert one deliberation exchange row.
pub async fn insert_exchange(pool: &PgPool, params: &InsertExchange<'_>) -> sqlx::Result<()> {
    sqlx::query(
        r"
        INSERT INTO deliberation_exchanges
            (request_id, round_number, council_member_id, content, references_to, token_usage)
        VALUES ($1, $2, $3, $4, $5, $6)
        ",
    )
    .bind(params.request_id)
    .bind(params.round_number)
    .bind(params.council_member_id)
    .bind(params.content)
    .bind(params.references_to)
    .bind(params.token_usage)
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert one cost record row.
pub async fn insert_cost_record(pool: &PgPool, params: &InsertCostRecord<'_>) -> sqlx::Result<()> {
    sqlx::query(
        r"
        INSERT INTO cost_records (request_id, provider, model, cost)
        VALUES ($1, $2, $3, $4)
        ",
    )
    .bind(params.request_id)
    .bind(params.provider)
    .bind(params.model)
    .bind(params.cost)
    .execute(pool)
    .await?;

    Ok(())
}

/// Upsert the health snapshot for one provider.
pub async fn upsert_provider_health(pool: &PgPool, health: &ProviderHealth) -> sqlx::Result<()> {
    sqlx::query(
        r"
        INSERT INTO provider_health
            (provider_id, status, success_rate, avg_latency_ms, last_failure_at, disabled_reason, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, NOW())
        ON CONFLICT (provider_id) DO UPDATE SET
            status = EXCLUDED.status,
            success_rate = EXCLUDED.success_rate,
            avg_latency_ms = EXCLUDED.avg_latency_ms,
            last_failure_at = EXCLUDED.last_failure_at,
            disabled_reason = EXCLUDED.disabled_reason,
            updated_at = NOW()
        ",
    )
    .bind(&health.provider_id)
    .bind(health.status.as_str())
    .bind(health.success_rate)
    .bind(health.avg_latency_ms)
    .bind(health.last_failure_at)
    .bind(&health.disabled_reason)
    .execute(pool)
    .await?;

    Ok(())
}

// ============================================================================
// Read side (analytics)
// ============================================================================

/// Find a request row by id.
pub async fn find_request(pool: &PgPool, request_id: Uuid) -> sqlx::Result<Option<RequestRecord>> {
    sqlx::query_as::<_, RequestRecord>("SELECT * FROM requests WHERE request_id = $1")
        .bind(request_id)
        .fetch_optional(pool)
        .await
}

/// Latencies with config snapshots for completed requests in the range.
pub async fn fetch_request_latencies(
    pool: &PgPool,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> sqlx::Result<Vec<RequestLatencyRow>> {
    sqlx::query_as::<_, RequestLatencyRow>(
        r"
        SELECT total_latency_ms, config_snapshot
        FROM requests
        WHERE created_at >= $1 AND created_at < $2
        ",
    )
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await
}

/// Number of completed requests in the range.
pub async fn count_completed_requests(
    pool: &PgPool,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> sqlx::Result<i64> {
    let row: (i64,) = sqlx::query_as(
        r"
        SELECT COUNT(*) FROM requests
        WHERE created_at >= $1 AND created_at < $2 AND status = 'completed'
        ",
    )
    .bind(from)
    .bind(to)
    .fetch_one(pool)
    .await?;

    Ok(row.0)
}

/// Round-0 response contents in the range, for the agreement matrix.
pub async fn fetch_round0_responses(
    pool: &PgPool,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> sqlx::Result<Vec<ResponseContentRow>> {
    sqlx::query_as::<_, ResponseContentRow>(
        r"
        SELECT request_id, council_member_id, content
        FROM council_responses
        WHERE round_number = 0 AND created_at >= $1 AND created_at < $2
        ORDER BY request_id, council_member_id
        ",
    )
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await
}

/// Member responses joined with their request's consensus, for influence.
pub async fn fetch_influence_rows(
    pool: &PgPool,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> sqlx::Result<Vec<InfluenceJoinRow>> {
    sqlx::query_as::<_, InfluenceJoinRow>(
        r"
        SELECT cr.council_member_id, cr.content, r.consensus_content
        FROM council_responses cr
        JOIN requests r ON r.request_id = cr.request_id
        WHERE cr.round_number = 0 AND cr.created_at >= $1 AND cr.created_at < $2
        ",
    )
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await
}

/// Cost record rows in the range.
pub async fn fetch_cost_rows(
    pool: &PgPool,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> sqlx::Result<Vec<CostRecordRow>> {
    sqlx::query_as::<_, CostRecordRow>(
        r"
        SELECT provider, model, cost
        FROM cost_records
        WHERE created_at >= $1 AND created_at < $2
        ",
    )
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await
}

/// Cost/agreement pairs in the range, temporally descending.
pub async fn fetch_cost_quality_rows(
    pool: &PgPool,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> sqlx::Result<Vec<CostQualityRow>> {
    sqlx::query_as::<_, CostQualityRow>(
        r"
        SELECT total_cost, agreement_level
        FROM requests
        WHERE created_at >= $1 AND created_at < $2
        ORDER BY created_at DESC
        ",
    )
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await
}
