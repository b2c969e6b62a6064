//! Database Models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One persisted request row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RequestRecord {
    /// Request identifier.
    pub request_id: Uuid,
    /// Original query text.
    pub query: String,
    /// Terminal status ("completed", "timeout_recovered", "failed").
    pub status: String,
    /// Consensus content, null on failure.
    pub consensus_content: Option<String>,
    /// Confidence band of the decision.
    pub confidence: Option<String>,
    /// Agreement level of the decision.
    pub agreement_level: Option<f64>,
    /// Total cost of the request, null when no pricing is configured.
    pub total_cost: Option<f64>,
    /// End-to-end latency in milliseconds.
    pub total_latency_ms: i64,
    /// Snapshot of the configuration the request ran under.
    pub config_snapshot: serde_json::Value,
    /// When the row was written.
    pub created_at: DateTime<Utc>,
}

/// Parameters for inserting a request row.
#[derive(Debug, Clone)]
pub struct InsertRequest<'a> {
    pub request_id: Uuid,
    pub query: &'a str,
    pub status: &'a str,
    pub consensus_content: Option<&'a str>,
    pub confidence: Option<&'a str>,
    pub agreement_level: Option<f64>,
    pub total_cost: Option<f64>,
    pub total_latency_ms: i64,
    pub config_snapshot: &'a serde_json::Value,
}

/// Parameters for inserting a council response row.
#[derive(Debug, Clone)]
pub struct InsertCouncilResponse<'a> {
    pub request_id: Uuid,
    pub council_member_id: &'a str,
    pub content: Option<&'a str>,
    pub round_number: i32,
    pub token_usage: &'a serde_json::Value,
    pub latency_ms: i64,
}

/// Parameters for inserting a deliberation exchange row.
#[derive(Debug, Clone)]
pub struct InsertExchange<'a> {
    pub request_id: Uuid,
    pub round_number: i32,
    pub council_member_id: &'a str,
    pub content: &'a str,
    pub references_to: &'a serde_json::Value,
    pub token_usage: &'a serde_json::Value,
}

/// Parameters for inserting a cost record row.
#[derive(Debug, Clone)]
pub struct InsertCostRecord<'a> {
    pub request_id: Uuid,
    pub provider: &'a str,
    pub model: &'a str,
    pub cost: Option<f64>,
}

/// Request latency paired with the config snapshot it ran under.
#[derive(Debug, Clone, FromRow)]
pub struct RequestLatencyRow {
    pub total_latency_ms: i64,
    pub config_snapshot: serde_json::Value,
}

/// One round-0 response content row.
#[derive(Debug, Clone, FromRow)]
pub struct ResponseContentRow {
    pub request_id: Uuid,
    pub council_member_id: String,
    pub content: Option<String>,
}

/// Member response joined with its request's consensus.
#[derive(Debug, Clone, FromRow)]
pub struct InfluenceJoinRow {
    pub council_member_id: String,
    pub content: Option<String>,
    pub consensus_content: Option<String>,
}

/// One persisted cost record row.
#[derive(Debug, Clone, FromRow)]
pub struct CostRecordRow {
    pub provider: String,
    pub model: String,
    pub cost: Option<f64>,
}

/// Cost and agreement for one request, for the cost-per-quality series.
#[derive(Debug, Clone, FromRow)]
pub struct CostQualityRow {
    pub total_cost: Option<f64>,
    pub agreement_level: Option<f64>,
}
