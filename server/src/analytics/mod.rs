//! Analytics Core
//!
//! Offline computations over persisted request and response rows:
//! latency percentiles, agreement matrix, influence scores, and cost
//! aggregates. Query-time reads go through a TTL cache.

mod cache;
mod stats;

pub use cache::AnalyticsCache;
pub use stats::{
    agreement_matrix, aggregate_costs, cost_quality_series, influence_scores, overlap, percentile,
    timeout_rate, AgreementMatrix, CostQualityPoint, CostReport, CostRow, InfluenceRow,
    PercentileSummary, ResponseRow, TimeoutSample,
};

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::db;

/// Latency report over a time range.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencyReport {
    /// Percentiles over every request in the range.
    pub overall: PercentileSummary,
    /// Percentiles partitioned by council size.
    pub by_council_size: BTreeMap<usize, PercentileSummary>,
    /// Percentiles partitioned by deliberation-round count.
    pub by_rounds: BTreeMap<u32, PercentileSummary>,
    /// Fraction of requests whose latency reached their global timeout.
    pub timeout_rate: f64,
}

/// Cache-first analytics over the persisted deliberation data.
pub struct AnalyticsService {
    db: PgPool,
    cache: AnalyticsCache,
}

impl AnalyticsService {
    /// Service over the given pool and cache.
    #[must_use]
    pub const fn new(db: PgPool, cache: AnalyticsCache) -> Self {
        Self { db, cache }
    }

    /// Latency percentiles, partitions, and timeout rate for the range.
    pub async fn latency_report(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> sqlx::Result<LatencyReport> {
        let key = cache_key("latency", from, to);
        if let Some(report) = self.cache.get(&key).await {
            return Ok(report);
        }

        let rows = db::fetch_request_latencies(&self.db, from, to).await?;

        let mut all = Vec::with_capacity(rows.len());
        let mut by_size: BTreeMap<usize, Vec<f64>> = BTreeMap::new();
        let mut by_rounds: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
        let mut timeout_samples = Vec::with_capacity(rows.len());

        for row in &rows {
            let latency = row.total_latency_ms as f64;
            all.push(latency);

            if let Some(size) = snapshot_council_size(&row.config_snapshot) {
                by_size.entry(size).or_default().push(latency);
            }
            if let Some(rounds) = snapshot_rounds(&row.config_snapshot) {
                by_rounds.entry(rounds).or_default().push(latency);
            }
            if let Some(timeout_ms) = snapshot_global_timeout_ms(&row.config_snapshot) {
                timeout_samples.push(TimeoutSample {
                    total_latency_ms: latency,
                    global_timeout_ms: timeout_ms,
                });
            }
        }

        let report = LatencyReport {
            overall: PercentileSummary::from_samples(&all),
            by_council_size: by_size
                .into_iter()
                .map(|(size, samples)| (size, PercentileSummary::from_samples(&samples)))
                .collect(),
            by_rounds: by_rounds
                .into_iter()
                .map(|(rounds, samples)| (rounds, PercentileSummary::from_samples(&samples)))
                .collect(),
            timeout_rate: timeout_rate(&timeout_samples),
        };

        self.cache.put(&key, &report).await;
        Ok(report)
    }

    /// Pairwise disagreement matrix over round-0 responses in the range.
    pub async fn agreement_report(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> sqlx::Result<AgreementMatrix> {
        let key = cache_key("agreement", from, to);
        if let Some(report) = self.cache.get(&key).await {
            return Ok(report);
        }

        let rows = db::fetch_round0_responses(&self.db, from, to).await?;
        let rows: Vec<ResponseRow> = rows
            .into_iter()
            .map(|row| ResponseRow {
                request_id: row.request_id,
                member_id: row.council_member_id,
                content: row.content,
            })
            .collect();

        let report = agreement_matrix(&rows);
        self.cache.put(&key, &report).await;
        Ok(report)
    }

    /// Per-member influence over consensus decisions in the range.
    pub async fn influence_report(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> sqlx::Result<BTreeMap<String, f64>> {
        let key = cache_key("influence", from, to);
        if let Some(report) = self.cache.get(&key).await {
            return Ok(report);
        }

        let rows = db::fetch_influence_rows(&self.db, from, to).await?;
        let rows: Vec<InfluenceRow> = rows
            .into_iter()
            .map(|row| InfluenceRow {
                member_id: row.council_member_id,
                content: row.content,
                consensus: row.consensus_content,
            })
            .collect();

        let report = influence_scores(&rows);
        self.cache.put(&key, &report).await;
        Ok(report)
    }

    /// Cost totals, groupings, and 30-day projection for the range.
    pub async fn cost_report(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> sqlx::Result<CostReport> {
        let key = cache_key("costs", from, to);
        if let Some(report) = self.cache.get(&key).await {
            return Ok(report);
        }

        let rows = db::fetch_cost_rows(&self.db, from, to).await?;
        let rows: Vec<CostRow> = rows
            .into_iter()
            .map(|row| CostRow {
                provider: row.provider,
                model: row.model,
                cost: row.cost,
            })
            .collect();
        let completed = db::count_completed_requests(&self.db, from, to).await?;
        let range_days = (to - from).num_seconds() as f64 / 86_400.0;

        let report = aggregate_costs(&rows, completed.max(0) as usize, range_days);
        self.cache.put(&key, &report).await;
        Ok(report)
    }

    /// Cost/agreement pairs for the range, temporally descending.
    pub async fn cost_quality_report(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> sqlx::Result<Vec<CostQualityPoint>> {
        let key = cache_key("cost-quality", from, to);
        if let Some(report) = self.cache.get(&key).await {
            return Ok(report);
        }

        let rows = db::fetch_cost_quality_rows(&self.db, from, to).await?;
        let pairs: Vec<(Option<f64>, Option<f64>)> = rows
            .into_iter()
            .map(|row| (row.total_cost, row.agreement_level))
            .collect();

        let report = cost_quality_series(&pairs);
        self.cache.put(&key, &report).await;
        Ok(report)
    }
}

fn cache_key(report: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> String {
    format!(
        "conclave:analytics:{report}:{}:{}",
        from.timestamp(),
        to.timestamp()
    )
}

fn snapshot_council_size(snapshot: &serde_json::Value) -> Option<usize> {
    snapshot.get("members")?.as_array().map(Vec::len)
}

fn snapshot_rounds(snapshot: &serde_json::Value) -> Option<u32> {
    snapshot
        .pointer("/deliberation/rounds")?
        .as_u64()
        .map(|rounds| rounds as u32)
}

fn snapshot_global_timeout_ms(snapshot: &serde_json::Value) -> Option<f64> {
    snapshot
        .pointer("/performance/global_timeout_seconds")?
        .as_f64()
        .map(|seconds| seconds * 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_fields_are_extracted() {
        let snapshot = json!({
            "members": [{"member_id": "m1"}, {"member_id": "m2"}],
            "deliberation": {"rounds": 2},
            "performance": {"global_timeout_seconds": 60.0},
        });

        assert_eq!(snapshot_council_size(&snapshot), Some(2));
        assert_eq!(snapshot_rounds(&snapshot), Some(2));
        assert!((snapshot_global_timeout_ms(&snapshot).unwrap() - 60_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn malformed_snapshot_yields_none() {
        let snapshot = json!({"unrelated": true});
        assert_eq!(snapshot_council_size(&snapshot), None);
        assert_eq!(snapshot_rounds(&snapshot), None);
        assert_eq!(snapshot_global_timeout_ms(&snapshot), None);
    }
}
