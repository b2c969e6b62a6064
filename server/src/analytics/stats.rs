//! Pure analytic computations over persisted deliberation data.
//!
//! Everything here runs to completion without suspension; the service
//! layer feeds these functions from time-range queries.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

/// Minimum token length kept when tokenizing content for overlap.
const MIN_TOKEN_LEN: usize = 4;
/// Pairwise overlap below this counts as a disagreement.
const DISAGREEMENT_THRESHOLD: f64 = 0.7;
/// Overlap above this counts as a consensus match for influence.
const INFLUENCE_THRESHOLD: f64 = 0.5;

/// Linear-interpolation percentile over a sorted sample.
///
/// Position is `(n - 1) * p + 1` (1-based); the result interpolates
/// between the floor and ceiling positions. Empty input yields 0.
#[must_use]
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let pos = (n as f64 - 1.0) * p.clamp(0.0, 1.0) + 1.0;
            let lower = pos.floor() as usize;
            let upper = pos.ceil() as usize;
            let lower_value = sorted[lower - 1];
            let upper_value = sorted[upper - 1];
            lower_value + (upper_value - lower_value) * (pos - pos.floor())
        }
    }
}

/// Summary of one latency sample.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PercentileSummary {
    pub count: usize,
    pub min: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub max: f64,
}

impl PercentileSummary {
    /// Compute the summary from an unsorted sample.
    #[must_use]
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let mut sorted: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
        sorted.sort_by(f64::total_cmp);
        if sorted.is_empty() {
            return Self::default();
        }
        Self {
            count: sorted.len(),
            min: sorted[0],
            p50: percentile(&sorted, 0.50),
            p95: percentile(&sorted, 0.95),
            p99: percentile(&sorted, 0.99),
            max: sorted[sorted.len() - 1],
        }
    }
}

/// Word-set similarity used as a cheap text-overlap measure.
///
/// Tokens split on whitespace; tokens of length <= 3 are dropped and the
/// rest deduplicated. Two empty sets compare the trimmed strings; one
/// empty set is zero overlap. Never returns NaN.
#[must_use]
pub fn overlap(a: &str, b: &str) -> f64 {
    let set_a = token_set(a);
    let set_b = token_set(b);

    match (set_a.is_empty(), set_b.is_empty()) {
        (true, true) => {
            if a.trim() == b.trim() {
                1.0
            } else {
                0.0
            }
        }
        (true, false) | (false, true) => 0.0,
        (false, false) => {
            let intersection = set_a.intersection(&set_b).count();
            intersection as f64 / set_a.len().max(set_b.len()) as f64
        }
    }
}

fn token_set(text: &str) -> HashSet<&str> {
    text.split_whitespace()
        .filter(|token| token.len() >= MIN_TOKEN_LEN)
        .collect()
}

/// One persisted member response used for agreement and influence.
#[derive(Debug, Clone)]
pub struct ResponseRow {
    pub request_id: uuid::Uuid,
    pub member_id: String,
    pub content: Option<String>,
}

/// Pairwise disagreement rates across observed members.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgreementMatrix {
    /// Observed member ids, ordered lexicographically.
    pub members: Vec<String>,
    /// `matrix[i][j]` is the disagreement rate between members i and j;
    /// the diagonal is 0 and the matrix is symmetric.
    pub matrix: Vec<Vec<f64>>,
}

/// Compute the disagreement matrix over persisted responses.
///
/// A pair's rate is computed over requests where both members answered
/// with non-null content; a disagreement is a pairwise overlap below 0.7.
#[must_use]
pub fn agreement_matrix(rows: &[ResponseRow]) -> AgreementMatrix {
    let mut members: Vec<String> = rows
        .iter()
        .map(|row| row.member_id.clone())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    members.sort_unstable();

    // request id -> member -> content, null contents skipped.
    let mut by_request: BTreeMap<uuid::Uuid, BTreeMap<&str, &str>> = BTreeMap::new();
    for row in rows {
        if let Some(content) = row.content.as_deref() {
            by_request
                .entry(row.request_id)
                .or_default()
                .insert(row.member_id.as_str(), content);
        }
    }

    let n = members.len();
    let mut matrix = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let mut shared = 0usize;
            let mut disagreements = 0usize;
            for contents in by_request.values() {
                let (Some(a), Some(b)) = (
                    contents.get(members[i].as_str()),
                    contents.get(members[j].as_str()),
                ) else {
                    continue;
                };
                shared += 1;
                if overlap(a, b) < DISAGREEMENT_THRESHOLD {
                    disagreements += 1;
                }
            }
            let rate = if shared == 0 {
                0.0
            } else {
                disagreements as f64 / shared as f64
            };
            matrix[i][j] = rate;
            matrix[j][i] = rate;
        }
    }

    AgreementMatrix { members, matrix }
}

/// One (member response, consensus) pairing used for influence.
#[derive(Debug, Clone)]
pub struct InfluenceRow {
    pub member_id: String,
    pub content: Option<String>,
    pub consensus: Option<String>,
}

/// Per-member influence: the fraction of requests where the member's
/// answer overlaps the consensus above 0.5. Always finite, in [0, 1].
#[must_use]
pub fn influence_scores(rows: &[InfluenceRow]) -> BTreeMap<String, f64> {
    let mut totals: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for row in rows {
        let (Some(content), Some(consensus)) = (row.content.as_deref(), row.consensus.as_deref())
        else {
            continue;
        };
        if content.is_empty() || consensus.is_empty() {
            continue;
        }
        let entry = totals.entry(row.member_id.as_str()).or_insert((0, 0));
        entry.1 += 1;
        if overlap(content, consensus) > INFLUENCE_THRESHOLD {
            entry.0 += 1;
        }
    }

    totals
        .into_iter()
        .map(|(member, (matches, total))| {
            let score = if total == 0 {
                0.0
            } else {
                matches as f64 / total as f64
            };
            (member.to_string(), score)
        })
        .collect()
}

/// One request's latency paired with its configured global timeout.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutSample {
    pub total_latency_ms: f64,
    pub global_timeout_ms: f64,
}

/// Fraction of requests whose total latency reached the configured
/// global timeout.
#[must_use]
pub fn timeout_rate(samples: &[TimeoutSample]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let timed_out = samples
        .iter()
        .filter(|s| s.total_latency_ms >= s.global_timeout_ms)
        .count();
    timed_out as f64 / samples.len() as f64
}

/// One persisted cost record.
#[derive(Debug, Clone)]
pub struct CostRow {
    pub provider: String,
    pub model: String,
    pub cost: Option<f64>,
}

/// Aggregated cost report over a time range.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostReport {
    pub total_cost: f64,
    pub by_provider: BTreeMap<String, f64>,
    pub by_provider_model: BTreeMap<String, f64>,
    pub cost_per_request: f64,
    pub projected_30d_cost: f64,
}

/// Sum persisted costs, skipping null/NaN rows, grouped by provider and
/// by (provider, model). `cost_per_request` divides by the completed
/// request count; the 30-day projection scales by `30 / range_days`.
#[must_use]
pub fn aggregate_costs(rows: &[CostRow], completed_requests: usize, range_days: f64) -> CostReport {
    let mut report = CostReport::default();

    for row in rows {
        let Some(cost) = row.cost.filter(|c| c.is_finite()) else {
            continue;
        };
        report.total_cost += cost;
        *report.by_provider.entry(row.provider.clone()).or_default() += cost;
        *report
            .by_provider_model
            .entry(format!("{}/{}", row.provider, row.model))
            .or_default() += cost;
    }

    if completed_requests > 0 {
        report.cost_per_request = report.total_cost / completed_requests as f64;
    }
    if range_days > 0.0 {
        report.projected_30d_cost = report.total_cost * (30.0 / range_days);
    }

    report
}

/// One (cost, agreement) pairing in temporal order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CostQualityPoint {
    pub total_cost: f64,
    pub agreement_level: f64,
}

/// Pair request costs with agreement levels, dropping null/NaN items and
/// preserving the caller's (temporally descending) order.
#[must_use]
pub fn cost_quality_series(rows: &[(Option<f64>, Option<f64>)]) -> Vec<CostQualityPoint> {
    rows.iter()
        .filter_map(|(cost, agreement)| {
            let total_cost = cost.filter(|c| c.is_finite())?;
            let agreement_level = agreement.filter(|a| a.is_finite())?;
            Some(CostQualityPoint {
                total_cost,
                agreement_level,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn percentile_empty_and_single() {
        assert!((percentile(&[], 0.5) - 0.0).abs() < f64::EPSILON);
        assert!((percentile(&[42.0], 0.99) - 42.0).abs() < f64::EPSILON);
    }

    #[test]
    fn percentile_interpolates_linearly() {
        let sorted = [10.0, 20.0, 30.0, 40.0];
        // pos = 3 * 0.5 + 1 = 2.5 -> midway between 20 and 30.
        assert!((percentile(&sorted, 0.5) - 25.0).abs() < 1e-9);
        assert!((percentile(&sorted, 0.0) - 10.0).abs() < 1e-9);
        assert!((percentile(&sorted, 1.0) - 40.0).abs() < 1e-9);
    }

    #[test]
    fn percentiles_are_ordered() {
        let samples: Vec<f64> = (0..500).map(|i| f64::from(i % 97) * 3.5).collect();
        let summary = PercentileSummary::from_samples(&samples);
        assert!(summary.min <= summary.p50);
        assert!(summary.p50 <= summary.p95);
        assert!(summary.p95 <= summary.p99);
        assert!(summary.p99 <= summary.max);
    }

    #[test]
    fn uniform_input_yields_equal_percentiles() {
        let samples = vec![7.0; 32];
        let summary = PercentileSummary::from_samples(&samples);
        assert!((summary.p50 - 7.0).abs() < f64::EPSILON);
        assert!((summary.p95 - 7.0).abs() < f64::EPSILON);
        assert!((summary.p99 - 7.0).abs() < f64::EPSILON);
    }

    #[test]
    fn overlap_identity_and_symmetry() {
        let text = "Paris is the capital of France";
        assert!((overlap(text, text) - 1.0).abs() < f64::EPSILON);

        let other = "The capital city of France is Paris";
        let ab = overlap(text, other);
        let ba = overlap(other, text);
        assert!((ab - ba).abs() < f64::EPSILON);
        assert!(!ab.is_nan());
    }

    #[test]
    fn overlap_short_tokens_are_dropped() {
        // Every token is <= 3 chars, so both sets are empty and the
        // trimmed strings differ.
        assert!((overlap("a bb cc", "dd e f") - 0.0).abs() < f64::EPSILON);
        assert!((overlap("a bb cc", " a bb cc ") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn overlap_one_empty_set_is_zero() {
        assert!((overlap("tiny", "") - 0.0).abs() < f64::EPSILON);
        assert!((overlap("", "tiny") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn agreement_matrix_is_square_symmetric_zero_diagonal() {
        let r1 = Uuid::now_v7();
        let r2 = Uuid::now_v7();
        let rows = vec![
            ResponseRow {
                request_id: r1,
                member_id: "m1".into(),
                content: Some("Paris is the capital of France".into()),
            },
            ResponseRow {
                request_id: r1,
                member_id: "m2".into(),
                content: Some("Paris is the capital of France".into()),
            },
            ResponseRow {
                request_id: r2,
                member_id: "m1".into(),
                content: Some("completely different answer entirely".into()),
            },
            ResponseRow {
                request_id: r2,
                member_id: "m2".into(),
                content: Some("Paris remains the capital city".into()),
            },
        ];

        let result = agreement_matrix(&rows);
        assert_eq!(result.members, vec!["m1", "m2"]);
        assert_eq!(result.matrix.len(), 2);
        for (i, row) in result.matrix.iter().enumerate() {
            assert_eq!(row.len(), 2);
            assert!((row[i] - 0.0).abs() < f64::EPSILON);
            for (j, value) in row.iter().enumerate() {
                assert!((0.0..=1.0).contains(value));
                assert!((value - result.matrix[j][i]).abs() < f64::EPSILON);
            }
        }
        // One agreeing request, one disagreeing request: rate 0.5.
        assert!((result.matrix[0][1] - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn agreement_matrix_skips_null_content() {
        let r1 = Uuid::now_v7();
        let rows = vec![
            ResponseRow {
                request_id: r1,
                member_id: "m1".into(),
                content: None,
            },
            ResponseRow {
                request_id: r1,
                member_id: "m2".into(),
                content: Some("something sufficiently long".into()),
            },
        ];

        let result = agreement_matrix(&rows);
        // No shared request with both contents: rate defaults to 0.
        assert!((result.matrix[0][1] - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn influence_scores_are_bounded() {
        let rows = vec![
            InfluenceRow {
                member_id: "m1".into(),
                content: Some("Paris is the capital of France".into()),
                consensus: Some("Paris is the capital of France".into()),
            },
            InfluenceRow {
                member_id: "m1".into(),
                content: Some("unrelated response text here".into()),
                consensus: Some("Paris is the capital of France".into()),
            },
            InfluenceRow {
                member_id: "m2".into(),
                content: None,
                consensus: Some("Paris is the capital of France".into()),
            },
        ];

        let scores = influence_scores(&rows);
        assert!((scores["m1"] - 0.5).abs() < f64::EPSILON);
        // m2 contributed no usable pairs and is absent.
        assert!(!scores.contains_key("m2"));
        for score in scores.values() {
            assert!(score.is_finite());
            assert!((0.0..=1.0).contains(score));
        }
    }

    #[test]
    fn timeout_rate_counts_at_or_above_deadline() {
        let samples = [
            TimeoutSample {
                total_latency_ms: 60_000.0,
                global_timeout_ms: 60_000.0,
            },
            TimeoutSample {
                total_latency_ms: 1_000.0,
                global_timeout_ms: 60_000.0,
            },
        ];
        assert!((timeout_rate(&samples) - 0.5).abs() < f64::EPSILON);
        assert!((timeout_rate(&[]) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn cost_aggregation_skips_null_and_nan() {
        let rows = vec![
            CostRow {
                provider: "openai".into(),
                model: "gpt".into(),
                cost: Some(1.5),
            },
            CostRow {
                provider: "openai".into(),
                model: "gpt".into(),
                cost: None,
            },
            CostRow {
                provider: "anthropic".into(),
                model: "claude".into(),
                cost: Some(f64::NAN),
            },
            CostRow {
                provider: "anthropic".into(),
                model: "claude".into(),
                cost: Some(0.5),
            },
        ];

        let report = aggregate_costs(&rows, 4, 10.0);
        assert!((report.total_cost - 2.0).abs() < f64::EPSILON);
        assert!((report.by_provider["openai"] - 1.5).abs() < f64::EPSILON);
        assert!((report.by_provider_model["anthropic/claude"] - 0.5).abs() < f64::EPSILON);
        assert!((report.cost_per_request - 0.5).abs() < f64::EPSILON);
        assert!((report.projected_30d_cost - 6.0).abs() < f64::EPSILON);
    }

    #[test]
    fn cost_quality_drops_incomplete_pairs() {
        let rows = vec![
            (Some(1.0), Some(0.9)),
            (None, Some(0.5)),
            (Some(2.0), None),
            (Some(f64::NAN), Some(0.1)),
        ];
        let series = cost_quality_series(&rows);
        assert_eq!(series.len(), 1);
        assert!((series[0].total_cost - 1.0).abs() < f64::EPSILON);
    }
}
