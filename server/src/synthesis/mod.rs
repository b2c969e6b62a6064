//! Synthesis Collaborator Seam
//!
//! Reduces a deliberation thread to a single consensus decision. The
//! strategy itself is a collaborator; the crate ships a similarity-based
//! default so the proxy works without an external engine.

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::analytics::overlap;
use crate::council::{
    Confidence, ConsensusDecision, DeliberationThread, SynthesisConfig, SynthesisError,
    UserRequest,
};

/// Agreement at or above this yields high confidence.
const HIGH_CONFIDENCE: f64 = 0.8;
/// Agreement at or above this (and below high) yields medium confidence.
const MEDIUM_CONFIDENCE: f64 = 0.5;

/// Reduces a thread to one decision. Inputs are read-only.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(
        &self,
        request: &UserRequest,
        thread: &DeliberationThread,
        config: &SynthesisConfig,
    ) -> Result<ConsensusDecision, SynthesisError>;
}

/// Default strategy: pick the final-round answer with the highest mean
/// overlap against its peers; agreement is the mean pairwise overlap.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimilaritySynthesizer;

impl SimilaritySynthesizer {
    fn agreement_level(contents: &[&str]) -> f64 {
        if contents.len() < 2 {
            return 1.0;
        }
        let mut total = 0.0;
        let mut pairs = 0usize;
        for i in 0..contents.len() {
            for j in (i + 1)..contents.len() {
                total += overlap(contents[i], contents[j]);
                pairs += 1;
            }
        }
        total / pairs as f64
    }

    fn representative(contents: &[&str]) -> usize {
        if contents.len() < 2 {
            return 0;
        }
        let mut best = 0usize;
        let mut best_score = f64::MIN;
        for i in 0..contents.len() {
            let score: f64 = contents
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, peer)| overlap(contents[i], peer))
                .sum::<f64>()
                / (contents.len() - 1) as f64;
            if score > best_score {
                best_score = score;
                best = i;
            }
        }
        best
    }

    const fn confidence_for(agreement: f64) -> Confidence {
        if agreement >= HIGH_CONFIDENCE {
            Confidence::High
        } else if agreement >= MEDIUM_CONFIDENCE {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

#[async_trait]
impl Synthesizer for SimilaritySynthesizer {
    async fn synthesize(
        &self,
        request: &UserRequest,
        thread: &DeliberationThread,
        config: &SynthesisConfig,
    ) -> Result<ConsensusDecision, SynthesisError> {
        let final_round = thread
            .final_round()
            .ok_or_else(|| SynthesisError("thread has no rounds".to_string()))?;
        if final_round.exchanges.is_empty() {
            return Err(SynthesisError("final round has no exchanges".to_string()));
        }

        let contents: Vec<&str> = final_round
            .exchanges
            .iter()
            .map(|e| e.content.as_str())
            .collect();
        let agreement_level = Self::agreement_level(&contents);
        let representative = Self::representative(&contents);

        debug!(
            request_id = %request.request_id,
            agreement = agreement_level,
            representative = %final_round.exchanges[representative].council_member_id,
            "Synthesized consensus"
        );

        Ok(ConsensusDecision {
            content: contents[representative].to_string(),
            confidence: Self::confidence_for(agreement_level),
            agreement_level,
            strategy: config.strategy.clone(),
            contributing_members: thread.contributing_members(),
            timestamp: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::council::{DeliberationRound, Exchange, TokenUsage};

    fn thread_of(contents: &[&str]) -> DeliberationThread {
        DeliberationThread {
            rounds: vec![DeliberationRound {
                round_number: 0,
                exchanges: contents
                    .iter()
                    .enumerate()
                    .map(|(i, content)| Exchange {
                        council_member_id: format!("m{}", i + 1),
                        content: (*content).to_string(),
                        references_to: Vec::new(),
                        token_usage: TokenUsage::default(),
                    })
                    .collect(),
            }],
            total_duration_ms: 100,
        }
    }

    #[tokio::test]
    async fn identical_answers_yield_high_confidence() {
        let thread = thread_of(&[
            "Paris is the capital of France",
            "Paris is the capital of France",
            "Paris is the capital of France",
        ]);
        let decision = SimilaritySynthesizer
            .synthesize(
                &UserRequest::new("capital of France?"),
                &thread,
                &SynthesisConfig::default(),
            )
            .await
            .expect("synthesis succeeds");

        assert_eq!(decision.confidence, Confidence::High);
        assert!(decision.agreement_level > 0.8);
        assert_eq!(decision.contributing_members, vec!["m1", "m2", "m3"]);
        assert_eq!(decision.content, "Paris is the capital of France");
    }

    #[tokio::test]
    async fn divergent_answers_yield_low_confidence() {
        let thread = thread_of(&[
            "completely unrelated first answer",
            "another different second response",
            "third orthogonal reply altogether",
        ]);
        let decision = SimilaritySynthesizer
            .synthesize(
                &UserRequest::new("q"),
                &thread,
                &SynthesisConfig::default(),
            )
            .await
            .expect("synthesis succeeds");

        assert_eq!(decision.confidence, Confidence::Low);
        assert!(decision.agreement_level < 0.5);
    }

    #[tokio::test]
    async fn single_answer_is_full_agreement() {
        let thread = thread_of(&["the only answer available"]);
        let decision = SimilaritySynthesizer
            .synthesize(
                &UserRequest::new("q"),
                &thread,
                &SynthesisConfig::default(),
            )
            .await
            .expect("synthesis succeeds");

        assert!((decision.agreement_level - 1.0).abs() < f64::EPSILON);
        assert_eq!(decision.confidence, Confidence::High);
    }

    #[tokio::test]
    async fn empty_thread_is_an_error() {
        let thread = DeliberationThread {
            rounds: Vec::new(),
            total_duration_ms: 0,
        };
        let result = SimilaritySynthesizer
            .synthesize(
                &UserRequest::new("q"),
                &thread,
                &SynthesisConfig::default(),
            )
            .await;
        assert!(result.is_err());
    }
}
