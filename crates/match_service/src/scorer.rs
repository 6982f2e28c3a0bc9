//! Final compatibility scores
//!
//! The ML probability is multiplied by the ten factor multipliers,
//! recomputed from the live records, so hard constraints such as blood
//! incompatibility always pull the score down whatever the model says.

use organmatch_core::{FactorSet, FeatureVector, PairMetrics, RecordId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::history::{record_if_absent, MatchHistoryStore, MatchRecord};
use crate::predictor::Prediction;
use crate::records::RecordSource;
use crate::round2;

/// Raw metrics and factor multipliers behind a final score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorBreakdown {
    pub metrics: PairMetrics,
    pub factors: FactorSet,
    pub combined_factor_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompatibilityScore {
    pub donor_id: RecordId,
    pub recipient_id: RecordId,
    /// `clamp(0, 100, ml_score * product of factors)`, 2 decimals
    pub final_score: f64,
    pub ml_score: f64,
    pub breakdown: FactorBreakdown,
}

/// Blend a 0..100 ML score with the product of the factors.
pub fn final_score(ml_score: f64, factors: &FactorSet) -> f64 {
    round2((ml_score * factors.product()).clamp(0.0, 100.0))
}

pub struct CompatibilityScorer {
    history: Arc<dyn MatchHistoryStore>,
    threshold: f64,
}

impl CompatibilityScorer {
    pub fn new(history: Arc<dyn MatchHistoryStore>, threshold: f64) -> Self {
        Self { history, threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Score predictions against the live records, highest final score first.
    ///
    /// Pairs whose donor or recipient no longer exists are dropped. Pairs
    /// at or above the threshold are recorded in match history once; a
    /// failed write is logged and the batch continues.
    pub fn score(
        &self,
        predictions: &[Prediction],
        records: &dyn RecordSource,
    ) -> Vec<CompatibilityScore> {
        let mut seen = HashSet::new();
        let mut scores = Vec::with_capacity(predictions.len());

        for prediction in predictions {
            let key = (prediction.donor_id, prediction.recipient_id);
            if !seen.insert(key) {
                continue;
            }

            let (Some(donor), Some(recipient)) =
                (records.donor(key.0), records.recipient(key.1))
            else {
                debug!("Skipping pair {:?}: record no longer exists", key);
                continue;
            };

            let pair = FeatureVector::new(&donor, &recipient);
            let score = CompatibilityScore {
                donor_id: key.0,
                recipient_id: key.1,
                final_score: final_score(prediction.probability, &pair.factors),
                ml_score: prediction.probability,
                breakdown: FactorBreakdown {
                    metrics: pair.metrics,
                    factors: pair.factors,
                    combined_factor_score: pair.combined_factor_score(),
                },
            };

            if score.final_score >= self.threshold {
                let record = MatchRecord::new(key.0, key.1, score.final_score);
                match record_if_absent(self.history.as_ref(), record) {
                    Ok(true) => debug!("Recorded match {:?} at {}", key, score.final_score),
                    Ok(false) => {}
                    Err(e) => warn!("Failed to record match {:?}: {}", key, e),
                }
            }

            scores.push(score);
        }

        scores.sort_by(|a, b| b.final_score.total_cmp(&a.final_score));
        scores
    }
}
