//! ML match probabilities from the stored forest

use organmatch_core::{build_pairs, Donor, FeatureMatrix, ModelStore, RecordId, Recipient};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ImputationSource;
use crate::errors::Result;
use crate::round2;

/// Model probability for one pair, as a percentage with 2 decimals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub donor_id: RecordId,
    pub recipient_id: RecordId,
    pub probability: f64,
}

pub struct Predictor {
    store: ModelStore,
    imputation: ImputationSource,
}

impl Predictor {
    pub fn new(store: ModelStore, imputation: ImputationSource) -> Self {
        Self { store, imputation }
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    /// Score every organ-matching pair, highest probability first.
    ///
    /// Empty when no model has been trained or no pair exists. The bundle is
    /// read on each call so a finished retrain is picked up immediately.
    pub fn predict(&self, donors: &[Donor], recipients: &[Recipient]) -> Result<Vec<Prediction>> {
        let Some(bundle) = self.store.load()? else {
            info!("Model not trained yet; no predictions");
            return Ok(Vec::new());
        };

        let pairs = build_pairs(donors, recipients);
        if pairs.is_empty() {
            debug!("No organ-matching pairs to score");
            return Ok(Vec::new());
        }

        let mut matrix = FeatureMatrix::from_pairs(&pairs, &bundle.feature_columns)?;
        match self.imputation {
            ImputationSource::Current => {
                matrix.impute_medians();
            }
            ImputationSource::Training => matrix.impute_with(&bundle.training_medians)?,
        }

        let mut predictions: Vec<Prediction> = matrix
            .ids
            .iter()
            .zip(&matrix.rows)
            .map(|(&(donor_id, recipient_id), row)| Prediction {
                donor_id,
                recipient_id,
                probability: round2(bundle.forest.predict_proba(row) * 100.0),
            })
            .collect();

        // Stable: equal probabilities keep pair order
        predictions.sort_by(|a, b| b.probability.total_cmp(&a.probability));
        Ok(predictions)
    }

    /// Top `top_n` predictions for one recipient; empty if the id is unknown.
    pub fn best_matches(
        &self,
        donors: &[Donor],
        recipients: &[Recipient],
        recipient_id: RecordId,
        top_n: usize,
    ) -> Result<Vec<Prediction>> {
        let Some(recipient) = recipients.iter().find(|r| r.id == recipient_id) else {
            return Ok(Vec::new());
        };
        let mut predictions = self.predict(donors, std::slice::from_ref(recipient))?;
        predictions.truncate(top_n);
        Ok(predictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use organmatch_core::{Forest, HyperParams, ModelBundle, Node, Tree, FEATURE_COLUMNS};
    use tempfile::TempDir;

    /// One stump on `hla_match_score`: high HLA overlap -> 0.9, else 0.2
    fn store_with_stump(dir: &TempDir) -> ModelStore {
        let store = ModelStore::new(dir.path().join("model.json"), dir.path().join("cfg.json"));
        let n = FEATURE_COLUMNS.len();
        let tree = Tree::new(vec![
            Node::internal(0, 0, 0.5, 1, 2),
            Node::leaf(1, 0.2),
            Node::leaf(2, 0.9),
        ]);
        let mut importances = vec![0.0; n];
        importances[0] = 1.0;
        store
            .save(&ModelBundle {
                forest: Forest::new(n, vec![tree], importances),
                feature_columns: FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect(),
                params: HyperParams::default(),
                training_medians: vec![0.0; n],
                created_at: Utc::now(),
            })
            .unwrap();
        store
    }

    fn donor(id: RecordId, hla: &str) -> Donor {
        let mut d = Donor::new(id, "Kidney");
        d.hla_typing = Some(hla.into());
        d
    }

    fn recipient(id: RecordId) -> Recipient {
        let mut r = Recipient::new(id, "Kidney");
        r.hla_typing = Some("A1,A2,B7,B8".into());
        r
    }

    #[test]
    fn test_untrained_model_gives_empty() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path().join("none.json"), dir.path().join("cfg.json"));
        let predictor = Predictor::new(store, ImputationSource::Current);
        assert!(predictor
            .predict(&[donor(1, "A1")], &[recipient(2)])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_predictions_sorted_and_scaled() {
        let dir = TempDir::new().unwrap();
        let predictor = Predictor::new(store_with_stump(&dir), ImputationSource::Current);

        let donors = vec![donor(1, "A3,A11,B35,B44"), donor(2, "A1,A2,B7,B8")];
        let predictions = predictor.predict(&donors, &[recipient(10)]).unwrap();

        assert_eq!(predictions.len(), 2);
        assert_eq!(predictions[0].donor_id, 2);
        assert_eq!(predictions[0].probability, 90.0);
        assert_eq!(predictions[1].probability, 20.0);
    }

    #[test]
    fn test_best_matches_respects_top_n() {
        let dir = TempDir::new().unwrap();
        let predictor = Predictor::new(store_with_stump(&dir), ImputationSource::Training);

        let donors: Vec<Donor> = (1..=5).map(|i| donor(i, "A1,A2,B7,B8")).collect();
        let recipients = vec![recipient(10), recipient(11)];

        let top = predictor.best_matches(&donors, &recipients, 10, 3).unwrap();
        assert_eq!(top.len(), 3);
        assert!(top.iter().all(|p| p.recipient_id == 10));
        // Ties keep donor order
        assert_eq!(top.iter().map(|p| p.donor_id).collect::<Vec<_>>(), vec![1, 2, 3]);

        assert!(predictor.best_matches(&donors, &recipients, 99, 3).unwrap().is_empty());
    }
}
