//! Metrics for the stored model against the current records

use chrono::{DateTime, Utc};
use organmatch_core::{Donor, HyperParams, ModelStore, Recipient};
use organmatch_trainer::{evaluate, prepare_data, split_for_evaluation, Evaluation};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Highest importance first
    pub feature_importance: Vec<FeatureImportance>,
    pub n_samples: usize,
    pub n_features: usize,
    pub params: HyperParams,
    pub trained_at: DateTime<Utc>,
    /// Held-out metrics; absent below the minimum sample count
    pub evaluation: Option<Evaluation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModelStatus {
    NotTrained,
    Trained(Box<ModelMetrics>),
}

/// Report on the stored model using the given snapshot.
pub fn evaluate_model(
    store: &ModelStore,
    donors: &[Donor],
    recipients: &[Recipient],
) -> Result<ModelStatus> {
    let Some(bundle) = store.load()? else {
        info!("Model not trained yet");
        return Ok(ModelStatus::NotTrained);
    };

    let feature_importance = bundle
        .ranked_importances()
        .into_iter()
        .map(|(feature, importance)| FeatureImportance {
            feature,
            importance,
        })
        .collect();

    let (n_samples, evaluation) =
        match prepare_data(donors, recipients, &bundle.feature_columns)? {
            Some(prepared) => {
                let (_, test) = split_for_evaluation(&prepared.dataset);
                let evaluation = test.map(|test| evaluate(&bundle.forest, &test));
                (prepared.dataset.len(), evaluation)
            }
            None => (0, None),
        };

    Ok(ModelStatus::Trained(Box::new(ModelMetrics {
        feature_importance,
        n_samples,
        n_features: bundle.feature_columns.len(),
        params: bundle.params,
        trained_at: bundle.created_at,
        evaluation,
    })))
}
