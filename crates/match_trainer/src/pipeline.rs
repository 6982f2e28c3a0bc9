//! End-to-end training run
//!
//! Snapshot records -> labelled pairs -> imputed matrix -> seeded split ->
//! forest -> held-out metrics -> persisted bundle and hyperparameters.

use chrono::Utc;
use organmatch_core::{
    build_labelled_pairs, Donor, FeatureMatrix, Forest, HyperParams, ModelBundle, ModelStore,
    Recipient, FEATURE_COLUMNS, MIN_SAMPLES_FOR_SPLIT, RANDOM_STATE, TEST_FRACTION,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dataset::Dataset;
use crate::errors::TrainerError;
use crate::metrics::{roc_auc, roc_curve, ClassificationReport, ConfusionMatrix, RocPoint};
use crate::trainer::{ForestConfig, ForestTrainer};

/// Labelled, imputed training data built from a record snapshot
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub dataset: Dataset,
    /// Column medians used for imputation
    pub medians: Vec<f64>,
}

/// Held-out performance of a forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub confusion_matrix: ConfusionMatrix,
    pub report: ClassificationReport,
    /// `None` when the test set holds a single class
    pub roc_auc: Option<f64>,
    pub roc_curve: Option<Vec<RocPoint>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub n_samples: usize,
    pub n_train: usize,
    pub n_test: usize,
    pub positive_rate: f64,
    pub params: HyperParams,
    /// Present when enough samples existed for a held-out split
    pub evaluation: Option<Evaluation>,
    pub model_hash: String,
}

#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub bundle: ModelBundle,
    pub report: TrainingReport,
}

/// Build labelled pairs over `columns` and median-impute them.
///
/// Returns `Ok(None)` when no donor/recipient pair shares an organ.
pub fn prepare_data<S: AsRef<str>>(
    donors: &[Donor],
    recipients: &[Recipient],
    columns: &[S],
) -> Result<Option<PreparedData>, TrainerError> {
    let (pairs, labels) = build_labelled_pairs(donors, recipients);
    if pairs.is_empty() {
        return Ok(None);
    }

    let mut matrix = FeatureMatrix::from_pairs(&pairs, columns)?;
    let medians = matrix.impute_medians();
    let dataset = Dataset::from_matrix(&matrix, labels)?;
    Ok(Some(PreparedData { dataset, medians }))
}

/// Seeded train/test split, or everything as training data when there are
/// fewer than `MIN_SAMPLES_FOR_SPLIT` rows.
pub fn split_for_evaluation(dataset: &Dataset) -> (Dataset, Option<Dataset>) {
    if dataset.len() < MIN_SAMPLES_FOR_SPLIT {
        return (dataset.clone(), None);
    }
    let (train, test) = dataset.split_train_test(TEST_FRACTION, RANDOM_STATE);
    (train, Some(test))
}

/// Score a forest on held-out rows.
pub fn evaluate(forest: &Forest, test: &Dataset) -> Evaluation {
    let scores: Vec<f64> = test.features.iter().map(|x| forest.predict_proba(x)).collect();
    let predicted: Vec<u8> = test.features.iter().map(|x| forest.predict(x)).collect();

    let confusion_matrix = ConfusionMatrix::from_predictions(&test.labels, &predicted);
    let report = ClassificationReport::from_confusion(&confusion_matrix);
    let auc = roc_auc(&test.labels, &scores);
    let curve = auc.map(|_| roc_curve(&test.labels, &scores));

    Evaluation {
        confusion_matrix,
        report,
        roc_auc: auc,
        roc_curve: curve,
    }
}

/// Train on a snapshot and atomically replace the stored model.
///
/// Without `override_params` the persisted config (or the defaults) is used.
/// Returns `Ok(None)` when the snapshot yields no pairs.
pub fn train_model(
    donors: &[Donor],
    recipients: &[Recipient],
    store: &ModelStore,
    override_params: Option<HyperParams>,
) -> Result<Option<TrainOutcome>, TrainerError> {
    let params = override_params.unwrap_or_else(|| store.load_params());
    params.validate()?;

    let Some(prepared) = prepare_data(donors, recipients, &FEATURE_COLUMNS)? else {
        warn!(
            "Insufficient data: no organ-matching pairs among {} donors and {} recipients",
            donors.len(),
            recipients.len()
        );
        return Ok(None);
    };
    let dataset = &prepared.dataset;

    let (train, test) = split_for_evaluation(dataset);
    if test.is_none() {
        info!(
            "Only {} samples; training on all of them without evaluation",
            dataset.len()
        );
    }

    let forest = ForestTrainer::new(ForestConfig::new(params, RANDOM_STATE)).train(&train)?;

    let evaluation = test.as_ref().map(|test| evaluate(&forest, test));
    if let Some(eval) = &evaluation {
        info!(
            "Held-out accuracy {:.3}, ROC-AUC {}",
            eval.report.accuracy,
            eval.roc_auc
                .map(|auc| format!("{:.3}", auc))
                .unwrap_or_else(|| "n/a (single class)".to_string())
        );
    }

    let bundle = ModelBundle {
        forest,
        feature_columns: FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect(),
        params,
        training_medians: prepared.medians.clone(),
        created_at: Utc::now(),
    };
    let model_hash = store.save(&bundle)?;
    store.save_params(&params)?;

    let report = TrainingReport {
        n_samples: dataset.len(),
        n_train: train.len(),
        n_test: test.as_ref().map_or(0, Dataset::len),
        positive_rate: dataset.positive_rate(),
        params,
        evaluation,
        model_hash,
    };

    Ok(Some(TrainOutcome { bundle, report }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_threshold() {
        let four = Dataset::new(vec![vec![1.0]; 4], vec![0, 1, 0, 1]).unwrap();
        let (train, test) = split_for_evaluation(&four);
        assert_eq!(train.len(), 4);
        assert!(test.is_none());

        let five = Dataset::new(vec![vec![1.0]; 5], vec![0, 1, 0, 1, 1]).unwrap();
        let (train, test) = split_for_evaluation(&five);
        assert_eq!(train.len(), 4);
        assert_eq!(test.map(|t| t.len()), Some(1));
    }

    #[test]
    fn test_prepare_without_pairs() {
        let donors = vec![Donor::new(1, "Heart")];
        let recipients = vec![Recipient::new(2, "Kidney")];
        assert!(prepare_data(&donors, &recipients, &FEATURE_COLUMNS)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_evaluate_single_class_has_no_auc() {
        let forest = Forest::new(
            1,
            vec![organmatch_core::Tree::new(vec![organmatch_core::Node::leaf(0, 0.9)])],
            vec![0.0],
        );
        let test = Dataset::new(vec![vec![0.0], vec![1.0]], vec![1, 1]).unwrap();
        let eval = evaluate(&forest, &test);
        assert_eq!(eval.roc_auc, None);
        assert!(eval.roc_curve.is_none());
        assert_eq!(eval.confusion_matrix.true_positives(), 2);
        assert_eq!(eval.report.accuracy, 1.0);
    }

    #[test]
    fn test_evaluate_uses_forest_classes() {
        use organmatch_core::{Node, Tree};
        // A leaf of exactly 0.5 is a negative prediction
        let forest = Forest::new(
            1,
            vec![Tree::new(vec![
                Node::internal(0, 0, 0.5, 1, 2),
                Node::leaf(1, 0.5),
                Node::leaf(2, 0.8),
            ])],
            vec![1.0],
        );
        let test =
            Dataset::new(vec![vec![0.0], vec![0.0], vec![1.0], vec![1.0]], vec![0, 1, 1, 0])
                .unwrap();
        let eval = evaluate(&forest, &test);

        assert_eq!(eval.confusion_matrix.true_negatives(), 1);
        assert_eq!(eval.confusion_matrix.false_negatives(), 1);
        assert_eq!(eval.confusion_matrix.true_positives(), 1);
        assert_eq!(eval.confusion_matrix.false_positives(), 1);
        for (x, row) in test.features.iter().zip(0..) {
            let expected = u8::from(row >= 2);
            assert_eq!(forest.predict(x), expected);
        }
    }
}
