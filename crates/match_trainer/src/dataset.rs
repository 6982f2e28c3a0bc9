//! Labelled training data and deterministic splitting
//!
//! A `Dataset` is an imputed feature matrix paired with binary labels.
//! Splitting shuffles row indices with the seeded LCG so repeated runs on
//! the same snapshot hold out the same rows.

use organmatch_core::FeatureMatrix;

use crate::deterministic::LcgRng;
use crate::errors::TrainerError;

/// Training dataset with dense features and 0/1 labels
#[derive(Clone, Debug, Default)]
pub struct Dataset {
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<u8>,
    pub feature_count: usize,
}

impl Dataset {
    pub fn new(features: Vec<Vec<f64>>, labels: Vec<u8>) -> Result<Self, TrainerError> {
        if features.len() != labels.len() {
            return Err(TrainerError::Dataset(format!(
                "{} rows but {} labels",
                features.len(),
                labels.len()
            )));
        }
        let feature_count = features.first().map(Vec::len).unwrap_or(0);
        if let Some(pos) = features.iter().position(|row| row.len() != feature_count) {
            return Err(TrainerError::Dataset(format!(
                "row {} has {} features, expected {}",
                pos,
                features[pos].len(),
                feature_count
            )));
        }
        if let Some(bad) = labels.iter().find(|&&l| l > 1) {
            return Err(TrainerError::Dataset(format!("label {} is not binary", bad)));
        }
        Ok(Self {
            features,
            labels,
            feature_count,
        })
    }

    /// Take an already imputed matrix; NaN cells are rejected.
    pub fn from_matrix(matrix: &FeatureMatrix, labels: Vec<u8>) -> Result<Self, TrainerError> {
        if matrix.rows.iter().flatten().any(|v| v.is_nan()) {
            return Err(TrainerError::Dataset(
                "feature matrix still contains missing values".to_string(),
            ));
        }
        let mut dataset = Self::new(matrix.rows.clone(), labels)?;
        dataset.feature_count = matrix.n_features();
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Fraction of rows labelled 1
    pub fn positive_rate(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.labels.iter().filter(|&&l| l == 1).count() as f64 / self.len() as f64
    }

    /// Rows at `indices`, in that order (repeats allowed)
    pub fn subset(&self, indices: &[usize]) -> Self {
        Self {
            features: indices.iter().map(|&i| self.features[i].clone()).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
            feature_count: self.feature_count,
        }
    }

    /// Hold out `ceil(len * test_fraction)` shuffled rows as a test set.
    ///
    /// Returns `(train, test)`. The training side always keeps at least one row.
    pub fn split_train_test(&self, test_fraction: f64, seed: u64) -> (Self, Self) {
        let n = self.len();
        let mut indices: Vec<usize> = (0..n).collect();
        LcgRng::new(seed).shuffle(&mut indices);

        let n_test = ((n as f64 * test_fraction).ceil() as usize).min(n.saturating_sub(1));
        let (test_idx, train_idx) = indices.split_at(n_test);
        (self.subset(train_idx), self.subset(test_idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(n: usize) -> Dataset {
        let features = (0..n).map(|i| vec![i as f64, (i * 2) as f64]).collect();
        let labels = (0..n).map(|i| (i % 2) as u8).collect();
        Dataset::new(features, labels).unwrap()
    }

    #[test]
    fn test_rejects_mismatched_lengths() {
        assert!(Dataset::new(vec![vec![1.0]], vec![]).is_err());
        assert!(Dataset::new(vec![vec![1.0], vec![1.0, 2.0]], vec![0, 1]).is_err());
        assert!(Dataset::new(vec![vec![1.0]], vec![2]).is_err());
    }

    #[test]
    fn test_split_sizes_round_up() {
        let (train, test) = dataset(5).split_train_test(0.2, 42);
        assert_eq!((train.len(), test.len()), (4, 1));

        let (train, test) = dataset(11).split_train_test(0.2, 42);
        assert_eq!((train.len(), test.len()), (8, 3));
    }

    #[test]
    fn test_split_is_deterministic_and_disjoint() {
        let data = dataset(30);
        let (train_a, test_a) = data.split_train_test(0.2, 42);
        let (train_b, test_b) = data.split_train_test(0.2, 42);
        assert_eq!(test_a.features, test_b.features);
        assert_eq!(train_a.features, train_b.features);

        let mut seen: Vec<f64> = train_a
            .features
            .iter()
            .chain(test_a.features.iter())
            .map(|row| row[0])
            .collect();
        seen.sort_by(f64::total_cmp);
        assert_eq!(seen, (0..30).map(|i| i as f64).collect::<Vec<_>>());
    }

    #[test]
    fn test_positive_rate() {
        assert_eq!(dataset(4).positive_rate(), 0.5);
        assert_eq!(Dataset::default().positive_rate(), 0.0);
    }
}
