//! Random-forest classifier model
//!
//! The positive-class probability is the mean of the per-tree leaf
//! probabilities.

use super::tree::Tree;
use crate::errors::{CoreError, Result};
use serde::{Deserialize, Serialize};

/// Current forest format version
pub const FOREST_VERSION: i32 = 1;

/// Ensemble of classification trees
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Forest {
    /// Model format version
    pub version: i32,

    /// Width of the expected feature vector
    pub n_features: usize,

    pub trees: Vec<Tree>,

    /// Normalized impurity-based importances, one per feature
    pub feature_importances: Vec<f64>,
}

impl Forest {
    pub fn new(n_features: usize, trees: Vec<Tree>, feature_importances: Vec<f64>) -> Self {
        Self {
            version: FOREST_VERSION,
            n_features,
            trees,
            feature_importances,
        }
    }

    /// Validate model structure
    pub fn validate(&self) -> Result<()> {
        if self.version != FOREST_VERSION {
            return Err(CoreError::ValidationFailed(format!(
                "Unsupported model version: {}",
                self.version
            )));
        }

        if self.trees.is_empty() {
            return Err(CoreError::ValidationFailed("Forest has no trees".to_string()));
        }

        if self.feature_importances.len() != self.n_features {
            return Err(CoreError::ValidationFailed(format!(
                "Expected {} feature importances, found {}",
                self.n_features,
                self.feature_importances.len()
            )));
        }

        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features).map_err(|e| {
                CoreError::ValidationFailed(format!("Tree {} validation failed: {}", i, e))
            })?;
        }

        Ok(())
    }

    /// Positive-class probability in [0, 1]
    pub fn predict_proba(&self, features: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.trees.iter().map(|t| t.predict_proba(features)).sum();
        sum / self.trees.len() as f64
    }

    /// Hard class prediction (1 when the positive probability wins)
    pub fn predict(&self, features: &[f64]) -> u8 {
        u8::from(self.predict_proba(features) > 0.5)
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::tree::Node;

    fn forest() -> Forest {
        let left_heavy = Tree::new(vec![
            Node::internal(0, 0, 0.5, 1, 2),
            Node::leaf(1, 0.0),
            Node::leaf(2, 1.0),
        ]);
        let constant = Tree::new(vec![Node::leaf(0, 0.5)]);
        Forest::new(1, vec![left_heavy, constant], vec![1.0])
    }

    #[test]
    fn test_mean_probability() {
        let f = forest();
        assert_eq!(f.predict_proba(&[0.0]), 0.25);
        assert_eq!(f.predict_proba(&[1.0]), 0.75);
        assert_eq!(f.predict(&[0.0]), 0);
        assert_eq!(f.predict(&[1.0]), 1);
    }

    #[test]
    fn test_validation() {
        assert!(forest().validate().is_ok());

        let mut wrong_width = forest();
        wrong_width.feature_importances.clear();
        assert!(wrong_width.validate().is_err());

        let empty = Forest::new(1, Vec::new(), vec![1.0]);
        assert!(empty.validate().is_err());
    }
}
