//! Random-forest trainer
//!
//! Each tree is grown on a bootstrap sample drawn with its own seed, so the
//! forest is identical whether trees are built in parallel or in sequence.

use organmatch_core::{Forest, HyperParams};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::cart::{CartBuilder, GrownTree, TreeConfig};
use crate::dataset::Dataset;
use crate::deterministic::{derive_seed, LcgRng};
use crate::errors::TrainerError;

/// Forest training configuration
#[derive(Clone, Debug)]
pub struct ForestConfig {
    pub params: HyperParams,
    /// Base seed; tree `i` uses `derive_seed(seed, i)`
    pub seed: u64,
}

impl ForestConfig {
    pub fn new(params: HyperParams, seed: u64) -> Self {
        Self { params, seed }
    }
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            params: HyperParams::default(),
            seed: organmatch_core::RANDOM_STATE,
        }
    }
}

/// Bootstrap-aggregated Gini tree trainer
pub struct ForestTrainer {
    config: ForestConfig,
}

impl ForestTrainer {
    pub fn new(config: ForestConfig) -> Self {
        Self { config }
    }

    /// Train a forest on the given dataset
    pub fn train(&self, dataset: &Dataset) -> Result<Forest, TrainerError> {
        self.config.params.validate()?;
        if dataset.is_empty() {
            return Err(TrainerError::Training("cannot train on an empty dataset".into()));
        }
        if dataset.feature_count == 0 {
            return Err(TrainerError::Training("dataset has no features".into()));
        }

        let params = self.config.params;
        let tree_config = TreeConfig {
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split,
            min_samples_leaf: params.min_samples_leaf,
            max_features: TreeConfig::sqrt_features(dataset.feature_count),
        };

        info!(
            "Training {} trees on {} samples ({} features, {} per split)",
            params.n_estimators,
            dataset.len(),
            dataset.feature_count,
            tree_config.max_features
        );

        let grown: Vec<GrownTree> = (0..params.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let seed = derive_seed(self.config.seed, tree_idx as u64);
                let mut rng = LcgRng::new(seed);
                let n = dataset.len();
                let sample: Vec<usize> = (0..n).map(|_| rng.next_range(n)).collect();

                let tree = CartBuilder::new(dataset, tree_config.clone(), rng.next_u64())
                    .build(&sample);
                debug!(
                    "Tree {}/{} grown: {} nodes, depth {}",
                    tree_idx + 1,
                    params.n_estimators,
                    tree.tree.nodes.len(),
                    tree.tree.depth()
                );
                tree
            })
            .collect();

        let importances = aggregate_importances(&grown, dataset.feature_count);
        let trees = grown.into_iter().map(|g| g.tree).collect();
        let forest = Forest::new(dataset.feature_count, trees, importances);
        forest.validate()?;

        info!("Forest trained with {} trees", forest.num_trees());
        Ok(forest)
    }
}

/// Normalize each tree's importances, average them, then renormalize.
///
/// Trees that never split contribute nothing. If no tree split at all the
/// result is all zeros.
pub fn aggregate_importances(trees: &[GrownTree], n_features: usize) -> Vec<f64> {
    let mut total = vec![0.0; n_features];
    for grown in trees {
        let sum: f64 = grown.importances.iter().sum();
        if sum <= 0.0 {
            continue;
        }
        for (acc, value) in total.iter_mut().zip(&grown.importances) {
            *acc += value / sum;
        }
    }

    if !trees.is_empty() {
        for acc in &mut total {
            *acc /= trees.len() as f64;
        }
    }

    let sum: f64 = total.iter().sum();
    if sum > 0.0 {
        for acc in &mut total {
            *acc /= sum;
        }
    }
    total
}
