//! CART classification tree builder
//!
//! Greedy Gini-impurity splits over a random subset of features at each
//! node. Thresholds sit at the midpoint between consecutive distinct values
//! and samples with `x <= threshold` go left. Leaves store the fraction of
//! positive samples that reached them.

use organmatch_core::forest::{Node, Tree};

use crate::dataset::Dataset;
use crate::deterministic::LcgRng;

/// Growth limits for a single tree
#[derive(Clone, Debug)]
pub struct TreeConfig {
    /// `None` grows until the other limits stop it
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features examined per split
    pub max_features: usize,
}

impl TreeConfig {
    /// `max(1, floor(sqrt(n_features)))`
    pub fn sqrt_features(n_features: usize) -> usize {
        ((n_features as f64).sqrt().floor() as usize).max(1)
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: Some(10),
            min_samples_split: 5,
            min_samples_leaf: 2,
            max_features: 1,
        }
    }
}

/// Best split found for a node
#[derive(Debug, Clone)]
struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    /// Weighted impurity decrease `n*g - n_l*g_l - n_r*g_r`
    gain: f64,
}

/// A fitted tree plus its unnormalized per-feature impurity decrease
#[derive(Debug, Clone)]
pub struct GrownTree {
    pub tree: Tree,
    pub importances: Vec<f64>,
}

/// Builds one classification tree over a (possibly bootstrapped) sample
pub struct CartBuilder<'a> {
    config: TreeConfig,
    dataset: &'a Dataset,
    rng: LcgRng,
}

impl<'a> CartBuilder<'a> {
    pub fn new(dataset: &'a Dataset, config: TreeConfig, seed: u64) -> Self {
        Self {
            config,
            dataset,
            rng: LcgRng::new(seed),
        }
    }

    /// Grow a tree over the rows at `indices` (repeats allowed).
    pub fn build(mut self, indices: &[usize]) -> GrownTree {
        let mut nodes = Vec::new();
        let mut importances = vec![0.0; self.dataset.feature_count];

        if indices.is_empty() {
            nodes.push(Node::leaf(0, 0.0));
        } else {
            self.build_node(indices, 0, &mut nodes, &mut importances);
        }

        GrownTree {
            tree: Tree::new(nodes),
            importances,
        }
    }

    fn build_node(
        &mut self,
        indices: &[usize],
        depth: usize,
        nodes: &mut Vec<Node>,
        importances: &mut [f64],
    ) -> i32 {
        let current_idx = nodes.len() as i32;
        let n = indices.len();
        let positives = self.count_positives(indices);
        let probability = positives as f64 / n as f64;

        let depth_reached = self.config.max_depth.is_some_and(|max| depth >= max);
        if depth_reached
            || n < self.config.min_samples_split
            || n < 2 * self.config.min_samples_leaf
            || positives == 0
            || positives == n
        {
            nodes.push(Node::leaf(current_idx, probability));
            return current_idx;
        }

        let Some(split) = self.find_best_split(indices, positives) else {
            nodes.push(Node::leaf(current_idx, probability));
            return current_idx;
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| self.dataset.features[i][split.feature_idx] <= split.threshold);

        importances[split.feature_idx] += split.gain;

        // Children are patched in once their subtrees are placed
        nodes.push(Node::internal(
            current_idx,
            split.feature_idx as i32,
            split.threshold,
            -1,
            -1,
        ));

        let left = self.build_node(&left_indices, depth + 1, nodes, importances);
        let right = self.build_node(&right_indices, depth + 1, nodes, importances);

        let node = &mut nodes[current_idx as usize];
        node.left = left;
        node.right = right;

        current_idx
    }

    /// Examine random features until `max_features` non-constant ones have
    /// been scanned (or all features are exhausted).
    fn find_best_split(&mut self, indices: &[usize], positives: usize) -> Option<SplitCandidate> {
        let feature_count = self.dataset.feature_count;
        let mut order: Vec<usize> = (0..feature_count).collect();
        self.rng.shuffle(&mut order);

        let n = indices.len() as f64;
        let parent_impurity = n * gini(positives as f64, n);
        let mut best: Option<SplitCandidate> = None;
        let mut visited = 0;

        for feature_idx in order {
            if visited >= self.config.max_features {
                break;
            }

            let mut column: Vec<(f64, u8)> = indices
                .iter()
                .map(|&i| (self.dataset.features[i][feature_idx], self.dataset.labels[i]))
                .collect();
            column.sort_by(|a, b| a.0.total_cmp(&b.0));

            let (first, last) = (column[0].0, column[column.len() - 1].0);
            if first == last {
                continue;
            }
            visited += 1;

            if let Some(candidate) =
                self.best_threshold(feature_idx, &column, positives, parent_impurity)
            {
                if best.as_ref().map_or(true, |b| candidate.gain > b.gain) {
                    best = Some(candidate);
                }
            }
        }

        best
    }

    /// Sweep sorted values once, scoring each boundary between distinct values.
    fn best_threshold(
        &self,
        feature_idx: usize,
        column: &[(f64, u8)],
        positives: usize,
        parent_impurity: f64,
    ) -> Option<SplitCandidate> {
        let n = column.len();
        let min_leaf = self.config.min_samples_leaf;
        let mut left_pos = 0usize;
        let mut best: Option<SplitCandidate> = None;

        for i in 0..n - 1 {
            left_pos += column[i].1 as usize;
            let (value, next) = (column[i].0, column[i + 1].0);
            if value == next {
                continue;
            }

            let n_left = i + 1;
            let n_right = n - n_left;
            if n_left < min_leaf || n_right < min_leaf {
                continue;
            }

            let right_pos = positives - left_pos;
            let child_impurity = n_left as f64 * gini(left_pos as f64, n_left as f64)
                + n_right as f64 * gini(right_pos as f64, n_right as f64);
            let gain = parent_impurity - child_impurity;
            if gain <= f64::EPSILON {
                continue;
            }

            if best.as_ref().map_or(true, |b| gain > b.gain) {
                let mut threshold = value + (next - value) / 2.0;
                if threshold >= next {
                    threshold = value;
                }
                best = Some(SplitCandidate {
                    feature_idx,
                    threshold,
                    gain,
                });
            }
        }

        best
    }

    fn count_positives(&self, indices: &[usize]) -> usize {
        indices
            .iter()
            .filter(|&&i| self.dataset.labels[i] == 1)
            .count()
    }
}

/// Gini impurity of a node with `positives` out of `n` samples
fn gini(positives: f64, n: f64) -> f64 {
    if n == 0.0 {
        return 0.0;
    }
    let p = positives / n;
    1.0 - p * p - (1.0 - p) * (1.0 - p)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable() -> Dataset {
        Dataset::new(
            vec![
                vec![1.0, 7.0],
                vec![2.0, 7.0],
                vec![3.0, 7.0],
                vec![4.0, 7.0],
                vec![10.0, 7.0],
                vec![11.0, 7.0],
                vec![12.0, 7.0],
                vec![13.0, 7.0],
            ],
            vec![0, 0, 0, 0, 1, 1, 1, 1],
        )
        .unwrap()
    }

    fn config() -> TreeConfig {
        TreeConfig {
            max_depth: Some(5),
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: 1,
        }
    }

    #[test]
    fn test_gini() {
        assert_eq!(gini(0.0, 4.0), 0.0);
        assert_eq!(gini(4.0, 4.0), 0.0);
        assert!((gini(2.0, 4.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_sqrt_features() {
        assert_eq!(TreeConfig::sqrt_features(23), 4);
        assert_eq!(TreeConfig::sqrt_features(1), 1);
        assert_eq!(TreeConfig::sqrt_features(0), 1);
    }

    #[test]
    fn test_splits_on_informative_feature_at_midpoint() {
        let data = separable();
        let indices: Vec<usize> = (0..data.len()).collect();
        let grown = CartBuilder::new(&data, config(), 42).build(&indices);

        let root = &grown.tree.nodes[0];
        assert_eq!(root.feature_idx, 0);
        assert_eq!(root.threshold, 7.0);
        assert_eq!(grown.tree.predict_proba(&[2.5, 7.0]), 0.0);
        assert_eq!(grown.tree.predict_proba(&[12.5, 7.0]), 1.0);
        assert_eq!(grown.importances[1], 0.0);
        assert!(grown.importances[0] > 0.0);
        assert!(grown.tree.validate(2).is_ok());
    }

    #[test]
    fn test_pure_node_is_single_leaf() {
        let data = Dataset::new(vec![vec![1.0], vec![2.0], vec![3.0]], vec![1, 1, 1]).unwrap();
        let grown = CartBuilder::new(&data, config(), 1).build(&[0, 1, 2]);
        assert_eq!(grown.tree.nodes.len(), 1);
        assert_eq!(grown.tree.nodes[0].leaf, Some(1.0));
    }

    #[test]
    fn test_limits_are_honoured() {
        let data = separable();
        let indices: Vec<usize> = (0..data.len()).collect();

        let stump = TreeConfig {
            max_depth: Some(0),
            ..config()
        };
        let grown = CartBuilder::new(&data, stump, 42).build(&indices);
        assert_eq!(grown.tree.nodes.len(), 1);
        assert_eq!(grown.tree.nodes[0].leaf, Some(0.5));

        let big_leaves = TreeConfig {
            min_samples_leaf: 5,
            ..config()
        };
        let grown = CartBuilder::new(&data, big_leaves, 42).build(&indices);
        assert_eq!(grown.tree.nodes.len(), 1);

        let big_split = TreeConfig {
            min_samples_split: 9,
            ..config()
        };
        let grown = CartBuilder::new(&data, big_split, 42).build(&indices);
        assert_eq!(grown.tree.nodes.len(), 1);
    }

    #[test]
    fn test_build_is_deterministic() {
        let data = separable();
        let indices = [0, 0, 1, 3, 4, 5, 5, 7];
        let a = CartBuilder::new(&data, config(), 9).build(&indices);
        let b = CartBuilder::new(&data, config(), 9).build(&indices);
        assert_eq!(a.tree, b.tree);
        assert_eq!(a.importances, b.importances);
    }
}
