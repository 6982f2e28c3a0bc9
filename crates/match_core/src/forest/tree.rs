//! Decision tree structures for forest inference
//!
//! Internal nodes route left when `feature <= threshold`; leaves carry the
//! fraction of positive training samples that reached them.

use serde::{Deserialize, Serialize};

/// A decision tree node (internal or leaf)
///
/// For internal nodes `feature_idx >= 0`, `left`/`right` point to child
/// indices and `leaf` is `None`. Leaves have `feature_idx == -1`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    /// Node ID (for reference, not used in traversal)
    pub id: i32,

    /// Left child index (-1 for leaf nodes)
    pub left: i32,

    /// Right child index (-1 for leaf nodes)
    pub right: i32,

    /// Feature index to split on (-1 for leaf nodes)
    pub feature_idx: i32,

    pub threshold: f64,

    /// Positive-class probability for leaf nodes
    pub leaf: Option<f64>,
}

impl Node {
    /// Create a new internal (split) node
    pub fn internal(id: i32, feature_idx: i32, threshold: f64, left: i32, right: i32) -> Self {
        Self {
            id,
            left,
            right,
            feature_idx,
            threshold,
            leaf: None,
        }
    }

    /// Create a new leaf node
    pub fn leaf(id: i32, probability: f64) -> Self {
        Self {
            id,
            left: -1,
            right: -1,
            feature_idx: -1,
            threshold: 0.0,
            leaf: Some(probability),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.feature_idx == -1 || self.leaf.is_some()
    }
}

/// A single classification tree; node 0 is the root
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Positive-class probability for one sample.
    ///
    /// Malformed structure (bad child or feature index) evaluates to 0.
    pub fn predict_proba(&self, features: &[f64]) -> f64 {
        let mut idx = 0usize;

        loop {
            let Some(node) = self.nodes.get(idx) else {
                return 0.0;
            };

            if node.is_leaf() {
                return node.leaf.unwrap_or(0.0);
            }

            let Some(&value) = features.get(node.feature_idx as usize) else {
                return 0.0;
            };

            let next = if value <= node.threshold {
                node.left
            } else {
                node.right
            };
            if next < 0 || next as usize >= self.nodes.len() {
                return 0.0;
            }
            idx = next as usize;
        }
    }

    /// Number of split levels on the longest root-to-leaf path.
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize, guard: usize) -> usize {
            match nodes.get(idx) {
                Some(node) if !node.is_leaf() && guard < nodes.len() => {
                    1 + walk(nodes, node.left as usize, guard + 1)
                        .max(walk(nodes, node.right as usize, guard + 1))
                }
                _ => 0,
            }
        }
        walk(&self.nodes, 0, 0)
    }

    /// Validate tree structure
    pub fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("Tree has no nodes".to_string());
        }

        for (i, node) in self.nodes.iter().enumerate() {
            if node.is_leaf() {
                match node.leaf {
                    Some(p) if (0.0..=1.0).contains(&p) => {}
                    Some(p) => return Err(format!("Leaf node {i} has probability {p}")),
                    None => return Err(format!("Leaf node {i} has no leaf value")),
                }
                continue;
            }

            if node.left < 0 || node.left as usize >= self.nodes.len() {
                return Err(format!("Node {} has invalid left child: {}", i, node.left));
            }
            if node.right < 0 || node.right as usize >= self.nodes.len() {
                return Err(format!("Node {} has invalid right child: {}", i, node.right));
            }
            // Children always follow their parent, which rules out cycles
            if node.left as usize <= i || node.right as usize <= i {
                return Err(format!(
                    "Node {} points back to an earlier node ({}, {})",
                    i, node.left, node.right
                ));
            }
            if node.feature_idx < 0 || node.feature_idx as usize >= n_features {
                return Err(format!(
                    "Internal node {} has invalid feature index: {}",
                    i, node.feature_idx
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump() -> Tree {
        Tree::new(vec![
            Node::internal(0, 0, 50.0, 1, 2),
            Node::leaf(1, 0.25),
            Node::leaf(2, 0.75),
        ])
    }

    #[test]
    fn test_tree_evaluation() {
        let tree = stump();
        assert_eq!(tree.predict_proba(&[30.0]), 0.25);
        assert_eq!(tree.predict_proba(&[50.0]), 0.25); // Equal goes left
        assert_eq!(tree.predict_proba(&[60.0]), 0.75);
        assert_eq!(tree.predict_proba(&[]), 0.0);
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn test_tree_validation() {
        assert!(stump().validate(1).is_ok());
        assert!(stump().validate(0).is_err());

        let invalid = Tree::new(vec![
            Node::internal(0, 0, 50.0, 5, 2),
            Node::leaf(1, 0.1),
            Node::leaf(2, 0.2),
        ]);
        assert!(invalid.validate(1).is_err());

        let bad_leaf = Tree::new(vec![Node::leaf(0, 1.5)]);
        assert!(bad_leaf.validate(1).is_err());
    }

    #[test]
    fn test_cyclic_children_rejected() {
        let self_loop = Tree::new(vec![
            Node::internal(0, 0, 50.0, 0, 1),
            Node::leaf(1, 0.1),
        ]);
        assert!(self_loop.validate(1).is_err());

        let back_edge = Tree::new(vec![
            Node::internal(0, 0, 50.0, 1, 2),
            Node::internal(1, 0, 10.0, 0, 2),
            Node::leaf(2, 0.3),
        ]);
        let err = back_edge.validate(1).unwrap_err();
        assert!(err.contains("earlier node"));

        // Children after the parent in any order are fine
        let reordered = Tree::new(vec![
            Node::internal(0, 0, 50.0, 2, 1),
            Node::leaf(1, 0.75),
            Node::leaf(2, 0.25),
        ]);
        assert!(reordered.validate(1).is_ok());
        assert_eq!(reordered.predict_proba(&[10.0]), 0.25);
    }
}
