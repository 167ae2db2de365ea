//! Decision tree implementation
//!
//! Binary CART classifier with weighted Gini impurity. Each split draws a
//! fresh random subset of candidate features.

use crate::error::{ChurnError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Splits whose weighted impurity decrease is below this (per unit of node
/// weight) are treated as no improvement
const MIN_IMPURITY_DECREASE: f64 = 1e-12;

/// Decision tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with the weighted-majority class
    Leaf {
        value: u8,
        /// Weighted share of class 1 in the leaf
        positive_fraction: f64,
        n_samples: usize,
    },
    /// Internal node; rows with `x[feature_idx] <= threshold` go left
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        impurity: f64,
    },
}

#[derive(Debug, Clone, Copy)]
struct BestSplit {
    feature_idx: usize,
    threshold: f64,
    /// `W * g(node) - W_l * g(left) - W_r * g(right)`
    improvement: f64,
}

/// Decision tree classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Tree root
    root: Option<TreeNode>,
    /// Maximum depth
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features considered per split (all when `None`)
    pub max_features: Option<usize>,
    /// Seed for per-split feature sampling
    pub random_state: u64,
    /// Number of features
    n_features: usize,
    /// Weighted impurity decrease per feature, not normalized
    feature_importances: Option<Array1<f64>>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionTree {
    pub fn new() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            random_state: 0,
            n_features: 0,
            feature_importances: None,
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features);
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Fit with every record weighing 1
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<u8>) -> Result<&mut Self> {
        let weights = vec![1.0; y.len()];
        self.fit_weighted(x, y, &weights)
    }

    /// Fit with per-record weights.
    ///
    /// A single-class input is valid here and yields a one-leaf tree; the
    /// forest feeds trees bootstrap samples that may lack a class.
    pub fn fit_weighted(&mut self, x: &Array2<f64>, y: &Array1<u8>, sample_weight: &[f64]) -> Result<&mut Self> {
        let n_samples = x.nrows();

        if n_samples != y.len() || n_samples != sample_weight.len() {
            return Err(ChurnError::ShapeError {
                expected: format!("y and weight length = {}", n_samples),
                actual: format!("y length = {}, weight length = {}", y.len(), sample_weight.len()),
            });
        }
        if n_samples == 0 {
            return Err(ChurnError::FitError("no training rows".to_string()));
        }
        if let Some((row, &label)) = y.iter().enumerate().find(|&(_, &l)| l > 1) {
            return Err(ChurnError::InvalidLabel {
                row,
                value: label.to_string(),
            });
        }

        self.n_features = x.ncols();
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let mut importances = vec![0.0; self.n_features];

        let indices: Vec<usize> = (0..n_samples).collect();
        let root = self.build_tree(x, y, sample_weight, &indices, 0, &mut rng, &mut importances);

        self.root = Some(root);
        self.feature_importances = Some(Array1::from_vec(importances));
        Ok(self)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_tree(
        &self,
        x: &Array2<f64>,
        y: &Array1<u8>,
        w: &[f64],
        indices: &[usize],
        depth: usize,
        rng: &mut ChaCha8Rng,
        importances: &mut [f64],
    ) -> TreeNode {
        let n_samples = indices.len();
        let totals = class_totals(y, w, indices);
        let impurity = gini(totals);

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || totals[0] <= 0.0
            || totals[1] <= 0.0;

        if !should_stop {
            if let Some(split) = self.find_best_split(x, y, w, indices, totals, rng) {
                let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
                    .iter()
                    .partition(|&&i| x[[i, split.feature_idx]] <= split.threshold);

                importances[split.feature_idx] += split.improvement;

                let left = Box::new(self.build_tree(x, y, w, &left_indices, depth + 1, rng, importances));
                let right = Box::new(self.build_tree(x, y, w, &right_indices, depth + 1, rng, importances));

                return TreeNode::Split {
                    feature_idx: split.feature_idx,
                    threshold: split.threshold,
                    left,
                    right,
                    n_samples,
                    impurity,
                };
            }
        }

        let total = totals[0] + totals[1];
        TreeNode::Leaf {
            // ties go to class 0
            value: u8::from(totals[1] > totals[0]),
            positive_fraction: if total > 0.0 { totals[1] / total } else { 0.0 },
            n_samples,
        }
    }

    /// Scan a random permutation of the features. The first `max_features`
    /// are always examined; scanning continues past them only until some
    /// feature yields a valid split.
    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<u8>,
        w: &[f64],
        indices: &[usize],
        totals: [f64; 2],
        rng: &mut ChaCha8Rng,
    ) -> Option<BestSplit> {
        let n_features = x.ncols();
        let n_features_to_try = self.max_features.unwrap_or(n_features).clamp(1, n_features.max(1));

        let mut features: Vec<usize> = (0..n_features).collect();
        features.shuffle(rng);

        let mut best: Option<BestSplit> = None;
        for (visited, &feature_idx) in features.iter().enumerate() {
            if visited >= n_features_to_try && best.is_some() {
                break;
            }
            if let Some(candidate) = self.best_split_on(x, y, w, indices, totals, feature_idx) {
                if best.map_or(true, |b| candidate.improvement > b.improvement) {
                    best = Some(candidate);
                }
            }
        }
        best
    }

    fn best_split_on(
        &self,
        x: &Array2<f64>,
        y: &Array1<u8>,
        w: &[f64],
        indices: &[usize],
        totals: [f64; 2],
        feature_idx: usize,
    ) -> Option<BestSplit> {
        let n = indices.len();
        let mut order: Vec<(f64, usize)> = indices.iter().map(|&i| (x[[i, feature_idx]], i)).collect();
        order.sort_by(|a, b| a.0.total_cmp(&b.0));

        let node_weight = totals[0] + totals[1];
        let parent = node_weight * gini(totals);
        let mut best_improvement = MIN_IMPURITY_DECREASE * node_weight;
        let mut best: Option<BestSplit> = None;

        let mut left = [0.0f64; 2];
        for pos in 0..n - 1 {
            let (value, i) = order[pos];
            left[usize::from(y[i])] += w[i];

            let next = order[pos + 1].0;
            if next <= value {
                continue;
            }
            let left_count = pos + 1;
            if left_count < self.min_samples_leaf || n - left_count < self.min_samples_leaf {
                continue;
            }

            let right = [totals[0] - left[0], totals[1] - left[1]];
            let left_weight = left[0] + left[1];
            let right_weight = right[0] + right[1];
            let improvement = parent - left_weight * gini(left) - right_weight * gini(right);

            if improvement > best_improvement {
                best_improvement = improvement;
                let mut threshold = value / 2.0 + next / 2.0;
                if threshold >= next || !threshold.is_finite() {
                    threshold = value;
                }
                best = Some(BestSplit {
                    feature_idx,
                    threshold,
                    improvement,
                });
            }
        }
        best
    }

    fn leaf_for(&self, sample: ArrayView1<f64>) -> Option<&TreeNode> {
        let mut node = self.root.as_ref()?;
        loop {
            match node {
                TreeNode::Leaf { .. } => return Some(node),
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    node = if sample[*feature_idx] <= *threshold { &**left } else { &**right };
                }
            }
        }
    }

    fn check_input(&self, x: &Array2<f64>) -> Result<()> {
        if self.root.is_none() {
            return Err(ChurnError::NotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(ChurnError::shape(
                format!("{} features", self.n_features),
                format!("{} features", x.ncols()),
            ));
        }
        Ok(())
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<u8>> {
        self.check_input(x)?;
        Ok(x.rows()
            .into_iter()
            .map(|row| match self.leaf_for(row) {
                Some(TreeNode::Leaf { value, .. }) => *value,
                _ => 0,
            })
            .collect())
    }

    /// Weighted share of class 1 in each row's leaf
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.check_input(x)?;
        Ok(x.rows()
            .into_iter()
            .map(|row| match self.leaf_for(row) {
                Some(TreeNode::Leaf { positive_fraction, .. }) => *positive_fraction,
                _ => 0.0,
            })
            .collect())
    }

    /// Weighted impurity decrease per feature, summed over this tree's splits
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    pub fn root(&self) -> Option<&TreeNode> {
        self.root.as_ref()
    }

    /// Get tree depth
    pub fn get_depth(&self) -> usize {
        self.root.as_ref().map_or(0, node_depth)
    }

    /// Get number of leaves
    pub fn get_n_leaves(&self) -> usize {
        self.root.as_ref().map_or(0, count_leaves)
    }
}

fn class_totals(y: &Array1<u8>, w: &[f64], indices: &[usize]) -> [f64; 2] {
    let mut totals = [0.0f64; 2];
    for &i in indices {
        totals[usize::from(y[i])] += w[i];
    }
    totals
}

fn gini(totals: [f64; 2]) -> f64 {
    let total = totals[0] + totals[1];
    if total <= 0.0 {
        return 0.0;
    }
    let p0 = totals[0] / total;
    let p1 = totals[1] / total;
    1.0 - p0 * p0 - p1 * p1
}

fn node_depth(node: &TreeNode) -> usize {
    match node {
        TreeNode::Leaf { .. } => 1,
        TreeNode::Split { left, right, .. } => 1 + node_depth(left).max(node_depth(right)),
    }
}

fn count_leaves(node: &TreeNode) -> usize {
    match node {
        TreeNode::Leaf { .. } => 1,
        TreeNode::Split { left, right, .. } => count_leaves(left) + count_leaves(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classifier_simple() {
        let x = array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
        let y = array![0, 0, 1, 1];

        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();

        assert_eq!(tree.predict(&x).unwrap(), y);
        assert_eq!(tree.get_n_leaves(), 2);
        match tree.root().unwrap() {
            TreeNode::Split { feature_idx, threshold, .. } => {
                assert_eq!(*feature_idx, 0);
                assert_eq!(*threshold, 0.5);
            }
            leaf => panic!("expected a split, got {:?}", leaf),
        }
    }

    #[test]
    fn test_max_depth() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0]];
        let y = array![0, 1, 0, 1, 0, 1];

        let mut tree = DecisionTree::new().with_max_depth(2);
        tree.fit(&x, &y).unwrap();

        assert!(tree.get_depth() <= 3);
    }

    #[test]
    fn test_feature_importances_constant_feature() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [4.0, 0.0]];
        let y = array![0, 0, 1, 1];

        let mut tree = DecisionTree::new().with_max_features(1).with_random_state(3);
        tree.fit(&x, &y).unwrap();

        let importances = tree.feature_importances().unwrap();
        assert_eq!(importances[1], 0.0);
        // root gini 0.5 over weight 4, both children pure
        assert!((importances[0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_leaf_majority() {
        let x = array![[0.0], [0.0], [0.0]];
        let y = array![0, 0, 1];

        let mut tree = DecisionTree::new();
        tree.fit_weighted(&x, &y, &[1.0, 1.0, 3.0]).unwrap();

        assert_eq!(tree.predict(&array![[0.0]]).unwrap()[0], 1);
        assert!((tree.predict_proba(&array![[0.0]]).unwrap()[0] - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_single_class_is_leaf() {
        let mut tree = DecisionTree::new();
        tree.fit(&array![[0.0], [1.0]], &array![1, 1]).unwrap();
        assert_eq!(tree.get_n_leaves(), 1);
        assert_eq!(tree.predict(&array![[5.0]]).unwrap()[0], 1);
    }

    #[test]
    fn test_predict_errors() {
        let tree = DecisionTree::new();
        assert!(matches!(tree.predict(&array![[0.0]]), Err(ChurnError::NotFitted)));

        let mut tree = DecisionTree::new();
        tree.fit(&array![[0.0], [1.0]], &array![0, 1]).unwrap();
        assert!(matches!(
            tree.predict(&array![[0.0, 1.0]]),
            Err(ChurnError::ShapeError { .. })
        ));
    }
}
